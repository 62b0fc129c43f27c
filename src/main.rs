use clap::Parser;
use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use gridbot_fleet::client::sim::SimGrid;
use gridbot_fleet::config::{CliArgs, FleetConfig};
use gridbot_fleet::console::{self, CommandOutcome};
use gridbot_fleet::fleet::FleetManager;

/// How long to wait for bots to log out before exiting anyway
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();
    let cli = CliArgs::parse();

    // Initialize logging
    let filter = match &cli.log_level {
        Some(level) => EnvFilter::try_new(level)?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("Gridbot fleet v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration; nothing launches unless it is valid
    let config = FleetConfig::load(&cli);
    config.validate()?;
    let template = config.template()?;
    info!(
        "Configuration loaded: {} bots, behaviours [{}], start {}, {}ms apart",
        config.bot_count,
        template.behaviours,
        template.start,
        config.login_delay.as_millis()
    );

    let seed = config.seed.unwrap_or_else(rand::random);
    let grid = SimGrid::new(config.sim_config(), seed);
    info!("Simulated grid: {} regions, seed {}", grid.regions().len(), seed);

    let manager = Arc::new(FleetManager::new(Arc::new(grid), config.fleet_settings())?);

    #[cfg(feature = "metrics_server")]
    {
        if let Some(port) = config.metrics_port {
            let metrics = manager.metrics().clone();
            tokio::spawn(async move {
                if let Err(e) = gridbot_fleet::metrics::start_metrics_server(metrics, port).await {
                    error!("Metrics server error: {}", e);
                }
            });
        }
    }
    #[cfg(not(feature = "metrics_server"))]
    {
        if config.metrics_port.is_some() {
            warn!("Built without metrics_server, ignoring metrics port");
        }
    }

    // The launch sleeps between bots, so it gets its own thread
    {
        let manager = manager.clone();
        let count = config.bot_count;
        std::thread::Builder::new()
            .name("launcher".to_string())
            .spawn(move || {
                if let Err(e) = manager.connect_bots(count, &template) {
                    error!("Launch aborted: {}", e);
                }
            })?;
    }

    // Blocking stdin reads stay off the runtime
    let (line_tx, mut lines) = mpsc::unbounded_channel::<String>();
    std::thread::Builder::new()
        .name("console".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if line_tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Failed to read console input: {}", e);
                        break;
                    }
                }
            }
        })?;

    println!("Type 'help' for commands");
    let mut console_open = true;
    loop {
        tokio::select! {
            line = lines.recv(), if console_open => {
                let Some(line) = line else {
                    info!("Console input closed, Ctrl+C to stop the fleet");
                    console_open = false;
                    continue;
                };
                let command = match console::parse(&line) {
                    Ok(Some(command)) => command,
                    Ok(None) => continue,
                    Err(e) => {
                        println!("{}", e);
                        continue;
                    }
                };
                let handle = manager.clone();
                match tokio::task::spawn_blocking(move || console::execute(&handle, command)).await? {
                    CommandOutcome::Output(text) => println!("{}", text),
                    CommandOutcome::Exit(text) => {
                        println!("{}", text);
                        break;
                    }
                }
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!("Failed to listen for Ctrl+C: {}", e);
                }
                info!("Shutdown signal received, disconnecting all bots");
                manager.disconnect(None);
                break;
            }
        }
    }

    // Cleanup
    let handle = manager.clone();
    let drained = tokio::task::spawn_blocking(move || {
        handle.join_workers();
        handle.wait_for_drain(DRAIN_TIMEOUT)
    })
    .await?;
    if !drained {
        warn!("Exiting with bots still active");
    }

    let metrics = manager.metrics().snapshot();
    info!(
        "Fleet stopped: {} launched, {} logins, {} login failures, {} network failures",
        metrics.bots_launched, metrics.logins_succeeded, metrics.login_failures, metrics.network_failures
    );

    Ok(())
}
