use crossbeam_channel::{unbounded, Sender};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::client::ClientFactory;
use crate::fleet::bot::{Bot, BotDetail, BotTemplate, BotWorker, ConnectionState, Pacing};
use crate::fleet::events::{spawn_notifier, FleetEvent};
use crate::fleet::region::{RegionRecord, RegionRegistry};
use crate::fleet::status::FleetStatus;
use crate::metrics::FleetMetrics;

/// Timing knobs for a fleet run
#[derive(Debug, Clone)]
pub struct FleetSettings {
    /// Pause between consecutive launches
    pub stagger: Duration,
    pub pacing: Pacing,
    /// Seed for the shared random source; entropy when absent
    pub seed: Option<u64>,
}

impl Default for FleetSettings {
    fn default() -> Self {
        Self {
            stagger: Duration::from_millis(5000),
            pacing: Pacing::default(),
            seed: None,
        }
    }
}

/// Guarded by the collection lock
struct FleetState {
    /// Launch order
    bots: Vec<Arc<Bot>>,
    /// Set by the first disconnect or successful shutdown; never cleared
    disconnecting: bool,
}

/// Result of a disconnect request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisconnectReport {
    /// Connected bots without a pending shutdown when the request was made
    pub connected: usize,
    /// Bots asked to shut down
    pub requested: usize,
}

/// Fleet manager: owns the bot collection and orchestrates launch and
/// teardown. Every operation takes `&self`, so one manager can be shared
/// between the launcher thread and the console.
pub struct FleetManager {
    state: Mutex<FleetState>,
    regions: Arc<RegionRegistry>,
    metrics: Arc<FleetMetrics>,
    factory: Arc<dyn ClientFactory>,
    events: Sender<FleetEvent>,
    rng: Mutex<StdRng>,
    settings: FleetSettings,
}

impl FleetManager {
    /// Create a manager and start its event notifier
    pub fn new(factory: Arc<dyn ClientFactory>, settings: FleetSettings) -> Result<Self, FleetError> {
        let regions = Arc::new(RegionRegistry::new());
        let metrics = Arc::new(FleetMetrics::new());
        let (events, rx) = unbounded();
        spawn_notifier(rx, regions.clone(), metrics.clone())?;

        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            state: Mutex::new(FleetState {
                bots: Vec::new(),
                disconnecting: false,
            }),
            regions,
            metrics,
            factory,
            events,
            rng: Mutex::new(rng),
            settings,
        })
    }

    /// Launch `count` bots in index order, sleeping the stagger delay
    /// between launches. Stops early once a disconnect has been issued.
    /// Blocks the caller for the whole launch; returns how many bots were
    /// launched.
    pub fn connect_bots(&self, count: usize, template: &BotTemplate) -> Result<usize, FleetError> {
        info!(
            "Launching {} bots ({}), {}ms apart",
            count,
            template.behaviours,
            self.settings.stagger.as_millis()
        );

        let mut launched = 0;
        for index in 0..count {
            if self.state.lock().disconnecting {
                info!("Disconnect in progress, launch stopped after {} bots", launched);
                break;
            }

            let spec = template
                .spec_for(index)
                .ok_or(FleetError::SuffixOverflow { from: template.from, index })?;
            let worker = BotWorker {
                client: self.factory.create(&spec),
                behaviours: spec.behaviours.instantiate(),
                events: self.events.clone(),
                pacing: self.settings.pacing,
                rng: StdRng::seed_from_u64(self.rng.lock().gen()),
            };
            let bot = Arc::new(Bot::new(spec));

            {
                let mut state = self.state.lock();
                // Client creation can be slow; a teardown may have started meanwhile
                if state.disconnecting {
                    info!("Disconnect in progress, launch stopped after {} bots", launched);
                    break;
                }
                if state.bots.iter().any(|b| b.name() == bot.name()) {
                    return Err(FleetError::DuplicateBot(bot.name().to_string()));
                }
                state.bots.push(bot.clone());
            }

            if let Err(e) = bot.spawn(worker) {
                self.state.lock().bots.retain(|b| !Arc::ptr_eq(b, &bot));
                return Err(e.into());
            }
            self.metrics.record_launch();
            launched += 1;
            debug!(bot = %bot.name(), "Launched {}/{}", launched, count);

            if index + 1 < count && !self.settings.stagger.is_zero() {
                std::thread::sleep(self.settings.stagger);
            }
        }

        info!("Launched {} bots", launched);
        Ok(launched)
    }

    /// Ask up to `count` Connected bots (all of them when `None`) to shut
    /// down, newest first. Returns without waiting for any teardown.
    pub fn disconnect(&self, count: Option<usize>) -> DisconnectReport {
        let (connected, targets) = {
            let mut state = self.state.lock();
            state.disconnecting = true;

            let candidates: Vec<&Arc<Bot>> = state
                .bots
                .iter()
                .rev()
                .filter(|b| b.is_connected() && !b.shutdown_requested())
                .collect();
            let connected = candidates.len();
            let wanted = count.map_or(connected, |n| n.min(connected));

            // Lazy: only the first `wanted` bots that accept are signalled
            let targets: Vec<Arc<Bot>> = candidates
                .into_iter()
                .filter(|b| b.request_shutdown())
                .take(wanted)
                .cloned()
                .collect();
            (connected, targets)
        };

        self.metrics.record_disconnect_requests(targets.len());
        info!("Disconnecting {} of {} connected bots", targets.len(), connected);

        for bot in &targets {
            spawn_teardown(bot.clone());
        }

        DisconnectReport {
            connected,
            requested: targets.len(),
        }
    }

    /// Succeeds only when no bot is Connected. Also stops any launch in
    /// progress.
    pub fn shutdown(&self) -> Result<(), FleetError> {
        let mut state = self.state.lock();
        let connected = state.bots.iter().filter(|b| b.is_connected()).count();
        if connected > 0 {
            warn!("Shutdown refused, {} bots still connected", connected);
            return Err(FleetError::StillConnected { connected });
        }
        state.disconnecting = true;
        info!("Fleet shut down");
        Ok(())
    }

    pub fn status(&self) -> FleetStatus {
        let rows = {
            let state = self.state.lock();
            state.bots.iter().map(|b| b.status_row()).collect()
        };
        FleetStatus::from_rows(rows)
    }

    pub fn regions(&self) -> Vec<RegionRecord> {
        self.regions.snapshot()
    }

    pub fn find_bot(&self, name: &str) -> Option<BotDetail> {
        let state = self.state.lock();
        state.bots.iter().find(|b| b.name() == name).map(|b| b.detail())
    }

    pub fn connected_count(&self) -> usize {
        self.count_in(ConnectionState::Connected)
    }

    pub fn bot_count(&self) -> usize {
        self.state.lock().bots.len()
    }

    pub fn is_disconnecting(&self) -> bool {
        self.state.lock().disconnecting
    }

    pub fn metrics(&self) -> &Arc<FleetMetrics> {
        &self.metrics
    }

    /// Poll until every bot is Disconnected or `timeout` passes
    pub fn wait_for_drain(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let active = {
                let state = self.state.lock();
                state.bots.iter().filter(|b| b.state() != ConnectionState::Disconnected).count()
            };
            if active == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                warn!("{} bots still active after {}ms", active, timeout.as_millis());
                return false;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    /// Stop every bot and join the worker threads that no teardown task has
    /// claimed. Used on process exit. Returns how many workers were joined.
    pub fn join_workers(&self) -> usize {
        let bots: Vec<Arc<Bot>> = {
            let mut state = self.state.lock();
            state.disconnecting = true;
            state.bots.clone()
        };

        let mut joined = 0;
        for bot in &bots {
            bot.request_shutdown();
            if bot.join_worker() {
                joined += 1;
            }
        }
        debug!("Joined {} bot workers", joined);
        joined
    }

    fn count_in(&self, wanted: ConnectionState) -> usize {
        let state = self.state.lock();
        state.bots.iter().filter(|b| b.state() == wanted).count()
    }
}

/// Join a bot's worker on a detached thread so the caller never waits on it
fn spawn_teardown(bot: Arc<Bot>) {
    let name = bot.name().to_string();
    let spawned = std::thread::Builder::new()
        .name(format!("teardown {}", name))
        .spawn(move || {
            let started = Instant::now();
            if bot.join_worker() {
                debug!(bot = %bot.name(), "Teardown took {}ms", started.elapsed().as_millis());
            }
        });
    if let Err(e) = spawned {
        error!(bot = %name, "Failed to spawn teardown task: {}", e);
    }
}

/// Fleet manager errors
#[derive(Debug, thiserror::Error)]
pub enum FleetError {
    #[error("{connected} bots still connected; disconnect them first")]
    StillConnected { connected: usize },
    #[error("Bot name already in use: {0}")]
    DuplicateBot(String),
    #[error("Bot suffix overflows: first suffix {from}, bot index {index}")]
    SuffixOverflow { from: u32, index: usize },
    #[error("Failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::GridClient;
    use crate::fleet::bot::tests::{template, wait_until, ScriptedClient};
    use crate::fleet::bot::BotSpec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Weak;

    /// Hands out scripted clients. Can fail chosen logins, stall in
    /// `create`, and issue a disconnect from inside the n-th `create`, which
    /// lands between two launch iterations.
    #[derive(Default)]
    struct ScriptedFactory {
        created: AtomicUsize,
        fail_suffixes: Vec<u32>,
        disconnect_on: Option<usize>,
        delay: Duration,
        manager: Mutex<Weak<FleetManager>>,
    }

    impl ClientFactory for ScriptedFactory {
        fn create(&self, spec: &BotSpec) -> Box<dyn GridClient> {
            if !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }
            let created = self.created.fetch_add(1, Ordering::SeqCst) + 1;
            if self.disconnect_on == Some(created) {
                if let Some(manager) = self.manager.lock().upgrade() {
                    manager.disconnect(None);
                }
            }
            let mut client = ScriptedClient::new(RegionRecord::new("Oak", 1000, 1000));
            client.fail_login = self.fail_suffixes.contains(&spec.suffix);
            Box::new(client)
        }
    }

    fn fast_settings() -> FleetSettings {
        FleetSettings {
            stagger: Duration::ZERO,
            pacing: Pacing::new(Duration::from_millis(1), Duration::from_millis(3)),
            seed: Some(7),
        }
    }

    fn manager_with(factory: ScriptedFactory) -> Arc<FleetManager> {
        let factory = Arc::new(factory);
        let manager = Arc::new(FleetManager::new(factory.clone(), fast_settings()).unwrap());
        *factory.manager.lock() = Arc::downgrade(&manager);
        manager
    }

    fn launch_connected(count: usize) -> Arc<FleetManager> {
        let manager = manager_with(ScriptedFactory::default());
        assert_eq!(manager.connect_bots(count, &template()).unwrap(), count);
        assert!(wait_until(|| manager.connected_count() == count));
        manager
    }

    fn connected_names(manager: &FleetManager) -> Vec<String> {
        manager
            .status()
            .rows
            .into_iter()
            .filter(|r| r.state == ConnectionState::Connected)
            .map(|r| r.name)
            .collect()
    }

    #[test]
    fn test_connect_bots_in_index_order() {
        let manager = launch_connected(3);

        let names: Vec<String> = manager.status().rows.into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["Load Bot_0", "Load Bot_1", "Load Bot_2"]);
        assert_eq!(manager.metrics().bots_launched.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_stagger_delays_launches() {
        let factory = Arc::new(ScriptedFactory::default());
        let settings = FleetSettings {
            stagger: Duration::from_millis(50),
            ..fast_settings()
        };
        let manager = FleetManager::new(factory, settings).unwrap();

        let started = Instant::now();
        manager.connect_bots(3, &template()).unwrap();

        // Two gaps
        assert!(started.elapsed() >= Duration::from_millis(100));
        manager.join_workers();
    }

    #[test]
    fn test_no_stagger_after_last_launch() {
        let factory = Arc::new(ScriptedFactory::default());
        let settings = FleetSettings {
            stagger: Duration::from_millis(500),
            ..fast_settings()
        };
        let manager = FleetManager::new(factory, settings).unwrap();

        let started = Instant::now();
        assert_eq!(manager.connect_bots(1, &template()).unwrap(), 1);

        assert!(started.elapsed() < Duration::from_millis(400));
        manager.join_workers();
    }

    #[test]
    fn test_disconnect_n_takes_most_recent() {
        let manager = launch_connected(5);

        let report = manager.disconnect(Some(2));
        assert_eq!(report, DisconnectReport { connected: 5, requested: 2 });

        assert!(wait_until(|| manager.connected_count() == 3));
        assert_eq!(
            connected_names(&manager),
            vec!["Load Bot_0", "Load Bot_1", "Load Bot_2"]
        );
        manager.join_workers();
    }

    #[test]
    fn test_disconnect_more_than_connected_is_capped() {
        let manager = launch_connected(2);

        let report = manager.disconnect(Some(10));

        assert_eq!(report.requested, 2);
        assert!(wait_until(|| manager.connected_count() == 0));
    }

    #[test]
    fn test_disconnect_all_skips_disconnected_bots() {
        let manager = manager_with(ScriptedFactory {
            fail_suffixes: vec![1],
            ..Default::default()
        });
        manager.connect_bots(3, &template()).unwrap();
        assert!(wait_until(|| manager.connected_count() == 2
            && manager.find_bot("Load Bot_1").unwrap().attempts == 1
            && manager.find_bot("Load Bot_1").unwrap().state == ConnectionState::Disconnected));

        let report = manager.disconnect(None);

        assert_eq!(report, DisconnectReport { connected: 2, requested: 2 });
        assert!(!manager.find_bot("Load Bot_1").unwrap().shutdown_requested);
        assert!(wait_until(|| manager.connected_count() == 0));
    }

    #[test]
    fn test_repeated_disconnect_skips_pending_teardown() {
        let manager = launch_connected(4);

        let first = manager.disconnect(Some(2));
        let second = manager.disconnect(Some(2));

        assert_eq!(first.requested, 2);
        assert_eq!(second.requested, 2);
        assert!(wait_until(|| manager.connected_count() == 0));
    }

    #[test]
    fn test_shutdown_refused_while_connected() {
        let manager = launch_connected(2);

        let result = manager.shutdown();
        assert!(matches!(result, Err(FleetError::StillConnected { connected: 2 })));
        assert_eq!(manager.connected_count(), 2);

        manager.disconnect(None);
        assert!(wait_until(|| manager.connected_count() == 0));
        assert!(manager.shutdown().is_ok());
    }

    #[test]
    fn test_shutdown_with_empty_fleet() {
        let manager = manager_with(ScriptedFactory::default());
        assert!(manager.shutdown().is_ok());
        assert!(manager.is_disconnecting());
    }

    #[test]
    fn test_disconnect_during_launch_stops_further_spawns() {
        let manager = manager_with(ScriptedFactory {
            disconnect_on: Some(3),
            ..Default::default()
        });

        let launched = manager.connect_bots(10, &template()).unwrap();

        assert_eq!(launched, 3);
        assert_eq!(manager.bot_count(), 3);
        assert!(manager.is_disconnecting());
        manager.join_workers();
    }

    #[test]
    fn test_join_workers_during_slow_create_drops_pending_bot() {
        let manager = manager_with(ScriptedFactory {
            delay: Duration::from_millis(200),
            ..Default::default()
        });
        let launcher = {
            let manager = manager.clone();
            std::thread::spawn(move || manager.connect_bots(1, &template()))
        };

        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(manager.join_workers(), 0);
        let launched = launcher.join().unwrap().unwrap();

        assert_eq!(launched, 0);
        assert_eq!(manager.bot_count(), 0);
        assert_eq!(manager.connected_count(), 0);
        assert!(manager.wait_for_drain(Duration::from_millis(100)));
    }

    #[test]
    fn test_suffix_overflow_stops_launch() {
        let manager = manager_with(ScriptedFactory::default());
        let mut template = template();
        template.from = u32::MAX;

        let result = manager.connect_bots(2, &template);

        assert!(matches!(
            result,
            Err(FleetError::SuffixOverflow { from: u32::MAX, index: 1 })
        ));
        assert_eq!(manager.bot_count(), 1);
        manager.join_workers();
    }

    #[test]
    fn test_launch_after_disconnect_launches_nothing() {
        let manager = manager_with(ScriptedFactory::default());
        manager.disconnect(None);

        assert_eq!(manager.connect_bots(5, &template()).unwrap(), 0);
        assert_eq!(manager.bot_count(), 0);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let manager = manager_with(ScriptedFactory::default());
        manager.connect_bots(1, &template()).unwrap();

        let result = manager.connect_bots(1, &template());

        assert!(matches!(result, Err(FleetError::DuplicateBot(name)) if name == "Load Bot_0"));
        assert_eq!(manager.bot_count(), 1);
        manager.join_workers();
    }

    #[test]
    fn test_status_totals_match_bot_count() {
        let manager = manager_with(ScriptedFactory {
            fail_suffixes: vec![0, 2],
            ..Default::default()
        });
        manager.connect_bots(4, &template()).unwrap();

        for _ in 0..20 {
            let status = manager.status();
            assert_eq!(status.totals.total(), status.bot_count());
            assert_eq!(status.bot_count(), 4);
        }
        manager.join_workers();
    }

    #[test]
    fn test_regions_populated_from_events() {
        let manager = launch_connected(3);

        assert!(wait_until(|| manager.regions().len() == 1));
        assert_eq!(manager.regions()[0].name, "Oak");
        manager.join_workers();
    }

    #[test]
    fn test_find_bot() {
        let manager = launch_connected(2);

        let detail = manager.find_bot("Load Bot_1").unwrap();
        assert_eq!(detail.state, ConnectionState::Connected);
        assert_eq!(detail.region.unwrap().name, "Oak");
        assert!(manager.find_bot("Load Bot_9").is_none());
        manager.join_workers();
    }

    #[test]
    fn test_join_workers_stops_everything() {
        let manager = launch_connected(3);

        assert_eq!(manager.join_workers(), 3);

        assert_eq!(manager.connected_count(), 0);
        assert!(manager.wait_for_drain(Duration::from_millis(100)));
    }
}
