use clap::Parser;
use std::str::FromStr;
use std::time::Duration;

use crate::behavior::BehaviorSet;
use crate::client::sim::SimConfig;
use crate::fleet::{BotTemplate, FleetSettings, Pacing};

/// Command line. Every option is optional so that unset flags leave the
/// environment and defaults in place.
#[derive(Debug, Clone, Default, Parser)]
#[command(
    name = "gridbot",
    version,
    about = "Drive a fleet of simulated agents against a virtual-world grid"
)]
pub struct CliArgs {
    /// Number of bots to launch
    #[arg(long, value_name = "N")]
    pub botcount: Option<usize>,
    /// First name shared by every bot
    #[arg(long)]
    pub firstname: Option<String>,
    /// Last name stem; bots are named <stem>_<suffix>
    #[arg(long)]
    pub lastname: Option<String>,
    #[arg(long)]
    pub password: Option<String>,
    /// Login service URI
    #[arg(long, value_name = "URI")]
    pub loginuri: Option<String>,
    /// Suffix of the first bot
    #[arg(long, value_name = "N")]
    pub from: Option<u32>,
    /// Outfit setting passed to login
    #[arg(long)]
    pub wear: Option<String>,
    /// home, last, or <region>[/x[/y[/z]]]
    #[arg(long, value_name = "LOCATION")]
    pub start: Option<String>,
    /// Comma-separated behaviour letters: p(hysics) g(rab) t(eleport) c(ross) n(one)
    #[arg(long, value_name = "LETTERS")]
    pub behaviours: Option<String>,
    /// Delay between bot launches
    #[arg(long, value_name = "MS")]
    pub login_delay_ms: Option<u64>,
    #[arg(long, value_name = "MS")]
    pub action_min_ms: Option<u64>,
    #[arg(long, value_name = "MS")]
    pub action_max_ms: Option<u64>,
    /// Seed for reproducible runs
    #[arg(long)]
    pub seed: Option<u64>,
    /// Serve metrics on this port
    #[arg(long, value_name = "PORT")]
    pub metrics_port: Option<u16>,
    /// Log filter (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,
    /// Simulated region names, west to east
    #[arg(long, value_delimiter = ',', value_name = "NAMES")]
    pub sim_regions: Option<Vec<String>>,
    #[arg(long, value_name = "MS")]
    pub sim_login_latency_ms: Option<u64>,
    #[arg(long, value_name = "P")]
    pub sim_login_failure_rate: Option<f64>,
    #[arg(long, value_name = "P")]
    pub sim_drop_rate: Option<f64>,
}

/// Fleet run configuration
#[derive(Debug, Clone)]
pub struct FleetConfig {
    pub bot_count: usize,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password: Option<String>,
    pub login_uri: Option<String>,
    pub from: u32,
    pub wear: String,
    pub start: String,
    pub behaviours: String,
    pub login_delay: Duration,
    pub action_min: Duration,
    pub action_max: Duration,
    pub seed: Option<u64>,
    pub metrics_port: Option<u16>,
    pub sim_regions: Vec<String>,
    pub sim_login_latency: Duration,
    pub sim_login_failure_rate: f64,
    pub sim_drop_rate: f64,
}

impl Default for FleetConfig {
    fn default() -> Self {
        let sim = SimConfig::default();
        Self {
            bot_count: 1,
            first_name: None,
            last_name: None,
            password: None,
            login_uri: None,
            from: 0,
            wear: "no".to_string(),
            start: "last".to_string(),
            behaviours: "p".to_string(),
            login_delay: Duration::from_millis(5000),
            action_min: Duration::from_millis(1000),
            action_max: Duration::from_millis(3000),
            seed: None,
            metrics_port: None,
            sim_regions: sim.regions,
            sim_login_latency: sim.login_latency,
            sim_login_failure_rate: sim.login_failure_rate,
            sim_drop_rate: sim.drop_rate,
        }
    }
}

impl FleetConfig {
    /// Defaults, then environment, then command line
    pub fn load(cli: &CliArgs) -> Self {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok());
        config.apply_cli(cli);
        config
    }

    /// Overlay `BOT_*`/`SIM_*` variables. Unparsable values are logged and
    /// ignored.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        env_parse(&var, "BOT_COUNT", &mut self.bot_count);
        env_string(&var, "BOT_FIRSTNAME", &mut self.first_name);
        env_string(&var, "BOT_LASTNAME", &mut self.last_name);
        env_string(&var, "BOT_PASSWORD", &mut self.password);
        env_string(&var, "BOT_LOGINURI", &mut self.login_uri);
        env_parse(&var, "BOT_FROM", &mut self.from);
        if let Some(wear) = var("BOT_WEAR") {
            self.wear = wear;
        }
        if let Some(start) = var("BOT_START") {
            self.start = start;
        }
        if let Some(behaviours) = var("BOT_BEHAVIOURS") {
            self.behaviours = behaviours;
        }
        env_millis(&var, "BOT_LOGIN_DELAY_MS", &mut self.login_delay);
        env_millis(&var, "BOT_ACTION_MIN_MS", &mut self.action_min);
        env_millis(&var, "BOT_ACTION_MAX_MS", &mut self.action_max);

        if let Some(raw) = var("BOT_SEED") {
            match raw.parse() {
                Ok(seed) => self.seed = Some(seed),
                Err(_) => tracing::warn!("Invalid BOT_SEED '{}', using a random seed", raw),
            }
        }

        if let Some(raw) = var("METRICS_PORT") {
            match raw.parse::<u16>() {
                Ok(port) if port > 0 => self.metrics_port = Some(port),
                _ => tracing::warn!("Invalid METRICS_PORT '{}', metrics disabled", raw),
            }
        }

        if let Some(raw) = var("SIM_REGIONS") {
            self.sim_regions = split_list(&raw);
        }
        env_millis(&var, "SIM_LOGIN_LATENCY_MS", &mut self.sim_login_latency);
        env_parse(&var, "SIM_LOGIN_FAILURE_RATE", &mut self.sim_login_failure_rate);
        env_parse(&var, "SIM_DROP_RATE", &mut self.sim_drop_rate);
    }

    pub fn apply_cli(&mut self, cli: &CliArgs) {
        if let Some(count) = cli.botcount {
            self.bot_count = count;
        }
        if cli.firstname.is_some() {
            self.first_name = cli.firstname.clone();
        }
        if cli.lastname.is_some() {
            self.last_name = cli.lastname.clone();
        }
        if cli.password.is_some() {
            self.password = cli.password.clone();
        }
        if cli.loginuri.is_some() {
            self.login_uri = cli.loginuri.clone();
        }
        if let Some(from) = cli.from {
            self.from = from;
        }
        if let Some(wear) = &cli.wear {
            self.wear = wear.clone();
        }
        if let Some(start) = &cli.start {
            self.start = start.clone();
        }
        if let Some(behaviours) = &cli.behaviours {
            self.behaviours = behaviours.clone();
        }
        if let Some(ms) = cli.login_delay_ms {
            self.login_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = cli.action_min_ms {
            self.action_min = Duration::from_millis(ms);
        }
        if let Some(ms) = cli.action_max_ms {
            self.action_max = Duration::from_millis(ms);
        }
        if cli.seed.is_some() {
            self.seed = cli.seed;
        }
        if cli.metrics_port.is_some() {
            self.metrics_port = cli.metrics_port;
        }
        if let Some(regions) = &cli.sim_regions {
            self.sim_regions = regions
                .iter()
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty())
                .collect();
        }
        if let Some(ms) = cli.sim_login_latency_ms {
            self.sim_login_latency = Duration::from_millis(ms);
        }
        if let Some(rate) = cli.sim_login_failure_rate {
            self.sim_login_failure_rate = rate;
        }
        if let Some(rate) = cli.sim_drop_rate {
            self.sim_drop_rate = rate;
        }
    }

    /// Validate configuration after loading. Must pass before any bot
    /// launches.
    pub fn validate(&self) -> Result<(), ConfigError> {
        required(&self.first_name, "firstname")?;
        required(&self.last_name, "lastname")?;
        required(&self.password, "password")?;
        let login_uri = required(&self.login_uri, "loginuri")?;
        if !login_uri.contains("://") {
            return Err(ConfigError::InvalidLoginUri(login_uri.to_string()));
        }
        if self.action_min > self.action_max {
            return Err(ConfigError::InvalidPacing {
                min_ms: self.action_min.as_millis() as u64,
                max_ms: self.action_max.as_millis() as u64,
            });
        }
        check_rate("sim-login-failure-rate", self.sim_login_failure_rate)?;
        check_rate("sim-drop-rate", self.sim_drop_rate)?;
        if self.bot_count > 0 {
            let last = u64::from(self.from) + self.bot_count as u64 - 1;
            if last > u64::from(u32::MAX) {
                return Err(ConfigError::SuffixOverflow {
                    from: self.from,
                    bot_count: self.bot_count,
                });
            }
        }
        if self.sim_regions.is_empty() {
            return Err(ConfigError::NoRegions);
        }
        Ok(())
    }

    /// Launch template for the fleet
    pub fn template(&self) -> Result<BotTemplate, ConfigError> {
        Ok(BotTemplate {
            first_name: required(&self.first_name, "firstname")?.to_string(),
            last_name: required(&self.last_name, "lastname")?.to_string(),
            password: required(&self.password, "password")?.to_string(),
            login_uri: required(&self.login_uri, "loginuri")?.to_string(),
            start: self.start.clone(),
            wear: self.wear.clone(),
            behaviours: BehaviorSet::parse(&self.behaviours),
            from: self.from,
        })
    }

    pub fn fleet_settings(&self) -> FleetSettings {
        FleetSettings {
            stagger: self.login_delay,
            pacing: Pacing::new(self.action_min, self.action_max),
            seed: self.seed,
        }
    }

    pub fn sim_config(&self) -> SimConfig {
        SimConfig {
            regions: self.sim_regions.clone(),
            login_latency: self.sim_login_latency,
            login_failure_rate: self.sim_login_failure_rate,
            drop_rate: self.sim_drop_rate,
            ..SimConfig::default()
        }
    }
}

/// Configuration errors; fatal before launch
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required option --{0}")]
    Missing(&'static str),
    #[error("Invalid login URI '{0}', expected scheme://host")]
    InvalidLoginUri(String),
    #[error("action-min-ms ({min_ms}) cannot exceed action-max-ms ({max_ms})")]
    InvalidPacing { min_ms: u64, max_ms: u64 },
    #[error("{name} must be between 0 and 1, got {value}")]
    InvalidRate { name: &'static str, value: f64 },
    #[error("{bot_count} bots starting at suffix {from} overflow the suffix range")]
    SuffixOverflow { from: u32, bot_count: usize },
    #[error("At least one simulated region is required")]
    NoRegions,
}

fn required<'a>(value: &'a Option<String>, name: &'static str) -> Result<&'a str, ConfigError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ConfigError::Missing(name)),
    }
}

fn check_rate(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidRate { name, value })
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn env_string(var: &impl Fn(&str) -> Option<String>, key: &str, target: &mut Option<String>) {
    if let Some(value) = var(key) {
        *target = Some(value);
    }
}

fn env_parse<T: FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str, target: &mut T) {
    if let Some(raw) = var(key) {
        match raw.trim().parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => tracing::warn!("Invalid {} '{}', using default", key, raw),
        }
    }
}

fn env_millis(var: &impl Fn(&str) -> Option<String>, key: &str, target: &mut Duration) {
    let mut ms = target.as_millis() as u64;
    env_parse(var, key, &mut ms);
    *target = Duration::from_millis(ms);
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashbrown::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn valid() -> FleetConfig {
        FleetConfig {
            first_name: Some("Load".to_string()),
            last_name: Some("Bot".to_string()),
            password: Some("secret".to_string()),
            login_uri: Some("http://grid.example:8002/".to_string()),
            ..FleetConfig::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = FleetConfig::default();
        assert_eq!(config.bot_count, 1);
        assert_eq!(config.from, 0);
        assert_eq!(config.wear, "no");
        assert_eq!(config.start, "last");
        assert_eq!(config.behaviours, "p");
        assert_eq!(config.login_delay, Duration::from_millis(5000));
    }

    #[test]
    fn test_missing_required_options() {
        assert_eq!(FleetConfig::default().validate(), Err(ConfigError::Missing("firstname")));

        let mut config = valid();
        config.password = Some("  ".to_string());
        assert_eq!(config.validate(), Err(ConfigError::Missing("password")));

        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = valid();
        config.login_uri = Some("grid.example".to_string());
        assert!(matches!(config.validate(), Err(ConfigError::InvalidLoginUri(_))));

        let mut config = valid();
        config.action_min = Duration::from_millis(500);
        config.action_max = Duration::from_millis(100);
        assert!(matches!(config.validate(), Err(ConfigError::InvalidPacing { .. })));

        let mut config = valid();
        config.sim_drop_rate = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidRate { name: "sim-drop-rate", .. })
        ));

        let mut config = valid();
        config.sim_regions.clear();
        assert_eq!(config.validate(), Err(ConfigError::NoRegions));
    }

    #[test]
    fn test_suffix_range_checked() {
        let mut config = valid();
        let cli = CliArgs::parse_from(["gridbot", "--from", "4294967295", "--botcount", "2"]);
        config.apply_cli(&cli);
        assert_eq!(
            config.validate(),
            Err(ConfigError::SuffixOverflow { from: u32::MAX, bot_count: 2 })
        );

        // The last suffix may be u32::MAX itself
        config.bot_count = 1;
        assert!(config.validate().is_ok());

        config.from = u32::MAX - 9;
        config.bot_count = 10;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overlay() {
        let mut config = FleetConfig::default();
        config.apply_env(env(&[
            ("BOT_COUNT", "25"),
            ("BOT_FIRSTNAME", "Test"),
            ("BOT_LOGIN_DELAY_MS", "200"),
            ("SIM_REGIONS", "Ash, Elm ,,Fir"),
            ("METRICS_PORT", "9100"),
        ]));

        assert_eq!(config.bot_count, 25);
        assert_eq!(config.first_name.as_deref(), Some("Test"));
        assert_eq!(config.login_delay, Duration::from_millis(200));
        assert_eq!(config.sim_regions, vec!["Ash", "Elm", "Fir"]);
        assert_eq!(config.metrics_port, Some(9100));
    }

    #[test]
    fn test_invalid_env_keeps_default() {
        let mut config = FleetConfig::default();
        config.apply_env(env(&[
            ("BOT_COUNT", "lots"),
            ("BOT_ACTION_MAX_MS", "-5"),
            ("METRICS_PORT", "0"),
        ]));

        assert_eq!(config.bot_count, 1);
        assert_eq!(config.action_max, Duration::from_millis(3000));
        assert_eq!(config.metrics_port, None);
    }

    #[test]
    fn test_cli_overrides_env() {
        let mut config = FleetConfig::default();
        config.apply_env(env(&[("BOT_COUNT", "25"), ("BOT_START", "home")]));

        let cli = CliArgs::parse_from([
            "gridbot",
            "--botcount",
            "3",
            "--start",
            "Oak/10/20",
            "--sim-regions",
            "A,B",
        ]);
        config.apply_cli(&cli);

        assert_eq!(config.bot_count, 3);
        assert_eq!(config.start, "Oak/10/20");
        assert_eq!(config.sim_regions, vec!["A", "B"]);
        assert_eq!(config.behaviours, "p");
    }

    #[test]
    fn test_template_from_config() {
        let mut config = valid();
        config.from = 5;
        config.start = "Oak".to_string();
        config.behaviours = "p,g,p,x".to_string();

        let template = config.template().unwrap();
        let spec = template.spec_for(0).unwrap();

        assert_eq!(spec.name(), "Load Bot_5");
        assert_eq!(spec.start_location, "uri:Oak&128&128&0");
        assert_eq!(template.behaviours.letters(), "p,g");
    }

    #[test]
    fn test_settings_and_sim_config() {
        let mut config = valid();
        config.seed = Some(42);
        config.sim_drop_rate = 0.25;

        let settings = config.fleet_settings();
        assert_eq!(settings.stagger, Duration::from_millis(5000));
        assert_eq!(settings.pacing, Pacing::default());
        assert_eq!(settings.seed, Some(42));

        let sim = config.sim_config();
        assert_eq!(sim.drop_rate, 0.25);
        assert_eq!(sim.regions.len(), 4);
    }
}
