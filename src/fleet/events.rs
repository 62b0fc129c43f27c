//! Notifications from bot workers to the fleet manager
//!
//! Workers push events into an unbounded channel and carry on; a single
//! notifier thread logs them, updates metrics and feeds the region cache.

use crossbeam_channel::Receiver;
use std::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::fleet::region::{RegionRecord, RegionRegistry};
use crate::metrics::FleetMetrics;

/// Why a connected bot went away
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Operator asked for it
    Requested,
    /// The session dropped underneath the bot
    NetworkFailure(String),
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::Requested => f.write_str("disconnect requested"),
            DisconnectReason::NetworkFailure(e) => write!(f, "network failure: {}", e),
        }
    }
}

#[derive(Debug, Clone)]
pub enum FleetEventKind {
    Connecting { attempt: u32 },
    Connected { region: RegionRecord, login_time: Duration },
    LoginFailed { error: String },
    RegionEntered { region: RegionRecord },
    Disconnected { reason: DisconnectReason },
}

#[derive(Debug, Clone)]
pub struct FleetEvent {
    pub bot: String,
    pub kind: FleetEventKind,
}

/// Apply one event to the shared fleet-side state
pub fn handle_event(event: FleetEvent, regions: &RegionRegistry, metrics: &FleetMetrics) {
    let FleetEvent { bot, kind } = event;
    match kind {
        FleetEventKind::Connecting { attempt } => {
            metrics.record_login_attempt();
            debug!(bot = %bot, attempt, "Connecting");
        }
        FleetEventKind::Connected { region, login_time } => {
            metrics.record_login_success(login_time);
            info!(
                bot = %bot,
                region = %region.name,
                "Login took {}ms",
                login_time.as_millis()
            );
            observe_region(region, regions, metrics);
        }
        FleetEventKind::LoginFailed { error } => {
            metrics.record_login_failure();
            warn!(bot = %bot, "Login failed: {}", error);
        }
        FleetEventKind::RegionEntered { region } => {
            observe_region(region, regions, metrics);
        }
        FleetEventKind::Disconnected { reason } => {
            metrics.record_disconnect(&reason);
            info!(bot = %bot, "Disconnected ({})", reason);
        }
    }
}

fn observe_region(region: RegionRecord, regions: &RegionRegistry, metrics: &FleetMetrics) {
    let name = region.name.clone();
    let handle = region.handle;
    if regions.observe(region) {
        metrics.record_region_discovered();
        info!(region = %name, handle, "Discovered region");
    }
}

/// Start the notifier thread. It exits once every sender is gone.
pub fn spawn_notifier(
    events: Receiver<FleetEvent>,
    regions: Arc<RegionRegistry>,
    metrics: Arc<FleetMetrics>,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("fleet-notifier".to_string())
        .spawn(move || {
            for event in events.iter() {
                handle_event(event, &regions, &metrics);
            }
            debug!("Fleet notifier stopped");
        })
}
