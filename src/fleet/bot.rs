//! A single simulated agent and the worker thread that drives it

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::Rng;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::behavior::{Behavior, BehaviorSet};
use crate::client::{ClientEvent, GridClient, LoginParams};
use crate::fleet::events::{DisconnectReason, FleetEvent, FleetEventKind};
use crate::fleet::location::parse_start_location;
use crate::fleet::region::RegionRecord;

/// Connection lifecycle of a bot's session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ConnectionState {
    /// Not logged in (initial and terminal)
    Disconnected,
    /// Login in progress
    Connecting,
    /// Logged in and running behaviours
    Connected,
}

impl ConnectionState {
    pub const ALL: [ConnectionState; 3] = [
        ConnectionState::Disconnected,
        ConnectionState::Connecting,
        ConnectionState::Connected,
    ];

    /// Position in `ALL`
    pub fn index(&self) -> usize {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
        }
    }

    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Disconnected)
                | (Connected, Disconnected)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
        })
    }
}

/// Launch parameters shared by every bot of a fleet run
#[derive(Debug, Clone)]
pub struct BotTemplate {
    pub first_name: String,
    /// Last name stem; each bot appends `_<suffix>`
    pub last_name: String,
    pub password: String,
    pub login_uri: String,
    /// Start location as supplied by the operator
    pub start: String,
    pub wear: String,
    pub behaviours: BehaviorSet,
    /// Suffix of the first bot
    pub from: u32,
}

impl BotTemplate {
    /// Spec for the bot launched at `index`. `None` when its suffix would
    /// not fit in a `u32`.
    pub fn spec_for(&self, index: usize) -> Option<BotSpec> {
        let suffix = u32::try_from(index).ok()?.checked_add(self.from)?;
        Some(BotSpec {
            first_name: self.first_name.clone(),
            last_name_stem: self.last_name.clone(),
            suffix,
            password: self.password.clone(),
            login_uri: self.login_uri.clone(),
            start_location: parse_start_location(&self.start),
            wear: self.wear.clone(),
            behaviours: self.behaviours.clone(),
        })
    }
}

/// Immutable identity, credentials and settings of one bot
#[derive(Debug, Clone)]
pub struct BotSpec {
    pub first_name: String,
    pub last_name_stem: String,
    pub suffix: u32,
    pub password: String,
    pub login_uri: String,
    /// Canonical start location
    pub start_location: String,
    pub wear: String,
    pub behaviours: BehaviorSet,
}

impl BotSpec {
    pub fn last_name(&self) -> String {
        format!("{}_{}", self.last_name_stem, self.suffix)
    }

    /// Display name, unique within a run
    pub fn name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name())
    }

    pub fn login_params(&self) -> LoginParams {
        LoginParams {
            first_name: self.first_name.clone(),
            last_name: self.last_name(),
            password: self.password.clone(),
            start_location: self.start_location.clone(),
            login_uri: self.login_uri.clone(),
            wear: self.wear.clone(),
        }
    }
}

/// Random wait between behaviour rounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub min: Duration,
    pub max: Duration,
}

impl Pacing {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    pub fn next(&self, rng: &mut impl Rng) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        rng.gen_range(self.min..=self.max)
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self::new(Duration::from_millis(1000), Duration::from_millis(3000))
    }
}

#[derive(Debug)]
struct BotStatus {
    state: ConnectionState,
    attempts: u32,
    region: Option<RegionRecord>,
    connected_at: Option<Instant>,
}

/// Row of the fleet status table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BotStatusRow {
    pub name: String,
    pub region: String,
    pub state: ConnectionState,
    pub attempts: u32,
}

/// Everything known about one bot, for `show bot`
#[derive(Debug, Clone, Serialize)]
pub struct BotDetail {
    pub name: String,
    pub state: ConnectionState,
    pub attempts: u32,
    pub region: Option<RegionRecord>,
    pub connected_for: Option<Duration>,
    pub behaviours: String,
    pub start_location: String,
    pub login_uri: String,
    pub wear: String,
    pub shutdown_requested: bool,
}

/// What a worker thread owns exclusively for the life of its bot
pub struct BotWorker {
    pub client: Box<dyn GridClient>,
    pub behaviours: Vec<Box<dyn Behavior>>,
    pub events: Sender<FleetEvent>,
    pub pacing: Pacing,
    pub rng: StdRng,
}

/// One simulated agent. Shared between the fleet manager and the bot's
/// own worker; only the worker changes its connection state.
pub struct Bot {
    spec: BotSpec,
    name: String,
    status: RwLock<BotStatus>,
    shutdown_tx: Sender<()>,
    shutdown_rx: Receiver<()>,
    shutdown_requested: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Bot {
    pub fn new(spec: BotSpec) -> Self {
        let (shutdown_tx, shutdown_rx) = bounded(1);
        Self {
            name: spec.name(),
            spec,
            status: RwLock::new(BotStatus {
                state: ConnectionState::Disconnected,
                attempts: 0,
                region: None,
                connected_at: None,
            }),
            shutdown_tx,
            shutdown_rx,
            shutdown_requested: AtomicBool::new(false),
            worker: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn spec(&self) -> &BotSpec {
        &self.spec
    }

    pub fn state(&self) -> ConnectionState {
        self.status.read().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn attempts(&self) -> u32 {
        self.status.read().attempts
    }

    pub fn current_region(&self) -> Option<RegionRecord> {
        self.status.read().region.clone()
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    pub fn status_row(&self) -> BotStatusRow {
        let status = self.status.read();
        BotStatusRow {
            name: self.name.clone(),
            region: status
                .region
                .as_ref()
                .map(|r| r.name.clone())
                .unwrap_or_else(|| "none".to_string()),
            state: status.state,
            attempts: status.attempts,
        }
    }

    pub fn detail(&self) -> BotDetail {
        let status = self.status.read();
        BotDetail {
            name: self.name.clone(),
            state: status.state,
            attempts: status.attempts,
            region: status.region.clone(),
            connected_for: status.connected_at.map(|t| t.elapsed()),
            behaviours: self.spec.behaviours.to_string(),
            start_location: self.spec.start_location.clone(),
            login_uri: self.spec.login_uri.clone(),
            wear: self.spec.wear.clone(),
            shutdown_requested: self.shutdown_requested(),
        }
    }

    /// Start the worker thread. The handle is kept for teardown.
    pub fn spawn(self: &Arc<Self>, worker: BotWorker) -> std::io::Result<()> {
        let bot = Arc::clone(self);
        let handle = std::thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || bot.run(worker))?;
        *self.worker.lock() = Some(handle);
        Ok(())
    }

    /// Ask the worker to log out and exit. Never blocks. Returns false if
    /// a shutdown was already requested.
    pub fn request_shutdown(&self) -> bool {
        if self.shutdown_requested.swap(true, Ordering::SeqCst) {
            return false;
        }
        // Capacity 1 and a single sender, so this only fails if already signalled
        let _ = self.shutdown_tx.try_send(());
        true
    }

    /// Wait for the worker thread to exit. Returns false if there was no
    /// worker left to join.
    pub fn join_worker(&self) -> bool {
        let handle = self.worker.lock().take();
        match handle {
            Some(handle) => {
                if handle.join().is_err() {
                    error!(bot = %self.name, "Worker panicked");
                }
                true
            }
            None => false,
        }
    }

    fn transition(&self, next: ConnectionState) -> bool {
        let mut status = self.status.write();
        if !status.state.can_transition_to(next) {
            warn!(bot = %self.name, "Ignoring transition {} -> {}", status.state, next);
            return false;
        }
        status.state = next;
        match next {
            ConnectionState::Connecting => status.attempts += 1,
            ConnectionState::Connected => status.connected_at = Some(Instant::now()),
            ConnectionState::Disconnected => {
                status.region = None;
                status.connected_at = None;
            }
        }
        true
    }

    fn set_region(&self, region: RegionRecord) {
        self.status.write().region = Some(region);
    }

    fn emit(&self, worker: &BotWorker, kind: FleetEventKind) {
        // The notifier only goes away with the manager; nothing to do then
        let _ = worker.events.send(FleetEvent {
            bot: self.name.clone(),
            kind,
        });
    }

    /// Worker entry point: log in, run behaviours until told to stop or
    /// the connection fails, then log out.
    fn run(self: Arc<Self>, mut worker: BotWorker) {
        let _guard = DisconnectOnExit(&self);

        if self.shutdown_requested() {
            debug!(bot = %self.name, "Shutdown requested before login");
            return;
        }
        if !self.transition(ConnectionState::Connecting) {
            return;
        }
        let attempt = self.attempts();
        self.emit(&worker, FleetEventKind::Connecting { attempt });
        debug!(bot = %self.name, attempt, "Logging in to {}", self.spec.login_uri);

        let started = Instant::now();
        let reply = match worker.client.login(&self.spec.login_params()) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(bot = %self.name, attempt, "Login failed: {}", e);
                self.transition(ConnectionState::Disconnected);
                self.emit(&worker, FleetEventKind::LoginFailed { error: e.to_string() });
                return;
            }
        };

        self.set_region(reply.region.clone());
        self.transition(ConnectionState::Connected);
        info!(bot = %self.name, region = %reply.region.name, "Connected");
        self.emit(
            &worker,
            FleetEventKind::Connected {
                region: reply.region,
                login_time: started.elapsed(),
            },
        );

        let reason = self.behave(&mut worker);

        for behaviour in worker.behaviours.iter_mut() {
            behaviour.close(worker.client.as_mut());
        }
        if reason == DisconnectReason::Requested {
            if let Err(e) = worker.client.logout() {
                error!(bot = %self.name, "Logout failed: {}", e);
            }
        } else {
            warn!(bot = %self.name, "{}", reason);
        }

        self.transition(ConnectionState::Disconnected);
        info!(bot = %self.name, "Disconnected");
        self.emit(&worker, FleetEventKind::Disconnected { reason });
    }

    fn behave(&self, worker: &mut BotWorker) -> DisconnectReason {
        for behaviour in worker.behaviours.iter_mut() {
            if let Err(e) = behaviour.initialize(worker.client.as_mut()) {
                if e.is_fatal() {
                    return DisconnectReason::NetworkFailure(e.to_string());
                }
                warn!(bot = %self.name, behaviour = %behaviour.kind(), "Initialize failed: {}", e);
            }
        }

        loop {
            let wait = worker.pacing.next(&mut worker.rng);
            match self.shutdown_rx.recv_timeout(wait) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return DisconnectReason::Requested,
                Err(RecvTimeoutError::Timeout) => {}
            }

            for behaviour in worker.behaviours.iter_mut() {
                if let Err(e) = behaviour.action(worker.client.as_mut(), &mut worker.rng) {
                    if e.is_fatal() {
                        return DisconnectReason::NetworkFailure(e.to_string());
                    }
                    debug!(bot = %self.name, behaviour = %behaviour.kind(), "Action failed: {}", e);
                }
            }

            match worker.client.poll() {
                Ok(events) => {
                    for event in events {
                        match event {
                            ClientEvent::RegionEntered(region) => {
                                debug!(bot = %self.name, region = %region.name, "Entered region");
                                self.set_region(region.clone());
                                self.emit(worker, FleetEventKind::RegionEntered { region });
                            }
                            ClientEvent::Chat { from, message } => {
                                debug!(bot = %self.name, "{} says: {}", from, message);
                            }
                        }
                    }
                }
                Err(e) if e.is_fatal() => return DisconnectReason::NetworkFailure(e.to_string()),
                Err(e) => debug!(bot = %self.name, "Poll failed: {}", e),
            }
        }
    }
}

impl fmt::Debug for Bot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bot")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("attempts", &self.attempts())
            .finish()
    }
}

/// Leaves the bot Disconnected however the worker exits, including by panic
struct DisconnectOnExit<'a>(&'a Bot);

impl Drop for DisconnectOnExit<'_> {
    fn drop(&mut self) {
        let mut status = self.0.status.write();
        if status.state != ConnectionState::Disconnected {
            status.state = ConnectionState::Disconnected;
            status.region = None;
            status.connected_at = None;
        }
    }
}
