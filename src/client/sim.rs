//! In-process simulated grid
//!
//! Stands in for a real login service and region simulators. Regions sit
//! in a single row of the grid; walking off the east or west edge crosses
//! into the neighbour. Login latency, login failures and mid-session
//! network faults are injected from configuration.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::client::session::{SessionTable, SessionToken};
use crate::client::{ClientError, ClientEvent, ClientFactory, GridClient, LoginParams, LoginReply};
use crate::fleet::bot::BotSpec;
use crate::fleet::location::split_start_uri;
use crate::fleet::region::{RegionRecord, REGION_SIZE};
use crate::util::vec3::Vec3;

/// Grid X coordinate of the westernmost simulated region
const GRID_ORIGIN_X: u32 = 1000;
/// Grid Y coordinate shared by every simulated region
const GRID_ORIGIN_Y: u32 = 1000;

/// Distance covered by one walk step, metres
const WALK_STEP: f32 = 4.0;
/// Distance covered by one run step, metres
const RUN_STEP: f32 = 8.0;

/// Simulated grid settings
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Region names, west to east
    pub regions: Vec<String>,
    pub login_latency: Duration,
    /// Probability in [0, 1] that a login attempt fails
    pub login_failure_rate: f64,
    /// Probability in [0, 1] that a poll reports a lost connection
    pub drop_rate: f64,
    pub objects_per_region: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            regions: vec![
                "Oak".to_string(),
                "Birch".to_string(),
                "Cedar".to_string(),
                "Maple".to_string(),
            ],
            login_latency: Duration::from_millis(250),
            login_failure_rate: 0.0,
            drop_rate: 0.0,
            objects_per_region: 8,
        }
    }
}

#[derive(Debug)]
struct SimRegion {
    record: RegionRecord,
    objects: Vec<Uuid>,
}

#[derive(Debug)]
struct GridState {
    config: SimConfig,
    regions: Vec<SimRegion>,
    sessions: Mutex<SessionTable>,
    seeds: Mutex<StdRng>,
}

impl GridState {
    fn region_index(&self, name: &str) -> Option<usize> {
        self.regions.iter().position(|r| r.record.name == name)
    }
}

/// Handle to a simulated grid; cheap to clone
#[derive(Debug, Clone)]
pub struct SimGrid {
    state: Arc<GridState>,
}

impl SimGrid {
    pub fn new(config: SimConfig, seed: u64) -> Self {
        let regions = config
            .regions
            .iter()
            .enumerate()
            .map(|(i, name)| SimRegion {
                record: RegionRecord::new(name.clone(), GRID_ORIGIN_X + i as u32, GRID_ORIGIN_Y),
                objects: (0..config.objects_per_region).map(|_| Uuid::new_v4()).collect(),
            })
            .collect();

        Self {
            state: Arc::new(GridState {
                config,
                regions,
                sessions: Mutex::new(SessionTable::new()),
                seeds: Mutex::new(StdRng::seed_from_u64(seed)),
            }),
        }
    }

    pub fn regions(&self) -> Vec<RegionRecord> {
        self.state.regions.iter().map(|r| r.record.clone()).collect()
    }

    /// Number of open sessions on the grid
    pub fn session_count(&self) -> usize {
        self.state.sessions.lock().len()
    }

    /// Number of agents currently in the named region
    pub fn population(&self, region: &str) -> usize {
        match self.state.region_index(region) {
            Some(index) => self.state.sessions.lock().population(index),
            None => 0,
        }
    }

    pub fn client(&self) -> SimClient {
        let seed = self.state.seeds.lock().gen();
        SimClient::new(self.state.clone(), seed)
    }
}

impl ClientFactory for SimGrid {
    fn create(&self, _spec: &BotSpec) -> Box<dyn GridClient> {
        Box::new(self.client())
    }
}

/// One agent's connection to the simulated grid
#[derive(Debug)]
pub struct SimClient {
    grid: Arc<GridState>,
    rng: StdRng,
    session: Option<(Uuid, SessionToken)>,
    region: usize,
    position: Vec3,
    pending: Vec<ClientEvent>,
}

impl SimClient {
    fn new(grid: Arc<GridState>, seed: u64) -> Self {
        Self {
            grid,
            rng: StdRng::seed_from_u64(seed),
            session: None,
            region: 0,
            position: Vec3::REGION_CENTRE,
            pending: Vec::new(),
        }
    }

    fn agent_id(&self) -> Result<Uuid, ClientError> {
        self.session
            .as_ref()
            .map(|(id, _)| *id)
            .ok_or(ClientError::NotConnected)
    }

    fn enter_region(&mut self, agent_id: Uuid, index: usize) {
        self.region = index;
        self.grid.sessions.lock().set_region(agent_id, index);
        self.pending
            .push(ClientEvent::RegionEntered(self.grid.regions[index].record.clone()));
    }

    /// Resolve the canonical start location to a region index and position
    fn resolve_start(&self, start: &str) -> (usize, Vec3) {
        match split_start_uri(start) {
            Some((name, [x, y, z])) => match self.grid.region_index(name) {
                Some(index) => (
                    index,
                    Vec3::new(x as f32, y as f32, z as f32).clamp_to_region(REGION_SIZE as f32),
                ),
                None => (0, Vec3::REGION_CENTRE),
            },
            None => (0, Vec3::REGION_CENTRE),
        }
    }

    fn close_session(&mut self) {
        if let Some((agent_id, _)) = self.session.take() {
            self.grid.sessions.lock().close(agent_id);
        }
    }
}

impl GridClient for SimClient {
    fn login(&mut self, params: &LoginParams) -> Result<LoginReply, ClientError> {
        self.close_session();

        let latency = self.grid.config.login_latency;
        if !latency.is_zero() {
            let jitter = self.rng.gen_range(0.8..1.2);
            std::thread::sleep(latency.mul_f64(jitter));
        }

        if params.password.is_empty() {
            return Err(ClientError::LoginRejected("empty password".to_string()));
        }
        if self.grid.regions.is_empty() {
            return Err(ClientError::Unreachable(format!("{} has no regions", params.login_uri)));
        }

        let failure_rate = self.grid.config.login_failure_rate.clamp(0.0, 1.0);
        if self.rng.gen_bool(failure_rate) {
            return Err(ClientError::Unreachable(format!(
                "simulated timeout contacting {}",
                params.login_uri
            )));
        }

        let (region, position) = self.resolve_start(&params.start_location);
        let agent_name = format!("{} {}", params.first_name, params.last_name);
        let session = self.grid.sessions.lock().open(&agent_name, region);

        debug!(
            "Sim login {} in {} (session {}, wear={})",
            agent_name,
            self.grid.regions[region].record.name,
            session.token.short(),
            params.wear
        );

        self.session = Some((session.agent_id, session.token.clone()));
        self.region = region;
        self.position = position;
        self.pending.clear();

        Ok(LoginReply {
            agent_id: session.agent_id,
            session: session.token,
            region: self.grid.regions[region].record.clone(),
            position,
        })
    }

    fn logout(&mut self) -> Result<(), ClientError> {
        let (agent_id, _) = self.session.take().ok_or(ClientError::NotConnected)?;
        self.grid.sessions.lock().close(agent_id);
        Ok(())
    }

    fn poll(&mut self) -> Result<Vec<ClientEvent>, ClientError> {
        let (agent_id, token) = self.session.clone().ok_or(ClientError::NotConnected)?;

        if !self.grid.sessions.lock().validate(agent_id, &token) {
            self.session = None;
            return Err(ClientError::ConnectionLost("session closed by grid".to_string()));
        }

        let drop_rate = self.grid.config.drop_rate.clamp(0.0, 1.0);
        if self.rng.gen_bool(drop_rate) {
            self.close_session();
            return Err(ClientError::ConnectionLost("simulated network fault".to_string()));
        }

        Ok(std::mem::take(&mut self.pending))
    }

    fn current_region(&self) -> Option<RegionRecord> {
        self.session
            .as_ref()
            .map(|_| self.grid.regions[self.region].record.clone())
    }

    fn position(&self) -> Vec3 {
        self.position
    }

    fn walk(&mut self, heading: f32, run: bool) -> Result<(), ClientError> {
        let agent_id = self.agent_id()?;
        let step = if run { RUN_STEP } else { WALK_STEP };
        let mut next = self.position + Vec3::from_heading(heading) * step;
        let size = REGION_SIZE as f32;

        if next.x < 0.0 && self.region > 0 {
            next.x += size;
            self.enter_region(agent_id, self.region - 1);
        } else if next.x >= size && self.region + 1 < self.grid.regions.len() {
            next.x -= size;
            self.enter_region(agent_id, self.region + 1);
        }

        self.position = next.clamp_to_region(size);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), ClientError> {
        self.agent_id().map(|_| ())
    }

    fn jump(&mut self) -> Result<(), ClientError> {
        self.agent_id()?;
        // Lands again before the next poll
        Ok(())
    }

    fn say(&mut self, message: &str) -> Result<(), ClientError> {
        self.agent_id()?;
        debug!("Sim chat in {}: {}", self.grid.regions[self.region].record.name, message);
        Ok(())
    }

    fn nearby_objects(&self) -> Vec<Uuid> {
        if self.session.is_none() {
            return Vec::new();
        }
        self.grid.regions[self.region].objects.clone()
    }

    fn grab(&mut self, object: Uuid) -> Result<(), ClientError> {
        self.agent_id()?;
        if self.grid.regions[self.region].objects.contains(&object) {
            Ok(())
        } else {
            Err(ClientError::ObjectNotFound(object))
        }
    }

    fn teleport(&mut self, region: &str, position: Vec3) -> Result<(), ClientError> {
        let agent_id = self.agent_id()?;
        let index = self
            .grid
            .region_index(region)
            .ok_or_else(|| ClientError::UnknownRegion(region.to_string()))?;

        self.position = position.clamp_to_region(REGION_SIZE as f32);
        self.enter_region(agent_id, index);
        Ok(())
    }

    fn neighbours(&self) -> Vec<RegionRecord> {
        if self.session.is_none() {
            return Vec::new();
        }
        let mut neighbours = Vec::with_capacity(2);
        if self.region > 0 {
            neighbours.push(self.grid.regions[self.region - 1].record.clone());
        }
        if let Some(east) = self.grid.regions.get(self.region + 1) {
            neighbours.push(east.record.clone());
        }
        neighbours
    }
}

impl Drop for SimClient {
    fn drop(&mut self) {
        self.close_session();
    }
}
