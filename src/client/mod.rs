//! Boundary to the grid client library
//!
//! A bot drives exactly one `GridClient`. The wire protocol lives behind
//! this trait; the crate ships an in-process simulated grid so a fleet can
//! be exercised without a live grid.

pub mod session;
pub mod sim;

use uuid::Uuid;

use crate::fleet::bot::BotSpec;
use crate::fleet::region::RegionRecord;
use crate::util::vec3::Vec3;

pub use session::SessionToken;

/// Everything the login service needs to start a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginParams {
    pub first_name: String,
    pub last_name: String,
    pub password: String,
    /// Canonical start location (`home`, `last` or `uri:<region>&x&y&z`)
    pub start_location: String,
    pub login_uri: String,
    pub wear: String,
}

/// Successful login response
#[derive(Debug, Clone)]
pub struct LoginReply {
    pub agent_id: Uuid,
    pub session: SessionToken,
    pub region: RegionRecord,
    pub position: Vec3,
}

/// Asynchronous happenings reported by `GridClient::poll`
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// The agent arrived in a region (teleport, crossing)
    RegionEntered(RegionRecord),
    /// Chat heard from another agent
    Chat { from: String, message: String },
}

/// Client collaborator errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    #[error("Login rejected: {0}")]
    LoginRejected(String),
    #[error("Login service unreachable: {0}")]
    Unreachable(String),
    #[error("Connection lost: {0}")]
    ConnectionLost(String),
    #[error("Not logged in")]
    NotConnected,
    #[error("Unknown region: {0}")]
    UnknownRegion(String),
    #[error("Object not found: {0}")]
    ObjectNotFound(Uuid),
}

impl ClientError {
    /// Whether the session is gone and the bot must stop
    pub fn is_fatal(&self) -> bool {
        matches!(self, ClientError::ConnectionLost(_) | ClientError::NotConnected)
    }
}

/// One simulated agent's view of the grid. All calls block.
pub trait GridClient: Send {
    fn login(&mut self, params: &LoginParams) -> Result<LoginReply, ClientError>;

    fn logout(&mut self) -> Result<(), ClientError>;

    /// Drain pending events. `ConnectionLost` signals an unrecoverable fault.
    fn poll(&mut self) -> Result<Vec<ClientEvent>, ClientError>;

    fn current_region(&self) -> Option<RegionRecord>;

    fn position(&self) -> Vec3;

    /// Walk (or run) one step along a heading in radians
    fn walk(&mut self, heading: f32, run: bool) -> Result<(), ClientError>;

    fn stop(&mut self) -> Result<(), ClientError>;

    fn jump(&mut self) -> Result<(), ClientError>;

    fn say(&mut self, message: &str) -> Result<(), ClientError>;

    /// Objects in the current region that can be grabbed
    fn nearby_objects(&self) -> Vec<Uuid>;

    fn grab(&mut self, object: Uuid) -> Result<(), ClientError>;

    fn teleport(&mut self, region: &str, position: Vec3) -> Result<(), ClientError>;

    /// Regions adjacent to the current one
    fn neighbours(&self) -> Vec<RegionRecord>;
}

/// Creates one exclusive client per bot
pub trait ClientFactory: Send + Sync {
    fn create(&self, spec: &BotSpec) -> Box<dyn GridClient>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_errors() {
        assert!(ClientError::ConnectionLost("reset".into()).is_fatal());
        assert!(ClientError::NotConnected.is_fatal());
        assert!(!ClientError::UnknownRegion("Oak".into()).is_fatal());
        assert!(!ClientError::ObjectNotFound(Uuid::nil()).is_fatal());
    }
}
