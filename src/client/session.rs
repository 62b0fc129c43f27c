use rand::RngCore;
use std::collections::HashMap;
use std::fmt;
use std::time::Instant;
use uuid::Uuid;

/// Secure session id issued by the login service
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionToken([u8; 32]);

impl SessionToken {
    /// Generate a new session token from the thread-local CSPRNG
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Short hex prefix, safe to put in logs
    pub fn short(&self) -> String {
        self.0[..4].iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionToken({}..)", self.short())
    }
}

/// Live session on the grid side
#[derive(Debug, Clone)]
pub struct Session {
    pub agent_id: Uuid,
    pub token: SessionToken,
    pub agent_name: String,
    pub region: usize,
    pub created_at: Instant,
}

/// Session table keyed by agent. One session per agent name: a second
/// login for the same name replaces the first.
#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: HashMap<Uuid, Session>,
    by_name: HashMap<String, Uuid>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self, agent_name: &str, region: usize) -> Session {
        if let Some(old) = self.by_name.remove(agent_name) {
            self.sessions.remove(&old);
        }

        let session = Session {
            agent_id: Uuid::new_v4(),
            token: SessionToken::generate(),
            agent_name: agent_name.to_string(),
            region,
            created_at: Instant::now(),
        };
        self.by_name.insert(agent_name.to_string(), session.agent_id);
        self.sessions.insert(session.agent_id, session.clone());
        session
    }

    /// Validate a token against the agent's current session
    pub fn validate(&self, agent_id: Uuid, token: &SessionToken) -> bool {
        self.sessions
            .get(&agent_id)
            .map(|s| &s.token == token)
            .unwrap_or(false)
    }

    pub fn set_region(&mut self, agent_id: Uuid, region: usize) -> bool {
        if let Some(session) = self.sessions.get_mut(&agent_id) {
            session.region = region;
            true
        } else {
            false
        }
    }

    pub fn close(&mut self, agent_id: Uuid) -> Option<Session> {
        let session = self.sessions.remove(&agent_id)?;
        self.by_name.remove(&session.agent_name);
        Some(session)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Number of agents currently in a region
    pub fn population(&self, region: usize) -> usize {
        self.sessions.values().filter(|s| s.region == region).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_token_generate() {
        let t1 = SessionToken::generate();
        let t2 = SessionToken::generate();
        assert_ne!(t1, t2);
    }

    #[test]
    fn test_session_token_short() {
        let token = SessionToken::generate();
        assert_eq!(token.short().len(), 8);
        assert!(format!("{:?}", token).starts_with("SessionToken("));
    }

    #[test]
    fn test_open_and_validate() {
        let mut table = SessionTable::new();
        let session = table.open("Load Bot_0", 0);

        assert!(table.validate(session.agent_id, &session.token));
        assert!(!table.validate(session.agent_id, &SessionToken::generate()));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_relogin_replaces_session() {
        let mut table = SessionTable::new();
        let first = table.open("Load Bot_0", 0);
        let second = table.open("Load Bot_0", 1);

        assert!(!table.validate(first.agent_id, &first.token));
        assert!(table.validate(second.agent_id, &second.token));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_close() {
        let mut table = SessionTable::new();
        let session = table.open("Load Bot_0", 0);

        assert!(table.close(session.agent_id).is_some());
        assert!(table.close(session.agent_id).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_population() {
        let mut table = SessionTable::new();
        let a = table.open("A", 0);
        table.open("B", 0);
        table.open("C", 1);

        assert_eq!(table.population(0), 2);
        table.set_region(a.agent_id, 1);
        assert_eq!(table.population(1), 2);
    }
}
