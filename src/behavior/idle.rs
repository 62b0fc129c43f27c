use rand::rngs::StdRng;

use crate::behavior::{Behavior, BehaviorKind};
use crate::client::{ClientError, GridClient};

/// Stays logged in without doing anything
#[derive(Debug, Default)]
pub struct IdleBehavior {
    rounds: u64,
}

impl IdleBehavior {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Behavior for IdleBehavior {
    fn kind(&self) -> BehaviorKind {
        BehaviorKind::Idle
    }

    fn action(&mut self, _client: &mut dyn GridClient, _rng: &mut StdRng) -> Result<(), ClientError> {
        self.rounds += 1;
        Ok(())
    }

    fn progress(&self) -> u64 {
        self.rounds
    }
}
