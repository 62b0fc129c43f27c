use rand::rngs::StdRng;
use rand::Rng;

use crate::behavior::{Behavior, BehaviorKind};
use crate::client::{ClientError, GridClient};

/// Lines picked at random for chatter
const CHATTER: &[&str] = &[
    "Hello there",
    "Anyone around?",
    "Nice region",
    "Testing, testing",
    "brb",
    "What a view",
];

/// Chance per round of saying something
const CHAT_CHANCE: f64 = 0.1;
/// Chance per round of jumping
const JUMP_CHANCE: f64 = 0.2;
/// Chance per round of running instead of walking
const RUN_CHANCE: f64 = 0.3;

/// Random-walk avatar movement with the odd jump and chat line
#[derive(Debug)]
pub struct PhysicsBehavior {
    heading: f32,
    steps: u64,
    jumps: u64,
    lines_said: u64,
}

impl PhysicsBehavior {
    pub fn new() -> Self {
        Self {
            heading: 0.0,
            steps: 0,
            jumps: 0,
            lines_said: 0,
        }
    }

    pub fn jumps(&self) -> u64 {
        self.jumps
    }

    pub fn lines_said(&self) -> u64 {
        self.lines_said
    }
}

impl Default for PhysicsBehavior {
    fn default() -> Self {
        Self::new()
    }
}

impl Behavior for PhysicsBehavior {
    fn kind(&self) -> BehaviorKind {
        BehaviorKind::Physics
    }

    fn action(&mut self, client: &mut dyn GridClient, rng: &mut StdRng) -> Result<(), ClientError> {
        // Drift the heading rather than picking a fresh one each round
        self.heading = (self.heading + rng.gen_range(-1.0..1.0)).rem_euclid(std::f32::consts::TAU);
        client.walk(self.heading, rng.gen_bool(RUN_CHANCE))?;
        self.steps += 1;

        if rng.gen_bool(JUMP_CHANCE) {
            client.jump()?;
            self.jumps += 1;
        }

        if rng.gen_bool(CHAT_CHANCE) {
            let line = CHATTER[rng.gen_range(0..CHATTER.len())];
            client.say(line)?;
            self.lines_said += 1;
        }

        Ok(())
    }

    fn close(&mut self, client: &mut dyn GridClient) {
        let _ = client.stop();
    }

    fn progress(&self) -> u64 {
        self.steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::tests::{sim_client, test_rng};

    #[test]
    fn test_physics_moves_avatar() {
        let (_grid, mut client) = sim_client("last");
        let mut rng = test_rng();
        let mut behavior = PhysicsBehavior::new();
        let start = client.position();

        for _ in 0..10 {
            behavior.action(&mut client, &mut rng).unwrap();
        }

        assert_eq!(behavior.progress(), 10);
        assert!(client.position().distance_to(start) > 0.0);
    }

    #[test]
    fn test_physics_stops_when_logged_out() {
        let (_grid, mut client) = sim_client("last");
        client.logout().unwrap();
        let mut behavior = PhysicsBehavior::new();

        let result = behavior.action(&mut client, &mut test_rng());
        assert!(matches!(result, Err(ClientError::NotConnected)));
        assert_eq!(behavior.progress(), 0);
    }
}
