use rand::rngs::StdRng;
use std::f32::consts::PI;

use crate::behavior::{Behavior, BehaviorKind};
use crate::client::{ClientError, GridClient};
use crate::fleet::region::REGION_SIZE;

/// Distance from an edge at which the bot checks for a neighbour ahead
const EDGE_MARGIN: f32 = 16.0;

/// Runs east or west along the grid row to force region crossings
#[derive(Debug)]
pub struct CrossBehavior {
    eastbound: bool,
    crossings: u64,
    turns: u64,
}

impl CrossBehavior {
    pub fn new() -> Self {
        Self {
            eastbound: true,
            crossings: 0,
            turns: 0,
        }
    }

    pub fn turns(&self) -> u64 {
        self.turns
    }

    fn heading(&self) -> f32 {
        if self.eastbound {
            0.0
        } else {
            PI
        }
    }
}

impl Default for CrossBehavior {
    fn default() -> Self {
        Self::new()
    }
}

impl Behavior for CrossBehavior {
    fn kind(&self) -> BehaviorKind {
        BehaviorKind::Cross
    }

    fn action(&mut self, client: &mut dyn GridClient, _rng: &mut StdRng) -> Result<(), ClientError> {
        let current = client.current_region().ok_or(ClientError::NotConnected)?;
        let x = client.position().x;

        let near_edge = if self.eastbound {
            x >= REGION_SIZE as f32 - EDGE_MARGIN
        } else {
            x <= EDGE_MARGIN
        };
        if near_edge {
            let ahead = client.neighbours().iter().any(|n| {
                if self.eastbound {
                    n.x > current.x
                } else {
                    n.x < current.x
                }
            });
            if !ahead {
                self.eastbound = !self.eastbound;
                self.turns += 1;
            }
        }

        client.walk(self.heading(), true)?;

        if client
            .current_region()
            .map(|r| r.handle != current.handle)
            .unwrap_or(false)
        {
            self.crossings += 1;
        }
        Ok(())
    }

    fn progress(&self) -> u64 {
        self.crossings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::tests::{sim_client, test_rng};

    #[test]
    fn test_cross_reaches_next_region() {
        let (_grid, mut client) = sim_client("uri:Oak&240&128&0");
        let mut behavior = CrossBehavior::new();

        for _ in 0..3 {
            behavior.action(&mut client, &mut test_rng()).unwrap();
        }

        assert_eq!(behavior.progress(), 1);
        assert_eq!(client.current_region().unwrap().name, "Birch");
    }

    #[test]
    fn test_cross_turns_at_grid_edge() {
        let (_grid, mut client) = sim_client("uri:Maple&250&128&0");
        let mut behavior = CrossBehavior::new();

        behavior.action(&mut client, &mut test_rng()).unwrap();

        assert_eq!(behavior.turns(), 1);
        assert!(client.position().x < 250.0);
        assert_eq!(client.current_region().unwrap().name, "Maple");
    }
}
