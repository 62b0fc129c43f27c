use rand::rngs::StdRng;
use rand::Rng;

use crate::behavior::{Behavior, BehaviorKind};
use crate::client::{ClientError, GridClient};
use crate::fleet::region::RegionRecord;
use crate::util::vec3::Vec3;

/// Bounces between the arrival region and a random neighbour
#[derive(Debug, Default)]
pub struct TeleportBehavior {
    home: Option<RegionRecord>,
    teleports: u64,
    failures: u64,
}

impl TeleportBehavior {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn home(&self) -> Option<&RegionRecord> {
        self.home.as_ref()
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }
}

impl Behavior for TeleportBehavior {
    fn kind(&self) -> BehaviorKind {
        BehaviorKind::Teleport
    }

    fn initialize(&mut self, client: &mut dyn GridClient) -> Result<(), ClientError> {
        self.home = client.current_region();
        Ok(())
    }

    fn action(&mut self, client: &mut dyn GridClient, rng: &mut StdRng) -> Result<(), ClientError> {
        let Some(current) = client.current_region() else {
            return Err(ClientError::NotConnected);
        };
        let home = self.home.get_or_insert_with(|| current.clone()).clone();

        let destination = if current.handle == home.handle {
            let neighbours = client.neighbours();
            if neighbours.is_empty() {
                return Ok(());
            }
            neighbours[rng.gen_range(0..neighbours.len())].name.clone()
        } else {
            home.name
        };

        match client.teleport(&destination, Vec3::REGION_CENTRE) {
            Ok(()) => {
                self.teleports += 1;
                Ok(())
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(_) => {
                self.failures += 1;
                Ok(())
            }
        }
    }

    fn progress(&self) -> u64 {
        self.teleports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::tests::{sim_client, test_rng};

    #[test]
    fn test_teleport_alternates_with_home() {
        let (_grid, mut client) = sim_client("uri:Birch&128&128&0");
        let mut rng = test_rng();
        let mut behavior = TeleportBehavior::new();
        behavior.initialize(&mut client).unwrap();
        assert_eq!(behavior.home().unwrap().name, "Birch");

        behavior.action(&mut client, &mut rng).unwrap();
        let away = client.current_region().unwrap().name;
        assert!(away == "Oak" || away == "Cedar");

        behavior.action(&mut client, &mut rng).unwrap();
        assert_eq!(client.current_region().unwrap().name, "Birch");
        assert_eq!(behavior.progress(), 2);
    }

    #[test]
    fn test_teleport_requires_session() {
        let (_grid, mut client) = sim_client("last");
        client.logout().unwrap();
        let mut behavior = TeleportBehavior::new();

        let result = behavior.action(&mut client, &mut test_rng());
        assert!(matches!(result, Err(ClientError::NotConnected)));
    }
}
