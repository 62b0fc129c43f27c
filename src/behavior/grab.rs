use rand::rngs::StdRng;
use rand::Rng;
use tracing::debug;
use uuid::Uuid;

use crate::behavior::{Behavior, BehaviorKind};
use crate::client::{ClientError, GridClient};

/// Grabs a random object in the current region each round
#[derive(Debug, Default)]
pub struct GrabBehavior {
    grabs: u64,
    misses: u64,
    last_object: Option<Uuid>,
}

impl GrabBehavior {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_object(&self) -> Option<Uuid> {
        self.last_object
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}

impl Behavior for GrabBehavior {
    fn kind(&self) -> BehaviorKind {
        BehaviorKind::Grab
    }

    fn action(&mut self, client: &mut dyn GridClient, rng: &mut StdRng) -> Result<(), ClientError> {
        let objects = client.nearby_objects();
        if objects.is_empty() {
            return Ok(());
        }

        let object = objects[rng.gen_range(0..objects.len())];
        match client.grab(object) {
            Ok(()) => {
                self.grabs += 1;
                self.last_object = Some(object);
                Ok(())
            }
            // Object went away between listing and grabbing
            Err(ClientError::ObjectNotFound(id)) => {
                debug!("Grab target {} vanished", id);
                self.misses += 1;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn progress(&self) -> u64 {
        self.grabs
    }
}
