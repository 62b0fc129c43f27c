//! Per-bot behaviour strategies
//!
//! A bot runs a set of behaviours, each invoked once per action round.
//! Behaviours keep bot-local progress state, so every bot gets its own
//! freshly constructed instances; an instance is never shared.

pub mod cross;
pub mod grab;
pub mod idle;
pub mod physics;
pub mod teleport;

use rand::rngs::StdRng;
use smallvec::SmallVec;
use std::fmt;
use tracing::debug;

use crate::client::{ClientError, GridClient};

pub use cross::CrossBehavior;
pub use grab::GrabBehavior;
pub use idle::IdleBehavior;
pub use physics::PhysicsBehavior;
pub use teleport::TeleportBehavior;

/// Known behaviour strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BehaviorKind {
    /// Random walking, running, jumping and chatter
    Physics,
    /// Grab nearby objects
    Grab,
    /// Teleport between regions
    Teleport,
    /// Walk across region boundaries
    Cross,
    /// Log in and do nothing
    Idle,
}

impl BehaviorKind {
    pub const ALL: [BehaviorKind; 5] = [
        BehaviorKind::Physics,
        BehaviorKind::Grab,
        BehaviorKind::Teleport,
        BehaviorKind::Cross,
        BehaviorKind::Idle,
    ];

    /// Decode a single-letter behaviour code
    pub fn from_letter(letter: &str) -> Option<Self> {
        match letter {
            "p" => Some(BehaviorKind::Physics),
            "g" => Some(BehaviorKind::Grab),
            "t" => Some(BehaviorKind::Teleport),
            "c" => Some(BehaviorKind::Cross),
            "n" => Some(BehaviorKind::Idle),
            _ => None,
        }
    }

    pub fn letter(&self) -> char {
        match self {
            BehaviorKind::Physics => 'p',
            BehaviorKind::Grab => 'g',
            BehaviorKind::Teleport => 't',
            BehaviorKind::Cross => 'c',
            BehaviorKind::Idle => 'n',
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BehaviorKind::Physics => "Physics",
            BehaviorKind::Grab => "Grab",
            BehaviorKind::Teleport => "Teleport",
            BehaviorKind::Cross => "Cross",
            BehaviorKind::Idle => "Idle",
        }
    }

    /// Build a fresh, exclusively owned instance of this strategy
    pub fn instantiate(&self) -> Box<dyn Behavior> {
        match self {
            BehaviorKind::Physics => Box::new(PhysicsBehavior::new()),
            BehaviorKind::Grab => Box::new(GrabBehavior::new()),
            BehaviorKind::Teleport => Box::new(TeleportBehavior::new()),
            BehaviorKind::Cross => Box::new(CrossBehavior::new()),
            BehaviorKind::Idle => Box::new(IdleBehavior::new()),
        }
    }
}

impl fmt::Display for BehaviorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A periodic action unit bound to one bot
pub trait Behavior: Send {
    fn kind(&self) -> BehaviorKind;

    /// Called once after login, before the first action
    fn initialize(&mut self, _client: &mut dyn GridClient) -> Result<(), ClientError> {
        Ok(())
    }

    /// One round of activity
    fn action(&mut self, client: &mut dyn GridClient, rng: &mut StdRng) -> Result<(), ClientError>;

    /// Called once when the bot stops, while the session may still be open
    fn close(&mut self, _client: &mut dyn GridClient) {}

    /// Number of actions that had a visible effect
    fn progress(&self) -> u64;
}

/// Requested behaviours, deduplicated, in order of first request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BehaviorSet {
    kinds: SmallVec<[BehaviorKind; 5]>,
}

impl BehaviorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode comma-separated letter codes. Duplicates collapse and
    /// unknown letters are skipped.
    pub fn parse(letters: &str) -> Self {
        let mut set = Self::new();
        for letter in letters.split(',').map(str::trim).filter(|l| !l.is_empty()) {
            match BehaviorKind::from_letter(letter) {
                Some(kind) => {
                    set.insert(kind);
                }
                None => debug!("Ignoring unknown behaviour code '{}'", letter),
            }
        }
        set
    }

    /// Add a behaviour. Returns false if it was already present.
    pub fn insert(&mut self, kind: BehaviorKind) -> bool {
        if self.kinds.contains(&kind) {
            return false;
        }
        self.kinds.push(kind);
        true
    }

    pub fn contains(&self, kind: BehaviorKind) -> bool {
        self.kinds.contains(&kind)
    }

    pub fn kinds(&self) -> &[BehaviorKind] {
        &self.kinds
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// One new instance per requested behaviour
    pub fn instantiate(&self) -> Vec<Box<dyn Behavior>> {
        self.kinds.iter().map(|k| k.instantiate()).collect()
    }

    /// Letter codes, e.g. `p,g`
    pub fn letters(&self) -> String {
        self.kinds
            .iter()
            .map(|k| k.letter().to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for BehaviorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kinds.is_empty() {
            return f.write_str("none");
        }
        let names: Vec<&str> = self.kinds.iter().map(|k| k.name()).collect();
        f.write_str(&names.join(", "))
    }
}
