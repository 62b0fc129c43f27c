//! Fleet lifecycle: bots, their workers, and the manager that launches and
//! tears them down

pub mod bot;
pub mod events;
pub mod location;
pub mod manager;
pub mod region;
pub mod status;

pub use bot::{Bot, BotDetail, BotSpec, BotStatusRow, BotTemplate, ConnectionState, Pacing};
pub use manager::{DisconnectReport, FleetError, FleetManager, FleetSettings};
pub use region::{RegionRecord, RegionRegistry};
pub use status::{FleetStatus, StateTotals};
