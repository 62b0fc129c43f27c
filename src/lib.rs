//! Gridbot Fleet Library
//!
//! Load-testing fleet for virtual-world grids: launches many simulated
//! agents with staggered logins, runs pluggable behaviours on each, and
//! tears the fleet down from an operator console.
//!
//! # Features
//!
//! - `metrics_server` - HTTP endpoint serving fleet metrics in Prometheus and JSON format (enabled by default)

pub mod behavior;
pub mod client;
pub mod config;
pub mod console;
pub mod fleet;
pub mod metrics;
pub mod util;
