//! Hourly economic-dispatch simulation over a Newton-Raphson AC power flow
//! core.
//!
//! Given the compiled-in reference network ([`network::Network::case9`]) and
//! a 24-value hourly demand profile, [`simulation::Simulation`] computes the
//! least-cost dispatch for every hour, verified against the full AC power
//! flow equations and the lines' thermal ratings, or reports exactly why an
//! hour cannot be served.

pub mod dispatch;
pub mod error;
pub mod network;
pub mod powerflow;
pub mod report;
pub mod simulation;

pub mod prelude {
    pub use crate::dispatch::{solve_hour, DispatchSolution};
    pub use crate::error::{DispatchError, PowerFlowError, SimulationError};
    pub use crate::network::Network;
    pub use crate::powerflow::{newton_pf, PowerFlowConfig};
    pub use crate::report::{render_table, HourlyResult};
    pub use crate::simulation::{RunState, Simulation, SimulationConfig, HORIZON_HOURS};
}
