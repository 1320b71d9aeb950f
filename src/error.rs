//! Failure taxonomy for the dispatch engine.
//!
//! Three layers, matching the call stack: [`PowerFlowError`] is internal to
//! the Newton-Raphson solve, [`DispatchError`] scopes a single hour's
//! dispatch attempt, and [`SimulationError`] is what a 24-hour run surfaces
//! to the caller. Numerical non-convergence and constraint infeasibility are
//! deliberately distinct variants: the former means the equations could not
//! be solved, the latter means they were solved and the answer violates an
//! operating limit.

use std::time::Duration;

use thiserror::Error;

/// Errors produced by the Newton-Raphson power flow iteration itself.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PowerFlowError {
    /// The iteration budget ran out before the mismatch fell below tolerance.
    /// Also reported when the Jacobian becomes singular mid-iteration.
    #[error(
        "power flow did not converge after {iterations} iterations \
         (max mismatch {mismatch_pu:.3e} p.u.)"
    )]
    Diverged { mismatch_pu: f64, iterations: usize },

    /// The caller's run deadline expired while iterating.
    #[error("run deadline expired during power flow iteration")]
    DeadlineExceeded,
}

/// Hour-scoped dispatch failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispatchError {
    /// Propagated from the power flow solve for a candidate dispatch.
    #[error(
        "power flow did not converge after {iterations} iterations \
         (max mismatch {mismatch_pu:.3e} p.u.)"
    )]
    PowerFlowDivergence { mismatch_pu: f64, iterations: usize },

    /// A line's computed flow exceeds its thermal rating after dispatch.
    #[error("line {line} loaded at {loading_percent:.2}% of its thermal rating")]
    LineOverload { line: usize, loading_percent: f64 },

    /// Demand (including network losses) exceeds the summed capacity of all
    /// dispatchable sources.
    #[error(
        "total demand {demand_mw:.2} MW exceeds dispatchable capacity {capacity_mw:.2} MW"
    )]
    InfeasibleDemand { demand_mw: f64, capacity_mw: f64 },

    /// The base-case loads sum to zero, so a target demand cannot be
    /// distributed across buses.
    #[error("base-case load sums to zero; cannot scale a target demand onto it")]
    DegenerateBaseCase,

    /// The run deadline expired while solving this hour. Surfaced to callers
    /// as [`SimulationError::Timeout`], never as an hour failure.
    #[error("run deadline expired while solving this hour")]
    DeadlineExceeded,
}

impl From<PowerFlowError> for DispatchError {
    fn from(e: PowerFlowError) -> Self {
        match e {
            PowerFlowError::Diverged {
                mismatch_pu,
                iterations,
            } => DispatchError::PowerFlowDivergence {
                mismatch_pu,
                iterations,
            },
            PowerFlowError::DeadlineExceeded => DispatchError::DeadlineExceeded,
        }
    }
}

/// Run-scoped simulation failures. A failed run produces no partial results.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    /// The input profile did not contain exactly one value per hour.
    #[error("expected exactly 24 hourly load values, got {got}")]
    InvalidInputShape { got: usize },

    /// Dispatch failed for one hour; carries the hour index and the offending
    /// load value verbatim so an operator can locate it in the forecast.
    #[error("dispatch failed at hour {hour} for total load {load_mw:.2} MW: {source}")]
    Hour {
        hour: usize,
        load_mw: f64,
        #[source]
        source: DispatchError,
    },

    /// The caller-supplied time budget elapsed before all hours completed.
    #[error("simulation run exceeded its time budget of {budget:?}")]
    Timeout { budget: Duration },
}
