//! The 24-hour simulation loop.
//!
//! Hours are independent given the immutable [`Network`]: each solve derives
//! its own load and dispatch state, so the horizon is fanned out over a
//! rayon worker pool and collected back into hour order. Failure is
//! fail-fast: the lowest-indexed failing hour aborts the run and no partial
//! results are returned.

use std::time::{Duration, Instant};

use rayon::prelude::*;
use tracing::{info, warn};

use crate::dispatch;
use crate::error::{DispatchError, SimulationError};
use crate::network::Network;
use crate::powerflow::PowerFlowConfig;
use crate::report::HourlyResult;

/// Hours in one simulated day.
pub const HORIZON_HOURS: usize = 24;

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    pub powerflow: PowerFlowConfig,
    /// Wall-clock budget for the whole run; expiry aborts every in-flight
    /// hour solve.
    pub timeout: Option<Duration>,
    /// Solve hours on the rayon pool; turning this off runs them in order on
    /// the calling thread.
    pub parallel: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            powerflow: PowerFlowConfig::default(),
            timeout: None,
            parallel: true,
        }
    }
}

/// Lifecycle of a simulation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Failed,
}

/// Drives [`dispatch::solve_hour`] across the 24-hour horizon.
pub struct Simulation {
    network: Network,
    config: SimulationConfig,
    state: RunState,
}

impl Simulation {
    pub fn new(network: Network) -> Self {
        Self::with_config(network, SimulationConfig::default())
    }

    pub fn with_config(network: Network, config: SimulationConfig) -> Self {
        Simulation {
            network,
            config,
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    /// Runs the full horizon against `hourly_load_mw` (exactly one value per
    /// hour) and returns the ordered hourly results, or the first failure.
    pub fn run(
        &mut self,
        hourly_load_mw: &[f64],
    ) -> Result<Vec<HourlyResult>, SimulationError> {
        self.state = RunState::Running;
        let outcome = self.run_inner(hourly_load_mw);
        self.state = match outcome {
            Ok(_) => RunState::Completed,
            Err(_) => RunState::Failed,
        };
        outcome
    }

    fn run_inner(
        &self,
        hourly_load_mw: &[f64],
    ) -> Result<Vec<HourlyResult>, SimulationError> {
        if hourly_load_mw.len() != HORIZON_HOURS {
            return Err(SimulationError::InvalidInputShape {
                got: hourly_load_mw.len(),
            });
        }
        let deadline = self.config.timeout.map(|budget| Instant::now() + budget);
        info!(
            parallel = self.config.parallel,
            timeout = ?self.config.timeout,
            "starting 24-hour dispatch run"
        );

        let net = &self.network;
        let pf = &self.config.powerflow;
        let solve = |(hour, load_mw): (usize, f64)| -> Result<HourlyResult, SimulationError> {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(self.timeout_error());
            }
            dispatch::solve_hour(net, pf, load_mw, deadline)
                .map(|sol| HourlyResult::from_solution(hour, load_mw, &sol))
                .map_err(|source| match source {
                    DispatchError::DeadlineExceeded => self.timeout_error(),
                    source => {
                        warn!(hour, load_mw, %source, "hour dispatch failed");
                        SimulationError::Hour {
                            hour,
                            load_mw,
                            source,
                        }
                    }
                })
        };

        // rayon's indexed map keeps hour order on collect, so concurrent
        // completion order never reorders the output.
        let outcomes: Vec<Result<HourlyResult, SimulationError>> = if self.config.parallel {
            hourly_load_mw
                .par_iter()
                .copied()
                .enumerate()
                .map(solve)
                .collect()
        } else {
            hourly_load_mw
                .iter()
                .copied()
                .enumerate()
                .map(solve)
                .collect()
        };

        // A deadline expiry anywhere turns the whole run into a timeout;
        // otherwise the earliest failing hour wins, matching sequential
        // fail-fast semantics.
        if outcomes
            .iter()
            .any(|o| matches!(o, Err(SimulationError::Timeout { .. })))
        {
            return Err(self.timeout_error());
        }
        let results = outcomes
            .into_iter()
            .collect::<Result<Vec<HourlyResult>, SimulationError>>()?;

        info!(hours = results.len(), "dispatch run completed");
        Ok(results)
    }

    fn timeout_error(&self) -> SimulationError {
        SimulationError::Timeout {
            budget: self.config.timeout.unwrap_or_default(),
        }
    }
}
