//! Newton-Raphson solve of the bus injection equations.

use std::time::Instant;

use nalgebra::DVector;
use nalgebra_sparse::CscMatrix;
use num_complex::Complex64;
use tracing::debug;

use super::jacobian::{assemble_mismatch, build_jacobian, StateIndex};
use super::solver::LinearSolver;
use crate::error::PowerFlowError;

/// Convergence parameters of the power flow iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerFlowConfig {
    /// Maximum absolute power mismatch, per-unit, accepted as converged.
    pub tol: f64,
    pub max_iter: usize,
}

impl Default for PowerFlowConfig {
    fn default() -> Self {
        PowerFlowConfig {
            tol: 1e-6,
            max_iter: 30,
        }
    }
}

/// A converged voltage state.
#[derive(Debug, Clone, PartialEq)]
pub struct PowerFlowSolution {
    pub v: DVector<Complex64>,
    pub iterations: usize,
    pub max_mismatch_pu: f64,
}

/// Iterates from `v_init` until the largest absolute bus power mismatch
/// drops below `cfg.tol`, correcting the state through the linearized
/// mismatch equations each round. PV bus magnitudes are pinned by carrying
/// no magnitude variable for them; the slack bus carries no variable at all.
///
/// Fails with [`PowerFlowError::Diverged`] when the iteration budget is
/// exhausted, the mismatch stops being finite, or the Jacobian cannot be
/// factorized. An elapsed `deadline` aborts with
/// [`PowerFlowError::DeadlineExceeded`].
pub fn newton_pf(
    ybus: &CscMatrix<Complex64>,
    s_spec: &DVector<Complex64>,
    v_init: &DVector<Complex64>,
    idx: &StateIndex,
    cfg: &PowerFlowConfig,
    deadline: Option<Instant>,
    solver: &mut impl LinearSolver,
) -> Result<PowerFlowSolution, PowerFlowError> {
    let mut v = v_init.clone();
    let mut vm: DVector<f64> = v.map(|e| e.norm());
    let mut va: DVector<f64> = v.map(|e| e.arg());

    if idx.n_state == 0 {
        return Ok(PowerFlowSolution {
            v,
            iterations: 0,
            max_mismatch_pu: 0.0,
        });
    }

    let mut iterations = 0;
    loop {
        let s_calc = v.component_mul(&(ybus * &v).conjugate());
        let f = assemble_mismatch(&s_calc, s_spec, idx);
        let max_mismatch = f.amax();
        debug!(iterations, max_mismatch_pu = max_mismatch, "power flow step");

        if max_mismatch < cfg.tol {
            return Ok(PowerFlowSolution {
                v,
                iterations,
                max_mismatch_pu: max_mismatch,
            });
        }
        if !max_mismatch.is_finite() || iterations >= cfg.max_iter {
            return Err(PowerFlowError::Diverged {
                mismatch_pu: max_mismatch,
                iterations,
            });
        }
        if let Some(d) = deadline {
            if Instant::now() >= d {
                return Err(PowerFlowError::DeadlineExceeded);
            }
        }

        let jac = build_jacobian(ybus, &v, &s_calc, idx);
        let mut dx = f;
        if solver.solve(&jac, dx.as_mut_slice()).is_err() {
            // A singular Jacobian means the linearization broke down; treat
            // it as non-convergence at the current mismatch.
            return Err(PowerFlowError::Diverged {
                mismatch_pu: max_mismatch,
                iterations,
            });
        }

        for bus in 0..idx.n_bus {
            if let Some(col) = idx.ang[bus] {
                va[bus] -= dx[col];
            }
            if let Some(col) = idx.vm[bus] {
                vm[bus] -= dx[col];
            }
            v[bus] = Complex64::from_polar(vm[bus], va[bus]);
        }
        iterations += 1;
    }
}
