//! Polar-form mismatch Jacobian of the bus power injection equations.
//!
//! State ordering follows the usual convention: angle corrections for every
//! non-slack bus first (in bus order), then magnitude corrections for PQ
//! buses. Mismatch rows mirror the same layout, so the system stays square.
//! Partial derivatives follow the MATPOWER Technical Note 2 formulae,
//! evaluated per Ybus nonzero so the Jacobian inherits the admittance
//! matrix's sparsity.

use nalgebra::DVector;
use nalgebra_sparse::{CooMatrix, CscMatrix};
use num_complex::Complex64;

/// Maps bus indices to state-vector and mismatch-row positions. The slack
/// bus contributes no unknowns; generator (PV) buses contribute an angle
/// only; PQ buses contribute angle and magnitude.
#[derive(Debug, Clone)]
pub struct StateIndex {
    pub n_bus: usize,
    pub slack: usize,
    /// Bus -> angle variable column (and active-power mismatch row).
    pub ang: Vec<Option<usize>>,
    /// Bus -> magnitude variable column (and reactive-power mismatch row).
    pub vm: Vec<Option<usize>>,
    pub n_state: usize,
}

impl StateIndex {
    pub fn new(n_bus: usize, slack: usize, pq: &[usize]) -> Self {
        let mut ang = vec![None; n_bus];
        let mut vm = vec![None; n_bus];
        let mut next = 0;
        for bus in 0..n_bus {
            if bus != slack {
                ang[bus] = Some(next);
                next += 1;
            }
        }
        let mut is_pq = vec![false; n_bus];
        for &bus in pq {
            is_pq[bus] = true;
        }
        for bus in 0..n_bus {
            if is_pq[bus] {
                vm[bus] = Some(next);
                next += 1;
            }
        }
        StateIndex {
            n_bus,
            slack,
            ang,
            vm,
            n_state: next,
        }
    }
}

/// Mismatch vector `f(x) = S_calc - S_spec`, laid out per [`StateIndex`]:
/// active-power residuals for non-slack buses, then reactive-power residuals
/// for PQ buses.
pub(crate) fn assemble_mismatch(
    s_calc: &DVector<Complex64>,
    s_spec: &DVector<Complex64>,
    idx: &StateIndex,
) -> DVector<f64> {
    let mut f = DVector::zeros(idx.n_state);
    for bus in 0..idx.n_bus {
        let mis = s_calc[bus] - s_spec[bus];
        if let Some(row) = idx.ang[bus] {
            f[row] = mis.re;
        }
        if let Some(row) = idx.vm[bus] {
            f[row] = mis.im;
        }
    }
    f
}

/// Assembles the Jacobian `d f / d [theta | Vm]` at the voltage state `v`,
/// given the calculated injections `s_calc = diag(v) * conj(Ybus * v)`.
pub(crate) fn build_jacobian(
    ybus: &CscMatrix<Complex64>,
    v: &DVector<Complex64>,
    s_calc: &DVector<Complex64>,
    idx: &StateIndex,
) -> CscMatrix<f64> {
    let vm: DVector<f64> = v.map(|e| e.norm());
    let va: DVector<f64> = v.map(|e| e.arg());

    let offsets = ybus.col_offsets();
    let rows = ybus.row_indices();
    let vals = ybus.values();

    let mut coo = CooMatrix::new(idx.n_state, idx.n_state);
    for j in 0..ybus.ncols() {
        for k in offsets[j]..offsets[j + 1] {
            let i = rows[k];
            let g = vals[k].re;
            let b = vals[k].im;

            if i == j {
                let p = s_calc[i].re;
                let q = s_calc[i].im;
                if let Some(row) = idx.ang[i] {
                    if let Some(col) = idx.ang[i] {
                        coo.push(row, col, -q - b * vm[i] * vm[i]);
                    }
                    if let Some(col) = idx.vm[i] {
                        coo.push(row, col, p / vm[i] + g * vm[i]);
                    }
                }
                if let Some(row) = idx.vm[i] {
                    if let Some(col) = idx.ang[i] {
                        coo.push(row, col, p - g * vm[i] * vm[i]);
                    }
                    if let Some(col) = idx.vm[i] {
                        coo.push(row, col, q / vm[i] - b * vm[i]);
                    }
                }
            } else {
                let t = va[i] - va[j];
                let (sin_t, cos_t) = t.sin_cos();
                // Shared sub-expressions of the four off-diagonal partials.
                let gc_bs = g * cos_t + b * sin_t;
                let gs_bc = g * sin_t - b * cos_t;
                if let Some(row) = idx.ang[i] {
                    if let Some(col) = idx.ang[j] {
                        coo.push(row, col, vm[i] * vm[j] * gs_bc);
                    }
                    if let Some(col) = idx.vm[j] {
                        coo.push(row, col, vm[i] * gc_bs);
                    }
                }
                if let Some(row) = idx.vm[i] {
                    if let Some(col) = idx.ang[j] {
                        coo.push(row, col, -vm[i] * vm[j] * gc_bs);
                    }
                    if let Some(col) = idx.vm[j] {
                        coo.push(row, col, vm[i] * gs_bc);
                    }
                }
            }
        }
    }
    CscMatrix::from(&coo)
}
