//! Newton-Raphson AC power flow: admittance assembly, Jacobian construction,
//! the iteration itself, and flow extraction from a converged voltage state.

pub(crate) mod jacobian;
mod newton;
pub(crate) mod solver;
mod ybus;

pub use jacobian::StateIndex;
pub use newton::{newton_pf, PowerFlowConfig, PowerFlowSolution};
pub use solver::{LinearSolver, SparseLu};
pub use ybus::build_ybus;

use nalgebra::DVector;
use num_complex::Complex64;

use crate::network::Network;

/// Complex power over one line in both directions, plus its loading relative
/// to the thermal rating.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineFlow {
    pub p_from_mw: f64,
    pub q_from_mvar: f64,
    pub p_to_mw: f64,
    pub q_to_mvar: f64,
    /// `100 * max(|S_from|, |S_to|) / rating`.
    pub loading_percent: f64,
}

/// Computes per-line flows from a solved voltage state, in network line
/// order.
pub fn line_flows(net: &Network, v: &DVector<Complex64>) -> Vec<LineFlow> {
    net.lines
        .iter()
        .map(|line| {
            let ys = Complex64::new(1.0, 0.0) / Complex64::new(line.r_pu, line.x_pu);
            let ysh = Complex64::new(0.0, line.b_pu / 2.0);
            let vf = v[line.from];
            let vt = v[line.to];
            let i_from = (vf - vt) * ys + vf * ysh;
            let i_to = (vt - vf) * ys + vt * ysh;
            let s_from = vf * i_from.conj() * net.s_base_mva;
            let s_to = vt * i_to.conj() * net.s_base_mva;
            let flow_mva = s_from.norm().max(s_to.norm());
            LineFlow {
                p_from_mw: s_from.re,
                q_from_mvar: s_from.im,
                p_to_mw: s_to.re,
                q_to_mvar: s_to.im,
                loading_percent: 100.0 * flow_mva / line.rating_mva,
            }
        })
        .collect()
}
