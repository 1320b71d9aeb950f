//! Nodal admittance matrix assembly.

use nalgebra_sparse::{CooMatrix, CscMatrix};
use num_complex::Complex64;

use crate::network::Network;

/// Builds the per-unit nodal admittance matrix from the standard pi branch
/// model: series admittance between terminals, half the charging susceptance
/// shunted at each end. Duplicate triplets are summed by the COO to CSC
/// conversion.
pub fn build_ybus(net: &Network) -> CscMatrix<Complex64> {
    let n = net.buses.len();
    let mut coo = CooMatrix::new(n, n);
    for line in &net.lines {
        let ys = Complex64::new(1.0, 0.0) / Complex64::new(line.r_pu, line.x_pu);
        let ysh = Complex64::new(0.0, line.b_pu / 2.0);
        coo.push(line.from, line.from, ys + ysh);
        coo.push(line.to, line.to, ys + ysh);
        coo.push(line.from, line.to, -ys);
        coo.push(line.to, line.from, -ys);
    }
    CscMatrix::from(&coo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{Bus, BusKind, ExternalGrid, Line, LoadPoint, Network};
    use nalgebra::DMatrix;

    fn two_bus_net(b_pu: f64) -> Network {
        Network {
            s_base_mva: 100.0,
            buses: vec![
                Bus {
                    index: 0,
                    kind: BusKind::Slack,
                    base_kv: 110.0,
                },
                Bus {
                    index: 1,
                    kind: BusKind::Load,
                    base_kv: 110.0,
                },
            ],
            lines: vec![Line {
                from: 0,
                to: 1,
                r_pu: 0.01,
                x_pu: 0.1,
                b_pu,
                rating_mva: 100.0,
            }],
            generators: vec![],
            ext_grid: ExternalGrid {
                bus: 0,
                min_mw: 0.0,
                max_mw: 1000.0,
                cost_per_mw: 1.0,
            },
            loads: vec![LoadPoint {
                bus: 1,
                p_mw: 50.0,
                q_mvar: 20.0,
            }],
        }
    }

    #[test]
    fn two_bus_entries() {
        let ybus = DMatrix::from(&build_ybus(&two_bus_net(0.2)));
        let ys = Complex64::new(1.0, 0.0) / Complex64::new(0.01, 0.1);
        let diag = ys + Complex64::new(0.0, 0.1);
        assert!((ybus[(0, 0)] - diag).norm() < 1e-12);
        assert!((ybus[(1, 1)] - diag).norm() < 1e-12);
        assert!((ybus[(0, 1)] + ys).norm() < 1e-12);
        assert!((ybus[(1, 0)] + ys).norm() < 1e-12);
    }

    #[test]
    fn rows_sum_to_zero_without_charging() {
        let ybus = DMatrix::from(&build_ybus(&two_bus_net(0.0)));
        for i in 0..2 {
            let sum: Complex64 = (0..2).map(|j| ybus[(i, j)]).sum();
            assert!(sum.norm() < 1e-12);
        }
    }

    #[test]
    fn case9_ybus_is_symmetric_and_finite() {
        let net = Network::case9();
        let ybus = build_ybus(&net);
        assert_eq!(ybus.nrows(), 9);
        assert_eq!(ybus.ncols(), 9);
        assert!(ybus.values().iter().all(|y| !y.re.is_nan() && !y.im.is_nan()));
        let dense = DMatrix::from(&ybus);
        for i in 0..9 {
            for j in 0..9 {
                assert!((dense[(i, j)] - dense[(j, i)]).norm() < 1e-12);
            }
        }
    }
}
