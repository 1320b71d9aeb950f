//! Immutable network model: buses, lines, sources, and base-case loads.
//!
//! A [`Network`] is built once and only read afterwards; per-hour load and
//! dispatch values are derived from it by value, never written back. All
//! branch impedances are stored per-unit on the network's MVA base, the way
//! the reference case data ships them.

use serde::{Deserialize, Serialize};

use crate::error::DispatchError;

/// Role a bus plays in the power flow formulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BusKind {
    /// Reference bus; absorbs the power-balance mismatch. Exactly one per
    /// network.
    Slack,
    /// Generator bus; active power and voltage magnitude held fixed.
    Generator,
    /// Plain bus; power injection fixed, voltage solved for.
    Load,
}

/// A network node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bus {
    pub index: usize,
    pub kind: BusKind,
    pub base_kv: f64,
}

/// A branch between two buses with its series impedance, total line-charging
/// susceptance, and thermal rating. Impedances are per-unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub from: usize,
    pub to: usize,
    pub r_pu: f64,
    pub x_pu: f64,
    pub b_pu: f64,
    pub rating_mva: f64,
}

/// A dispatchable generator with capacity bounds and a linear cost.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Generator {
    pub bus: usize,
    pub min_mw: f64,
    pub max_mw: f64,
    pub cost_per_mw: f64,
}

/// The import/export connection at the slack bus. Same shape as a generator;
/// it additionally absorbs network losses during the power flow solve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExternalGrid {
    pub bus: usize,
    pub min_mw: f64,
    pub max_mw: f64,
    pub cost_per_mw: f64,
}

/// A base-case load draw at a bus. Active power is scaled per hour; reactive
/// power stays at its base-case value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoadPoint {
    pub bus: usize,
    pub p_mw: f64,
    pub q_mvar: f64,
}

/// Read-only description of the grid: topology, operating limits, and cost
/// coefficients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Network {
    pub s_base_mva: f64,
    pub buses: Vec<Bus>,
    pub lines: Vec<Line>,
    pub generators: Vec<Generator>,
    pub ext_grid: ExternalGrid,
    pub loads: Vec<LoadPoint>,
}

impl Network {
    /// The compiled-in reference network: the 9-bus, 9-line test case with
    /// one external grid, two generators, and three loads, plus the operating
    /// limits and linear costs of the dispatch study (external grid
    /// [0, 250] MW at 10/MW, generators [0, 300] MW at 20/MW and
    /// [0, 280] MW at 30/MW).
    pub fn case9() -> Self {
        let buses = (0..9)
            .map(|index| Bus {
                index,
                kind: match index {
                    0 => BusKind::Slack,
                    1 | 2 => BusKind::Generator,
                    _ => BusKind::Load,
                },
                base_kv: 345.0,
            })
            .collect();

        // (from, to, r, x, b, rating) per-unit on 100 MVA.
        let branch_data = [
            (0usize, 3usize, 0.0, 0.0576, 0.0, 250.0),
            (3, 4, 0.017, 0.092, 0.158, 250.0),
            (4, 5, 0.039, 0.17, 0.358, 150.0),
            (2, 5, 0.0, 0.0586, 0.0, 300.0),
            (5, 6, 0.0119, 0.1008, 0.209, 150.0),
            (6, 7, 0.0085, 0.072, 0.149, 250.0),
            (7, 1, 0.0, 0.0625, 0.0, 250.0),
            (7, 8, 0.032, 0.161, 0.306, 250.0),
            (8, 3, 0.01, 0.085, 0.176, 250.0),
        ];
        let lines = branch_data
            .iter()
            .map(|&(from, to, r_pu, x_pu, b_pu, rating_mva)| Line {
                from,
                to,
                r_pu,
                x_pu,
                b_pu,
                rating_mva,
            })
            .collect();

        Network {
            s_base_mva: 100.0,
            buses,
            lines,
            generators: vec![
                Generator {
                    bus: 1,
                    min_mw: 0.0,
                    max_mw: 300.0,
                    cost_per_mw: 20.0,
                },
                Generator {
                    bus: 2,
                    min_mw: 0.0,
                    max_mw: 280.0,
                    cost_per_mw: 30.0,
                },
            ],
            ext_grid: ExternalGrid {
                bus: 0,
                min_mw: 0.0,
                max_mw: 250.0,
                cost_per_mw: 10.0,
            },
            loads: vec![
                LoadPoint {
                    bus: 4,
                    p_mw: 90.0,
                    q_mvar: 30.0,
                },
                LoadPoint {
                    bus: 6,
                    p_mw: 100.0,
                    q_mvar: 35.0,
                },
                LoadPoint {
                    bus: 8,
                    p_mw: 125.0,
                    q_mvar: 50.0,
                },
            ],
        }
    }

    /// Index of the slack bus.
    pub fn slack_bus(&self) -> usize {
        self.buses
            .iter()
            .position(|b| b.kind == BusKind::Slack)
            .unwrap_or(0)
    }

    /// Buses solved as PQ nodes: everything that is neither slack nor a
    /// generator bus.
    pub fn pq_buses(&self) -> Vec<usize> {
        self.buses
            .iter()
            .filter(|b| b.kind == BusKind::Load)
            .map(|b| b.index)
            .collect()
    }

    /// Sum of base-case active loads, the denominator of proportional
    /// scaling.
    pub fn total_base_load_mw(&self) -> f64 {
        self.loads.iter().map(|l| l.p_mw).sum()
    }

    /// Summed maximum output of every dispatchable source.
    pub fn total_source_capacity_mw(&self) -> f64 {
        self.ext_grid.max_mw + self.generators.iter().map(|g| g.max_mw).sum::<f64>()
    }

    /// Distributes a target total demand across load points, preserving each
    /// point's base-case share. Returns one active-power value per entry of
    /// [`Network::loads`], in order.
    pub fn scale_loads(&self, target_mw: f64) -> Result<Vec<f64>, DispatchError> {
        let base = self.total_base_load_mw();
        if base == 0.0 {
            return Err(DispatchError::DegenerateBaseCase);
        }
        let factor = target_mw / base;
        Ok(self.loads.iter().map(|l| l.p_mw * factor).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case9_shape() {
        let net = Network::case9();
        assert_eq!(net.buses.len(), 9);
        assert_eq!(net.lines.len(), 9);
        assert_eq!(net.generators.len(), 2);
        assert_eq!(net.loads.len(), 3);
        let slacks = net
            .buses
            .iter()
            .filter(|b| b.kind == BusKind::Slack)
            .count();
        assert_eq!(slacks, 1);
        assert_eq!(net.slack_bus(), 0);
        assert_eq!(net.pq_buses(), vec![3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn case9_limits_and_costs() {
        let net = Network::case9();
        for line in &net.lines {
            assert!(line.rating_mva > 0.0);
        }
        for g in &net.generators {
            assert!(0.0 <= g.min_mw && g.min_mw <= g.max_mw);
        }
        assert_eq!(net.ext_grid.cost_per_mw, 10.0);
        assert_eq!(net.generators[0].cost_per_mw, 20.0);
        assert_eq!(net.generators[1].cost_per_mw, 30.0);
        assert_eq!(net.total_source_capacity_mw(), 830.0);
        assert_eq!(net.total_base_load_mw(), 315.0);
    }

    #[test]
    fn scaling_preserves_shares() {
        let net = Network::case9();
        let scaled = net.scale_loads(157.5).unwrap();
        assert_eq!(scaled.len(), 3);
        assert!((scaled[0] - 45.0).abs() < 1e-12);
        assert!((scaled[1] - 50.0).abs() < 1e-12);
        assert!((scaled[2] - 62.5).abs() < 1e-12);
        let sum: f64 = scaled.iter().sum();
        assert!((sum - 157.5).abs() < 1e-9);
    }

    #[test]
    fn scaling_to_zero_gives_zero_loads() {
        let net = Network::case9();
        let scaled = net.scale_loads(0.0).unwrap();
        assert!(scaled.iter().all(|&p| p == 0.0));
    }

    #[test]
    fn zero_sum_base_case_is_degenerate() {
        let mut net = Network::case9();
        for l in &mut net.loads {
            l.p_mw = 0.0;
        }
        assert_eq!(
            net.scale_loads(100.0),
            Err(DispatchError::DegenerateBaseCase)
        );
    }
}
