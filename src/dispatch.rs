//! Least-cost dispatch of one hour: merit-order allocation, power-flow
//! verification, and line-limit checking.
//!
//! The optimizer is sequential rather than a joint security-constrained
//! program: allocate demand to sources cheapest-first, verify the candidate
//! with a full AC power flow, and reject the hour if any line exceeds its
//! rating. Network losses land on the slack source, so the allocation is
//! re-targeted at demand plus the realized losses until the slack's output
//! matches its allocation.

use std::time::Instant;

use nalgebra::DVector;
use num_complex::Complex64;
use tracing::{debug, warn};

use crate::error::DispatchError;
use crate::network::Network;
use crate::powerflow::{
    build_ybus, line_flows, newton_pf, LineFlow, PowerFlowConfig, SparseLu, StateIndex,
};

/// Passes of the dispatch / power-flow / loss re-estimate loop.
const MAX_LOSS_PASSES: usize = 5;
/// Fixpoint tolerance on the slack source's realized output, MW.
const SLACK_TOL_MW: f64 = 1e-4;
/// Slop allowed on capacity bounds before a realized dispatch is rejected.
/// Wider than [`SLACK_TOL_MW`] so a converged loss fixpoint cannot sit on
/// the wrong side of the bound check.
const BOUND_TOL_MW: f64 = 1e-3;

/// Dispatch for one hour: per-source setpoints, resulting line flows, and
/// the hour's total cost.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchSolution {
    /// Generator setpoints, in network generator order, MW.
    pub generator_mw: Vec<f64>,
    /// Realized external-grid output (its allocation plus network losses), MW.
    pub ext_grid_mw: f64,
    /// Per-line flows, in network line order.
    pub flows: Vec<LineFlow>,
    pub losses_mw: f64,
    pub total_cost: f64,
    pub pf_iterations: usize,
}

/// Merit-order allocation of `demand_mw` across the external grid and the
/// generators: every source gets its minimum, then remaining demand fills
/// sources cheapest-first up to their maxima. Ties on cost resolve to the
/// external grid first, then generators in network order.
fn merit_order(net: &Network, demand_mw: f64) -> Result<(f64, Vec<f64>), DispatchError> {
    let capacity = net.total_source_capacity_mw();
    if demand_mw > capacity {
        return Err(DispatchError::InfeasibleDemand {
            demand_mw,
            capacity_mw: capacity,
        });
    }

    // Source 0 is the external grid, 1..=n the generators; a stable sort on
    // cost keeps that order on ties.
    let mut order: Vec<(f64, usize, f64, f64)> = vec![(
        net.ext_grid.cost_per_mw,
        0,
        net.ext_grid.min_mw,
        net.ext_grid.max_mw,
    )];
    order.extend(
        net.generators
            .iter()
            .enumerate()
            .map(|(i, g)| (g.cost_per_mw, i + 1, g.min_mw, g.max_mw)),
    );
    order.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut setpoints = vec![0.0; order.len()];
    let mut remaining = demand_mw;
    for &(_, source, min_mw, _) in &order {
        setpoints[source] = min_mw;
        remaining -= min_mw;
    }
    for &(_, source, min_mw, max_mw) in &order {
        let take = remaining.clamp(0.0, max_mw - min_mw);
        setpoints[source] += take;
        remaining -= take;
    }
    if remaining > BOUND_TOL_MW {
        return Err(DispatchError::InfeasibleDemand {
            demand_mw,
            capacity_mw: capacity,
        });
    }
    Ok((setpoints[0], setpoints[1..].to_vec()))
}

/// Specified per-bus complex injections, per-unit: generator setpoints minus
/// scaled active loads and base-case reactive loads.
fn build_s_spec(net: &Network, scaled_loads: &[f64], gen_mw: &[f64]) -> DVector<Complex64> {
    let mut s = DVector::zeros(net.buses.len());
    for (load, &p_mw) in net.loads.iter().zip(scaled_loads) {
        s[load.bus] -= Complex64::new(p_mw, load.q_mvar) / net.s_base_mva;
    }
    for (g, &p_mw) in net.generators.iter().zip(gen_mw) {
        s[g.bus] += Complex64::new(p_mw, 0.0) / net.s_base_mva;
    }
    s
}

/// Solves the least-cost dispatch for one hour of `total_load_mw` demand.
pub fn solve_hour(
    net: &Network,
    cfg: &PowerFlowConfig,
    total_load_mw: f64,
    deadline: Option<Instant>,
) -> Result<DispatchSolution, DispatchError> {
    let scaled_loads = net.scale_loads(total_load_mw)?;
    let ybus = build_ybus(net);
    let slack = net.slack_bus();
    let idx = StateIndex::new(net.buses.len(), slack, &net.pq_buses());
    let v_init = DVector::from_element(net.buses.len(), Complex64::new(1.0, 0.0));
    let mut solver = SparseLu::default();

    let slack_load_mw: f64 = net
        .loads
        .iter()
        .zip(&scaled_loads)
        .filter(|(l, _)| l.bus == slack)
        .map(|(_, &p)| p)
        .sum();

    let mut loss_estimate_mw = 0.0;
    let mut pass = 0;
    let (ext_mw, gen_mw, v, iterations, losses_mw) = loop {
        let (ext_target, gen_mw) = merit_order(net, total_load_mw + loss_estimate_mw)?;
        let s_spec = build_s_spec(net, &scaled_loads, &gen_mw);
        let sol = newton_pf(&ybus, &s_spec, &v_init, &idx, cfg, deadline, &mut solver)?;

        // Realized slack output: net injection at the slack bus plus any
        // load served there.
        let i_slack = (&ybus * &sol.v)[slack];
        let p_slack_mw = (sol.v[slack] * i_slack.conj()).re * net.s_base_mva + slack_load_mw;
        let generation_mw: f64 = gen_mw.iter().sum::<f64>() + p_slack_mw;
        let losses_mw = generation_mw - total_load_mw;
        debug!(
            pass,
            ext_target, p_slack_mw, losses_mw, "loss compensation pass"
        );

        pass += 1;
        if (p_slack_mw - ext_target).abs() < SLACK_TOL_MW || pass >= MAX_LOSS_PASSES {
            break (p_slack_mw, gen_mw, sol.v, sol.iterations, losses_mw);
        }
        loss_estimate_mw = losses_mw;
    };

    // Loss compensation keeps the slack inside its band in every servable
    // case; falling out here means demand plus losses exceed capacity.
    if ext_mw > net.ext_grid.max_mw + BOUND_TOL_MW || ext_mw < net.ext_grid.min_mw - BOUND_TOL_MW
    {
        warn!(ext_mw, "external grid pushed outside its capacity by losses");
        return Err(DispatchError::InfeasibleDemand {
            demand_mw: total_load_mw + losses_mw,
            capacity_mw: net.total_source_capacity_mw(),
        });
    }

    let flows = line_flows(net, &v);
    if let Some((line, flow)) = flows
        .iter()
        .enumerate()
        .find(|(_, f)| f.loading_percent > 100.0)
    {
        warn!(line, loading_percent = flow.loading_percent, "line overload");
        return Err(DispatchError::LineOverload {
            line,
            loading_percent: flow.loading_percent,
        });
    }

    let total_cost = net.ext_grid.cost_per_mw * ext_mw
        + net
            .generators
            .iter()
            .zip(&gen_mw)
            .map(|(g, &p)| g.cost_per_mw * p)
            .sum::<f64>();

    Ok(DispatchSolution {
        generator_mw: gen_mw,
        ext_grid_mw: ext_mw,
        flows,
        losses_mw,
        total_cost,
        pf_iterations: iterations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merit_order_prefers_the_cheapest_source() {
        let net = Network::case9();
        let (ext, gens) = merit_order(&net, 50.0).unwrap();
        assert_eq!((ext, gens), (50.0, vec![0.0, 0.0]));

        let (ext, gens) = merit_order(&net, 600.0).unwrap();
        assert_eq!((ext, gens), (250.0, vec![300.0, 50.0]));

        let (ext, gens) = merit_order(&net, 830.0).unwrap();
        assert_eq!((ext, gens), (250.0, vec![300.0, 280.0]));
    }

    #[test]
    fn s_spec_nets_generation_against_load() {
        let net = Network::case9();
        let scaled = net.scale_loads(315.0).unwrap();
        let s = build_s_spec(&net, &scaled, &[163.0, 85.0]);

        assert_eq!(s[net.generators[0].bus], Complex64::new(1.63, 0.0));
        assert_eq!(s[net.generators[1].bus], Complex64::new(0.85, 0.0));
        assert_eq!(s[net.loads[0].bus], Complex64::new(-0.90, -0.30));
        assert_eq!(s[net.slack_bus()], Complex64::new(0.0, 0.0));
    }

    #[test]
    fn merit_order_rejects_excess_demand() {
        let net = Network::case9();
        let err = merit_order(&net, 900.0).unwrap_err();
        assert_eq!(
            err,
            DispatchError::InfeasibleDemand {
                demand_mw: 900.0,
                capacity_mw: 830.0
            }
        );
    }

    #[test]
    fn merit_order_tie_break_is_stable() {
        let mut net = Network::case9();
        net.generators[0].cost_per_mw = net.ext_grid.cost_per_mw;
        let (ext, gens) = merit_order(&net, 260.0).unwrap();
        // Equal cost: external grid fills first.
        assert_eq!((ext, gens), (250.0, vec![10.0, 0.0]));
    }

    #[test]
    fn light_demand_dispatches_within_limits() {
        let net = Network::case9();
        let sol = solve_hour(&net, &PowerFlowConfig::default(), 50.0, None).unwrap();

        // The external grid alone covers 50 MW plus losses.
        assert_eq!(sol.generator_mw, vec![0.0, 0.0]);
        assert!(sol.ext_grid_mw >= 50.0);
        assert!(sol.ext_grid_mw <= net.ext_grid.max_mw);
        assert!(sol.losses_mw >= 0.0 && sol.losses_mw < 5.0);

        let supplied: f64 = sol.ext_grid_mw + sol.generator_mw.iter().sum::<f64>();
        assert!((supplied - 50.0 - sol.losses_mw).abs() < 1e-6);

        for flow in &sol.flows {
            assert!(flow.loading_percent >= 0.0);
            assert!(flow.loading_percent <= 100.0);
        }
        let expected_cost = net.ext_grid.cost_per_mw * sol.ext_grid_mw;
        assert!((sol.total_cost - expected_cost).abs() < 1e-9);
    }

    #[test]
    fn heavy_demand_trips_a_line_limit() {
        // 600 MW forces generator 1 to 300 MW through its 250 MVA tie line.
        let net = Network::case9();
        let err = solve_hour(&net, &PowerFlowConfig::default(), 600.0, None).unwrap_err();
        assert!(
            matches!(err, DispatchError::LineOverload { loading_percent, .. }
                if loading_percent > 100.0),
            "expected a line overload, got {err:?}"
        );
    }

    #[test]
    fn dispatch_is_deterministic() {
        let net = Network::case9();
        let cfg = PowerFlowConfig::default();
        let a = solve_hour(&net, &cfg, 120.0, None).unwrap();
        let b = solve_hour(&net, &cfg, 120.0, None).unwrap();
        assert_eq!(a, b);
    }
}
