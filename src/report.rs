//! Per-hour result records and run summaries.
//!
//! Every numeric field is rounded to two decimals before packaging, so the
//! records serialize to the wire shape the API layer exposes.

use std::fmt;

use serde::{Deserialize, Serialize};
use tabled::{Table, Tabled};

use crate::dispatch::DispatchSolution;

/// One hour's dispatch outcome. Immutable once produced; the field names are
/// the serialized wire names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyResult {
    pub hour: usize,
    pub total_load_mw: f64,
    /// Ordered by network line index.
    pub line_loading_percent: Vec<f64>,
    /// Ordered by network generator index.
    pub generator_dispatch_mw: Vec<f64>,
    pub external_grid_dispatch_mw: f64,
    pub total_cost_per_hour: f64,
}

/// Rounds to two decimal places.
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

impl HourlyResult {
    pub(crate) fn from_solution(hour: usize, total_load_mw: f64, sol: &DispatchSolution) -> Self {
        HourlyResult {
            hour,
            total_load_mw: round2(total_load_mw),
            line_loading_percent: sol
                .flows
                .iter()
                .map(|f| round2(f.loading_percent))
                .collect(),
            generator_dispatch_mw: sol.generator_mw.iter().copied().map(round2).collect(),
            external_grid_dispatch_mw: round2(sol.ext_grid_mw),
            total_cost_per_hour: round2(sol.total_cost),
        }
    }

    fn peak_loading_percent(&self) -> f64 {
        self.line_loading_percent
            .iter()
            .copied()
            .fold(0.0, f64::max)
    }
}

/// A float printed with two decimals, for table cells.
#[derive(Clone, Copy, PartialEq)]
struct Fixed2(f64);

impl fmt::Display for Fixed2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

#[derive(Tabled)]
struct HourRow {
    hour: usize,
    load_mw: Fixed2,
    ext_grid_mw: Fixed2,
    generation_mw: Fixed2,
    peak_loading_pct: Fixed2,
    cost: Fixed2,
}

/// Renders a run's results as a fixed-width summary table, one row per hour.
pub fn render_table(results: &[HourlyResult]) -> String {
    let rows = results.iter().map(|r| HourRow {
        hour: r.hour,
        load_mw: Fixed2(r.total_load_mw),
        ext_grid_mw: Fixed2(r.external_grid_dispatch_mw),
        generation_mw: Fixed2(r.generator_dispatch_mw.iter().sum()),
        peak_loading_pct: Fixed2(r.peak_loading_percent()),
        cost: Fixed2(r.total_cost_per_hour),
    });
    Table::new(rows).to_string()
}
