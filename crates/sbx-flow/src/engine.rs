//! The power-flow engine seam.
//!
//! The timeseries runner and the build pipeline never call the solver
//! directly; they hold a [`FlowEngine`]. The default implementation is
//! the Newton-Raphson solver of this crate, and a caller with special
//! needs (custom initialization, an external solver binding) can inject
//! its own.

use sbx_core::{Network, SbxResult};

use crate::newton::{solve_network, FlowOptions, FlowReport};
use crate::results::write_results;

/// A power-flow solve that fills the network's result tables.
pub trait FlowEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// Solve and write `res_*` tables; non-convergence is an error.
    fn solve(&self, net: &mut Network, opts: &FlowOptions) -> SbxResult<FlowReport>;
}

/// Default engine: dense Newton-Raphson.
#[derive(Debug, Clone, Copy, Default)]
pub struct NewtonEngine;

impl FlowEngine for NewtonEngine {
    fn name(&self) -> &'static str {
        "newton"
    }

    fn solve(&self, net: &mut Network, opts: &FlowOptions) -> SbxResult<FlowReport> {
        let state = solve_network(net, opts)?;
        write_results(net, &state);
        Ok(state.report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::newton::tests::two_bus_case;

    #[test]
    fn test_engine_fills_result_tables() {
        let mut net = two_bus_case();
        let report = NewtonEngine.solve(&mut net, &FlowOptions::default()).unwrap();
        assert!(report.converged);
        assert_eq!(net.res_bus.len(), 2);
        assert_eq!(net.res_line.len(), 1);
        assert_eq!(net.res_load.len(), 1);
    }

    #[test]
    fn test_losses_match_bus_balance() {
        let mut net = two_bus_case();
        NewtonEngine.solve(&mut net, &FlowOptions::default()).unwrap();
        let line_losses: f64 = net.res_line.iter().map(|(_, r)| r.pl_mw).sum();
        let trafo_losses: f64 = net.res_trafo.iter().map(|(_, r)| r.pl_mw).sum();
        let bus_balance: f64 = net.res_bus.iter().map(|(_, r)| r.p_mw).sum();
        // consumption-positive bus powers sum to minus the losses
        assert!((line_losses + trafo_losses + bus_balance).abs() < 1e-6);
        assert!(line_losses > 0.0);
    }

    #[test]
    fn test_slack_covers_load_plus_losses() {
        let mut net = two_bus_case();
        NewtonEngine.solve(&mut net, &FlowOptions::default()).unwrap();
        let slack_p = net.res_ext_grid.get(0).unwrap().p_mw;
        let losses: f64 = net.res_line.iter().map(|(_, r)| r.pl_mw).sum();
        assert!((slack_p - 40.0 - losses).abs() < 1e-6);
    }
}
