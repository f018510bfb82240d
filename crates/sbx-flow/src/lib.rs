//! # sbx-flow: AC power flow
//!
//! A compact Newton-Raphson AC power-flow solver over the element tables
//! of [`sbx_core::Network`]: Y-bus assembly from line and transformer
//! data, dense LU Newton iterations, optional reactive-limit enforcement
//! via PV-PQ switching, and extraction of the full `res_*` table set.
//!
//! The solver hides behind the [`FlowEngine`] trait so the timeseries
//! runner stays independent of the concrete implementation.

pub mod engine;
pub mod newton;
pub mod results;
pub mod ybus;

pub use engine::{FlowEngine, NewtonEngine};
pub use newton::{solve_network, BusType, FlowOptions, FlowReport, FlowState};
pub use results::write_results;
pub use ybus::{BranchAdmittance, YBus};
