//! # sbx-ts: timeseries execution
//!
//! Drives repeated power-flow solves over a sequence of time steps:
//! profile values are injected per step, registered controllers run
//! around each solve, and a configurable set of result columns is
//! collected into per-key frames.
//!
//! The runner offers two strategies: a base kernel with full controller
//! support and an accelerated kernel (optional `accel` feature) that
//! fans independent steps out over a thread pool.

pub mod control;
pub mod inject;
pub mod outputs;
pub mod runner;

pub use control::{
    consider_distr_slack, ConstProfile, Controller, ControllerSet, DerController,
    DistributedSlack, QModel, TapControl,
};
pub use inject::{set_time_step, set_time_step_from_container, InjectMode};
pub use outputs::{branch_columns, default_outputs, OutputCollector};
pub use runner::{run_control, run_timeseries, Capability, ControlFn, Kernel, RunOptions};
