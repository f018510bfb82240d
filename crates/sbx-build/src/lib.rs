//! # sbx-build: excerpt assembly
//!
//! The construction pipeline of the EHV+HV excerpt grid: curated dataset
//! knowledge as a config artifact, pre-manipulation of the reference
//! data, the region cut with equivalent boundary loads, reactive-limit
//! computation per grid code, control-strategy attachment, snapshot
//! persistence, and the orchestrating entry point.

pub mod absolute;
pub mod assemble;
pub mod curation;
pub mod limits;
pub mod merge;
pub mod premanip;
pub mod reduce;
pub mod report;
pub mod snapshot;
pub mod strategy;

pub use absolute::absolute_profiles;
pub use assemble::{build_excerpt, build_excerpt_with, Excerpt, ExcerptOptions};
pub use curation::{Curation, LineStdType, LineTypeOverride};
pub use limits::{set_sgen_limits, SgenLimitOptions};
pub use merge::{convert_parallel_trafos, merge_same_bus_generation};
pub use premanip::{pre_manipulation, replace_ext_grids_by_slack_gens, set_bus_zones, BusRoles};
pub use reduce::reduce_ehv;
pub use report::{
    grid_parameters, overview, predefined_weights, weights_from_opt, Overview, ZoneParameters,
};
pub use snapshot::{load_network, save_network};
pub use strategy::{add_control_strategy, ControlStrategy, StrategyReport};
