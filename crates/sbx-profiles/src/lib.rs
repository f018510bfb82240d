//! # sbx-profiles: time-series profile data
//!
//! Profiles map a typed key (`load.p_mw`, `gen.vm_pu`, …) to a
//! time-indexed table whose columns are element indices of the matching
//! network table. This crate owns those tables and their persistence:
//!
//! - a partitioned parquet folder store (`two_days` / `rest_of_the_year`),
//! - a single-file zip container with one parquet sub-table per key,
//! - a JSON folder tree with one file per variable.
//!
//! plus the value-preserving numeric downcasting applied before storage.

pub mod downcast;
pub mod frame;
pub mod selection;
pub mod store;

pub use downcast::{downcast_frame, downcast_profiles};
pub use frame::{ProfileFrame, ProfileSet, ResultFrames};
pub use selection::StepSelection;
pub use store::container::{store_profiles_to_container, ContainerStore};
pub use store::json::{read_results_from_json, write_results_to_json};
pub use store::parquet::{
    load_profiles_from_parquet, store_profiles_to_parquet, TWO_DAYS_STEPS, YEAR_STEPS,
};
