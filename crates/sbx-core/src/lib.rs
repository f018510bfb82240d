//! # sbx-core: grid excerpt data model
//!
//! Fundamental data structures of the EHV+HV excerpt pipeline: the network
//! container with its typed element tables, the closed key space for
//! profile and result addressing, bus-graph connectivity utilities, the
//! unified error type, and the VDE AR-N 4120/4130 reactive-capability
//! curve data.
//!
//! The container deliberately models the source dataset's table-per-
//! element-type layout: every downstream stage (value injection, topology
//! reduction, limit computation) addresses elements by stable integer
//! index, and profiles reference those same indices as columns.

pub mod elements;
pub mod error;
pub mod graph;
pub mod keys;
pub mod network;
pub mod table;
pub mod vde;

pub use elements::*;
pub use error::{SbxError, SbxResult};
pub use graph::BusGraph;
pub use keys::{ColumnKind, ElementKind, ProfileKey, ResultKey, TableRef};
pub use network::{Network, NetworkStats};
pub use table::Table;
pub use vde::{CurveVariant, QBound, QCurveFamily, QCurveTag, VdeVersion};
