//! Curated dataset knowledge as a configuration artifact.
//!
//! The reduction is only valid for one reference grid, and everything it
//! knows about that grid lives here instead of in code: anchor buses for
//! the region cut, as-built line reinforcements, slack corrections, and
//! the curated generator voltage set-points. A different topology gets a
//! different file, not different code.

use std::collections::BTreeMap;
use std::path::Path;

use sbx_core::{SbxError, SbxResult};
use serde::{Deserialize, Serialize};

/// One line's standard-type replacement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineTypeOverride {
    pub line: usize,
    pub std_type: String,
}

/// Electrical parameters of a named line standard type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineStdType {
    pub r_ohm_per_km: f64,
    pub x_ohm_per_km: f64,
    pub c_nf_per_km: f64,
    pub max_i_ka: f64,
    pub kind: String,
}

/// The full curation record for one reference grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Curation {
    /// Buses where the retained region is cut from the exterior
    pub boundary_buses: Vec<usize>,
    /// Buses on the seam between the two retained EHV operator zones
    pub zone_boundary_buses: Vec<usize>,
    /// Extra traversal seeds for the retained region (besides the
    /// transformer-anchored seed)
    pub inner_seed_buses: Vec<usize>,
    /// Low-voltage side rating identifying the anchor transformers
    pub hv_trafo_lv_kv: f64,
    /// As-built reinforcements that differ from the published types
    pub line_type_overrides: Vec<LineTypeOverride>,
    /// Groups of lines whose parallel count is raised by one per group
    pub parallel_increments: Vec<Vec<usize>>,
    /// Parameter table of the standard types referenced by the overrides
    pub std_types: BTreeMap<String, LineStdType>,
    /// The generator that takes over the slack role
    pub slack_gen: usize,
    /// Generators losing their slack flag
    pub removed_slack_gens: Vec<usize>,
    /// Generators whose output must not move with the slack distribution
    pub zero_slack_weight_gens: Vec<usize>,
    /// Offset applied to every curated voltage set-point
    pub gen_vm_pu_offset: f64,
    /// Curated voltage set-points, positional over the generator table
    pub gen_vm_pu: Vec<f64>,
    /// Subnets forming the neutral zone between operator regions
    pub neutral_subnets: Vec<String>,
    /// Zone assignment of neutral buses when no neutral zone is wanted
    pub boundary_zone_by_subnet: BTreeMap<String, i32>,
    /// The one transformer tap-controlled from its hv side
    pub tap_control_hv_side_trafo: usize,
    /// Tap-control voltage band, per-unit
    pub tap_control_band_pu: (f64, f64),
}

impl Curation {
    /// The curation record bundled for the reference grid.
    pub fn bundled() -> SbxResult<Self> {
        serde_json::from_str(include_str!("../data/curation.json")).map_err(SbxError::from)
    }

    pub fn from_file(path: &Path) -> SbxResult<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(SbxError::from)
    }

    pub fn std_type(&self, name: &str) -> SbxResult<&LineStdType> {
        self.std_types
            .get(name)
            .ok_or_else(|| SbxError::Data(format!("standard line type '{name}' is not defined")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_curation_parses() {
        let cur = Curation::bundled().unwrap();
        assert!(cur.boundary_buses.contains(&68));
        assert_eq!(cur.zone_boundary_buses, vec![66, 8]);
        assert_eq!(cur.gen_vm_pu.len(), 345);
        assert!(cur.gen_vm_pu_offset < 0.0);
        // every override's type is defined
        for ov in &cur.line_type_overrides {
            assert!(cur.std_types.contains_key(&ov.std_type), "{}", ov.std_type);
        }
    }
}
