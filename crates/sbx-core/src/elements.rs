//! Row types of the network element tables.
//!
//! Column names follow the source dataset's conventions (unit-suffixed,
//! snake_case) so that profile keys, snapshot files and result tables all
//! speak the same vocabulary.

use serde::{Deserialize, Serialize};

use crate::vde::QCurveTag;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bus {
    pub name: String,
    pub vn_kv: f64,
    /// Operator zone label; 0 is the neutral zone
    pub zone: i32,
    pub subnet: String,
    pub volt_lvl: Option<i8>,
    pub min_vm_pu: Option<f64>,
    pub max_vm_pu: Option<f64>,
    pub in_service: bool,
    pub origin_id: Option<String>,
}

impl Default for Bus {
    fn default() -> Self {
        Self {
            name: String::new(),
            vn_kv: 0.0,
            zone: 0,
            subnet: String::new(),
            volt_lvl: None,
            min_vm_pu: None,
            max_vm_pu: None,
            in_service: true,
            origin_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Load {
    pub name: String,
    pub bus: usize,
    pub p_mw: f64,
    pub q_mvar: f64,
    pub sn_mva: Option<f64>,
    pub profile: String,
    pub zone: Option<i32>,
    pub volt_lvl: Option<i8>,
    pub subnet: String,
    pub in_service: bool,
    pub origin_id: Option<String>,
}

impl Default for Load {
    fn default() -> Self {
        Self {
            name: String::new(),
            bus: 0,
            p_mw: 0.0,
            q_mvar: 0.0,
            sn_mva: None,
            profile: String::new(),
            zone: None,
            volt_lvl: None,
            subnet: String::new(),
            in_service: true,
            origin_id: None,
        }
    }
}

/// Static generator (converter-connected generation unit).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sgen {
    pub name: String,
    pub bus: usize,
    pub p_mw: f64,
    pub q_mvar: f64,
    pub sn_mva: f64,
    pub profile: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub controllable: bool,
    /// Reactive-capability curve tag per VDE AR-N 4120/4130
    pub q_curve: Option<QCurveTag>,
    pub min_p_mw: Option<f64>,
    pub max_p_mw: Option<f64>,
    pub min_q_mvar: Option<f64>,
    pub max_q_mvar: Option<f64>,
    pub slack_weight: f64,
    pub volt_lvl: Option<i8>,
    pub subnet: String,
    pub in_service: bool,
    pub origin_id: Option<String>,
}

impl Default for Sgen {
    fn default() -> Self {
        Self {
            name: String::new(),
            bus: 0,
            p_mw: 0.0,
            q_mvar: 0.0,
            sn_mva: 0.0,
            profile: String::new(),
            kind: String::new(),
            controllable: false,
            q_curve: None,
            min_p_mw: None,
            max_p_mw: None,
            min_q_mvar: None,
            max_q_mvar: None,
            slack_weight: 0.0,
            volt_lvl: None,
            subnet: String::new(),
            in_service: true,
            origin_id: None,
        }
    }
}

/// Voltage-controlled (synchronous) generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Gen {
    pub name: String,
    pub bus: usize,
    pub p_mw: f64,
    pub vm_pu: f64,
    pub sn_mva: f64,
    pub min_p_mw: Option<f64>,
    pub max_p_mw: Option<f64>,
    pub min_q_mvar: Option<f64>,
    pub max_q_mvar: Option<f64>,
    /// Acts as the angle reference and absorbs residual mismatch
    pub slack: bool,
    pub slack_weight: f64,
    pub controllable: Option<bool>,
    pub profile: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub volt_lvl: Option<i8>,
    pub subnet: String,
    pub in_service: bool,
    pub origin_id: Option<String>,
}

impl Default for Gen {
    fn default() -> Self {
        Self {
            name: String::new(),
            bus: 0,
            p_mw: 0.0,
            vm_pu: 1.0,
            sn_mva: 0.0,
            min_p_mw: None,
            max_p_mw: None,
            min_q_mvar: None,
            max_q_mvar: None,
            slack: false,
            slack_weight: 0.0,
            controllable: None,
            profile: String::new(),
            kind: String::new(),
            volt_lvl: None,
            subnet: String::new(),
            in_service: true,
            origin_id: None,
        }
    }
}

/// External grid connection (replaced by slack generators during build).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtGrid {
    pub name: String,
    pub bus: usize,
    pub vm_pu: f64,
    pub va_degree: f64,
    pub sn_mva: f64,
    pub min_p_mw: Option<f64>,
    pub max_p_mw: Option<f64>,
    pub min_q_mvar: Option<f64>,
    pub max_q_mvar: Option<f64>,
    pub slack_weight: f64,
    pub profile: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub volt_lvl: Option<i8>,
    pub subnet: String,
    pub in_service: bool,
    pub origin_id: Option<String>,
}

impl Default for ExtGrid {
    fn default() -> Self {
        Self {
            name: String::new(),
            bus: 0,
            vm_pu: 1.0,
            va_degree: 0.0,
            sn_mva: 0.0,
            min_p_mw: None,
            max_p_mw: None,
            min_q_mvar: None,
            max_q_mvar: None,
            slack_weight: 1.0,
            profile: String::new(),
            kind: String::new(),
            volt_lvl: None,
            subnet: String::new(),
            in_service: true,
            origin_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Line {
    pub name: String,
    pub from_bus: usize,
    pub to_bus: usize,
    pub length_km: f64,
    pub r_ohm_per_km: f64,
    pub x_ohm_per_km: f64,
    pub c_nf_per_km: f64,
    pub max_i_ka: f64,
    /// Number of parallel systems represented by this row
    pub parallel: u32,
    pub std_type: String,
    /// "ohl" (overhead) or "cs" (cable)
    #[serde(rename = "type")]
    pub kind: String,
    pub volt_lvl: Option<i8>,
    pub subnet: String,
    pub in_service: bool,
    pub origin_id: Option<String>,
}

impl Default for Line {
    fn default() -> Self {
        Self {
            name: String::new(),
            from_bus: 0,
            to_bus: 0,
            length_km: 1.0,
            r_ohm_per_km: 0.0,
            x_ohm_per_km: 0.0,
            c_nf_per_km: 0.0,
            max_i_ka: 0.0,
            parallel: 1,
            std_type: String::new(),
            kind: "ohl".to_string(),
            volt_lvl: None,
            subnet: String::new(),
            in_service: true,
            origin_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Trafo {
    pub name: String,
    pub hv_bus: usize,
    pub lv_bus: usize,
    pub sn_mva: f64,
    pub vn_hv_kv: f64,
    pub vn_lv_kv: f64,
    pub vk_percent: f64,
    pub vkr_percent: f64,
    pub pfe_kw: f64,
    pub i0_percent: f64,
    /// "hv" or "lv"
    pub tap_side: String,
    pub tap_neutral: i32,
    pub tap_min: i32,
    pub tap_max: i32,
    pub tap_step_percent: f64,
    pub tap_pos: i32,
    pub parallel: u32,
    pub std_type: String,
    pub volt_lvl: Option<i8>,
    pub subnet: String,
    pub in_service: bool,
    pub origin_id: Option<String>,
}

impl Default for Trafo {
    fn default() -> Self {
        Self {
            name: String::new(),
            hv_bus: 0,
            lv_bus: 0,
            sn_mva: 0.0,
            vn_hv_kv: 0.0,
            vn_lv_kv: 0.0,
            vk_percent: 12.0,
            vkr_percent: 0.25,
            pfe_kw: 0.0,
            i0_percent: 0.0,
            tap_side: "hv".to_string(),
            tap_neutral: 0,
            tap_min: -9,
            tap_max: 9,
            tap_step_percent: 1.5,
            tap_pos: 0,
            parallel: 1,
            std_type: String::new(),
            volt_lvl: None,
            subnet: String::new(),
            in_service: true,
            origin_id: None,
        }
    }
}

/// Storage unit; present for snapshot compatibility, empty in this grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Storage {
    pub name: String,
    pub bus: usize,
    pub p_mw: f64,
    pub q_mvar: f64,
    pub sn_mva: f64,
    pub max_e_mwh: f64,
    pub profile: String,
    pub subnet: String,
    pub in_service: bool,
    pub origin_id: Option<String>,
}

impl Default for Storage {
    fn default() -> Self {
        Self {
            name: String::new(),
            bus: 0,
            p_mw: 0.0,
            q_mvar: 0.0,
            sn_mva: 0.0,
            max_e_mwh: 0.0,
            profile: String::new(),
            subnet: String::new(),
            in_service: true,
            origin_id: None,
        }
    }
}

/// Measurement placement row; the build pipeline clears this table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Measurement {
    pub name: String,
    pub measurement_type: String,
    pub element_type: String,
    pub element: usize,
    pub value: f64,
    pub std_dev: f64,
}

// --- result tables -------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResBus {
    pub vm_pu: f64,
    pub va_degree: f64,
    pub p_mw: f64,
    pub q_mvar: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResLine {
    pub p_from_mw: f64,
    pub q_from_mvar: f64,
    pub p_to_mw: f64,
    pub q_to_mvar: f64,
    pub pl_mw: f64,
    pub ql_mvar: f64,
    pub i_from_ka: f64,
    pub i_to_ka: f64,
    pub loading_percent: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResTrafo {
    pub p_hv_mw: f64,
    pub q_hv_mvar: f64,
    pub p_lv_mw: f64,
    pub q_lv_mvar: f64,
    pub pl_mw: f64,
    pub ql_mvar: f64,
    pub i_hv_ka: f64,
    pub i_lv_ka: f64,
    pub loading_percent: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResGen {
    pub p_mw: f64,
    pub q_mvar: f64,
    pub vm_pu: f64,
    pub va_degree: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResPq {
    pub p_mw: f64,
    pub q_mvar: f64,
}
