//! Per-step controllers applied around each power-flow solve.
//!
//! The controller fleet mirrors what grid operation attaches to such a
//! model: constant-profile writers feeding element tables from the time
//! series, curve-based reactive controllers on generation units, discrete
//! transformer tap control, and slack redistribution over weighted
//! generators.

use std::collections::BTreeMap;

use sbx_core::vde::{handtuch_x, handtuch_y, interp, CurveVariant, QBound, VdeVersion};
use sbx_core::{Network, ProfileKey, SbxError, SbxResult};
use sbx_profiles::ProfileSet;

/// Applies one profile key's row to the network at every time step.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstProfile {
    pub key: ProfileKey,
}

/// Reactive response curve of a [`DerController`].
#[derive(Debug, Clone, PartialEq)]
pub enum QModel {
    /// Q as a fraction of rated power over voltage magnitude knots
    QofV {
        v_points_pu: Vec<f64>,
        q_points: Vec<f64>,
    },
    /// Power factor over active-power-ratio knots; negative values mean
    /// underexcited operation
    CosphiP {
        p_points: Vec<f64>,
        cosphi_points: Vec<f64>,
    },
}

/// Curve-based reactive controller for one static generator.
#[derive(Debug, Clone, PartialEq)]
pub struct DerController {
    pub sgen: usize,
    pub q_model: QModel,
    /// Step damping: only 1/damping of the remaining distance is applied
    pub damping: f64,
    /// Operating-area variant used to clamp the target
    pub area_variant: CurveVariant,
}

impl DerController {
    pub fn new(sgen: usize, q_model: QModel) -> Self {
        Self {
            sgen,
            q_model,
            damping: 3.0,
            area_variant: CurveVariant::V2,
        }
    }

    fn q_target(&self, net: &Network) -> Option<f64> {
        let sgen = net.sgen.get(self.sgen)?;
        if sgen.sn_mva <= 0.0 {
            return None;
        }
        let q_frac = match &self.q_model {
            QModel::QofV {
                v_points_pu,
                q_points,
            } => {
                let vm = net.res_bus.get(sgen.bus).map(|r| r.vm_pu)?;
                interp(vm, v_points_pu, q_points)
            }
            QModel::CosphiP {
                p_points,
                cosphi_points,
            } => {
                let ratio = sgen.p_mw / sgen.sn_mva;
                let cosphi = interp(ratio, p_points, cosphi_points);
                let magnitude = cosphi.abs().clamp(1e-6, 1.0);
                let q = sgen.p_mw / sgen.sn_mva * magnitude.acos().tan();
                if cosphi < 0.0 {
                    -q
                } else {
                    q
                }
            }
        };
        // clamp into the code-conform operating area at the current output
        let xs = handtuch_x(VdeVersion::V2018);
        let ratio = sgen.p_mw / sgen.sn_mva;
        let q_max = interp(ratio, &xs, &handtuch_y(QBound::Max, self.area_variant));
        let q_min = -interp(ratio, &xs, &handtuch_y(QBound::Min, self.area_variant));
        Some(q_frac.clamp(q_min, q_max) * sgen.sn_mva)
    }
}

/// Discrete tap controller holding a voltage band at one trafo side.
#[derive(Debug, Clone, PartialEq)]
pub struct TapControl {
    pub trafos: Vec<usize>,
    pub vm_lower_pu: f64,
    pub vm_upper_pu: f64,
    /// "hv" or "lv": which terminal's voltage is controlled
    pub side: String,
}

/// Redistributes the slack residual over generators by `slack_weight`.
#[derive(Debug, Clone, PartialEq)]
pub struct DistributedSlack {
    pub tol_mw: f64,
}

impl Default for DistributedSlack {
    fn default() -> Self {
        Self { tol_mw: 0.1 }
    }
}

/// One registered controller.
#[derive(Debug, Clone, PartialEq)]
pub enum Controller {
    ConstProfile(ConstProfile),
    Der(DerController),
    Tap(TapControl),
    DistributedSlack(DistributedSlack),
}

impl Controller {
    /// Inject this controller's per-step data before solving.
    pub fn time_step(
        &self,
        net: &mut Network,
        profiles: &ProfileSet,
        step: i64,
    ) -> SbxResult<()> {
        if let Controller::ConstProfile(ctrl) = self {
            let Some(frame) = profiles.get(&ctrl.key) else {
                return Err(SbxError::Data(format!(
                    "controller references missing profile '{}'",
                    ctrl.key
                )));
            };
            if net.table_len(ctrl.key.table) == 0 || frame.height() == 0 {
                return Ok(());
            }
            let row = frame.row_at_step(step)?.ok_or_else(|| {
                SbxError::Data(format!(
                    "time step {step} is missing from the '{}' profile",
                    ctrl.key
                ))
            })?;
            net.write_column(ctrl.key.table, ctrl.key.column, &row);
        }
        Ok(())
    }

    /// Adjust the network after a solve; returns whether a change was made.
    pub fn control_step(&self, net: &mut Network) -> SbxResult<bool> {
        match self {
            Controller::ConstProfile(_) => Ok(false),
            Controller::Der(ctrl) => {
                let Some(target) = ctrl.q_target(net) else {
                    return Ok(false);
                };
                let Some(sgen) = net.sgen.get_mut(ctrl.sgen) else {
                    return Ok(false);
                };
                let delta = target - sgen.q_mvar;
                if delta.abs() < 1e-4 {
                    return Ok(false);
                }
                sgen.q_mvar += delta / ctrl.damping.max(1.0);
                Ok(true)
            }
            Controller::Tap(ctrl) => {
                let mut changed = false;
                for &idx in &ctrl.trafos {
                    let Some(trafo) = net.trafo.get(idx) else {
                        continue;
                    };
                    let bus = if ctrl.side == "hv" {
                        trafo.hv_bus
                    } else {
                        trafo.lv_bus
                    };
                    let Some(vm) = net.res_bus.get(bus).map(|r| r.vm_pu) else {
                        continue;
                    };
                    // raising the tap lowers the controlled-side voltage
                    let step = if vm > ctrl.vm_upper_pu {
                        1
                    } else if vm < ctrl.vm_lower_pu {
                        -1
                    } else {
                        continue;
                    };
                    let trafo = net.trafo.get_mut(idx).expect("checked above");
                    let new_pos = (trafo.tap_pos + step).clamp(trafo.tap_min, trafo.tap_max);
                    if new_pos != trafo.tap_pos {
                        trafo.tap_pos = new_pos;
                        changed = true;
                    }
                }
                Ok(changed)
            }
            Controller::DistributedSlack(ctrl) => {
                let residual = slack_residual_mw(net);
                if residual.abs() < ctrl.tol_mw {
                    return Ok(false);
                }
                let total_weight: f64 = net
                    .gen
                    .iter()
                    .filter(|(_, g)| g.in_service)
                    .map(|(_, g)| g.slack_weight)
                    .sum();
                if total_weight <= 0.0 {
                    return Ok(false);
                }
                for (_, gen) in net.gen.iter_mut() {
                    if gen.in_service && gen.slack_weight > 0.0 {
                        gen.p_mw += residual * gen.slack_weight / total_weight;
                    }
                }
                Ok(true)
            }
        }
    }
}

/// Power the slack sources currently provide beyond their setpoints.
fn slack_residual_mw(net: &Network) -> f64 {
    let mut residual = 0.0;
    for (idx, gen) in net.gen.iter().filter(|(_, g)| g.slack) {
        if let Some(res) = net.res_gen.get(idx) {
            residual += res.p_mw - gen.p_mw;
        }
    }
    for (idx, _) in net.ext_grid.iter() {
        if let Some(res) = net.res_ext_grid.get(idx) {
            residual += res.p_mw;
        }
    }
    residual
}

/// The registered controller fleet, indexed like an element table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControllerSet {
    entries: BTreeMap<usize, Controller>,
}

impl ControllerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, controller: Controller) -> usize {
        let idx = self.entries.keys().next_back().map_or(0, |last| last + 1);
        self.entries.insert(idx, controller);
        idx
    }

    pub fn remove(&mut self, idx: usize) -> Option<Controller> {
        self.entries.remove(&idx)
    }

    pub fn get(&self, idx: usize) -> Option<&Controller> {
        self.entries.get(&idx)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn indices(&self) -> Vec<usize> {
        self.entries.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Controller)> {
        self.entries.iter().map(|(&idx, c)| (idx, c))
    }

    pub fn retain<F: FnMut(usize, &Controller) -> bool>(&mut self, mut keep: F) {
        self.entries.retain(|&idx, ctrl| keep(idx, ctrl));
    }

    /// Indices of distributed-slack controllers.
    pub fn distributed_slack_indices(&self) -> Vec<usize> {
        self.entries
            .iter()
            .filter(|(_, c)| matches!(c, Controller::DistributedSlack(_)))
            .map(|(&idx, _)| idx)
            .collect()
    }
}

/// Register a distributed-slack controller unless one already exists.
///
/// Returns the controller index and whether this call created it; a
/// created controller is the caller's to remove after the run so repeated
/// runs do not accumulate stale controllers.
pub fn consider_distr_slack(controllers: &mut ControllerSet, tol_mw: f64) -> (usize, bool) {
    if let Some(&idx) = controllers.distributed_slack_indices().first() {
        return (idx, false);
    }
    let idx = controllers.push(Controller::DistributedSlack(DistributedSlack { tol_mw }));
    (idx, true)
}
