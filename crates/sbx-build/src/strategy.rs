//! Named control strategies attached to the assembled net.
//!
//! `LocalCtrl` models state-of-the-art local grid operation: the
//! eligible fleet is split by interleaved alternation between a
//! cosphi(P) response and a Q(V) droop so neighboring units do not all
//! behave identically, offshore wind always runs the droop, and the
//! transformers get discrete tap control. `QofV` applies the droop
//! uniformly instead.

use std::collections::BTreeMap;
use std::str::FromStr;

use sbx_core::{ColumnKind, ElementKind, Network, ProfileKey, SbxError, SbxResult};
use sbx_profiles::ProfileSet;
use sbx_ts::{Controller, ControllerSet, DerController, QModel, TapControl};

use crate::curation::Curation;

/// Recognized control strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlStrategy {
    LocalCtrl,
    QofV,
    /// Historic curve set; recognized but no longer implemented
    QofVOld,
    NoControl,
}

impl FromStr for ControlStrategy {
    type Err = SbxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LocalCtrl" => Ok(ControlStrategy::LocalCtrl),
            "QofV" => Ok(ControlStrategy::QofV),
            "QofV_old" => Ok(ControlStrategy::QofVOld),
            "NoControl" => Ok(ControlStrategy::NoControl),
            other => Err(SbxError::Config(format!(
                "control strategy '{other}' is unknown"
            ))),
        }
    }
}

/// Which elements a strategy put under active control.
pub type StrategyReport = BTreeMap<ElementKind, Vec<usize>>;

/// Attach the controllers of a strategy; returns the affected elements.
pub fn add_control_strategy(
    net: &Network,
    profiles: Option<&ProfileSet>,
    controllers: &mut ControllerSet,
    strategy: ControlStrategy,
    cur: &Curation,
) -> SbxResult<Option<StrategyReport>> {
    if strategy == ControlStrategy::NoControl {
        return Ok(None);
    }

    let have_p_sgens = eligible_sgens(net, profiles)?;

    match strategy {
        ControlStrategy::LocalCtrl => {
            let pv_idx: Vec<usize> = net
                .sgen
                .iter()
                .filter(|(_, s)| s.kind == "PV" || s.kind == "pv")
                .map(|(idx, _)| idx)
                .filter(|idx| have_p_sgens.contains(idx))
                .collect();
            let mut cosp_idx: Vec<usize> = every_other(&pv_idx);

            let other_idx: Vec<usize> = net
                .sgen
                .iter()
                .filter(|(_, s)| s.kind != "wind offshore")
                .map(|(idx, _)| idx)
                .filter(|idx| have_p_sgens.contains(idx) && !pv_idx.contains(idx))
                .collect();
            let mut qofv_idx: Vec<usize> = every_other(&other_idx);
            qofv_idx.extend(
                net.sgen
                    .iter()
                    .filter(|(_, s)| s.kind == "wind offshore")
                    .map(|(idx, _)| idx),
            );
            qofv_idx.sort_unstable();
            qofv_idx.dedup();
            qofv_idx.retain(|&idx| is_controllable(net, idx));

            cosp_idx.extend(other_idx.iter().filter(|idx| !qofv_idx.contains(idx)));
            cosp_idx.sort_unstable();
            cosp_idx.dedup();
            cosp_idx.retain(|&idx| is_controllable(net, idx));

            for &idx in &qofv_idx {
                controllers.push(Controller::Der(DerController::new(idx, qofv_droop())));
            }
            for &idx in &cosp_idx {
                controllers.push(Controller::Der(DerController::new(idx, cosphi_curve())));
            }

            // tap control: every trafo from the lv side, except the one
            // coupling point controlled from its hv side
            let (lower, upper) = cur.tap_control_band_pu;
            let lv_trafos: Vec<usize> = net
                .trafo
                .iter()
                .map(|(idx, _)| idx)
                .filter(|&idx| idx != cur.tap_control_hv_side_trafo)
                .collect();
            controllers.push(Controller::Tap(TapControl {
                trafos: lv_trafos,
                vm_lower_pu: lower,
                vm_upper_pu: upper,
                side: "lv".into(),
            }));
            if net.trafo.contains(cur.tap_control_hv_side_trafo) {
                controllers.push(Controller::Tap(TapControl {
                    trafos: vec![cur.tap_control_hv_side_trafo],
                    vm_lower_pu: lower,
                    vm_upper_pu: upper,
                    side: "hv".into(),
                }));
            }

            let mut affected = qofv_idx;
            affected.extend(cosp_idx);
            affected.sort_unstable();
            affected.dedup();
            Ok(Some(BTreeMap::from([(ElementKind::Sgen, affected)])))
        }

        ControlStrategy::QofV => {
            for &idx in &have_p_sgens {
                controllers.push(Controller::Der(DerController::new(
                    idx,
                    QModel::QofV {
                        v_points_pu: vec![0.0, 0.93, 0.97, 1.03, 1.07],
                        q_points: vec![0.484, 0.484, 0.0, 0.0, -0.484],
                    },
                )));
            }
            Ok(Some(BTreeMap::from([(ElementKind::Sgen, have_p_sgens)])))
        }

        ControlStrategy::QofVOld => Err(SbxError::Config(
            "control strategy 'QofV_old' is not implemented".into(),
        )),

        ControlStrategy::NoControl => unreachable!("handled above"),
    }
}

/// Sgens with a nonzero active-power profile (all sgens without profiles).
fn eligible_sgens(net: &Network, profiles: Option<&ProfileSet>) -> SbxResult<Vec<usize>> {
    let key = ProfileKey::new(ElementKind::Sgen, ColumnKind::PMw);
    let Some(frame) = profiles.and_then(|p| p.get(&key)) else {
        return Ok(net.sgen.indices());
    };
    let mut eligible = Vec::new();
    for idx in net.sgen.indices() {
        if let Some(values) = frame.column_values(idx)? {
            if values.iter().any(|v| v.abs() > 1e-4) {
                eligible.push(idx);
            }
        }
    }
    Ok(eligible)
}

fn is_controllable(net: &Network, idx: usize) -> bool {
    net.sgen.get(idx).is_some_and(|s| s.controllable)
}

/// Every second entry of a sorted index list.
fn every_other(sorted: &[usize]) -> Vec<usize> {
    sorted.iter().step_by(2).copied().collect()
}

fn qofv_droop() -> QModel {
    QModel::QofV {
        v_points_pu: vec![0.0, 0.98, 1.06],
        q_points: vec![0.484, 0.484, -0.484],
    }
}

fn cosphi_curve() -> QModel {
    QModel::CosphiP {
        p_points: vec![0.0, 0.5, 1.0],
        cosphi_points: vec![1.0, 1.0, -0.9],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sbx_core::{Bus, Sgen, Trafo};

    fn net_with_fleet() -> Network {
        let mut net = Network::new("t");
        net.bus.push(Bus {
            vn_kv: 110.0,
            ..Bus::default()
        });
        let kinds = ["PV", "PV", "PV", "PV", "hydro", "hydro", "wind offshore"];
        for kind in kinds {
            net.sgen.push(Sgen {
                bus: 0,
                p_mw: 10.0,
                sn_mva: 20.0,
                controllable: true,
                kind: kind.into(),
                ..Sgen::default()
            });
        }
        net.trafo.push(Trafo {
            hv_bus: 0,
            lv_bus: 0,
            sn_mva: 300.0,
            ..Trafo::default()
        });
        net
    }

    #[test]
    fn test_local_ctrl_splits_fleet() {
        let net = net_with_fleet();
        let cur = Curation::bundled().unwrap();
        let mut controllers = ControllerSet::new();
        let report =
            add_control_strategy(&net, None, &mut controllers, ControlStrategy::LocalCtrl, &cur)
                .unwrap()
                .unwrap();

        let affected = &report[&ElementKind::Sgen];
        // half the PV fleet runs at unity power factor uncontrolled; the
        // rest is split between the two models
        assert_eq!(affected, &vec![0, 2, 4, 5, 6]);
        // heterogeneous fleet: both model kinds are present
        let mut qofv = 0;
        let mut cosphi = 0;
        for (_, ctrl) in controllers.iter() {
            if let Controller::Der(der) = ctrl {
                match der.q_model {
                    QModel::QofV { .. } => qofv += 1,
                    QModel::CosphiP { .. } => cosphi += 1,
                }
            }
        }
        assert!(qofv > 0 && cosphi > 0);
        // offshore wind is always on the droop
        assert!(controllers.iter().any(|(_, c)| matches!(
            c,
            Controller::Der(der) if der.sgen == 6 && matches!(der.q_model, QModel::QofV { .. })
        )));
        // plus tap control
        assert!(controllers
            .iter()
            .any(|(_, c)| matches!(c, Controller::Tap(_))));
    }

    #[test]
    fn test_qofv_is_uniform() {
        let net = net_with_fleet();
        let cur = Curation::bundled().unwrap();
        let mut controllers = ControllerSet::new();
        let report = add_control_strategy(&net, None, &mut controllers, ControlStrategy::QofV, &cur)
            .unwrap()
            .unwrap();
        assert_eq!(report[&ElementKind::Sgen].len(), 7);
        assert_eq!(controllers.len(), 7);
    }

    #[test]
    fn test_no_control_is_noop() {
        let net = net_with_fleet();
        let cur = Curation::bundled().unwrap();
        let mut controllers = ControllerSet::new();
        let report =
            add_control_strategy(&net, None, &mut controllers, ControlStrategy::NoControl, &cur)
                .unwrap();
        assert!(report.is_none());
        assert!(controllers.is_empty());
    }

    #[test]
    fn test_old_strategy_is_config_error() {
        let net = net_with_fleet();
        let cur = Curation::bundled().unwrap();
        let mut controllers = ControllerSet::new();
        let err =
            add_control_strategy(&net, None, &mut controllers, ControlStrategy::QofVOld, &cur)
                .unwrap_err();
        assert!(matches!(err, SbxError::Config(_)));
    }

    #[test]
    fn test_unknown_name_fails_to_parse() {
        assert!("LocalCtrl".parse::<ControlStrategy>().is_ok());
        assert!("anything".parse::<ControlStrategy>().is_err());
    }
}
