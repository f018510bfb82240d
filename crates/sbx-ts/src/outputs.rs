//! Output variable selection and collection.
//!
//! Which result columns a run logs is configurable; the defaults differ
//! between the two kernels. Requested columns that do not exist in the
//! network are a warning and skipped, never fatal.

use std::collections::BTreeMap;

use sbx_core::{ColumnKind, ElementKind, Network, ResultKey, SbxResult, TableRef};
use sbx_profiles::{ProfileFrame, ResultFrames};
use tracing::warn;

/// Flow/loading/current columns of a two-terminal branch table.
pub fn branch_columns(kind: ElementKind) -> Vec<ColumnKind> {
    use ColumnKind::*;
    match kind {
        ElementKind::Trafo => vec![
            LoadingPercent,
            PHvMw,
            PLvMw,
            QHvMvar,
            QLvMvar,
            IHvKa,
            ILvKa,
        ],
        _ => vec![
            LoadingPercent,
            PFromMw,
            PToMw,
            QFromMvar,
            QToMvar,
            IFromKa,
            IToKa,
        ],
    }
}

/// The default output set.
///
/// Branch flows are always collected; bus voltage only on request; the
/// base kernel additionally logs the tap positions and the voltage/
/// reactive setpoint columns of the generation tables.
pub fn default_outputs(
    include_bus_vm_pu: bool,
    include_trafo_tap_pos: bool,
    include_bus_elm_vq: bool,
) -> Vec<ResultKey> {
    let mut out = Vec::new();
    if include_bus_vm_pu {
        out.push(ResultKey::res(ElementKind::Bus, ColumnKind::VmPu));
    }
    for column in branch_columns(ElementKind::Line) {
        out.push(ResultKey::res(ElementKind::Line, column));
    }
    for column in branch_columns(ElementKind::Trafo) {
        out.push(ResultKey::res(ElementKind::Trafo, column));
    }
    if include_trafo_tap_pos {
        out.push(ResultKey::element(ElementKind::Trafo, ColumnKind::TapPos));
    }
    if include_bus_elm_vq {
        out.push(ResultKey::res(ElementKind::Gen, ColumnKind::VmPu));
        out.push(ResultKey::res(ElementKind::Sgen, ColumnKind::QMvar));
    }
    out
}

/// Collects requested columns into per-key frames, one row per step.
pub struct OutputCollector {
    specs: Vec<ResultKey>,
    steps: Vec<i64>,
    rows: BTreeMap<ResultKey, Vec<Vec<(usize, f64)>>>,
}

impl OutputCollector {
    /// Keep the specs the network can serve; warn about the rest.
    pub fn new(net: &Network, specs: Vec<ResultKey>) -> Self {
        let mut kept: Vec<ResultKey> = Vec::new();
        let mut not_logged = Vec::new();
        for spec in specs {
            if kept.contains(&spec) {
                continue;
            }
            if net.has_column(spec.table, spec.column) {
                kept.push(spec);
            } else {
                not_logged.push(spec.to_string());
            }
        }
        if !not_logged.is_empty() {
            warn!(
                "these output columns could not be logged: {}",
                not_logged.join(", ")
            );
        }
        let rows = kept.iter().map(|&spec| (spec, Vec::new())).collect();
        Self {
            specs: kept,
            steps: Vec::new(),
            rows,
        }
    }

    pub fn specs(&self) -> &[ResultKey] {
        &self.specs
    }

    /// Record the current network state as the row of `step`.
    pub fn record(&mut self, net: &Network, step: i64) {
        self.steps.push(step);
        for spec in &self.specs {
            let row = net.read_column(spec.table, spec.column).unwrap_or_default();
            self.rows.get_mut(spec).expect("spec registered").push(row);
        }
    }

    /// Assemble the collected rows into result frames.
    pub fn into_frames(self) -> SbxResult<ResultFrames> {
        let mut frames = ResultFrames::new();
        for (spec, rows) in self.rows {
            // column set from the first recorded row; tables do not change
            // their index mid-run
            let ids: Vec<usize> = rows
                .first()
                .map(|row| row.iter().map(|&(id, _)| id).collect())
                .unwrap_or_default();
            let mut columns: Vec<(usize, Vec<f64>)> = ids
                .iter()
                .map(|&id| (id, Vec::with_capacity(rows.len())))
                .collect();
            for row in &rows {
                let by_id: BTreeMap<usize, f64> = row.iter().copied().collect();
                for (id, values) in columns.iter_mut() {
                    values.push(by_id.get(id).copied().unwrap_or(f64::NAN));
                }
            }
            frames.insert(spec, ProfileFrame::new(self.steps.clone(), columns)?);
        }
        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sbx_core::{Bus, Load, ResPq};

    #[test]
    fn test_default_outputs_shape() {
        let base = default_outputs(false, true, true);
        assert!(base.contains(&ResultKey::element(ElementKind::Trafo, ColumnKind::TapPos)));
        assert!(base.contains(&ResultKey::res(ElementKind::Sgen, ColumnKind::QMvar)));
        assert!(!base.contains(&ResultKey::res(ElementKind::Bus, ColumnKind::VmPu)));

        let accel = default_outputs(false, false, false);
        // branch columns only
        assert_eq!(accel.len(), 14);
    }

    #[test]
    fn test_unknown_column_is_skipped_with_warning() {
        let net = Network::new("t");
        let collector = OutputCollector::new(
            &net,
            vec![
                ResultKey::res(ElementKind::Load, ColumnKind::PMw),
                // bus tables have no p_from_mw
                ResultKey::res(ElementKind::Bus, ColumnKind::PFromMw),
            ],
        );
        assert_eq!(collector.specs().len(), 1);
    }

    #[test]
    fn test_collect_two_steps() {
        let mut net = Network::new("t");
        net.bus.push(Bus::default());
        net.load.push(Load {
            bus: 0,
            p_mw: 1.0,
            ..Load::default()
        });
        let mut collector = OutputCollector::new(
            &net,
            vec![ResultKey::res(ElementKind::Load, ColumnKind::PMw)],
        );
        net.res_load.insert(
            0,
            ResPq {
                p_mw: 1.0,
                q_mvar: 0.0,
            },
        );
        collector.record(&net, 0);
        net.res_load.get_mut(0).unwrap().p_mw = 2.0;
        collector.record(&net, 24);

        let frames = collector.into_frames().unwrap();
        let frame = frames
            .get(&ResultKey::res(ElementKind::Load, ColumnKind::PMw))
            .unwrap();
        assert_eq!(frame.steps().unwrap(), vec![0, 24]);
        assert_eq!(frame.column_values(0).unwrap().unwrap(), vec![1.0, 2.0]);
    }
}
