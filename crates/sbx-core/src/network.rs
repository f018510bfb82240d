//! The network container: typed element tables plus power-flow result
//! tables, all keyed by stable integer indices.
//!
//! The container is mutated in place through every pipeline stage and can
//! be serialized as a whole into a single JSON snapshot.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::elements::*;
use crate::error::{SbxError, SbxResult};
use crate::keys::{ColumnKind, ElementKind, TableRef};
use crate::table::Table;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Network {
    pub name: String,
    /// System apparent-power base in MVA
    pub sn_mva: f64,
    pub f_hz: f64,
    pub bus: Table<Bus>,
    pub load: Table<Load>,
    pub sgen: Table<Sgen>,
    pub gen: Table<Gen>,
    pub ext_grid: Table<ExtGrid>,
    pub line: Table<Line>,
    pub trafo: Table<Trafo>,
    pub storage: Table<Storage>,
    pub measurement: Table<Measurement>,
    pub res_bus: Table<ResBus>,
    pub res_line: Table<ResLine>,
    pub res_trafo: Table<ResTrafo>,
    pub res_gen: Table<ResGen>,
    pub res_sgen: Table<ResPq>,
    pub res_load: Table<ResPq>,
    pub res_ext_grid: Table<ResPq>,
}

/// Size and capacity summary of a network.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkStats {
    pub num_buses: usize,
    pub num_loads: usize,
    pub num_sgens: usize,
    pub num_gens: usize,
    pub num_ext_grids: usize,
    pub num_lines: usize,
    pub num_trafos: usize,
    pub total_load_mw: f64,
    pub total_gen_mw: f64,
    pub total_sgen_mw: f64,
}

impl std::fmt::Display for NetworkStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} buses, {} lines, {} trafos, {} loads ({:.0} MW), {} gens ({:.0} MW), {} sgens ({:.0} MW)",
            self.num_buses,
            self.num_lines,
            self.num_trafos,
            self.num_loads,
            self.total_load_mw,
            self.num_gens,
            self.total_gen_mw,
            self.num_sgens,
            self.total_sgen_mw,
        )
    }
}

impl Network {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sn_mva: 1.0,
            f_hz: 50.0,
            ..Self::default()
        }
    }

    pub fn stats(&self) -> NetworkStats {
        NetworkStats {
            num_buses: self.bus.len(),
            num_loads: self.load.len(),
            num_sgens: self.sgen.len(),
            num_gens: self.gen.len(),
            num_ext_grids: self.ext_grid.len(),
            num_lines: self.line.len(),
            num_trafos: self.trafo.len(),
            total_load_mw: self.load.iter().map(|(_, l)| l.p_mw).sum(),
            total_gen_mw: self.gen.iter().map(|(_, g)| g.p_mw).sum(),
            total_sgen_mw: self.sgen.iter().map(|(_, s)| s.p_mw).sum(),
        }
    }

    /// Check that every element references an existing bus.
    pub fn validate(&self) -> SbxResult<()> {
        let check = |bus: usize, what: &str, idx: usize| -> SbxResult<()> {
            if !self.bus.contains(bus) {
                return Err(SbxError::Structure(format!(
                    "{what} {idx} references missing bus {bus}"
                )));
            }
            Ok(())
        };
        for (idx, load) in self.load.iter() {
            check(load.bus, "load", idx)?;
        }
        for (idx, sgen) in self.sgen.iter() {
            check(sgen.bus, "sgen", idx)?;
        }
        for (idx, gen) in self.gen.iter() {
            check(gen.bus, "gen", idx)?;
        }
        for (idx, eg) in self.ext_grid.iter() {
            check(eg.bus, "ext_grid", idx)?;
        }
        for (idx, line) in self.line.iter() {
            check(line.from_bus, "line", idx)?;
            check(line.to_bus, "line", idx)?;
        }
        for (idx, trafo) in self.trafo.iter() {
            check(trafo.hv_bus, "trafo", idx)?;
            check(trafo.lv_bus, "trafo", idx)?;
        }
        Ok(())
    }

    /// Number of slack-capable sources (external grids plus slack gens).
    pub fn slack_count(&self) -> usize {
        self.ext_grid.len() + self.gen.iter().filter(|(_, g)| g.slack).count()
    }

    /// Drop all power-flow result rows.
    pub fn clear_result_tables(&mut self) {
        self.res_bus.clear();
        self.res_line.clear();
        self.res_trafo.clear();
        self.res_gen.clear();
        self.res_sgen.clear();
        self.res_load.clear();
        self.res_ext_grid.clear();
    }

    /// Extract the subnetwork spanned by `buses`.
    ///
    /// Keeps bus-attached elements whose bus is in the set and branches
    /// with both terminals in the set. Result rows are carried along for
    /// retained elements when `include_results` is set; name and base data
    /// are kept either way.
    pub fn select_subnet(&self, buses: &BTreeSet<usize>, include_results: bool) -> Network {
        let mut net = Network {
            name: self.name.clone(),
            sn_mva: self.sn_mva,
            f_hz: self.f_hz,
            ..Network::default()
        };
        net.bus = self.bus.clone();
        net.bus.retain(|idx, _| buses.contains(&idx));

        net.load = self.load.clone();
        net.load.retain(|_, row| buses.contains(&row.bus));
        net.sgen = self.sgen.clone();
        net.sgen.retain(|_, row| buses.contains(&row.bus));
        net.gen = self.gen.clone();
        net.gen.retain(|_, row| buses.contains(&row.bus));
        net.ext_grid = self.ext_grid.clone();
        net.ext_grid.retain(|_, row| buses.contains(&row.bus));
        net.storage = self.storage.clone();
        net.storage.retain(|_, row| buses.contains(&row.bus));
        net.line = self.line.clone();
        net.line
            .retain(|_, row| buses.contains(&row.from_bus) && buses.contains(&row.to_bus));
        net.trafo = self.trafo.clone();
        net.trafo
            .retain(|_, row| buses.contains(&row.hv_bus) && buses.contains(&row.lv_bus));

        if include_results {
            net.res_bus = self.res_bus.select(&net.bus.indices());
            net.res_line = self.res_line.select(&net.line.indices());
            net.res_trafo = self.res_trafo.select(&net.trafo.indices());
            net.res_gen = self.res_gen.select(&net.gen.indices());
            net.res_sgen = self.res_sgen.select(&net.sgen.indices());
            net.res_load = self.res_load.select(&net.load.indices());
            net.res_ext_grid = self.res_ext_grid.select(&net.ext_grid.indices());
        }
        net
    }

    pub fn table_len(&self, kind: ElementKind) -> usize {
        match kind {
            ElementKind::Bus => self.bus.len(),
            ElementKind::Load => self.load.len(),
            ElementKind::Sgen => self.sgen.len(),
            ElementKind::Gen => self.gen.len(),
            ElementKind::ExtGrid => self.ext_grid.len(),
            ElementKind::Line => self.line.len(),
            ElementKind::Trafo => self.trafo.len(),
            ElementKind::Storage => self.storage.len(),
        }
    }

    pub fn table_indices(&self, kind: ElementKind) -> Vec<usize> {
        match kind {
            ElementKind::Bus => self.bus.indices(),
            ElementKind::Load => self.load.indices(),
            ElementKind::Sgen => self.sgen.indices(),
            ElementKind::Gen => self.gen.indices(),
            ElementKind::ExtGrid => self.ext_grid.indices(),
            ElementKind::Line => self.line.indices(),
            ElementKind::Trafo => self.trafo.indices(),
            ElementKind::Storage => self.storage.indices(),
        }
    }

    /// Whether a `(table, column)` pair names readable numeric data here.
    pub fn has_column(&self, table: TableRef, column: ColumnKind) -> bool {
        self.read_column(table, column).is_some()
    }

    /// Read a numeric column as `(element index, value)` pairs.
    ///
    /// Returns `None` for unknown `(table, column)` pairs; an empty vec
    /// for known pairs on empty tables.
    pub fn read_column(&self, table: TableRef, column: ColumnKind) -> Option<Vec<(usize, f64)>> {
        use ColumnKind::*;
        use ElementKind::*;
        match table {
            TableRef::Element(kind) => match (kind, column) {
                (Load, PMw) => Some(self.load.iter().map(|(i, r)| (i, r.p_mw)).collect()),
                (Load, QMvar) => Some(self.load.iter().map(|(i, r)| (i, r.q_mvar)).collect()),
                (Sgen, PMw) => Some(self.sgen.iter().map(|(i, r)| (i, r.p_mw)).collect()),
                (Sgen, QMvar) => Some(self.sgen.iter().map(|(i, r)| (i, r.q_mvar)).collect()),
                (Gen, PMw) => Some(self.gen.iter().map(|(i, r)| (i, r.p_mw)).collect()),
                (Gen, VmPu) => Some(self.gen.iter().map(|(i, r)| (i, r.vm_pu)).collect()),
                (ExtGrid, VmPu) => Some(self.ext_grid.iter().map(|(i, r)| (i, r.vm_pu)).collect()),
                (Trafo, TapPos) => Some(
                    self.trafo
                        .iter()
                        .map(|(i, r)| (i, r.tap_pos as f64))
                        .collect(),
                ),
                (Storage, PMw) => Some(self.storage.iter().map(|(i, r)| (i, r.p_mw)).collect()),
                (Storage, QMvar) => Some(self.storage.iter().map(|(i, r)| (i, r.q_mvar)).collect()),
                _ => None,
            },
            TableRef::Res(kind) => match (kind, column) {
                (Bus, VmPu) => Some(self.res_bus.iter().map(|(i, r)| (i, r.vm_pu)).collect()),
                (Bus, VaDegree) => Some(
                    self.res_bus
                        .iter()
                        .map(|(i, r)| (i, r.va_degree))
                        .collect(),
                ),
                (Bus, PMw) => Some(self.res_bus.iter().map(|(i, r)| (i, r.p_mw)).collect()),
                (Bus, QMvar) => Some(self.res_bus.iter().map(|(i, r)| (i, r.q_mvar)).collect()),
                (Line, PFromMw) => Some(
                    self.res_line
                        .iter()
                        .map(|(i, r)| (i, r.p_from_mw))
                        .collect(),
                ),
                (Line, QFromMvar) => Some(
                    self.res_line
                        .iter()
                        .map(|(i, r)| (i, r.q_from_mvar))
                        .collect(),
                ),
                (Line, PToMw) => Some(self.res_line.iter().map(|(i, r)| (i, r.p_to_mw)).collect()),
                (Line, QToMvar) => Some(
                    self.res_line
                        .iter()
                        .map(|(i, r)| (i, r.q_to_mvar))
                        .collect(),
                ),
                (Line, PlMw) => Some(self.res_line.iter().map(|(i, r)| (i, r.pl_mw)).collect()),
                (Line, QlMvar) => Some(self.res_line.iter().map(|(i, r)| (i, r.ql_mvar)).collect()),
                (Line, IFromKa) => Some(
                    self.res_line
                        .iter()
                        .map(|(i, r)| (i, r.i_from_ka))
                        .collect(),
                ),
                (Line, IToKa) => Some(self.res_line.iter().map(|(i, r)| (i, r.i_to_ka)).collect()),
                (Line, LoadingPercent) => Some(
                    self.res_line
                        .iter()
                        .map(|(i, r)| (i, r.loading_percent))
                        .collect(),
                ),
                (Trafo, PHvMw) => Some(self.res_trafo.iter().map(|(i, r)| (i, r.p_hv_mw)).collect()),
                (Trafo, QHvMvar) => Some(
                    self.res_trafo
                        .iter()
                        .map(|(i, r)| (i, r.q_hv_mvar))
                        .collect(),
                ),
                (Trafo, PLvMw) => Some(self.res_trafo.iter().map(|(i, r)| (i, r.p_lv_mw)).collect()),
                (Trafo, QLvMvar) => Some(
                    self.res_trafo
                        .iter()
                        .map(|(i, r)| (i, r.q_lv_mvar))
                        .collect(),
                ),
                (Trafo, PlMw) => Some(self.res_trafo.iter().map(|(i, r)| (i, r.pl_mw)).collect()),
                (Trafo, QlMvar) => Some(
                    self.res_trafo
                        .iter()
                        .map(|(i, r)| (i, r.ql_mvar))
                        .collect(),
                ),
                (Trafo, IHvKa) => Some(self.res_trafo.iter().map(|(i, r)| (i, r.i_hv_ka)).collect()),
                (Trafo, ILvKa) => Some(self.res_trafo.iter().map(|(i, r)| (i, r.i_lv_ka)).collect()),
                (Trafo, LoadingPercent) => Some(
                    self.res_trafo
                        .iter()
                        .map(|(i, r)| (i, r.loading_percent))
                        .collect(),
                ),
                (Gen, PMw) => Some(self.res_gen.iter().map(|(i, r)| (i, r.p_mw)).collect()),
                (Gen, QMvar) => Some(self.res_gen.iter().map(|(i, r)| (i, r.q_mvar)).collect()),
                (Gen, VmPu) => Some(self.res_gen.iter().map(|(i, r)| (i, r.vm_pu)).collect()),
                (Gen, VaDegree) => Some(
                    self.res_gen
                        .iter()
                        .map(|(i, r)| (i, r.va_degree))
                        .collect(),
                ),
                (Sgen, PMw) => Some(self.res_sgen.iter().map(|(i, r)| (i, r.p_mw)).collect()),
                (Sgen, QMvar) => Some(self.res_sgen.iter().map(|(i, r)| (i, r.q_mvar)).collect()),
                (Load, PMw) => Some(self.res_load.iter().map(|(i, r)| (i, r.p_mw)).collect()),
                (Load, QMvar) => Some(self.res_load.iter().map(|(i, r)| (i, r.q_mvar)).collect()),
                (ExtGrid, PMw) => Some(
                    self.res_ext_grid
                        .iter()
                        .map(|(i, r)| (i, r.p_mw))
                        .collect(),
                ),
                (ExtGrid, QMvar) => Some(
                    self.res_ext_grid
                        .iter()
                        .map(|(i, r)| (i, r.q_mvar))
                        .collect(),
                ),
                _ => None,
            },
        }
    }

    /// Write a numeric element-table column from `(index, value)` pairs.
    ///
    /// Pairs whose index is not present in the table are ignored. Returns
    /// `false` when the `(table, column)` pair is not writable.
    pub fn write_column(
        &mut self,
        kind: ElementKind,
        column: ColumnKind,
        values: &[(usize, f64)],
    ) -> bool {
        use ColumnKind::*;
        use ElementKind::*;
        match (kind, column) {
            (Load, PMw) => {
                for &(idx, val) in values {
                    if let Some(row) = self.load.get_mut(idx) {
                        row.p_mw = val;
                    }
                }
            }
            (Load, QMvar) => {
                for &(idx, val) in values {
                    if let Some(row) = self.load.get_mut(idx) {
                        row.q_mvar = val;
                    }
                }
            }
            (Sgen, PMw) => {
                for &(idx, val) in values {
                    if let Some(row) = self.sgen.get_mut(idx) {
                        row.p_mw = val;
                    }
                }
            }
            (Sgen, QMvar) => {
                for &(idx, val) in values {
                    if let Some(row) = self.sgen.get_mut(idx) {
                        row.q_mvar = val;
                    }
                }
            }
            (Gen, PMw) => {
                for &(idx, val) in values {
                    if let Some(row) = self.gen.get_mut(idx) {
                        row.p_mw = val;
                    }
                }
            }
            (Gen, VmPu) => {
                for &(idx, val) in values {
                    if let Some(row) = self.gen.get_mut(idx) {
                        row.vm_pu = val;
                    }
                }
            }
            (ExtGrid, VmPu) => {
                for &(idx, val) in values {
                    if let Some(row) = self.ext_grid.get_mut(idx) {
                        row.vm_pu = val;
                    }
                }
            }
            (Trafo, TapPos) => {
                for &(idx, val) in values {
                    if let Some(row) = self.trafo.get_mut(idx) {
                        row.tap_pos = val.round() as i32;
                    }
                }
            }
            (Storage, PMw) => {
                for &(idx, val) in values {
                    if let Some(row) = self.storage.get_mut(idx) {
                        row.p_mw = val;
                    }
                }
            }
            (Storage, QMvar) => {
                for &(idx, val) in values {
                    if let Some(row) = self.storage.get_mut(idx) {
                        row.q_mvar = val;
                    }
                }
            }
            _ => return false,
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_bus_net() -> Network {
        let mut net = Network::new("test");
        net.bus.push(Bus {
            name: "Bus 0".into(),
            vn_kv: 380.0,
            ..Bus::default()
        });
        net.bus.push(Bus {
            name: "Bus 1".into(),
            vn_kv: 380.0,
            ..Bus::default()
        });
        net.load.push(Load {
            name: "Load 0".into(),
            bus: 1,
            p_mw: 50.0,
            q_mvar: 10.0,
            ..Load::default()
        });
        net.line.push(Line {
            name: "Line 0-1".into(),
            from_bus: 0,
            to_bus: 1,
            r_ohm_per_km: 0.03,
            x_ohm_per_km: 0.3,
            ..Line::default()
        });
        net
    }

    #[test]
    fn test_validate_catches_missing_bus() {
        let mut net = two_bus_net();
        net.load.push(Load {
            bus: 42,
            ..Load::default()
        });
        let err = net.validate().unwrap_err();
        assert!(matches!(err, SbxError::Structure(_)));
    }

    #[test]
    fn test_select_subnet_drops_cut_branches() {
        let mut net = two_bus_net();
        net.bus.push(Bus {
            name: "Bus 2".into(),
            vn_kv: 220.0,
            ..Bus::default()
        });
        net.line.push(Line {
            name: "Line 1-2".into(),
            from_bus: 1,
            to_bus: 2,
            ..Line::default()
        });

        let keep: BTreeSet<usize> = [0, 1].into_iter().collect();
        let sub = net.select_subnet(&keep, false);
        assert_eq!(sub.bus.len(), 2);
        assert_eq!(sub.line.len(), 1);
        assert_eq!(sub.load.len(), 1);
        // indices are preserved, not renumbered
        assert!(sub.line.contains(0));
        assert!(!sub.line.contains(1));
    }

    #[test]
    fn test_column_roundtrip() {
        let mut net = two_bus_net();
        assert!(net.write_column(
            ElementKind::Load,
            ColumnKind::PMw,
            &[(0, 75.0), (99, 1.0)]
        ));
        let col = net
            .read_column(TableRef::Element(ElementKind::Load), ColumnKind::PMw)
            .unwrap();
        assert_eq!(col, vec![(0, 75.0)]);
        // unknown pair
        assert!(!net.write_column(ElementKind::Bus, ColumnKind::PMw, &[]));
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let net = two_bus_net();
        let json = serde_json::to_string(&net).unwrap();
        let back: Network = serde_json::from_str(&json).unwrap();
        assert_eq!(back, net);
    }
}
