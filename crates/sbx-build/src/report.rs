//! Summary tables over the assembled net: per-zone parameters used to
//! derive objective weights, and a compact data overview.

use std::collections::BTreeMap;
use std::fmt;

use sbx_core::{ColumnKind, ElementKind, Network, ProfileKey, SbxError, SbxResult};
use sbx_profiles::ProfileSet;

/// Predefined per-zone objective weights of the study setup.
pub fn predefined_weights() -> BTreeMap<i32, f64> {
    BTreeMap::from([(1, 1.175832), (2, 2.383970), (3, 0.256285), (4, 0.183914)])
}

/// Weights that would result from taking the results of local control or
/// of an unweighted central optimization as orientation.
pub fn weights_from_opt(objective: &str, method: &str) -> SbxResult<BTreeMap<i32, f64>> {
    let per_zone: [f64; 4] = match (objective, method) {
        ("profile_loadings", "localCtrl") => [20.037488, 105.989305, 67.308047, 38.603703],
        ("profile_loadings", "COPF") => [16.728384, 94.654663, 40.587258, 20.976723],
        ("P_LOSS", "localCtrl") => [39.814284, 164.020201, 8.587810, 3.751839],
        ("P_LOSS", "COPF") => [34.915895, 140.440819, 6.461768, 2.379295],
        _ => {
            return Err(SbxError::Config(format!(
                "no reference results for objective '{objective}' and method '{method}'"
            )))
        }
    };
    let total: f64 = per_zone.iter().sum();
    Ok(per_zone
        .iter()
        .enumerate()
        .map(|(i, v)| (i as i32 + 1, v / total * 4.0))
        .collect())
}

/// Per-zone structural parameters and the relative weights derived from
/// them.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneParameters {
    /// zone -> (line length km, load energy GWh)
    pub per_zone: BTreeMap<i32, (f64, f64)>,
    /// zone -> weight (mean of relative shares, scaled by zone count)
    pub weights: BTreeMap<i32, f64>,
}

impl fmt::Display for ZoneParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "zone  line_length_km  load_p_gwh  weight")?;
        for (zone, (length, energy)) in &self.per_zone {
            let weight = self.weights.get(zone).copied().unwrap_or(0.0);
            writeln!(f, "{zone:>4}  {length:>14.1}  {energy:>10.3}  {weight:>6.4}")?;
        }
        Ok(())
    }
}

/// Compute the per-zone parameter table.
///
/// Lines are attributed to the zone of their from-bus; load energy comes
/// from the active-power profile at quarter-hour resolution.
pub fn grid_parameters(
    net: &Network,
    profiles: &ProfileSet,
    zones: Option<&[i32]>,
) -> SbxResult<ZoneParameters> {
    let key = ProfileKey::new(ElementKind::Load, ColumnKind::PMw);
    let Some(frame) = profiles.get(&key) else {
        return Err(SbxError::Data(
            "grid parameters need a load active-power timeseries".into(),
        ));
    };

    let zone_list: Vec<i32> = match zones {
        Some(zones) => zones.to_vec(),
        None => {
            let mut zones: Vec<i32> = net.bus.iter().map(|(_, b)| b.zone).collect();
            zones.sort_unstable();
            zones.dedup();
            zones
        }
    };

    let bus_zone: BTreeMap<usize, i32> = net.bus.iter().map(|(idx, b)| (idx, b.zone)).collect();
    let mut per_zone: BTreeMap<i32, (f64, f64)> = zone_list.iter().map(|&z| (z, (0.0, 0.0))).collect();

    for (_, line) in net.line.iter() {
        if let Some(&zone) = bus_zone.get(&line.from_bus) {
            if let Some(entry) = per_zone.get_mut(&zone) {
                entry.0 += line.length_km * f64::from(line.parallel.max(1));
            }
        }
    }

    for (idx, load) in net.load.iter() {
        let Some(&zone) = bus_zone.get(&load.bus) else {
            continue;
        };
        let Some(entry) = per_zone.get_mut(&zone) else {
            continue;
        };
        if let Some(values) = frame.column_values(idx)? {
            // quarter-hour MW sums -> GWh
            entry.1 += values.iter().sum::<f64>() / 4.0 / 1000.0;
        }
    }

    let length_total: f64 = per_zone.values().map(|v| v.0).sum();
    let energy_total: f64 = per_zone.values().map(|v| v.1).sum();
    let n = per_zone.len() as f64;
    let weights = per_zone
        .iter()
        .map(|(&zone, &(length, energy))| {
            let rel_length = if length_total > 0.0 { length / length_total } else { 0.0 };
            let rel_energy = if energy_total > 0.0 { energy / energy_total } else { 0.0 };
            (zone, (rel_length + rel_energy) / 2.0 * n)
        })
        .collect();

    Ok(ZoneParameters { per_zone, weights })
}

/// Compact structural overview of the assembled net.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overview {
    pub voltage_levels_kv: Vec<f64>,
    pub overhead_line_km: f64,
    pub cable_km: f64,
    pub generation_kinds: Vec<String>,
}

impl fmt::Display for Overview {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let levels: Vec<String> = self
            .voltage_levels_kv
            .iter()
            .map(|v| format!("{v:.0}"))
            .collect();
        write!(
            f,
            "levels {} kV, {:.1} km overhead, {:.1} km cable, kinds {{{}}}",
            levels.join("/"),
            self.overhead_line_km,
            self.cable_km,
            self.generation_kinds.join(", ")
        )
    }
}

pub fn overview(net: &Network) -> Overview {
    let mut levels: Vec<f64> = net.bus.iter().map(|(_, b)| b.vn_kv).collect();
    levels.sort_by(|a, b| b.total_cmp(a));
    levels.dedup();

    let mut overhead = 0.0;
    let mut cable = 0.0;
    for (_, line) in net.line.iter() {
        match line.kind.as_str() {
            "ohl" | "ol" => overhead += line.length_km,
            "cs" | "cable" => cable += line.length_km,
            _ => {}
        }
    }

    let mut kinds: Vec<String> = net
        .gen
        .iter()
        .map(|(_, g)| g.kind.clone())
        .chain(net.sgen.iter().map(|(_, s)| s.kind.clone()))
        .filter(|k| !k.is_empty() && !k.starts_with("imp"))
        .collect();
    kinds.sort();
    kinds.dedup();

    Overview {
        voltage_levels_kv: levels,
        overhead_line_km: overhead,
        cable_km: cable,
        generation_kinds: kinds,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sbx_core::{Bus, Line, Load};
    use sbx_profiles::ProfileFrame;

    #[test]
    fn test_zone_parameters() {
        let mut net = Network::new("t");
        net.bus.push(Bus {
            zone: 1,
            vn_kv: 380.0,
            ..Bus::default()
        });
        net.bus.push(Bus {
            zone: 2,
            vn_kv: 380.0,
            ..Bus::default()
        });
        net.line.push(Line {
            from_bus: 0,
            to_bus: 1,
            length_km: 100.0,
            ..Line::default()
        });
        net.line.push(Line {
            from_bus: 1,
            to_bus: 0,
            length_km: 300.0,
            ..Line::default()
        });
        net.load.push(Load {
            bus: 0,
            p_mw: 10.0,
            ..Load::default()
        });

        let mut profiles = ProfileSet::new();
        profiles.insert(
            ProfileKey::new(ElementKind::Load, ColumnKind::PMw),
            // 4 quarter hours of 1000 MW -> 1 GWh
            ProfileFrame::new(vec![0, 1, 2, 3], vec![(0, vec![1000.0; 4])]).unwrap(),
        );

        let params = grid_parameters(&net, &profiles, None).unwrap();
        assert_eq!(params.per_zone[&1], (100.0, 1.0));
        assert_eq!(params.per_zone[&2], (300.0, 0.0));
        // zone 1: (0.25 + 1.0)/2 * 2 zones = 1.25
        assert!((params.weights[&1] - 1.25).abs() < 1e-9);
        // weights sum to the zone count
        let sum: f64 = params.weights.values().sum();
        assert!((sum - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_predefined_weights_sum_to_zone_count() {
        let sum: f64 = predefined_weights().values().sum();
        assert!((sum - 4.0).abs() < 1e-4);
    }

    #[test]
    fn test_weights_from_opt() {
        let weights = weights_from_opt("P_LOSS", "COPF").unwrap();
        let sum: f64 = weights.values().sum();
        assert!((sum - 4.0).abs() < 1e-9);
        assert!(weights_from_opt("P_LOSS", "magic").is_err());
    }
}
