//! Element merging: co-located generation plants and duplicate parallel
//! transformers.

use std::collections::BTreeMap;

use sbx_core::{ColumnKind, ElementKind, Network, ProfileKey, SbxResult};
use sbx_profiles::{ProfileFrame, ProfileSet};
use tracing::info;

/// Merge generators and static generators sharing a bus into single
/// equivalent units, summing their ratings, bounds and profile columns.
pub fn merge_same_bus_generation(
    net: &mut Network,
    mut profiles: Option<&mut ProfileSet>,
) -> SbxResult<()> {
    // --- gens -------------------------------------------------------------
    let mut by_bus: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (idx, gen) in net.gen.iter() {
        by_bus.entry(gen.bus).or_default().push(idx);
    }
    for group in by_bus.values().filter(|g| g.len() > 1) {
        let survivor = group[0];
        let absorbed = &group[1..];
        let mut p_sum = 0.0;
        let mut sn_sum = 0.0;
        let mut max_p = 0.0;
        let mut min_q = 0.0;
        let mut max_q = 0.0;
        let mut weight = 0.0;
        let mut any_slack = false;
        for &idx in group.iter() {
            let gen = net.gen.get(idx).expect("grouped above");
            p_sum += gen.p_mw;
            sn_sum += gen.sn_mva;
            max_p += gen.max_p_mw.unwrap_or(0.0);
            min_q += gen.min_q_mvar.unwrap_or(0.0);
            max_q += gen.max_q_mvar.unwrap_or(0.0);
            weight += gen.slack_weight;
            any_slack |= gen.slack;
        }
        let gen = net.gen.get_mut(survivor).expect("grouped above");
        gen.p_mw = p_sum;
        gen.sn_mva = sn_sum;
        gen.max_p_mw = Some(max_p);
        gen.min_q_mvar = Some(min_q);
        gen.max_q_mvar = Some(max_q);
        gen.slack_weight = weight;
        gen.slack = any_slack;
        for &idx in absorbed {
            net.gen.remove(idx);
        }
        if let Some(profiles) = profiles.as_deref_mut() {
            merge_profile_columns(profiles, ElementKind::Gen, survivor, absorbed)?;
        }
    }

    // --- sgens ------------------------------------------------------------
    let mut by_bus: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (idx, sgen) in net.sgen.iter() {
        by_bus.entry(sgen.bus).or_default().push(idx);
    }
    for group in by_bus.values().filter(|g| g.len() > 1) {
        let survivor = group[0];
        let absorbed = &group[1..];
        let mut p_sum = 0.0;
        let mut q_sum = 0.0;
        let mut sn_sum = 0.0;
        for &idx in group.iter() {
            let sgen = net.sgen.get(idx).expect("grouped above");
            p_sum += sgen.p_mw;
            q_sum += sgen.q_mvar;
            sn_sum += sgen.sn_mva;
        }
        let sgen = net.sgen.get_mut(survivor).expect("grouped above");
        sgen.p_mw = p_sum;
        sgen.q_mvar = q_sum;
        sgen.sn_mva = sn_sum;
        for &idx in absorbed {
            net.sgen.remove(idx);
        }
        if let Some(profiles) = profiles.as_deref_mut() {
            merge_profile_columns(profiles, ElementKind::Sgen, survivor, absorbed)?;
        }
    }

    info!(
        "merged same-bus generation: {} gens, {} sgens remain",
        net.gen.len(),
        net.sgen.len()
    );
    Ok(())
}

/// Sum the absorbed units' profile columns into the survivor's column.
///
/// Set-point style columns (voltage) keep the survivor's values instead
/// of being summed.
fn merge_profile_columns(
    profiles: &mut ProfileSet,
    kind: ElementKind,
    survivor: usize,
    absorbed: &[usize],
) -> SbxResult<()> {
    let keys: Vec<ProfileKey> = profiles
        .keys()
        .filter(|k| k.table == kind)
        .copied()
        .collect();
    for key in keys {
        let frame = profiles.get(&key).expect("key just listed");
        let steps = frame.steps()?;
        let sum_values = key.column != ColumnKind::VmPu;
        let mut columns: Vec<(usize, Vec<f64>)> = Vec::new();
        for id in frame.element_ids() {
            if absorbed.contains(&id) {
                continue;
            }
            let mut values = frame
                .column_values(id)?
                .expect("id taken from the frame itself");
            if id == survivor && sum_values {
                for &other in absorbed {
                    if let Some(extra) = frame.column_values(other)? {
                        for (acc, v) in values.iter_mut().zip(extra) {
                            *acc += v;
                        }
                    }
                }
            }
            columns.push((id, values));
        }
        profiles.insert(key, ProfileFrame::new(steps, columns)?);
    }
    Ok(())
}

/// Collapse transformers that are electrical duplicates of each other
/// into one row with a raised parallel count.
pub fn convert_parallel_trafos(net: &mut Network) {
    let mut groups: BTreeMap<(usize, usize, u64, u64, String), Vec<usize>> = BTreeMap::new();
    for (idx, trafo) in net.trafo.iter() {
        let key = (
            trafo.hv_bus,
            trafo.lv_bus,
            trafo.vn_hv_kv.to_bits(),
            trafo.vn_lv_kv.to_bits(),
            trafo.std_type.clone(),
        );
        groups.entry(key).or_default().push(idx);
    }
    for group in groups.values().filter(|g| g.len() > 1) {
        let survivor = group[0];
        let total: u32 = group
            .iter()
            .filter_map(|&idx| net.trafo.get(idx))
            .map(|t| t.parallel.max(1))
            .sum();
        net.trafo.get_mut(survivor).expect("grouped above").parallel = total;
        for &idx in &group[1..] {
            net.trafo.remove(idx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sbx_core::{Bus, Gen, Sgen, Trafo};

    #[test]
    fn test_merge_gens_sums_ratings_and_profiles() {
        let mut net = Network::new("t");
        net.bus.push(Bus::default());
        for p in [100.0, 50.0] {
            net.gen.push(Gen {
                bus: 0,
                p_mw: p,
                sn_mva: p,
                max_p_mw: Some(p),
                slack_weight: 1.0,
                ..Gen::default()
            });
        }
        let mut profiles = ProfileSet::new();
        profiles.insert(
            ProfileKey::new(ElementKind::Gen, ColumnKind::PMw),
            ProfileFrame::new(
                vec![0, 1],
                vec![(0, vec![100.0, 90.0]), (1, vec![50.0, 40.0])],
            )
            .unwrap(),
        );

        merge_same_bus_generation(&mut net, Some(&mut profiles)).unwrap();
        assert_eq!(net.gen.len(), 1);
        let gen = net.gen.get(0).unwrap();
        assert_eq!(gen.p_mw, 150.0);
        assert_eq!(gen.slack_weight, 2.0);

        let frame = profiles
            .get(&ProfileKey::new(ElementKind::Gen, ColumnKind::PMw))
            .unwrap();
        assert_eq!(frame.element_ids(), vec![0]);
        assert_eq!(frame.column_values(0).unwrap().unwrap(), vec![150.0, 130.0]);
    }

    #[test]
    fn test_vm_profile_keeps_survivor_values() {
        let mut net = Network::new("t");
        net.bus.push(Bus::default());
        for _ in 0..2 {
            net.gen.push(Gen {
                bus: 0,
                vm_pu: 1.02,
                ..Gen::default()
            });
        }
        let mut profiles = ProfileSet::new();
        profiles.insert(
            ProfileKey::new(ElementKind::Gen, ColumnKind::VmPu),
            ProfileFrame::new(vec![0], vec![(0, vec![1.02]), (1, vec![1.05])]).unwrap(),
        );
        merge_same_bus_generation(&mut net, Some(&mut profiles)).unwrap();
        let frame = profiles
            .get(&ProfileKey::new(ElementKind::Gen, ColumnKind::VmPu))
            .unwrap();
        assert_eq!(frame.column_values(0).unwrap().unwrap(), vec![1.02]);
    }

    #[test]
    fn test_parallel_trafo_collapse() {
        let mut net = Network::new("t");
        net.bus.push(Bus::default());
        net.bus.push(Bus::default());
        for _ in 0..2 {
            net.trafo.push(Trafo {
                hv_bus: 0,
                lv_bus: 1,
                sn_mva: 300.0,
                vn_hv_kv: 220.0,
                vn_lv_kv: 110.0,
                std_type: "T1".into(),
                ..Trafo::default()
            });
        }
        net.trafo.push(Trafo {
            hv_bus: 0,
            lv_bus: 1,
            sn_mva: 300.0,
            vn_hv_kv: 220.0,
            vn_lv_kv: 110.0,
            std_type: "T2".into(),
            ..Trafo::default()
        });

        convert_parallel_trafos(&mut net);
        // the two T1 rows collapse, the T2 row stays
        assert_eq!(net.trafo.len(), 2);
        assert_eq!(net.trafo.get(0).unwrap().parallel, 2);
    }

    #[test]
    fn test_merge_keeps_sgen_bus_separation() {
        let mut net = Network::new("t");
        net.bus.push(Bus::default());
        net.bus.push(Bus::default());
        net.sgen.push(Sgen {
            bus: 0,
            p_mw: 10.0,
            ..Sgen::default()
        });
        net.sgen.push(Sgen {
            bus: 1,
            p_mw: 20.0,
            ..Sgen::default()
        });
        merge_same_bus_generation(&mut net, None).unwrap();
        assert_eq!(net.sgen.len(), 2);
    }
}
