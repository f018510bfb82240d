//! Dataset-specific pre-manipulation of the source grid.
//!
//! Everything that must happen to the published reference data before the
//! region cut is valid: measurement clearing, bound fixes, as-built line
//! reinforcements, external-grid replacement by slack-capable generators,
//! curated voltage set-points, absolute profiles, and the bus-role
//! partition that drives the reduction.

use std::collections::BTreeSet;

use sbx_core::{BusGraph, Gen, Network, SbxError, SbxResult};
use sbx_profiles::ProfileSet;
use tracing::{info, warn};

use crate::absolute::absolute_profiles;
use crate::curation::Curation;

/// Staging zone labels used between partition and final assignment.
pub const ZONE_OUTSIDE: i32 = 20;
pub const ZONE_INNER: i32 = 18;
pub const ZONE_BOUNDARY: i32 = 19;

/// The bus-role partition driving the topology reduction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BusRoles {
    pub boundary: BTreeSet<usize>,
    pub zone_boundary: BTreeSet<usize>,
    /// Retained region including the boundary buses
    pub inner: BTreeSet<usize>,
}

/// Run the full pre-manipulation; returns absolute profiles and roles.
pub fn pre_manipulation(
    net: &mut Network,
    source_profiles: &ProfileSet,
    cur: &Curation,
) -> SbxResult<(ProfileSet, BusRoles)> {
    net.measurement.clear();

    for (_, gen) in net.gen.iter_mut() {
        gen.min_p_mw = Some(0.0);
    }
    for (_, eg) in net.ext_grid.iter_mut() {
        eg.min_p_mw = Some(0.0);
    }
    net.sgen.retain(|_, sgen| sgen.sn_mva.abs() > 1e-9);

    // as-built reinforcements of critical internal lines
    for ov in &cur.line_type_overrides {
        let std = cur.std_type(&ov.std_type)?.clone();
        let line = net.line.get_mut(ov.line).ok_or_else(|| {
            SbxError::Data(format!("line {} for std-type override is missing", ov.line))
        })?;
        line.std_type = ov.std_type.clone();
        line.r_ohm_per_km = std.r_ohm_per_km;
        line.x_ohm_per_km = std.x_ohm_per_km;
        line.c_nf_per_km = std.c_nf_per_km;
        line.max_i_ka = std.max_i_ka;
        line.kind = std.kind;
    }

    // external line reinforcements that keep the year convergent
    for group in &cur.parallel_increments {
        for &idx in group {
            if let Some(line) = net.line.get_mut(idx) {
                line.parallel += 1;
            }
        }
    }

    replace_ext_grids_by_slack_gens(net)?;

    for &idx in &cur.removed_slack_gens {
        if let Some(gen) = net.gen.get_mut(idx) {
            gen.slack = false;
        }
    }
    if let Some(gen) = net.gen.get_mut(cur.slack_gen) {
        gen.slack = true;
    }
    for &idx in &cur.zero_slack_weight_gens {
        if let Some(gen) = net.gen.get_mut(idx) {
            gen.slack_weight = 0.0;
        }
    }
    for (_, gen) in net.gen.iter_mut() {
        if gen.controllable.is_none() {
            gen.controllable = Some(true);
        }
    }

    let profiles = absolute_profiles(net, source_profiles)?;

    // curated voltage set-points, positional over the generator table
    if cur.gen_vm_pu.len() != net.gen.len() {
        return Err(SbxError::Structure(format!(
            "curation has {} voltage set-points but the net has {} generators",
            cur.gen_vm_pu.len(),
            net.gen.len()
        )));
    }
    for ((_, gen), &vm) in net.gen.iter_mut().zip(cur.gen_vm_pu.iter()) {
        gen.vm_pu = vm + cur.gen_vm_pu_offset;
    }

    let roles = set_bus_zones(net, cur);
    Ok((profiles, roles))
}

/// Replace every external grid by a generator so the year can run with a
/// distributed slack.
pub fn replace_ext_grids_by_slack_gens(net: &mut Network) -> SbxResult<()> {
    if net.ext_grid.is_empty() {
        return Ok(());
    }
    if net.gen.iter().any(|(_, g)| g.slack_weight > 0.0) {
        warn!("existing gen slack weights are overwritten");
    }
    for (_, gen) in net.gen.iter_mut() {
        gen.slack_weight = 0.0;
    }

    let ext_grids: Vec<_> = net.ext_grid.indices();
    let mut first = true;
    for idx in ext_grids {
        let eg = net.ext_grid.remove(idx).expect("index just listed");
        let p_mw = eg.max_p_mw.unwrap_or(0.0);
        net.gen.push(Gen {
            name: eg.name,
            bus: eg.bus,
            p_mw,
            vm_pu: eg.vm_pu,
            sn_mva: eg.sn_mva,
            min_p_mw: eg.min_p_mw,
            max_p_mw: eg.max_p_mw,
            min_q_mvar: eg.min_q_mvar,
            max_q_mvar: eg.max_q_mvar,
            slack: first,
            slack_weight: eg.slack_weight,
            controllable: Some(true),
            profile: eg.profile,
            kind: eg.kind,
            volt_lvl: eg.volt_lvl,
            subnet: eg.subnet,
            in_service: eg.in_service,
            origin_id: eg.origin_id,
        });
        first = false;
    }
    info!("replaced external grids by slack-capable generators");
    Ok(())
}

/// Partition the buses into boundary, zone-boundary and inner roles and
/// stage the zone labels accordingly.
pub fn set_bus_zones(net: &mut Network, cur: &Curation) -> BusRoles {
    let boundary: BTreeSet<usize> = cur.boundary_buses.iter().copied().collect();
    let zone_boundary: BTreeSet<usize> = cur.zone_boundary_buses.iter().copied().collect();

    let graph = BusGraph::from_network(net);
    let mut inner: BTreeSet<usize> = boundary.clone();

    let mut seeds: Vec<usize> = Vec::new();
    if let Some((_, trafo)) = net
        .trafo
        .iter()
        .find(|(_, t)| (t.vn_lv_kv - cur.hv_trafo_lv_kv).abs() < 1e-6)
    {
        seeds.push(trafo.hv_bus);
    }
    seeds.extend(cur.inner_seed_buses.iter().copied());

    for seed in seeds {
        inner.extend(graph.connected_component(seed, &boundary));
    }

    for (idx, bus) in net.bus.iter_mut() {
        bus.zone = if boundary.contains(&idx) {
            ZONE_BOUNDARY
        } else if inner.contains(&idx) {
            ZONE_INNER
        } else {
            ZONE_OUTSIDE
        };
    }

    BusRoles {
        boundary,
        zone_boundary,
        inner,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sbx_core::{Bus, ExtGrid, Network};

    #[test]
    fn test_ext_grid_replacement_keeps_one_slack() {
        let mut net = Network::new("t");
        net.bus.push(Bus::default());
        net.bus.push(Bus::default());
        net.ext_grid.push(ExtGrid {
            bus: 0,
            vm_pu: 1.03,
            max_p_mw: Some(500.0),
            slack_weight: 2.0,
            ..ExtGrid::default()
        });
        net.ext_grid.push(ExtGrid {
            bus: 1,
            vm_pu: 1.01,
            max_p_mw: Some(300.0),
            slack_weight: 1.0,
            ..ExtGrid::default()
        });

        replace_ext_grids_by_slack_gens(&mut net).unwrap();
        assert!(net.ext_grid.is_empty());
        assert_eq!(net.gen.len(), 2);
        let slacks: Vec<bool> = net.gen.iter().map(|(_, g)| g.slack).collect();
        assert_eq!(slacks, vec![true, false]);
        // active power starts at the upper bound
        assert_eq!(net.gen.get(0).unwrap().p_mw, 500.0);
    }
}
