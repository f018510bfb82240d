//! Topology reduction: cut the grid at the boundary buses and replace the
//! exterior with equivalent loads.
//!
//! The cut is driven by the precomputed bus roles. Branches leaving the
//! boundary toward the exterior are identified, their terminal flows are
//! collected over the requested time steps, the interior subnetwork is
//! extracted, and one synthesized load per cut branch carries the
//! exterior's behavior — sized by the flow maximum and fed by a profile
//! column holding the full flow series.

use std::collections::BTreeSet;

use sbx_core::{ColumnKind, ElementKind, Load, Network, ProfileKey, ResultKey, SbxError, SbxResult};
use sbx_profiles::{ProfileFrame, ProfileSet};
use sbx_flow::FlowEngine;
use sbx_ts::{run_timeseries, ControllerSet, RunOptions};
use tracing::info;

use crate::curation::Curation;
use crate::premanip::BusRoles;

/// Reduce the net to the interior region plus synthesized boundary loads.
pub fn reduce_ehv(
    net: Network,
    profiles: &mut ProfileSet,
    time_steps: &[i64],
    roles: &BusRoles,
    cur: &Curation,
    engine: &dyn FlowEngine,
    run_opts: &RunOptions,
) -> SbxResult<Network> {
    let mut net = net;
    let exterior =
        |bus: usize| !roles.boundary.contains(&bus) && !roles.inner.contains(&bus);

    // --- classify boundary branches --------------------------------------
    let f_lines: Vec<usize> = net
        .line
        .iter()
        .filter(|(_, l)| roles.boundary.contains(&l.from_bus) && exterior(l.to_bus))
        .map(|(idx, _)| idx)
        .collect();
    let t_lines: Vec<usize> = net
        .line
        .iter()
        .filter(|(_, l)| roles.boundary.contains(&l.to_bus) && exterior(l.from_bus))
        .map(|(idx, _)| idx)
        .collect();

    // the reference topology never cuts through a transformer; a dataset
    // where it does invalidates the whole reduction
    let boundary_trafos: Vec<usize> = net
        .trafo
        .iter()
        .filter(|(_, t)| {
            (roles.boundary.contains(&t.hv_bus) && exterior(t.lv_bus))
                || (roles.boundary.contains(&t.lv_bus) && exterior(t.hv_bus))
        })
        .map(|(idx, _)| idx)
        .collect();
    if !boundary_trafos.is_empty() {
        return Err(SbxError::Structure(format!(
            "transformers {boundary_trafos:?} qualify as boundary branches; \
             the reduction is not valid for this topology"
        )));
    }

    // terminal buses, recorded before the exterior disappears
    let f_buses: Vec<usize> = f_lines
        .iter()
        .map(|&idx| net.line.get(idx).expect("classified above").from_bus)
        .collect();
    let t_buses: Vec<usize> = t_lines
        .iter()
        .map(|&idx| net.line.get(idx).expect("classified above").to_bus)
        .collect();

    // --- collect boundary flows over the time series ----------------------
    let output_vals = vec![
        ResultKey::res(ElementKind::Line, ColumnKind::PFromMw),
        ResultKey::res(ElementKind::Line, ColumnKind::QFromMvar),
        ResultKey::res(ElementKind::Line, ColumnKind::PToMw),
        ResultKey::res(ElementKind::Line, ColumnKind::QToMvar),
    ];
    info!("boundary-flow timeseries started ({} steps)", time_steps.len());
    let opts = RunOptions {
        output_vals: Some(output_vals),
        ..run_opts.clone()
    };
    let mut controllers = ControllerSet::new();
    let res = run_timeseries(
        &mut net,
        &mut controllers,
        Some(profiles),
        time_steps,
        engine,
        &opts,
        None,
    )?;
    info!("boundary-flow timeseries finished");

    let select = |column: ColumnKind, lines: &[usize]| -> SbxResult<ProfileFrame> {
        let key = ResultKey::res(ElementKind::Line, column);
        let frame = res
            .get(&key)
            .ok_or_else(|| SbxError::Data(format!("timeseries produced no '{key}' frame")))?;
        frame.select_elements(&lines.iter().copied().collect::<BTreeSet<_>>())
    };
    let f_p = select(ColumnKind::PFromMw, &f_lines)?;
    let f_q = select(ColumnKind::QFromMvar, &f_lines)?;
    let t_p = select(ColumnKind::PToMw, &t_lines)?;
    let t_q = select(ColumnKind::QToMvar, &t_lines)?;

    // --- extract the interior, keep prior results --------------------------
    let mut net = net.select_subnet(&roles.inner, true);

    // the subset may have cut away every slack source
    if net.slack_count() == 0 {
        let strongest = net
            .gen
            .iter()
            .max_by(|a, b| a.1.p_mw.total_cmp(&b.1.p_mw))
            .map(|(idx, _)| idx);
        if let Some(idx) = strongest {
            let gen = net.gen.get_mut(idx).expect("index from iteration");
            gen.slack = true;
            gen.slack_weight = 1.0;
            info!("re-designated gen {idx} as slack reference");
        }
    }

    // --- synthesize one load per cut branch --------------------------------
    let f_frame = synthesize_loads(&mut net, &f_lines, &f_buses, &f_p, &f_q, time_steps)?;
    let t_frame = synthesize_loads(&mut net, &t_lines, &t_buses, &t_p, &t_q, time_steps)?;

    let p_key = ProfileKey::new(ElementKind::Load, ColumnKind::PMw);
    let q_key = ProfileKey::new(ElementKind::Load, ColumnKind::QMvar);
    for (key, new_frames) in [(p_key, (&f_frame.0, &t_frame.0)), (q_key, (&f_frame.1, &t_frame.1))]
    {
        let existing = profiles.get(&key).cloned().unwrap_or(
            ProfileFrame::empty_with_steps(time_steps.to_vec())?,
        );
        let joined = ProfileFrame::concat_columns(&[&existing, new_frames.0, new_frames.1])?;
        profiles.insert(key, joined);
    }

    // --- drop profile data of removed elements -----------------------------
    let keys: Vec<_> = profiles.keys().copied().collect();
    for key in keys {
        let indices: BTreeSet<usize> = net.table_indices(key.table).into_iter().collect();
        let frame = profiles.get(&key).expect("key just listed");
        let filtered = frame.select_elements(&indices)?;
        profiles.insert(key, filtered);
    }

    assign_zones(&mut net, roles, cur);
    Ok(net)
}

/// Create the boundary loads of one direction and their profile frames.
///
/// Returns the `(p, q)` frames whose columns are the new load indices,
/// indexed by the run's time steps.
fn synthesize_loads(
    net: &mut Network,
    lines: &[usize],
    buses: &[usize],
    p_flows: &ProfileFrame,
    q_flows: &ProfileFrame,
    time_steps: &[i64],
) -> SbxResult<(ProfileFrame, ProfileFrame)> {
    let p_max: std::collections::BTreeMap<usize, f64> =
        p_flows.abs_max_per_element()?.into_iter().collect();
    let q_max: std::collections::BTreeMap<usize, f64> =
        q_flows.abs_max_per_element()?.into_iter().collect();

    let mut p_columns = Vec::with_capacity(lines.len());
    let mut q_columns = Vec::with_capacity(lines.len());
    for (&line, &bus) in lines.iter().zip(buses.iter()) {
        let name = format!("ExtL_{line}");
        let load = net.load.push(Load {
            name: name.clone(),
            bus,
            p_mw: p_max.get(&line).copied().unwrap_or(0.0),
            q_mvar: q_max.get(&line).copied().unwrap_or(0.0),
            profile: name,
            ..Load::default()
        });
        let p_values = p_flows.column_values(line)?.ok_or_else(|| {
            SbxError::Data(format!("no boundary flow series for line {line}"))
        })?;
        let q_values = q_flows.column_values(line)?.ok_or_else(|| {
            SbxError::Data(format!("no boundary flow series for line {line}"))
        })?;
        p_columns.push((load, p_values));
        q_columns.push((load, q_values));
    }
    Ok((
        ProfileFrame::new(time_steps.to_vec(), p_columns)?,
        ProfileFrame::new(time_steps.to_vec(), q_columns)?,
    ))
}

/// Final zone labels of the reduced net.
///
/// The two retained HV grids become zones 3 and 4 by subnet name; the
/// EHV region is split into zones 1 and 2 by connectivity from the
/// transformer-anchored bus, not traversing the zone-boundary buses; the
/// neutral coupling subnets and the zone-boundary buses end up in zone 0.
fn assign_zones(net: &mut Network, roles: &BusRoles, cur: &Curation) {
    for (_, bus) in net.bus.iter_mut() {
        if bus.subnet.contains("HV1") {
            bus.zone = 3;
        }
        if bus.subnet.contains("HV2") {
            bus.zone = 4;
        }
    }

    let ehv_buses: BTreeSet<usize> = net
        .bus
        .iter()
        .filter(|(_, b)| b.vn_kv > 110.0)
        .map(|(idx, _)| idx)
        .collect();

    let graph = sbx_core::BusGraph::from_network(net);
    let anchor = net
        .trafo
        .iter()
        .find(|(_, t)| (t.vn_lv_kv - cur.hv_trafo_lv_kv).abs() < 1e-6)
        .map(|(_, t)| t.hv_bus);
    let first_zone: BTreeSet<usize> = match anchor {
        Some(start) => graph
            .connected_component(start, &roles.zone_boundary)
            .intersection(&ehv_buses)
            .copied()
            .collect(),
        None => BTreeSet::new(),
    };

    for (idx, bus) in net.bus.iter_mut() {
        if first_zone.contains(&idx) {
            bus.zone = 1;
        } else if ehv_buses.contains(&idx) {
            bus.zone = 2;
        }
    }
    for (idx, bus) in net.bus.iter_mut() {
        if cur.neutral_subnets.contains(&bus.subnet) || roles.zone_boundary.contains(&idx) {
            bus.zone = 0;
        }
    }
}
