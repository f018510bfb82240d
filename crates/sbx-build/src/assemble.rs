//! The entry point: assemble the EHV+HV excerpt net.
//!
//! Either a stored snapshot is loaded and decorated with profile data, or
//! the excerpt is built from the reference dataset: pre-manipulation,
//! optional year run for the generator trajectories, topology reduction,
//! and the common post-processing (limits, zones, control attachment).

use std::collections::BTreeSet;
use std::path::PathBuf;

use sbx_core::vde::{CurveVariant, QCurveFamily, QCurveTag};
use sbx_core::{ColumnKind, ElementKind, Network, ProfileKey, ResultKey, SbxError, SbxResult};
use sbx_flow::{FlowEngine, FlowOptions, NewtonEngine};
use sbx_profiles::{
    downcast_profiles, load_profiles_from_parquet, read_results_from_json,
    store_profiles_to_parquet, ProfileSet, ResultFrames, StepSelection,
};
use sbx_ts::{
    consider_distr_slack, run_timeseries, set_time_step, ControllerSet, InjectMode, Kernel,
    RunOptions,
};
use tracing::{info, warn};

use crate::curation::Curation;
use crate::limits::{set_sgen_limits, SgenLimitOptions};
use crate::merge::{convert_parallel_trafos, merge_same_bus_generation};
use crate::premanip::pre_manipulation;
use crate::reduce::reduce_ehv;
use crate::snapshot::{load_network, save_network};
use crate::strategy::{add_control_strategy, ControlStrategy, StrategyReport};

/// Entry-point options of the excerpt assembly.
#[derive(Debug, Clone)]
pub struct ExcerptOptions {
    /// Time steps to include in the profile data
    pub time_steps: StepSelection,
    /// Load the stored snapshot instead of building from source
    pub from_snapshot: bool,
    /// Merge generation units sharing a bus
    pub merge_same_bus_gens: bool,
    /// Control strategy name; unknown names are ignored with a warning
    pub control: Option<String>,
    /// Keep a neutral zone of buses between the operator regions
    pub neutral_buses: bool,
    /// Number of EHV operator zones (1 or 2)
    pub ehv_zones: u8,
    /// Treat active power as fixed when computing sgen limits
    pub fixed_p: bool,
    /// Directory holding snapshot, profile store and source data
    pub data_dir: PathBuf,
    /// Profile store override (defaults to `<data_dir>/profiles`)
    pub profiles_dir: Option<PathBuf>,
    /// Where to persist a freshly built net and its profiles
    pub store_to: Option<PathBuf>,
    /// Execution strategy of the embedded timeseries runs
    pub kernel: Kernel,
}

impl Default for ExcerptOptions {
    fn default() -> Self {
        Self {
            time_steps: StepSelection::None,
            from_snapshot: true,
            merge_same_bus_gens: false,
            control: None,
            neutral_buses: false,
            ehv_zones: 2,
            fixed_p: true,
            data_dir: PathBuf::from("data"),
            profiles_dir: None,
            store_to: None,
            kernel: Kernel::Base,
        }
    }
}

/// The assembled excerpt.
#[derive(Debug)]
pub struct Excerpt {
    pub net: Network,
    pub profiles: Option<ProfileSet>,
    pub controllers: ControllerSet,
    pub strategy_report: Option<StrategyReport>,
}

/// Assemble with the default engine and the bundled curation record.
pub fn build_excerpt(opts: &ExcerptOptions) -> SbxResult<Excerpt> {
    build_excerpt_with(opts, &NewtonEngine, &Curation::bundled()?)
}

/// Assemble with an injected engine and curation record.
pub fn build_excerpt_with(
    opts: &ExcerptOptions,
    engine: &dyn FlowEngine,
    cur: &Curation,
) -> SbxResult<Excerpt> {
    let control = parse_control(opts.control.as_deref());

    let (mut net, mut profiles) = if opts.from_snapshot {
        load_from_snapshot(opts)?
    } else {
        build_from_source(opts, engine, cur)?
    };

    // --- post-processing common to both branches ---------------------------
    if opts.merge_same_bus_gens {
        merge_same_bus_generation(&mut net, profiles.as_mut())?;
    }

    set_sgen_limits(
        &mut net,
        profiles.as_ref(),
        &SgenLimitOptions {
            fixed_p: opts.fixed_p,
            ..SgenLimitOptions::default()
        },
    )?;

    assert_rated_powers(&net)?;

    if !opts.neutral_buses {
        for (_, bus) in net.bus.iter_mut() {
            if bus.zone == 0 {
                if let Some(&zone) = cur.boundary_zone_by_subnet.get(&bus.subnet) {
                    bus.zone = zone;
                }
            }
        }
    }

    match opts.ehv_zones {
        2 => {}
        1 => {
            for (_, bus) in net.bus.iter_mut() {
                if opts.neutral_buses && bus.zone == 0 && bus.subnet == "EHV1" {
                    bus.zone = 1;
                }
                if bus.zone == 2 {
                    bus.zone = 1;
                }
            }
        }
        other => {
            return Err(SbxError::Config(format!(
                "ehv_zones is implemented only for 1 or 2, not for {other}"
            )))
        }
    }

    if let Some(profiles) = profiles.as_mut() {
        downcast_profiles(profiles)?;
    }

    let mut controllers = ControllerSet::new();
    let strategy_report =
        add_control_strategy(&net, profiles.as_ref(), &mut controllers, control, cur)?;

    Ok(Excerpt {
        net,
        profiles,
        controllers,
        strategy_report,
    })
}

/// Unknown strategy names are a recoverable condition here: warn, run
/// without control.
fn parse_control(control: Option<&str>) -> ControlStrategy {
    match control {
        None => ControlStrategy::NoControl,
        Some(name) => name.parse().unwrap_or_else(|_| {
            warn!("control='{name}' is unknown and thus ignored");
            ControlStrategy::NoControl
        }),
    }
}

fn load_from_snapshot(opts: &ExcerptOptions) -> SbxResult<(Network, Option<ProfileSet>)> {
    let mut net = load_network(&opts.data_dir.join("net.json"))?;
    if opts.time_steps.is_none() {
        return Ok((net, None));
    }
    let folder = opts
        .profiles_dir
        .clone()
        .unwrap_or_else(|| opts.data_dir.join("profiles"));
    let profiles = load_profiles_from_parquet(&folder, &opts.time_steps)?;
    if let Some(first) = opts.time_steps.first() {
        if first != 0 {
            set_time_step(&mut net, first, &profiles, InjectMode::Full)?;
        }
    }
    Ok((net, Some(profiles)))
}

fn build_from_source(
    opts: &ExcerptOptions,
    engine: &dyn FlowEngine,
    cur: &Curation,
) -> SbxResult<(Network, Option<ProfileSet>)> {
    let mut net = load_network(&opts.data_dir.join("source_net.json"))?;
    let source_profiles =
        load_profiles_from_parquet(&opts.data_dir.join("source_profiles"), &StepSelection::All)?;

    let (mut profiles, roles) = pre_manipulation(&mut net, &source_profiles, cur)?;

    // resolve the requested steps against the available profile index
    let time_steps: Vec<i64> = match &opts.time_steps {
        StepSelection::None => {
            // nothing to run and nothing to reduce against: the full
            // source topology is returned as-is
            return Ok((net, None));
        }
        StepSelection::All => {
            let key = ProfileKey::new(ElementKind::Load, ColumnKind::PMw);
            profiles
                .get(&key)
                .ok_or_else(|| SbxError::Data("source data has no load.p_mw profile".into()))?
                .steps()?
        }
        StepSelection::Steps(_) => {
            let steps = opts.time_steps.explicit_sorted().expect("explicit variant");
            downcast_profiles(&mut profiles)?;
            profiles.reduce_by_steps(&steps.iter().copied().collect())?;
            steps
        }
    };

    // --- generator voltage/active-power trajectories -----------------------
    let res = gen_trajectories(&mut net, &mut profiles, &time_steps, engine, opts)?;
    let gen_indices: BTreeSet<usize> = net.gen.indices().into_iter().collect();
    for column in [ColumnKind::VmPu, ColumnKind::PMw] {
        let frame = pick_gen_frame(&res, column)?;
        profiles.insert(
            ProfileKey::new(ElementKind::Gen, column),
            frame.select_elements(&gen_indices)?,
        );
    }
    drop(res);

    downcast_profiles(&mut profiles)?;

    info!("topology reduction starts");
    let run_opts = RunOptions {
        kernel: opts.kernel,
        ..RunOptions::default()
    };
    let mut net = reduce_ehv(
        net,
        &mut profiles,
        &time_steps,
        &roles,
        cur,
        engine,
        &run_opts,
    )?;

    if let Some(&first) = time_steps.first() {
        set_time_step(&mut net, first, &profiles, InjectMode::Full)?;
    }
    net.clear_result_tables();

    convert_parallel_trafos(&mut net);
    tag_origin_ids(&mut net);

    // converter-connected units with distribution-level profiles stay
    // uncontrollable
    for (_, sgen) in net.sgen.iter_mut() {
        sgen.controllable = !sgen.profile.starts_with("mv_");
        sgen.slack_weight = 0.0;
    }
    assign_q_curve_tags(&mut net);

    net.name = "EHV_HV_excerpt".to_string();

    if let Some(store) = &opts.store_to {
        let mut stored = net.clone();
        stored.clear_result_tables();
        save_network(&stored, &store.join("net.json"))?;
        store_profiles_to_parquet(&profiles, &store.join("profiles"), false)?;
        info!("built net and profiles stored to {}", store.display());
    }

    Ok((net, Some(profiles)))
}

/// Year trajectories of the voltage-controlled generators: precomputed
/// results when available, otherwise a distributed-slack timeseries with
/// reactive limits enforced.
fn gen_trajectories(
    net: &mut Network,
    profiles: &mut ProfileSet,
    time_steps: &[i64],
    engine: &dyn FlowEngine,
    opts: &ExcerptOptions,
) -> SbxResult<ResultFrames> {
    let precomputed = opts.data_dir.join("net_creation_timeseries_results");
    if precomputed.is_dir() {
        info!("using precomputed generator trajectories");
        return read_results_from_json(&precomputed, &[], None, Some(time_steps), false);
    }

    let mut controllers = ControllerSet::new();
    let (ds_idx, ds_created) = consider_distr_slack(&mut controllers, 0.1);

    // a small gap inside the reactive bands keeps the resulting voltage
    // set-points feasible when the limits are enforced later
    let gaps: Vec<(usize, f64)> = net
        .gen
        .iter()
        .map(|(idx, g)| {
            let range = g.max_q_mvar.unwrap_or(0.0) - g.min_q_mvar.unwrap_or(0.0);
            (idx, range * 0.01)
        })
        .collect();
    for &(idx, gap) in &gaps {
        let gen = net.gen.get_mut(idx).expect("index just listed");
        gen.max_q_mvar = gen.max_q_mvar.map(|q| q - gap);
        gen.min_q_mvar = gen.min_q_mvar.map(|q| q + gap);
    }

    let run_opts = RunOptions {
        kernel: Kernel::Base,
        add_output_vals: vec![
            ResultKey::res(ElementKind::Gen, ColumnKind::PMw),
            ResultKey::res(ElementKind::Gen, ColumnKind::VmPu),
        ],
        flow: FlowOptions {
            enforce_q_limits: true,
            ..FlowOptions::default()
        },
        ..RunOptions::default()
    };
    let res = run_timeseries(
        net,
        &mut controllers,
        Some(profiles),
        time_steps,
        engine,
        &run_opts,
        None,
    )?;

    for &(idx, gap) in &gaps {
        let gen = net.gen.get_mut(idx).expect("index just listed");
        gen.max_q_mvar = gen.max_q_mvar.map(|q| q + gap);
        gen.min_q_mvar = gen.min_q_mvar.map(|q| q - gap);
    }
    if ds_created {
        controllers.remove(ds_idx);
    }
    Ok(res)
}

/// The trajectory frames may carry the result prefix or not, depending on
/// whether they were computed or read back from storage.
fn pick_gen_frame(
    res: &ResultFrames,
    column: ColumnKind,
) -> SbxResult<&sbx_profiles::ProfileFrame> {
    let with_prefix = ResultKey::res(ElementKind::Gen, column);
    let without = ResultKey::element(ElementKind::Gen, column);
    res.get(&with_prefix)
        .or_else(|| res.get(&without))
        .ok_or_else(|| {
            SbxError::Data(format!(
                "generator trajectory '{with_prefix}' is missing from the timeseries results"
            ))
        })
}

fn tag_origin_ids(net: &mut Network) {
    for (_, bus) in net.bus.iter_mut() {
        bus.origin_id = Some(bus.name.clone());
    }
    for (_, row) in net.load.iter_mut() {
        row.origin_id = Some(row.name.clone());
    }
    for (_, row) in net.sgen.iter_mut() {
        row.origin_id = Some(row.name.clone());
    }
    for (_, row) in net.gen.iter_mut() {
        row.origin_id = Some(row.name.clone());
    }
    for (_, row) in net.ext_grid.iter_mut() {
        row.origin_id = Some(row.name.clone());
    }
    for (_, row) in net.line.iter_mut() {
        row.origin_id = Some(row.name.clone());
    }
    for (_, row) in net.trafo.iter_mut() {
        row.origin_id = Some(row.name.clone());
    }
    for (_, row) in net.storage.iter_mut() {
        row.origin_id = Some(row.name.clone());
    }
}

/// Regulatory curve tags by connection voltage, controllable units only.
fn assign_q_curve_tags(net: &mut Network) {
    let bus_vn: std::collections::BTreeMap<usize, f64> =
        net.bus.iter().map(|(idx, b)| (idx, b.vn_kv)).collect();
    for (_, sgen) in net.sgen.iter_mut() {
        sgen.q_curve = None;
        if !sgen.controllable {
            continue;
        }
        let vn = bus_vn.get(&sgen.bus).copied().unwrap_or(0.0);
        let family = if sgen.volt_lvl == Some(3) && vn <= 145.0 {
            Some(QCurveFamily::V4120)
        } else if vn > 145.0 && vn < 255.0 {
            Some(QCurveFamily::V4130_220)
        } else if vn > 255.0 {
            Some(QCurveFamily::V4130_380)
        } else if vn > 60.0 {
            Some(QCurveFamily::V4120)
        } else {
            None
        };
        sgen.q_curve = family.map(|f| QCurveTag::new(f, CurveVariant::V2));
    }
}

/// Every active generation unit needs a real rating; a zero slips wrong
/// data through every later per-unit computation.
fn assert_rated_powers(net: &Network) -> SbxResult<()> {
    for (idx, eg) in net.ext_grid.iter() {
        if eg.sn_mva.abs() < 1e-9 {
            return Err(SbxError::Structure(format!(
                "ext_grid {idx} has (near-)zero rated power"
            )));
        }
    }
    for (idx, gen) in net.gen.iter() {
        if gen.sn_mva.abs() < 1e-9 {
            return Err(SbxError::Structure(format!(
                "gen {idx} has (near-)zero rated power"
            )));
        }
    }
    for (idx, sgen) in net.sgen.iter() {
        if sgen.sn_mva.abs() < 1e-9 {
            return Err(SbxError::Structure(format!(
                "sgen {idx} has (near-)zero rated power"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_control_is_ignored() {
        assert_eq!(parse_control(Some("FancyCtrl")), ControlStrategy::NoControl);
        assert_eq!(parse_control(None), ControlStrategy::NoControl);
        assert_eq!(parse_control(Some("QofV")), ControlStrategy::QofV);
    }

    #[test]
    fn test_unsupported_ehv_zone_count() {
        let dir = tempfile::tempdir().unwrap();
        // a minimal snapshot so the branch reaches the zone policy
        let mut net = Network::new("t");
        net.bus.push(sbx_core::Bus::default());
        save_network(&net, &dir.path().join("net.json")).unwrap();

        let opts = ExcerptOptions {
            ehv_zones: 3,
            data_dir: dir.path().to_path_buf(),
            ..ExcerptOptions::default()
        };
        let err = build_excerpt(&opts).unwrap_err();
        assert!(matches!(err, SbxError::Config(_)));
    }

    #[test]
    fn test_zero_rated_sgen_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let mut net = Network::new("t");
        net.bus.push(sbx_core::Bus::default());
        net.sgen.push(sbx_core::Sgen {
            bus: 0,
            sn_mva: 0.0,
            q_curve: Some(QCurveTag::new(QCurveFamily::V4120, CurveVariant::V2)),
            ..sbx_core::Sgen::default()
        });
        save_network(&net, &dir.path().join("net.json")).unwrap();

        let opts = ExcerptOptions {
            data_dir: dir.path().to_path_buf(),
            ..ExcerptOptions::default()
        };
        let err = build_excerpt(&opts).unwrap_err();
        assert!(matches!(err, SbxError::Structure(_)));
    }
}
