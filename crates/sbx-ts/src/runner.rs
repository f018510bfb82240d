//! The timeseries runner: repeated power-flow solves over an ordered set
//! of time steps.
//!
//! Two execution strategies exist. The base kernel applies the registered
//! controllers around every solve and supports a custom per-step control
//! callback. The accelerated kernel skips the controller machinery and
//! fans the independent steps out over a thread pool; it requires the
//! optional `accel` feature and fails fast with a configuration error
//! when that capability was not built in.

use std::path::PathBuf;
use std::str::FromStr;

use sbx_core::{Network, ProfileKey, ResultKey, SbxError, SbxResult};
use sbx_flow::{FlowEngine, FlowOptions};
use sbx_profiles::{write_results_to_json, ProfileSet, ResultFrames};
use tracing::{info, warn};

use crate::control::{Controller, ControllerSet};
use crate::outputs::{default_outputs, OutputCollector};

/// Execution strategy of the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Kernel {
    /// Parallel fan-out over steps, no controllers (`accel` feature)
    Accelerated,
    /// Sequential solves with controller support
    #[default]
    Base,
}

impl FromStr for Kernel {
    type Err = SbxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accelerated" | "accel" => Ok(Kernel::Accelerated),
            "base" => Ok(Kernel::Base),
            other => Err(SbxError::Config(format!(
                "execution strategy '{other}' is unknown"
            ))),
        }
    }
}

/// Typed capability probe for the accelerated kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Available,
    Missing(&'static str),
}

impl Kernel {
    /// Whether this kernel can run in the current build.
    pub fn capability(&self) -> Capability {
        match self {
            Kernel::Base => Capability::Available,
            Kernel::Accelerated => {
                #[cfg(feature = "accel")]
                {
                    Capability::Available
                }
                #[cfg(not(feature = "accel"))]
                {
                    Capability::Missing(
                        "the accelerated kernel needs the optional 'accel' feature; \
                         rebuild with --features accel or use the base kernel",
                    )
                }
            }
        }
    }
}

/// Runner configuration.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub kernel: Kernel,
    /// Full output set override; defaults differ per kernel
    pub output_vals: Option<Vec<ResultKey>>,
    /// Extra outputs on top of the defaults (base kernel only)
    pub add_output_vals: Vec<ResultKey>,
    pub include_bus_vm_pu: bool,
    pub flow: FlowOptions,
    /// Thread-count hint for the accelerated kernel
    pub threads: Option<usize>,
    /// Persist the result frames as a JSON folder tree
    pub output_path: Option<PathBuf>,
    /// Profile keys that get no const-profile controller
    pub exclude_const_keys: Vec<ProfileKey>,
    /// Cap on control-loop rounds per step
    pub max_control_rounds: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            kernel: Kernel::Base,
            output_vals: None,
            add_output_vals: Vec::new(),
            include_bus_vm_pu: false,
            flow: FlowOptions::default(),
            threads: None,
            output_path: None,
            exclude_const_keys: Vec::new(),
            max_control_rounds: 10,
        }
    }
}

/// Custom per-step control logic; replaces the built-in control loop.
pub type ControlFn<'a> = dyn FnMut(&mut Network, &mut ControllerSet, i64, &dyn FlowEngine, &FlowOptions) -> SbxResult<()>
    + 'a;

/// Run the control loop of one step: solve, let controllers react,
/// re-solve until no controller changes the network.
pub fn run_control(
    net: &mut Network,
    controllers: &ControllerSet,
    engine: &dyn FlowEngine,
    flow: &FlowOptions,
    max_rounds: usize,
) -> SbxResult<()> {
    engine.solve(net, flow)?;
    for _ in 0..max_rounds {
        let mut changed = false;
        for (_, controller) in controllers.iter() {
            changed |= controller.control_step(net)?;
        }
        if !changed {
            return Ok(());
        }
        engine.solve(net, flow)?;
    }
    warn!("control loop did not settle within {max_rounds} rounds");
    Ok(())
}

/// Execute the timeseries and collect the requested outputs.
pub fn run_timeseries(
    net: &mut Network,
    controllers: &mut ControllerSet,
    profiles: Option<&ProfileSet>,
    time_steps: &[i64],
    engine: &dyn FlowEngine,
    opts: &RunOptions,
    mut custom_control: Option<&mut ControlFn<'_>>,
) -> SbxResult<ResultFrames> {
    let mut kernel = opts.kernel;
    if custom_control.is_some() && kernel != Kernel::Base {
        warn!("kernel changed to 'base' to make use of the custom control function");
        kernel = Kernel::Base;
    }
    let profiles = match profiles {
        Some(p) if !p.is_empty() => p,
        _ => return Err(SbxError::Config("no profiles are available".into())),
    };
    if let Capability::Missing(reason) = kernel.capability() {
        return Err(SbxError::Config(reason.into()));
    }

    let specs = opts.output_vals.clone().unwrap_or_else(|| match kernel {
        Kernel::Base => default_outputs(opts.include_bus_vm_pu, true, true),
        Kernel::Accelerated => default_outputs(opts.include_bus_vm_pu, false, false),
    });
    let specs = match kernel {
        Kernel::Base => {
            let mut specs = specs;
            specs.extend(opts.add_output_vals.iter().copied());
            specs
        }
        Kernel::Accelerated => specs,
    };

    let results = match kernel {
        Kernel::Accelerated => run_accelerated(net, profiles, time_steps, engine, opts, specs)?,
        Kernel::Base => {
            let before: std::collections::BTreeSet<usize> =
                controllers.indices().into_iter().collect();
            for key in profiles.keys() {
                if !opts.exclude_const_keys.contains(key) {
                    controllers.push(Controller::ConstProfile(crate::control::ConstProfile {
                        key: *key,
                    }));
                }
            }

            let mut collector = OutputCollector::new(net, specs);
            for &step in time_steps {
                for (_, controller) in controllers.iter() {
                    controller.time_step(net, profiles, step)?;
                }
                // controller registration happens above; the closure may
                // still add or drop its own
                match custom_control.as_deref_mut() {
                    Some(control) => control(net, controllers, step, engine, &opts.flow)?,
                    None => {
                        run_control(net, controllers, engine, &opts.flow, opts.max_control_rounds)?
                    }
                }
                collector.record(net, step);
            }

            // drop everything this run registered
            controllers.retain(|idx, _| before.contains(&idx));
            collector.into_frames()?
        }
    };

    if let Some(path) = &opts.output_path {
        write_results_to_json(&results, path, None, false)?;
        info!("timeseries results written to {}", path.display());
    }
    Ok(results)
}

#[cfg(feature = "accel")]
fn run_accelerated(
    net: &mut Network,
    profiles: &ProfileSet,
    time_steps: &[i64],
    engine: &dyn FlowEngine,
    opts: &RunOptions,
    specs: Vec<ResultKey>,
) -> SbxResult<ResultFrames> {
    use rayon::prelude::*;

    use crate::inject::{set_time_step, InjectMode};

    let Some(&first) = time_steps.first() else {
        return OutputCollector::new(net, specs).into_frames();
    };
    set_time_step(net, first, profiles, InjectMode::Full)?;
    let mut collector = OutputCollector::new(net, specs);

    let solve_step = |step: i64| -> SbxResult<(i64, Network)> {
        let mut stepped = net.clone();
        set_time_step(&mut stepped, step, profiles, InjectMode::Full)?;
        engine.solve(&mut stepped, &opts.flow)?;
        Ok((step, stepped))
    };

    let solved: Vec<(i64, Network)> = match opts.threads {
        Some(threads) => rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| SbxError::Config(e.to_string()))?
            .install(|| {
                time_steps
                    .par_iter()
                    .map(|&step| solve_step(step))
                    .collect::<SbxResult<Vec<_>>>()
            })?,
        None => time_steps
            .par_iter()
            .map(|&step| solve_step(step))
            .collect::<SbxResult<Vec<_>>>()?,
    };

    for (step, solved_net) in &solved {
        collector.record(solved_net, *step);
    }
    Ok(collector.into_frames()?)
}

#[cfg(not(feature = "accel"))]
fn run_accelerated(
    _net: &mut Network,
    _profiles: &ProfileSet,
    _time_steps: &[i64],
    _engine: &dyn FlowEngine,
    _opts: &RunOptions,
    _specs: Vec<ResultKey>,
) -> SbxResult<ResultFrames> {
    unreachable!("capability probe rejects the accelerated kernel in this build")
}

#[cfg(test)]
mod tests {
    use super::*;
    use sbx_core::{Bus, ColumnKind, ElementKind, ExtGrid, Line, Load};
    use sbx_flow::NewtonEngine;
    use sbx_profiles::ProfileFrame;

    fn two_bus_net() -> Network {
        let mut net = Network::new("ts");
        net.sn_mva = 100.0;
        net.bus.push(Bus {
            vn_kv: 110.0,
            ..Bus::default()
        });
        net.bus.push(Bus {
            vn_kv: 110.0,
            ..Bus::default()
        });
        net.ext_grid.push(ExtGrid {
            bus: 0,
            vm_pu: 1.0,
            ..ExtGrid::default()
        });
        net.load.push(Load {
            bus: 1,
            p_mw: 30.0,
            q_mvar: 5.0,
            ..Load::default()
        });
        net.line.push(Line {
            from_bus: 0,
            to_bus: 1,
            length_km: 5.0,
            r_ohm_per_km: 0.06,
            x_ohm_per_km: 0.3,
            max_i_ka: 0.6,
            ..Line::default()
        });
        net
    }

    fn load_profiles() -> ProfileSet {
        let mut set = ProfileSet::new();
        set.insert(
            "load.p_mw".parse().unwrap(),
            ProfileFrame::new(vec![0, 1, 2], vec![(0, vec![10.0, 20.0, 30.0])]).unwrap(),
        );
        set
    }

    #[test]
    fn test_unknown_kernel_name_is_config_error() {
        let err = "numba-ish".parse::<Kernel>().unwrap_err();
        assert!(matches!(err, SbxError::Config(_)));
    }

    #[test]
    fn test_missing_profiles_is_config_error() {
        let mut net = two_bus_net();
        let mut controllers = ControllerSet::new();
        let err = run_timeseries(
            &mut net,
            &mut controllers,
            None,
            &[0],
            &NewtonEngine,
            &RunOptions::default(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, SbxError::Config(_)));
    }

    #[test]
    fn test_base_run_tracks_profile_steps() {
        let mut net = two_bus_net();
        let mut controllers = ControllerSet::new();
        let profiles = load_profiles();
        let opts = RunOptions {
            add_output_vals: vec![ResultKey::res(ElementKind::Load, ColumnKind::PMw)],
            ..RunOptions::default()
        };
        let results = run_timeseries(
            &mut net,
            &mut controllers,
            Some(&profiles),
            &[0, 1, 2],
            &NewtonEngine,
            &opts,
            None,
        )
        .unwrap();

        let loads = results
            .get(&ResultKey::res(ElementKind::Load, ColumnKind::PMw))
            .unwrap();
        assert_eq!(loads.column_values(0).unwrap().unwrap(), vec![10.0, 20.0, 30.0]);

        // line flow grows with the load
        let flows = results
            .get(&ResultKey::res(ElementKind::Line, ColumnKind::PFromMw))
            .unwrap()
            .column_values(0)
            .unwrap()
            .unwrap();
        assert!(flows[0] < flows[1] && flows[1] < flows[2]);

        // const-profile controllers were cleaned up afterwards
        assert!(controllers.is_empty());
    }

    #[test]
    fn test_custom_control_forces_base_and_runs() {
        let mut net = two_bus_net();
        let mut controllers = ControllerSet::new();
        let profiles = load_profiles();
        let mut called = 0usize;
        let mut control = |net: &mut Network,
                           _ctrls: &mut ControllerSet,
                           _step: i64,
                           engine: &dyn FlowEngine,
                           flow: &FlowOptions|
         -> SbxResult<()> {
            called += 1;
            engine.solve(net, flow)?;
            Ok(())
        };
        let opts = RunOptions {
            kernel: Kernel::Accelerated,
            ..RunOptions::default()
        };
        run_timeseries(
            &mut net,
            &mut controllers,
            Some(&profiles),
            &[0, 1],
            &NewtonEngine,
            &opts,
            Some(&mut control),
        )
        .unwrap();
        assert_eq!(called, 2);
    }

    #[cfg(not(feature = "accel"))]
    #[test]
    fn test_accelerated_without_capability_fails_fast() {
        let mut net = two_bus_net();
        let mut controllers = ControllerSet::new();
        let profiles = load_profiles();
        let opts = RunOptions {
            kernel: Kernel::Accelerated,
            ..RunOptions::default()
        };
        let err = run_timeseries(
            &mut net,
            &mut controllers,
            Some(&profiles),
            &[0],
            &NewtonEngine,
            &opts,
            None,
        )
        .unwrap_err();
        match err {
            SbxError::Config(msg) => assert!(msg.contains("accel")),
            other => panic!("expected Config error, got {other:?}"),
        }
    }

    #[cfg(feature = "accel")]
    #[test]
    fn test_accelerated_matches_base_flows() {
        let profiles = load_profiles();
        let steps = [0i64, 1, 2];

        let mut net_a = two_bus_net();
        let mut ctrl_a = ControllerSet::new();
        let accel = run_timeseries(
            &mut net_a,
            &mut ctrl_a,
            Some(&profiles),
            &steps,
            &NewtonEngine,
            &RunOptions {
                kernel: Kernel::Accelerated,
                threads: Some(2),
                ..RunOptions::default()
            },
            None,
        )
        .unwrap();

        let mut net_b = two_bus_net();
        let mut ctrl_b = ControllerSet::new();
        let base = run_timeseries(
            &mut net_b,
            &mut ctrl_b,
            Some(&profiles),
            &steps,
            &NewtonEngine,
            &RunOptions::default(),
            None,
        )
        .unwrap();

        let key = ResultKey::res(ElementKind::Line, ColumnKind::PFromMw);
        let a = accel.get(&key).unwrap().column_values(0).unwrap().unwrap();
        let b = base.get(&key).unwrap().column_values(0).unwrap().unwrap();
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-9);
        }
    }
}
