//! Result-table extraction from a converged flow state.
//!
//! Follows the result conventions of the source dataset's tables:
//! `res_bus.p_mw` is consumption-positive, branch terminal powers are
//! positive into the branch, generator rows report the power actually
//! provided (slack units absorb the residual).

use std::collections::HashMap;

use sbx_core::{Network, ResBus, ResGen, ResLine, ResPq, ResTrafo};

use crate::newton::{compute_power, BusType, FlowState};

/// Fill every `res_*` table of the network from the converged state.
pub fn write_results(net: &mut Network, state: &FlowState) {
    let n = state.ybus.n();
    let base = net.sn_mva;
    let v_mag: Vec<f64> = state.v.iter().map(|v| v.norm()).collect();
    let v_ang: Vec<f64> = state.v.iter().map(|v| v.arg()).collect();
    let (p_calc, q_calc) = compute_power(&state.ybus.matrix, &v_mag, &v_ang);

    // --- res_bus (consumption positive) ----------------------------------
    net.res_bus.clear();
    for (pos, &bus) in state.ybus.buses.iter().enumerate() {
        net.res_bus.insert(
            bus,
            ResBus {
                vm_pu: v_mag[pos],
                va_degree: v_ang[pos].to_degrees(),
                p_mw: -p_calc[pos] * base,
                q_mvar: -q_calc[pos] * base,
            },
        );
    }

    // --- branch flows -----------------------------------------------------
    net.res_line.clear();
    for &(idx, adm) in &state.ybus.lines {
        let s_from = adm.s_from(&state.v) * base;
        let s_to = adm.s_to(&state.v) * base;
        let (i_from_pu, i_to_pu) = adm.i_pu(&state.v);
        let (vn_from, vn_to) = (
            bus_vn(net, state.ybus.buses[adm.from]),
            bus_vn(net, state.ybus.buses[adm.to]),
        );
        let i_from_ka = i_from_pu * base / (3f64.sqrt() * vn_from);
        let i_to_ka = i_to_pu * base / (3f64.sqrt() * vn_to);
        let line = net.line.get(idx).expect("admittance from this table");
        let i_rated = line.max_i_ka * line.parallel.max(1) as f64;
        let loading_percent = if i_rated > 0.0 {
            i_from_ka.max(i_to_ka) / i_rated * 100.0
        } else {
            0.0
        };
        net.res_line.insert(
            idx,
            ResLine {
                p_from_mw: s_from.re,
                q_from_mvar: s_from.im,
                p_to_mw: s_to.re,
                q_to_mvar: s_to.im,
                pl_mw: s_from.re + s_to.re,
                ql_mvar: s_from.im + s_to.im,
                i_from_ka,
                i_to_ka,
                loading_percent,
            },
        );
    }

    net.res_trafo.clear();
    for &(idx, adm) in &state.ybus.trafos {
        let s_hv = adm.s_from(&state.v) * base;
        let s_lv = adm.s_to(&state.v) * base;
        let (i_hv_pu, i_lv_pu) = adm.i_pu(&state.v);
        let (vn_hv, vn_lv) = (
            bus_vn(net, state.ybus.buses[adm.from]),
            bus_vn(net, state.ybus.buses[adm.to]),
        );
        let i_hv_ka = i_hv_pu * base / (3f64.sqrt() * vn_hv);
        let i_lv_ka = i_lv_pu * base / (3f64.sqrt() * vn_lv);
        let trafo = net.trafo.get(idx).expect("admittance from this table");
        let sn_rated = trafo.sn_mva * trafo.parallel.max(1) as f64;
        let loading_percent = if sn_rated > 0.0 {
            s_hv.norm().max(s_lv.norm()) / sn_rated * 100.0
        } else {
            0.0
        };
        net.res_trafo.insert(
            idx,
            ResTrafo {
                p_hv_mw: s_hv.re,
                q_hv_mvar: s_hv.im,
                p_lv_mw: s_lv.re,
                q_lv_mvar: s_lv.im,
                pl_mw: s_hv.re + s_lv.re,
                ql_mvar: s_hv.im + s_lv.im,
                i_hv_ka,
                i_lv_ka,
                loading_percent,
            },
        );
    }

    // --- injection elements ----------------------------------------------
    // bus injection without generators, to find what the gens provide
    let mut p_other = vec![0.0; n];
    let mut q_other = vec![0.0; n];
    for (_, load) in net.load.iter().filter(|(_, l)| l.in_service) {
        if let Some(&i) = state.ybus.pos.get(&load.bus) {
            p_other[i] -= load.p_mw / base;
            q_other[i] -= load.q_mvar / base;
        }
    }
    for (_, storage) in net.storage.iter().filter(|(_, s)| s.in_service) {
        if let Some(&i) = state.ybus.pos.get(&storage.bus) {
            p_other[i] -= storage.p_mw / base;
            q_other[i] -= storage.q_mvar / base;
        }
    }
    for (_, sgen) in net.sgen.iter().filter(|(_, s)| s.in_service) {
        if let Some(&i) = state.ybus.pos.get(&sgen.bus) {
            p_other[i] += sgen.p_mw / base;
            q_other[i] += sgen.q_mvar / base;
        }
    }

    net.res_load.clear();
    for (idx, load) in net.load.iter() {
        let (p, q) = if load.in_service {
            (load.p_mw, load.q_mvar)
        } else {
            (0.0, 0.0)
        };
        net.res_load.insert(idx, ResPq { p_mw: p, q_mvar: q });
    }
    net.res_sgen.clear();
    for (idx, sgen) in net.sgen.iter() {
        let (p, q) = if sgen.in_service {
            (sgen.p_mw, sgen.q_mvar)
        } else {
            (0.0, 0.0)
        };
        net.res_sgen.insert(idx, ResPq { p_mw: p, q_mvar: q });
    }

    // generator allocation per bus
    let mut gen_buses: HashMap<usize, Vec<usize>> = HashMap::new();
    for (idx, gen) in net.gen.iter().filter(|(_, g)| g.in_service) {
        gen_buses.entry(gen.bus).or_default().push(idx);
    }

    net.res_gen.clear();
    let gen_rows: Vec<(usize, usize, f64, f64, bool)> = net
        .gen
        .iter()
        .map(|(idx, g)| (idx, g.bus, g.p_mw, g.sn_mva, g.slack))
        .collect();
    for (idx, bus, p_set, sn, slack) in gen_rows {
        let Some(&pos) = state.ybus.pos.get(&bus) else {
            continue;
        };
        let siblings = gen_buses.get(&bus).map_or(1, |v| v.len()) as f64;
        // reactive power the bus generators provide, shared by rating
        let q_bus = (q_calc[pos] - q_other[pos]) * base;
        let sn_sum: f64 = gen_buses
            .get(&bus)
            .map(|ids| {
                ids.iter()
                    .filter_map(|&i| net.gen.get(i))
                    .map(|g| g.sn_mva)
                    .sum()
            })
            .unwrap_or(0.0);
        let q_share = if sn_sum > 0.0 {
            q_bus * sn / sn_sum
        } else {
            q_bus / siblings
        };
        let p_mw = if slack || state.bus_types[pos] == BusType::Slack {
            let p_bus = (p_calc[pos] - p_other[pos]) * base;
            let others: f64 = gen_buses
                .get(&bus)
                .map(|ids| {
                    ids.iter()
                        .filter(|&&i| i != idx)
                        .filter_map(|&i| net.gen.get(i))
                        .filter(|g| !g.slack)
                        .map(|g| g.p_mw)
                        .sum()
                })
                .unwrap_or(0.0);
            p_bus - others
        } else {
            p_set
        };
        net.res_gen.insert(
            idx,
            ResGen {
                p_mw,
                q_mvar: q_share,
                vm_pu: v_mag[pos],
                va_degree: v_ang[pos].to_degrees(),
            },
        );
    }

    net.res_ext_grid.clear();
    let eg_rows: Vec<(usize, usize)> = net.ext_grid.iter().map(|(idx, e)| (idx, e.bus)).collect();
    for (idx, bus) in eg_rows {
        let Some(&pos) = state.ybus.pos.get(&bus) else {
            continue;
        };
        let gen_p_here: f64 = gen_buses
            .get(&bus)
            .map(|ids| {
                ids.iter()
                    .filter_map(|&i| net.res_gen.get(i))
                    .map(|r| r.p_mw)
                    .sum()
            })
            .unwrap_or(0.0);
        let gen_q_here: f64 = gen_buses
            .get(&bus)
            .map(|ids| {
                ids.iter()
                    .filter_map(|&i| net.res_gen.get(i))
                    .map(|r| r.q_mvar)
                    .sum()
            })
            .unwrap_or(0.0);
        net.res_ext_grid.insert(
            idx,
            ResPq {
                p_mw: (p_calc[pos] - p_other[pos]) * base - gen_p_here,
                q_mvar: (q_calc[pos] - q_other[pos]) * base - gen_q_here,
            },
        );
    }
}

fn bus_vn(net: &Network, bus: usize) -> f64 {
    net.bus.get(bus).map(|b| b.vn_kv).unwrap_or(1.0)
}
