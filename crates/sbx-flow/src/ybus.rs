//! Bus admittance matrix assembly from the element tables.
//!
//! Lines contribute their series impedance (ohms per km, scaled by length
//! and parallel systems) converted to per-unit on the system base and the
//! from-bus voltage base; transformers contribute their short-circuit
//! impedance on rating base with the tap-adjusted voltage ratio. Per
//! branch the four two-port admittances are kept for flow extraction.

use std::collections::HashMap;

use num_complex::Complex64;
use sbx_core::{Network, SbxError, SbxResult};

/// Two-port admittances of one branch, with terminal bus positions.
#[derive(Debug, Clone, Copy)]
pub struct BranchAdmittance {
    /// Position of the from (hv) bus in the bus ordering
    pub from: usize,
    /// Position of the to (lv) bus in the bus ordering
    pub to: usize,
    pub y_ff: Complex64,
    pub y_ft: Complex64,
    pub y_tf: Complex64,
    pub y_tt: Complex64,
}

impl BranchAdmittance {
    /// Complex power entering the from terminal, per-unit.
    pub fn s_from(&self, v: &[Complex64]) -> Complex64 {
        let i_from = self.y_ff * v[self.from] + self.y_ft * v[self.to];
        v[self.from] * i_from.conj()
    }

    /// Complex power entering the to terminal, per-unit.
    pub fn s_to(&self, v: &[Complex64]) -> Complex64 {
        let i_to = self.y_tf * v[self.from] + self.y_tt * v[self.to];
        v[self.to] * i_to.conj()
    }

    /// Current magnitudes at both terminals, per-unit.
    pub fn i_pu(&self, v: &[Complex64]) -> (f64, f64) {
        let i_from = self.y_ff * v[self.from] + self.y_ft * v[self.to];
        let i_to = self.y_tf * v[self.from] + self.y_tt * v[self.to];
        (i_from.norm(), i_to.norm())
    }
}

/// Dense bus admittance matrix plus per-branch admittance records.
pub struct YBus {
    /// Bus indices in matrix order (ascending table index)
    pub buses: Vec<usize>,
    /// Bus index to matrix position
    pub pos: HashMap<usize, usize>,
    pub matrix: Vec<Vec<Complex64>>,
    /// In-service lines: `(line table index, admittances)`
    pub lines: Vec<(usize, BranchAdmittance)>,
    /// In-service trafos: `(trafo table index, admittances)`
    pub trafos: Vec<(usize, BranchAdmittance)>,
}

impl YBus {
    pub fn build(net: &Network) -> SbxResult<Self> {
        let buses = net.bus.indices();
        let pos: HashMap<usize, usize> = buses.iter().enumerate().map(|(i, &b)| (b, i)).collect();
        let n = buses.len();
        let mut matrix = vec![vec![Complex64::new(0.0, 0.0); n]; n];
        let mut lines = Vec::new();
        let mut trafos = Vec::new();

        let base_mva = net.sn_mva;

        for (idx, line) in net.line.iter().filter(|(_, l)| l.in_service) {
            let (&i, &j) = match (pos.get(&line.from_bus), pos.get(&line.to_bus)) {
                (Some(i), Some(j)) => (i, j),
                _ => {
                    return Err(SbxError::Structure(format!(
                        "line {idx} references a bus outside the network"
                    )))
                }
            };
            let vn_kv = net
                .bus
                .get(line.from_bus)
                .map(|b| b.vn_kv)
                .unwrap_or_default();
            if vn_kv <= 0.0 {
                return Err(SbxError::Structure(format!(
                    "line {idx} connects to a bus without a voltage base"
                )));
            }
            let z_base = vn_kv * vn_kv / base_mva;
            let parallel = line.parallel.max(1) as f64;
            let r = line.r_ohm_per_km * line.length_km / parallel / z_base;
            let x = line.x_ohm_per_km * line.length_km / parallel / z_base;
            let z = Complex64::new(r, x);
            if z.norm_sqr() < 1e-14 {
                continue;
            }
            let y_series = z.inv();
            // total line charging, per-unit on system base
            let omega = 2.0 * std::f64::consts::PI * net.f_hz;
            let b_shunt =
                omega * line.c_nf_per_km * 1e-9 * line.length_km * parallel * z_base / 2.0;
            let y_shunt = Complex64::new(0.0, b_shunt);

            let adm = BranchAdmittance {
                from: i,
                to: j,
                y_ff: y_series + y_shunt,
                y_ft: -y_series,
                y_tf: -y_series,
                y_tt: y_series + y_shunt,
            };
            stamp(&mut matrix, &adm);
            lines.push((idx, adm));
        }

        for (idx, trafo) in net.trafo.iter().filter(|(_, t)| t.in_service) {
            let (&i, &j) = match (pos.get(&trafo.hv_bus), pos.get(&trafo.lv_bus)) {
                (Some(i), Some(j)) => (i, j),
                _ => {
                    return Err(SbxError::Structure(format!(
                        "trafo {idx} references a bus outside the network"
                    )))
                }
            };
            if trafo.sn_mva <= 0.0 {
                return Err(SbxError::Structure(format!(
                    "trafo {idx} has no rated power"
                )));
            }
            let parallel = trafo.parallel.max(1) as f64;
            // short-circuit impedance from rating base to system base
            let z_k = trafo.vk_percent / 100.0 * base_mva / trafo.sn_mva / parallel;
            let r_k = trafo.vkr_percent / 100.0 * base_mva / trafo.sn_mva / parallel;
            let x_k = (z_k * z_k - r_k * r_k).max(0.0).sqrt();
            let z = Complex64::new(r_k, x_k);
            if z.norm_sqr() < 1e-14 {
                continue;
            }
            let y_series = z.inv();

            let vn_bus_hv = net.bus.get(trafo.hv_bus).map(|b| b.vn_kv).unwrap_or(1.0);
            let vn_bus_lv = net.bus.get(trafo.lv_bus).map(|b| b.vn_kv).unwrap_or(1.0);
            let tap_factor =
                1.0 + f64::from(trafo.tap_pos - trafo.tap_neutral) * trafo.tap_step_percent / 100.0;
            let (hv_tap, lv_tap) = if trafo.tap_side == "lv" {
                (1.0, tap_factor)
            } else {
                (tap_factor, 1.0)
            };
            let ratio =
                (trafo.vn_hv_kv * hv_tap / vn_bus_hv) / (trafo.vn_lv_kv * lv_tap / vn_bus_lv);

            // magnetizing branch at the lv terminal
            let g_m = trafo.pfe_kw / 1000.0 / base_mva * parallel;
            let y_m_mag = trafo.i0_percent / 100.0 * trafo.sn_mva / base_mva * parallel;
            let b_m = -(y_m_mag * y_m_mag - g_m * g_m).max(0.0).sqrt();
            let y_m = Complex64::new(g_m, b_m);

            let adm = BranchAdmittance {
                from: i,
                to: j,
                y_ff: y_series / (ratio * ratio),
                y_ft: -y_series / ratio,
                y_tf: -y_series / ratio,
                y_tt: y_series + y_m,
            };
            stamp(&mut matrix, &adm);
            trafos.push((idx, adm));
        }

        Ok(Self {
            buses,
            pos,
            matrix,
            lines,
            trafos,
        })
    }

    pub fn n(&self) -> usize {
        self.buses.len()
    }
}

fn stamp(matrix: &mut [Vec<Complex64>], adm: &BranchAdmittance) {
    matrix[adm.from][adm.from] += adm.y_ff;
    matrix[adm.from][adm.to] += adm.y_ft;
    matrix[adm.to][adm.from] += adm.y_tf;
    matrix[adm.to][adm.to] += adm.y_tt;
}

#[cfg(test)]
mod tests {
    use super::*;
    use sbx_core::{Bus, Line, Trafo};

    #[test]
    fn test_line_stamping_is_symmetric() {
        let mut net = Network::new("t");
        net.bus.push(Bus {
            vn_kv: 110.0,
            ..Bus::default()
        });
        net.bus.push(Bus {
            vn_kv: 110.0,
            ..Bus::default()
        });
        net.line.push(Line {
            from_bus: 0,
            to_bus: 1,
            length_km: 10.0,
            r_ohm_per_km: 0.1,
            x_ohm_per_km: 0.4,
            ..Line::default()
        });
        let y = YBus::build(&net).unwrap();
        assert_eq!(y.n(), 2);
        assert_eq!(y.lines.len(), 1);
        assert!((y.matrix[0][1] - y.matrix[1][0]).norm() < 1e-12);
        // diagonal dominance for a passive branch
        assert!(y.matrix[0][0].norm() >= y.matrix[0][1].norm());
    }

    #[test]
    fn test_parallel_halves_impedance() {
        let mut net = Network::new("t");
        for _ in 0..2 {
            net.bus.push(Bus {
                vn_kv: 220.0,
                ..Bus::default()
            });
        }
        let mut line = Line {
            from_bus: 0,
            to_bus: 1,
            length_km: 5.0,
            r_ohm_per_km: 0.05,
            x_ohm_per_km: 0.3,
            ..Line::default()
        };
        net.line.push(line.clone());
        let single = YBus::build(&net).unwrap().matrix[0][1];

        line.parallel = 2;
        *net.line.get_mut(0).unwrap() = line;
        let double = YBus::build(&net).unwrap().matrix[0][1];
        assert!((double - single * 2.0).norm() < 1e-9);
    }

    #[test]
    fn test_trafo_without_rating_is_structure_error() {
        let mut net = Network::new("t");
        net.bus.push(Bus {
            vn_kv: 220.0,
            ..Bus::default()
        });
        net.bus.push(Bus {
            vn_kv: 110.0,
            ..Bus::default()
        });
        net.trafo.push(Trafo {
            hv_bus: 0,
            lv_bus: 1,
            sn_mva: 0.0,
            vn_hv_kv: 220.0,
            vn_lv_kv: 110.0,
            ..Trafo::default()
        });
        assert!(matches!(
            YBus::build(&net),
            Err(SbxError::Structure(_))
        ));
    }
}
