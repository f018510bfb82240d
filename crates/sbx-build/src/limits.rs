//! Reactive-power limits of static generators per VDE AR-N 4120/4130.
//!
//! The Q(V) dependency itself is handled by the controllers; here only
//! the outer Q band is written into the limit columns, from the Q(P)
//! curve of the unit's variant intersected with the absolute Q/P bounds
//! of its curve tag.

use sbx_core::vde::{handtuch_x, handtuch_y, interp, q_over_p_bounds, CurveVariant, QBound, VdeVersion};
use sbx_core::{ColumnKind, ElementKind, Network, ProfileKey, SbxError, SbxResult};
use sbx_profiles::ProfileSet;

/// Bounds within this distance of zero are floored to the epsilon so no
/// unit ends up with a degenerate zero-width feasible band.
const Q_EPS: f64 = 1e-5;

#[derive(Debug, Clone)]
pub struct SgenLimitOptions {
    /// 0 selects the variant per unit from its curve tag; 1..3 force one
    pub variant: u8,
    /// Grid-code revision year (2015 or 2018)
    pub version: u16,
    /// Active power is not an optimization variable; the upper bound may
    /// sit loosely above the operating point
    pub fixed_p: bool,
    /// Margin on the upper bound when `fixed_p` is off
    pub p_margin: f64,
    pub drop_q_curve_column: bool,
    /// Clamp the current reactive set-point into the new band
    pub set_to_limits: bool,
}

impl Default for SgenLimitOptions {
    fn default() -> Self {
        Self {
            variant: 0,
            version: 2018,
            fixed_p: true,
            p_margin: 0.0,
            drop_q_curve_column: false,
            set_to_limits: true,
        }
    }
}

/// Write `min/max_p_mw` and `min/max_q_mvar` of every static generator.
///
/// Returns the maximum adjustment applied to any unit's reactive
/// set-point (zero unless `set_to_limits` moved one).
pub fn set_sgen_limits(
    net: &mut Network,
    profiles: Option<&ProfileSet>,
    opts: &SgenLimitOptions,
) -> SbxResult<f64> {
    let version = VdeVersion::from_year(opts.version).ok_or_else(|| {
        SbxError::Config(format!("VDE version {} is not supported", opts.version))
    })?;
    let forced_variant = match opts.variant {
        0 => None,
        1..=3 => Some(CurveVariant::from_number(opts.variant).expect("checked range")),
        other => {
            return Err(SbxError::Config(format!(
                "sgen limit variant {other} is not implemented"
            )))
        }
    };
    if forced_variant.is_none()
        && !net.sgen.is_empty()
        && net.sgen.iter().all(|(_, s)| s.q_curve.is_none())
    {
        return Err(SbxError::Config(
            "variant 0 needs q-curve tags, but no sgen carries one".into(),
        ));
    }

    // profile maxima of the active power, if a profile set is available
    let p_key = ProfileKey::new(ElementKind::Sgen, ColumnKind::PMw);
    let profile_frame = profiles.and_then(|p| p.get(&p_key));

    // NOTE: the 2x bound below is a deliberately loose cap, not a
    // physical limit; with fixed p the solver only needs max_p to stay
    // clear of the operating point.
    let indices = net.sgen.indices();
    let mut max_q_adaption = 0.0_f64;
    for idx in indices {
        let profile_max = match profile_frame {
            Some(frame) => frame
                .column_values(idx)?
                .map(|values| values.into_iter().fold(f64::NEG_INFINITY, f64::max)),
            None => None,
        };
        let sgen = net.sgen.get_mut(idx).expect("index just listed");

        sgen.min_p_mw = Some(0.0);
        sgen.max_p_mw = Some(if opts.fixed_p {
            match profile_max {
                Some(max) if max.is_finite() => sgen.max_p_mw.unwrap_or(f64::NEG_INFINITY).max(max),
                _ => 2.0 * sgen.p_mw,
            }
        } else {
            sgen.p_mw + opts.p_margin
        });

        let variant = match forced_variant {
            Some(v) => v,
            None => match sgen.q_curve {
                Some(tag) => tag.variant,
                None => continue,
            },
        };

        // Q(P) band from the variant's curve
        let xs = handtuch_x(version);
        let ratio = if sgen.sn_mva > 0.0 {
            sgen.p_mw / sgen.sn_mva
        } else {
            f64::NAN
        };
        let band = |bound: QBound| -> f64 {
            let value = interp(ratio, &xs, &handtuch_y(bound, variant)) * sgen.sn_mva;
            if !value.is_finite() || value.abs() < Q_EPS {
                Q_EPS
            } else {
                value
            }
        };
        let mut max_q = band(QBound::Max);
        let mut min_q = -band(QBound::Min);

        // intersect with the absolute Q/P bounds of the curve tag
        if let Some(tag) = sgen.q_curve {
            let (lo, hi) = q_over_p_bounds(tag);
            min_q = min_q.max(lo * sgen.p_mw);
            max_q = max_q.min(hi * sgen.p_mw);
        }
        if max_q.abs() < Q_EPS {
            max_q = Q_EPS;
        }
        if min_q.abs() < Q_EPS {
            min_q = -Q_EPS;
        }
        sgen.min_q_mvar = Some(min_q);
        sgen.max_q_mvar = Some(max_q);

        if opts.set_to_limits {
            let clamped = sgen.q_mvar.clamp(min_q, max_q);
            max_q_adaption = max_q_adaption.max((sgen.q_mvar - clamped).abs());
            sgen.q_mvar = clamped;
        }
        if opts.drop_q_curve_column {
            sgen.q_curve = None;
        }
    }
    Ok(max_q_adaption)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sbx_core::{Bus, QCurveFamily, QCurveTag, Sgen};

    fn net_with_sgens() -> Network {
        let mut net = Network::new("t");
        net.bus.push(Bus {
            vn_kv: 110.0,
            ..Bus::default()
        });
        for (p, q, sn) in [(80.0, 0.0, 100.0), (0.0, 0.0, 50.0), (10.0, 30.0, 40.0)] {
            net.sgen.push(Sgen {
                bus: 0,
                p_mw: p,
                q_mvar: q,
                sn_mva: sn,
                controllable: true,
                q_curve: Some(QCurveTag::new(QCurveFamily::V4120, CurveVariant::V2)),
                ..Sgen::default()
            });
        }
        net
    }

    #[test]
    fn test_band_is_never_degenerate() {
        let mut net = net_with_sgens();
        set_sgen_limits(&mut net, None, &SgenLimitOptions::default()).unwrap();
        for (_, sgen) in net.sgen.iter() {
            let (min_q, max_q) = (sgen.min_q_mvar.unwrap(), sgen.max_q_mvar.unwrap());
            assert!(max_q > min_q, "inverted band: [{min_q}, {max_q}]");
            assert!(max_q >= Q_EPS);
            assert!(min_q <= -Q_EPS + 1e-12);
        }
        // the zero-output unit gets the epsilon band, not a collapsed one
        let idle = net.sgen.get(1).unwrap();
        assert_eq!(idle.max_q_mvar.unwrap(), Q_EPS);
        assert_eq!(idle.min_q_mvar.unwrap(), -Q_EPS);
    }

    #[test]
    fn test_full_output_gets_full_band() {
        let mut net = net_with_sgens();
        set_sgen_limits(&mut net, None, &SgenLimitOptions::default()).unwrap();
        let unit = net.sgen.get(0).unwrap();
        // p/sn = 0.8 is beyond the 20% knee: variant 2 band applies,
        // intersected with the absolute bound 0.410775 * p
        let expected_max = (0.410775_f64 * 100.0).min(0.410775 * 80.0);
        assert!((unit.max_q_mvar.unwrap() - expected_max).abs() < 1e-6);
    }

    #[test]
    fn test_fixed_p_doubles_without_profile() {
        let mut net = net_with_sgens();
        set_sgen_limits(&mut net, None, &SgenLimitOptions::default()).unwrap();
        assert_eq!(net.sgen.get(0).unwrap().max_p_mw, Some(160.0));
    }

    #[test]
    fn test_profile_maximum_raises_p_bound() {
        use sbx_profiles::ProfileFrame;
        let mut net = net_with_sgens();
        let mut profiles = ProfileSet::new();
        profiles.insert(
            ProfileKey::new(ElementKind::Sgen, ColumnKind::PMw),
            ProfileFrame::new(vec![0, 1], vec![(0, vec![95.0, 99.5])]).unwrap(),
        );
        set_sgen_limits(&mut net, Some(&profiles), &SgenLimitOptions::default()).unwrap();
        assert_eq!(net.sgen.get(0).unwrap().max_p_mw, Some(99.5));
        // units without a profile column fall back to the loose bound
        assert_eq!(net.sgen.get(2).unwrap().max_p_mw, Some(20.0));
    }

    #[test]
    fn test_set_to_limits_reports_adjustment() {
        let mut net = net_with_sgens();
        // unit 2 has q = 30 at p = 10: far outside any band
        let adaption =
            set_sgen_limits(&mut net, None, &SgenLimitOptions::default()).unwrap();
        assert!(adaption > 0.0);
        let unit = net.sgen.get(2).unwrap();
        assert!(unit.q_mvar <= unit.max_q_mvar.unwrap());
    }

    #[test]
    fn test_unknown_variant_is_config_error() {
        let mut net = net_with_sgens();
        let err = set_sgen_limits(
            &mut net,
            None,
            &SgenLimitOptions {
                variant: 4,
                ..SgenLimitOptions::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, SbxError::Config(_)));
    }

    #[test]
    fn test_2015_knots_open_the_band_later() {
        let mut net_2018 = net_with_sgens();
        let mut net_2015 = net_with_sgens();
        // p/sn = 0.075 sits between the 2018 knee (0.05) and 2015's (0.1)
        for net in [&mut net_2018, &mut net_2015] {
            net.sgen.get_mut(0).unwrap().p_mw = 7.5;
        }
        set_sgen_limits(&mut net_2018, None, &SgenLimitOptions::default()).unwrap();
        set_sgen_limits(
            &mut net_2015,
            None,
            &SgenLimitOptions {
                version: 2015,
                ..SgenLimitOptions::default()
            },
        )
        .unwrap();
        assert!(
            net_2018.sgen.get(0).unwrap().max_q_mvar.unwrap()
                > net_2015.sgen.get(0).unwrap().max_q_mvar.unwrap()
        );
    }
}
