//! Reactive-capability data of the German grid codes VDE AR-N 4120 (HV)
//! and AR-N 4130 (EHV).
//!
//! Connected generation units owe the operator a reactive band that
//! depends on their active output. Near zero output the band collapses;
//! from 20% of rated power on, the full band applies. The code defines
//! three variants of that Q(P) curve plus absolute Q/P bounds per
//! connection level; which variant applies is a property of the unit.

use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::SbxError;

/// Connection-level family of a reactive-capability curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QCurveFamily {
    /// AR-N 4120, 110 kV connections
    V4120,
    /// AR-N 4130, 220 kV connections
    V4130_220,
    /// AR-N 4130, 380 kV connections
    V4130_380,
}

/// Curve variant within a family (the code offers three).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CurveVariant {
    V1,
    V2,
    V3,
}

impl CurveVariant {
    pub fn index(&self) -> usize {
        match self {
            CurveVariant::V1 => 0,
            CurveVariant::V2 => 1,
            CurveVariant::V3 => 2,
        }
    }

    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(CurveVariant::V1),
            2 => Some(CurveVariant::V2),
            3 => Some(CurveVariant::V3),
            _ => None,
        }
    }
}

/// A unit's reactive-capability curve tag, e.g. `4130_220_v2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QCurveTag {
    pub family: QCurveFamily,
    pub variant: CurveVariant,
}

impl QCurveTag {
    pub fn new(family: QCurveFamily, variant: CurveVariant) -> Self {
        Self { family, variant }
    }
}

impl fmt::Display for QCurveTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let family = match self.family {
            QCurveFamily::V4120 => "4120",
            QCurveFamily::V4130_220 => "4130_220",
            QCurveFamily::V4130_380 => "4130_380",
        };
        let variant = match self.variant {
            CurveVariant::V1 => "v1",
            CurveVariant::V2 => "v2",
            CurveVariant::V3 => "v3",
        };
        write!(f, "{family}_{variant}")
    }
}

impl FromStr for QCurveTag {
    type Err = SbxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // legacy purely numeric tags from older dataset revisions
        if let Ok(n) = s.parse::<u8>() {
            let (family, variant) = match n {
                7..=9 => (QCurveFamily::V4120, n - 6),
                10..=12 => (QCurveFamily::V4130_220, n - 9),
                _ => {
                    return Err(SbxError::Parse(format!(
                        "unknown numeric q-curve tag '{s}'"
                    )))
                }
            };
            return Ok(Self::new(family, CurveVariant::from_number(variant).unwrap()));
        }
        let (family_str, variant_str) = s
            .rsplit_once("_v")
            .ok_or_else(|| SbxError::Parse(format!("unknown q-curve tag '{s}'")))?;
        let family = match family_str {
            "4120" => QCurveFamily::V4120,
            "4130_220" => QCurveFamily::V4130_220,
            "4130_380" => QCurveFamily::V4130_380,
            other => return Err(SbxError::Parse(format!("unknown q-curve family '{other}'"))),
        };
        let variant = variant_str
            .parse::<u8>()
            .ok()
            .and_then(CurveVariant::from_number)
            .ok_or_else(|| SbxError::Parse(format!("unknown q-curve variant in '{s}'")))?;
        Ok(Self::new(family, variant))
    }
}

impl Serialize for QCurveTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for QCurveTag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Revision year of the grid code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VdeVersion {
    V2015,
    V2018,
}

impl VdeVersion {
    pub fn from_year(year: u16) -> Option<Self> {
        match year {
            2015 => Some(VdeVersion::V2015),
            2018 => Some(VdeVersion::V2018),
            _ => None,
        }
    }
}

/// Which side of the reactive band is being computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QBound {
    Max,
    Min,
}

/// P/Sn knots of the Q(P) curve ("Handtuch" shape).
pub fn handtuch_x(version: VdeVersion) -> [f64; 3] {
    match version {
        VdeVersion::V2015 => [0.0, 0.1, 0.2],
        VdeVersion::V2018 => [0.0, 0.05, 0.2],
    }
}

/// Q/Sn knots of the Q(P) curve for a bound side and variant.
pub fn handtuch_y(bound: QBound, variant: CurveVariant) -> [f64; 3] {
    let y_end = match bound {
        QBound::Max => [0.484322, 0.410775, 0.328684],
        QBound::Min => [0.227902, 0.328684, 0.410775],
    }[variant.index()];
    [0.0, 0.1, y_end]
}

/// Absolute Q/P bounds of a curve tag: `(min, max)` as fractions of P.
///
/// The values depend only on the variant; families differ in which units
/// they apply to, not in the band itself.
pub fn q_over_p_bounds(tag: QCurveTag) -> (f64, f64) {
    match tag.variant {
        CurveVariant::V1 => (-0.227902, 0.484322),
        CurveVariant::V2 => (-0.328684, 0.410775),
        CurveVariant::V3 => (-0.410775, 0.328684),
    }
}

/// Piecewise-linear interpolation with end clamping over sorted knots.
pub fn interp(x: f64, xs: &[f64], ys: &[f64]) -> f64 {
    debug_assert_eq!(xs.len(), ys.len());
    if xs.is_empty() {
        return f64::NAN;
    }
    if x <= xs[0] {
        return ys[0];
    }
    if x >= xs[xs.len() - 1] {
        return ys[ys.len() - 1];
    }
    for w in 0..xs.len() - 1 {
        if x >= xs[w] && x <= xs[w + 1] {
            let t = (x - xs[w]) / (xs[w + 1] - xs[w]);
            return ys[w] + t * (ys[w + 1] - ys[w]);
        }
    }
    ys[ys.len() - 1]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_roundtrip() {
        for s in ["4120_v2", "4130_220_v1", "4130_380_v3"] {
            let tag: QCurveTag = s.parse().unwrap();
            assert_eq!(tag.to_string(), s);
        }
    }

    #[test]
    fn test_legacy_numeric_tags() {
        let tag: QCurveTag = "8".parse().unwrap();
        assert_eq!(tag.variant, CurveVariant::V2);
        let tag: QCurveTag = "12".parse().unwrap();
        assert_eq!(tag.variant, CurveVariant::V3);
        assert!("13".parse::<QCurveTag>().is_err());
    }

    #[test]
    fn test_handtuch_clamps_at_full_band() {
        let xs = handtuch_x(VdeVersion::V2018);
        let ys = handtuch_y(QBound::Max, CurveVariant::V2);
        // above 20% rated power the full band applies
        assert!((interp(0.5, &xs, &ys) - 0.410775).abs() < 1e-12);
        // at zero output the band is closed
        assert_eq!(interp(0.0, &xs, &ys), 0.0);
        // in between the band opens linearly
        let mid = interp(0.125, &xs, &ys);
        assert!(mid > 0.1 && mid < 0.410775);
    }

    #[test]
    fn test_bounds_mirror_between_variants() {
        let v2 = q_over_p_bounds(QCurveTag::new(QCurveFamily::V4120, CurveVariant::V2));
        let v3 = q_over_p_bounds(QCurveTag::new(QCurveFamily::V4120, CurveVariant::V3));
        // underexcited band of one variant equals the overexcited band of the next
        assert!((v2.0 + v3.1).abs() < 1e-12);
        assert!((v3.0 + v2.1).abs() < 1e-12);
    }
}
