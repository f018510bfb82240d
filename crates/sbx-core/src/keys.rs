//! Typed identifiers for element tables, columns and profile keys.
//!
//! The source dataset addresses time-series data with string keys such as
//! `"load.p_mw"` or `"res_line/p_from_mw"`. Here that key space is closed:
//! a [`ProfileKey`] is an element table plus a column, and a [`TableRef`]
//! additionally distinguishes result tables. Unknown strings are parse
//! errors instead of silent typos.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SbxError;

/// The element tables of a [`crate::Network`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Bus,
    Load,
    Sgen,
    Gen,
    ExtGrid,
    Line,
    Trafo,
    Storage,
}

impl ElementKind {
    /// All element tables, in snapshot order.
    pub fn all() -> &'static [ElementKind] {
        use ElementKind::*;
        &[Bus, Load, Sgen, Gen, ExtGrid, Line, Trafo, Storage]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ElementKind::Bus => "bus",
            ElementKind::Load => "load",
            ElementKind::Sgen => "sgen",
            ElementKind::Gen => "gen",
            ElementKind::ExtGrid => "ext_grid",
            ElementKind::Line => "line",
            ElementKind::Trafo => "trafo",
            ElementKind::Storage => "storage",
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ElementKind {
    type Err = SbxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "bus" => ElementKind::Bus,
            "load" => ElementKind::Load,
            "sgen" => ElementKind::Sgen,
            "gen" => ElementKind::Gen,
            "ext_grid" => ElementKind::ExtGrid,
            "line" => ElementKind::Line,
            "trafo" => ElementKind::Trafo,
            "storage" => ElementKind::Storage,
            other => return Err(SbxError::Parse(format!("unknown element table '{other}'"))),
        })
    }
}

/// Numeric columns addressed by profiles and output collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    PMw,
    QMvar,
    VmPu,
    VaDegree,
    TapPos,
    LoadingPercent,
    PFromMw,
    QFromMvar,
    PToMw,
    QToMvar,
    PHvMw,
    QHvMvar,
    PLvMw,
    QLvMvar,
    PlMw,
    QlMvar,
    IFromKa,
    IToKa,
    IHvKa,
    ILvKa,
}

impl ColumnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnKind::PMw => "p_mw",
            ColumnKind::QMvar => "q_mvar",
            ColumnKind::VmPu => "vm_pu",
            ColumnKind::VaDegree => "va_degree",
            ColumnKind::TapPos => "tap_pos",
            ColumnKind::LoadingPercent => "loading_percent",
            ColumnKind::PFromMw => "p_from_mw",
            ColumnKind::QFromMvar => "q_from_mvar",
            ColumnKind::PToMw => "p_to_mw",
            ColumnKind::QToMvar => "q_to_mvar",
            ColumnKind::PHvMw => "p_hv_mw",
            ColumnKind::QHvMvar => "q_hv_mvar",
            ColumnKind::PLvMw => "p_lv_mw",
            ColumnKind::QLvMvar => "q_lv_mvar",
            ColumnKind::PlMw => "pl_mw",
            ColumnKind::QlMvar => "ql_mvar",
            ColumnKind::IFromKa => "i_from_ka",
            ColumnKind::IToKa => "i_to_ka",
            ColumnKind::IHvKa => "i_hv_ka",
            ColumnKind::ILvKa => "i_lv_ka",
        }
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnKind {
    type Err = SbxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "p_mw" => ColumnKind::PMw,
            "q_mvar" => ColumnKind::QMvar,
            "vm_pu" => ColumnKind::VmPu,
            "va_degree" => ColumnKind::VaDegree,
            "tap_pos" => ColumnKind::TapPos,
            "loading_percent" => ColumnKind::LoadingPercent,
            "p_from_mw" => ColumnKind::PFromMw,
            "q_from_mvar" => ColumnKind::QFromMvar,
            "p_to_mw" => ColumnKind::PToMw,
            "q_to_mvar" => ColumnKind::QToMvar,
            "p_hv_mw" => ColumnKind::PHvMw,
            "q_hv_mvar" => ColumnKind::QHvMvar,
            "p_lv_mw" => ColumnKind::PLvMw,
            "q_lv_mvar" => ColumnKind::QLvMvar,
            "pl_mw" => ColumnKind::PlMw,
            "ql_mvar" => ColumnKind::QlMvar,
            "i_from_ka" => ColumnKind::IFromKa,
            "i_to_ka" => ColumnKind::IToKa,
            "i_hv_ka" => ColumnKind::IHvKa,
            "i_lv_ka" => ColumnKind::ILvKa,
            other => return Err(SbxError::Parse(format!("unknown column '{other}'"))),
        })
    }
}

/// An element table or its power-flow result table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TableRef {
    Element(ElementKind),
    Res(ElementKind),
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableRef::Element(kind) => write!(f, "{kind}"),
            TableRef::Res(kind) => write!(f, "res_{kind}"),
        }
    }
}

impl FromStr for TableRef {
    type Err = SbxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.strip_prefix("res_") {
            Some(rest) => Ok(TableRef::Res(rest.parse()?)),
            None => Ok(TableRef::Element(s.parse()?)),
        }
    }
}

/// A time-series profile key: element table plus column.
///
/// Accepts the `.` and `/` separated spellings of the source data
/// (`"load.p_mw"`, `"/load/p_mw"`), always prints the dotted form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProfileKey {
    pub table: ElementKind,
    pub column: ColumnKind,
}

impl ProfileKey {
    pub fn new(table: ElementKind, column: ColumnKind) -> Self {
        Self { table, column }
    }
}

impl fmt::Display for ProfileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

impl FromStr for ProfileKey {
    type Err = SbxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.strip_prefix('/').unwrap_or(s);
        let (table, column) = trimmed
            .split_once('.')
            .or_else(|| trimmed.split_once('/'))
            .ok_or_else(|| {
                SbxError::Parse(format!(
                    "profile key '{s}' is not of the form '<table>.<column>'"
                ))
            })?;
        Ok(Self {
            table: table.parse()?,
            column: column.parse()?,
        })
    }
}

/// A runner output key: a [`TableRef`] plus column, e.g. `res_line.pl_mw`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResultKey {
    pub table: TableRef,
    pub column: ColumnKind,
}

impl ResultKey {
    pub fn new(table: TableRef, column: ColumnKind) -> Self {
        Self { table, column }
    }

    pub fn res(kind: ElementKind, column: ColumnKind) -> Self {
        Self::new(TableRef::Res(kind), column)
    }

    pub fn element(kind: ElementKind, column: ColumnKind) -> Self {
        Self::new(TableRef::Element(kind), column)
    }
}

impl fmt::Display for ResultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

impl FromStr for ResultKey {
    type Err = SbxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.strip_prefix('/').unwrap_or(s);
        let (table, column) = trimmed
            .split_once('.')
            .or_else(|| trimmed.split_once('/'))
            .ok_or_else(|| {
                SbxError::Parse(format!(
                    "result key '{s}' is not of the form '<table>.<column>'"
                ))
            })?;
        Ok(Self {
            table: table.parse()?,
            column: column.parse()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_key_roundtrip() {
        let key: ProfileKey = "load.p_mw".parse().unwrap();
        assert_eq!(key.table, ElementKind::Load);
        assert_eq!(key.column, ColumnKind::PMw);
        assert_eq!(key.to_string(), "load.p_mw");
    }

    #[test]
    fn test_profile_key_slash_form() {
        let key: ProfileKey = "/gen/vm_pu".parse().unwrap();
        assert_eq!(key.to_string(), "gen.vm_pu");
    }

    #[test]
    fn test_result_key_res_prefix() {
        let key: ResultKey = "res_line.p_from_mw".parse().unwrap();
        assert_eq!(key.table, TableRef::Res(ElementKind::Line));
        assert_eq!(key.to_string(), "res_line.p_from_mw");

        let plain: ResultKey = "trafo.tap_pos".parse().unwrap();
        assert_eq!(plain.table, TableRef::Element(ElementKind::Trafo));
    }

    #[test]
    fn test_unknown_key_is_parse_error() {
        assert!("shunt.p_mw".parse::<ProfileKey>().is_err());
        assert!("load.p_kw".parse::<ProfileKey>().is_err());
        assert!("loadp_mw".parse::<ProfileKey>().is_err());
    }
}
