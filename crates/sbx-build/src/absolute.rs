//! Absolute-value profiles from per-unit source data.
//!
//! The reference dataset ships dimensionless scaling profiles per
//! element. Absolute time series are those scalings multiplied by the
//! element's rated column value, restricted to elements that exist in
//! both the table and the source frame.

use sbx_core::{ColumnKind, ElementKind, Network, ProfileKey, SbxResult, TableRef};
use sbx_profiles::{ProfileFrame, ProfileSet};
use tracing::debug;

/// Compute absolute profiles from per-unit source profiles.
pub fn absolute_profiles(net: &Network, source: &ProfileSet) -> SbxResult<ProfileSet> {
    let mut absolute = ProfileSet::new();
    for (key, frame) in source.iter() {
        if net.table_len(key.table) == 0 {
            // carry the empty table's index so the key set stays complete
            absolute.insert(*key, ProfileFrame::empty_with_steps(frame.steps()?)?);
            continue;
        }
        let Some(rated) = rated_column(net, key) else {
            debug!("no rated column for source profile {key}, copied as-is");
            absolute.insert(*key, frame.clone());
            continue;
        };
        let steps = frame.steps()?;
        let mut columns = Vec::new();
        for (idx, rating) in rated {
            let Some(scaling) = frame.column_values(idx)? else {
                continue;
            };
            columns.push((idx, scaling.into_iter().map(|s| s * rating).collect()));
        }
        absolute.insert(*key, ProfileFrame::new(steps, columns)?);
    }
    Ok(absolute)
}

/// The rated element values that scale a per-unit profile key.
fn rated_column(net: &Network, key: &ProfileKey) -> Option<Vec<(usize, f64)>> {
    match key.column {
        ColumnKind::PMw | ColumnKind::QMvar => {
            net.read_column(TableRef::Element(key.table), key.column)
        }
        // voltage set-point profiles are already absolute
        ColumnKind::VmPu => None,
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sbx_core::{Bus, Load, Network};

    #[test]
    fn test_scaling_by_rated_power() {
        let mut net = Network::new("t");
        net.bus.push(Bus::default());
        net.load.push(Load {
            bus: 0,
            p_mw: 100.0,
            q_mvar: 20.0,
            ..Load::default()
        });

        let mut source = ProfileSet::new();
        source.insert(
            "load.p_mw".parse().unwrap(),
            ProfileFrame::new(vec![0, 1], vec![(0, vec![0.5, 0.8])]).unwrap(),
        );
        source.insert(
            "load.q_mvar".parse().unwrap(),
            ProfileFrame::new(vec![0, 1], vec![(0, vec![0.5, 0.8])]).unwrap(),
        );

        let abs = absolute_profiles(&net, &source).unwrap();
        let p: ProfileKey = "load.p_mw".parse().unwrap();
        assert_eq!(
            abs.get(&p).unwrap().column_values(0).unwrap().unwrap(),
            vec![50.0, 80.0]
        );
        let q: ProfileKey = "load.q_mvar".parse().unwrap();
        assert_eq!(
            abs.get(&q).unwrap().column_values(0).unwrap().unwrap(),
            vec![10.0, 16.0]
        );
    }

    #[test]
    fn test_empty_table_keeps_index() {
        let net = Network::new("t");
        let mut source = ProfileSet::new();
        source.insert(
            "storage.p_mw".parse().unwrap(),
            ProfileFrame::empty_with_steps(vec![0, 1, 2]).unwrap(),
        );
        let abs = absolute_profiles(&net, &source).unwrap();
        let key: ProfileKey = "storage.p_mw".parse().unwrap();
        assert_eq!(abs.get(&key).unwrap().height(), 3);
        assert_eq!(abs.get(&key).unwrap().n_elements(), 0);
    }

    #[test]
    fn test_unknown_elements_are_dropped() {
        let mut net = Network::new("t");
        net.bus.push(Bus::default());
        net.load.push(Load {
            bus: 0,
            p_mw: 10.0,
            ..Load::default()
        });
        let mut source = ProfileSet::new();
        source.insert(
            "load.p_mw".parse().unwrap(),
            ProfileFrame::new(vec![0], vec![(0, vec![1.0]), (7, vec![1.0])]).unwrap(),
        );
        let abs = absolute_profiles(&net, &source).unwrap();
        let key: ProfileKey = "load.p_mw".parse().unwrap();
        assert_eq!(abs.get(&key).unwrap().element_ids(), vec![0]);
    }
}
