//! Value injection: write one time step of profile data into the
//! network's element tables.

use sbx_core::{Network, SbxError, SbxResult};
use sbx_profiles::{ContainerStore, ProfileSet};
use tracing::debug;

/// How profile rows are matched against table rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InjectMode {
    /// Overwrite the whole column from the profile row
    #[default]
    Full,
    /// Overwrite only elements present in both table and profile
    /// (used when profile coverage is partial)
    Intersection,
}

/// Set the values of `step` from a profile set into the network.
///
/// Keys whose target table is empty are skipped. A key that carries rows
/// but not the requested step is a data error naming both.
pub fn set_time_step(
    net: &mut Network,
    step: i64,
    profiles: &ProfileSet,
    mode: InjectMode,
) -> SbxResult<()> {
    for (key, frame) in profiles.iter() {
        if net.table_len(key.table) == 0 || frame.height() == 0 {
            continue;
        }
        let row = frame.row_at_step(step)?.ok_or_else(|| {
            SbxError::Data(format!(
                "time step {step} is missing from the '{key}' profile"
            ))
        })?;
        write_row(net, key, &row, mode);
    }
    Ok(())
}

/// Set the values of `step` from an open container store.
///
/// The ranged read of the container verifies that the stored index agrees
/// with the requested step and fails otherwise.
pub fn set_time_step_from_container(
    net: &mut Network,
    step: i64,
    store: &mut ContainerStore,
    mode: InjectMode,
) -> SbxResult<()> {
    for key in store.keys()? {
        if net.table_len(key.table) == 0 {
            continue;
        }
        let row = store.read_step_row(&key, step)?;
        write_row(net, &key, &row, mode);
    }
    Ok(())
}

fn write_row(
    net: &mut Network,
    key: &sbx_core::ProfileKey,
    row: &[(usize, f64)],
    mode: InjectMode,
) {
    let values: Vec<(usize, f64)> = match mode {
        InjectMode::Full => row.to_vec(),
        InjectMode::Intersection => {
            let indices = net.table_indices(key.table);
            row.iter()
                .filter(|(idx, _)| indices.contains(idx))
                .copied()
                .collect()
        }
    };
    if !net.write_column(key.table, key.column, &values) {
        debug!("profile key {key} does not map to a writable column, skipped");
    }
}
