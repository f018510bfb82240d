//! Partitioned parquet folder store.
//!
//! Storage is split into two fixed windows: the first two days of the
//! year (`two_days`, steps 0..192 at 15 min resolution) and the remainder
//! of a 366-day year (`rest_of_the_year`). A reload touches only the
//! partitions intersecting the requested selection, so the common
//! two-day experiments never read the big file set.

use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

use polars::prelude::*;
use sbx_core::{ProfileKey, SbxError, SbxResult};
use tracing::{info, warn};

use crate::frame::{IntoSbx, ProfileFrame, ProfileSet};
use crate::selection::StepSelection;
use crate::store::check_file_existence;

/// Steps covered by the `two_days` partition.
pub const TWO_DAYS_STEPS: i64 = 2 * 96;
/// Steps of a full 366-day year at 15 min resolution.
pub const YEAR_STEPS: i64 = 366 * 96;

fn partitions(base: &Path) -> [(PathBuf, Range<i64>); 2] {
    [
        (base.join("two_days"), 0..TWO_DAYS_STEPS),
        (base.join("rest_of_the_year"), TWO_DAYS_STEPS..YEAR_STEPS),
    ]
}

/// Write every profile frame into both partition folders.
///
/// The folders are wiped and rebuilt. A permission error during the wipe
/// is fatal unless `allow_permission_errors` demotes it to a log line
/// (the store is then left partially rewritten; rerun to recover).
pub fn store_profiles_to_parquet(
    profiles: &ProfileSet,
    folder: &Path,
    allow_permission_errors: bool,
) -> SbxResult<()> {
    for (partition, _) in partitions(folder) {
        match clean_dir(&partition) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::PermissionDenied => {
                if allow_permission_errors {
                    info!("keeping {}: {err}", partition.display());
                } else {
                    return Err(SbxError::Io(err));
                }
            }
            Err(err) => return Err(SbxError::Io(err)),
        }
    }

    for (key, frame) in profiles.iter() {
        for (partition, range) in partitions(folder) {
            let mut slice = frame.select_step_range(range)?.dataframe().clone();
            let path = partition.join(format!("{key}.parquet"));
            let file = fs::File::create(&path)?;
            ParquetWriter::new(file).finish(&mut slice).sbx()?;
        }
    }
    Ok(())
}

fn clean_dir(dir: &Path) -> std::io::Result<()> {
    if dir.exists() {
        if dir.is_dir() {
            fs::remove_dir_all(dir)?;
        } else {
            fs::remove_file(dir)?;
        }
    }
    fs::create_dir_all(dir)
}

/// Load the profile frames intersecting the requested selection.
///
/// Partitions outside the selection are not opened. An explicit step list
/// additionally reduces each loaded frame to exactly those steps.
pub fn load_profiles_from_parquet(
    folder: &Path,
    selection: &StepSelection,
) -> SbxResult<ProfileSet> {
    let mut profiles = ProfileSet::new();
    if selection.is_none() {
        return Ok(profiles);
    }

    let needed: Vec<(PathBuf, Range<i64>)> = partitions(folder)
        .into_iter()
        .filter(|(_, range)| selection.intersects(range.clone()))
        .collect();
    let Some((first, _)) = needed.first() else {
        warn!(
            "no stored partition intersects the requested steps, nothing loaded from {}",
            folder.display()
        );
        return Ok(profiles);
    };

    if !first.is_dir() {
        return Err(SbxError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("profile folder {} does not exist", first.display()),
        )));
    }
    let mut filenames: Vec<String> = fs::read_dir(first)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".parquet"))
        .collect();
    filenames.sort();

    for filename in filenames {
        let key: ProfileKey = filename.trim_end_matches(".parquet").parse()?;
        let mut combined: Option<ProfileFrame> = None;
        for (partition, _) in &needed {
            let path = partition.join(&filename);
            let file = check_file_existence(&path)?;
            let df = ParquetReader::new(file).finish().sbx()?;
            let frame = ProfileFrame::from_dataframe(df)?;
            match combined.as_mut() {
                Some(acc) => acc.append_rows(&frame)?,
                None => combined = Some(frame),
            }
        }
        if let Some(frame) = combined {
            profiles.insert(key, frame);
        }
    }

    if let Some(steps) = selection.explicit_sorted() {
        profiles.reduce_by_steps(&steps.into_iter().collect())?;
    }
    Ok(profiles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sbx_core::{ColumnKind, ElementKind};

    fn key(s: &str) -> ProfileKey {
        s.parse().unwrap()
    }

    fn sample_profiles() -> ProfileSet {
        // four steps in the two_days window, two beyond it
        let steps: Vec<i64> = vec![0, 1, 2, 3, 200, 201];
        let mut set = ProfileSet::new();
        set.insert(
            key("load.p_mw"),
            ProfileFrame::new(
                steps.clone(),
                vec![
                    (0, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
                    (3, vec![0.5, 0.5, 0.5, 0.5, 0.5, 0.5]),
                ],
            )
            .unwrap(),
        );
        set.insert(
            key("sgen.p_mw"),
            ProfileFrame::new(steps, vec![(1, vec![9.0, 8.0, 7.0, 6.0, 5.0, 4.0])]).unwrap(),
        );
        set
    }

    #[test]
    fn test_roundtrip_all_steps() {
        let dir = tempfile::tempdir().unwrap();
        let profiles = sample_profiles();
        store_profiles_to_parquet(&profiles, dir.path(), false).unwrap();
        let loaded = load_profiles_from_parquet(dir.path(), &StepSelection::All).unwrap();
        assert_eq!(loaded, profiles);
    }

    #[test]
    fn test_partial_reload_touches_only_two_days() {
        let dir = tempfile::tempdir().unwrap();
        store_profiles_to_parquet(&sample_profiles(), dir.path(), false).unwrap();
        // make the big partition unreadable by deleting it; a selection
        // inside the first window must not notice
        fs::remove_dir_all(dir.path().join("rest_of_the_year")).unwrap();
        let selection = StepSelection::Steps(vec![1, 3]);
        let loaded = load_profiles_from_parquet(dir.path(), &selection).unwrap();
        let frame = loaded
            .get(&ProfileKey::new(ElementKind::Load, ColumnKind::PMw))
            .unwrap();
        assert_eq!(frame.steps().unwrap(), vec![1, 3]);
        assert_eq!(frame.column_values(0).unwrap().unwrap(), vec![2.0, 4.0]);
    }

    #[test]
    fn test_selection_spanning_both_partitions() {
        let dir = tempfile::tempdir().unwrap();
        store_profiles_to_parquet(&sample_profiles(), dir.path(), false).unwrap();
        let loaded =
            load_profiles_from_parquet(dir.path(), &StepSelection::Steps(vec![0, 200])).unwrap();
        let frame = loaded.get(&key("sgen.p_mw")).unwrap();
        assert_eq!(frame.steps().unwrap(), vec![0, 200]);
        assert_eq!(frame.column_values(1).unwrap().unwrap(), vec![9.0, 5.0]);
    }

    #[test]
    fn test_missing_folder_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = load_profiles_from_parquet(&missing, &StepSelection::All).unwrap_err();
        assert!(matches!(err, SbxError::Io(_)));
    }

    #[test]
    fn test_none_selection_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_profiles_from_parquet(dir.path(), &StepSelection::None).unwrap();
        assert!(loaded.is_empty());
    }
}
