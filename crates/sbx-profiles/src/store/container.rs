//! Single-file container store.
//!
//! One zip archive holds a parquet sub-table per profile key under the
//! entry path `{table}/{column}.parquet`. Keys can be listed and read
//! individually, and a read can be restricted to a positional row range,
//! so a single time step never pulls the rest of the archive through
//! memory decompression.

use std::io::{Cursor, Read, Write};
use std::path::Path;

use polars::prelude::*;
use sbx_core::{ProfileKey, SbxError, SbxResult};
use ::zip::write::FileOptions;
use ::zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::frame::{IntoSbx, ProfileFrame, ProfileSet};
use crate::selection::StepSelection;
use crate::store::check_file_existence;

fn entry_name(key: &ProfileKey) -> String {
    format!("{}/{}.parquet", key.table, key.column)
}

/// Write a profile set into a single container file.
pub fn store_profiles_to_container(profiles: &ProfileSet, file: &Path) -> SbxResult<()> {
    let out = std::fs::File::create(file)?;
    let mut zip = ZipWriter::new(out);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for (key, frame) in profiles.iter() {
        let mut df = frame.dataframe().clone();
        let mut bytes = Cursor::new(Vec::new());
        ParquetWriter::new(&mut bytes).finish(&mut df).sbx()?;
        zip.start_file(entry_name(key), options)
            .map_err(|e| SbxError::Other(e.to_string()))?;
        zip.write_all(bytes.get_ref())?;
    }
    zip.finish().map_err(|e| SbxError::Other(e.to_string()))?;
    Ok(())
}

/// An open container file with per-key random access.
#[derive(Debug)]
pub struct ContainerStore {
    archive: ZipArchive<std::fs::File>,
}

impl ContainerStore {
    /// Open a container, verifying existence and readability first.
    pub fn open(path: &Path) -> SbxResult<Self> {
        let file = check_file_existence(path)?;
        let archive = ZipArchive::new(file).map_err(|e| SbxError::Other(e.to_string()))?;
        Ok(Self { archive })
    }

    /// All profile keys stored in the container, sorted.
    pub fn keys(&self) -> SbxResult<Vec<ProfileKey>> {
        let mut keys = Vec::new();
        for name in self.archive.file_names() {
            let trimmed = name.trim_end_matches(".parquet");
            keys.push(trimmed.parse()?);
        }
        keys.sort();
        Ok(keys)
    }

    fn read_entry(&mut self, key: &ProfileKey) -> SbxResult<ProfileFrame> {
        let name = entry_name(key);
        let mut entry = self
            .archive
            .by_name(&name)
            .map_err(|_| SbxError::Data(format!("container has no sub-table for key '{key}'")))?;
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut bytes)?;
        let df = ParquetReader::new(Cursor::new(bytes)).finish().sbx()?;
        ProfileFrame::from_dataframe(df)
    }

    /// Read one key's full frame.
    pub fn read_key(&mut self, key: &ProfileKey) -> SbxResult<ProfileFrame> {
        self.read_entry(key)
    }

    /// Read one key's frame restricted to a positional row range.
    pub fn read_rows(&mut self, key: &ProfileKey, start: i64, stop: i64) -> SbxResult<ProfileFrame> {
        let frame = self.read_entry(key)?;
        let df = frame
            .dataframe()
            .slice(start, (stop - start).max(0) as usize);
        ProfileFrame::from_dataframe(df)
    }

    /// Read the row of `step`, taken positionally and verified.
    ///
    /// A step that does not sit at its own position in the stored index
    /// means the container was stored with a foreign index; that is a data
    /// error, not something to paper over.
    pub fn read_step_row(&mut self, key: &ProfileKey, step: i64) -> SbxResult<Vec<(usize, f64)>> {
        let frame = self.read_rows(key, step, step + 1)?;
        let steps = frame.steps()?;
        match steps.first() {
            Some(&found) if found == step => Ok(frame
                .row_at_step(step)?
                .expect("step verified present above")),
            Some(&found) => Err(SbxError::Data(format!(
                "row {step} of the '{key}' sub-table has index {found}, expected {step}"
            ))),
            None => Err(SbxError::Data(format!(
                "time step {step} is missing from the '{key}' sub-table"
            ))),
        }
    }

    /// Read every key, honoring the step selection.
    pub fn read_all(&mut self, selection: &StepSelection) -> SbxResult<ProfileSet> {
        let mut profiles = ProfileSet::new();
        if selection.is_none() {
            return Ok(profiles);
        }
        let steps = selection.explicit_sorted();
        for key in self.keys()? {
            let frame = match &steps {
                None => self.read_key(&key)?,
                Some(sorted) => {
                    let (first, last) = match (sorted.first(), sorted.last()) {
                        (Some(&f), Some(&l)) => (f, l),
                        _ => continue,
                    };
                    let window = self.read_rows(&key, first, last + 1)?;
                    window.select_steps(&sorted.iter().copied().collect())?
                }
            };
            profiles.insert(key, frame);
        }
        Ok(profiles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> ProfileKey {
        s.parse().unwrap()
    }

    fn sample_profiles() -> ProfileSet {
        let steps: Vec<i64> = (0..6).collect();
        let mut set = ProfileSet::new();
        set.insert(
            key("load.p_mw"),
            ProfileFrame::new(
                steps.clone(),
                vec![(2, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])],
            )
            .unwrap(),
        );
        set.insert(
            key("gen.vm_pu"),
            ProfileFrame::new(steps, vec![(0, vec![1.01; 6]), (4, vec![1.02; 6])]).unwrap(),
        );
        set
    }

    #[test]
    fn test_roundtrip_full() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.zip");
        let profiles = sample_profiles();
        store_profiles_to_container(&profiles, &path).unwrap();

        let mut store = ContainerStore::open(&path).unwrap();
        assert_eq!(
            store.keys().unwrap(),
            vec![key("load.p_mw"), key("gen.vm_pu")]
        );
        let loaded = store.read_all(&StepSelection::All).unwrap();
        assert_eq!(loaded, profiles);
    }

    #[test]
    fn test_ranged_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.zip");
        store_profiles_to_container(&sample_profiles(), &path).unwrap();

        let mut store = ContainerStore::open(&path).unwrap();
        let frame = store.read_rows(&key("load.p_mw"), 2, 4).unwrap();
        assert_eq!(frame.steps().unwrap(), vec![2, 3]);
        assert_eq!(frame.column_values(2).unwrap().unwrap(), vec![3.0, 4.0]);
    }

    #[test]
    fn test_step_row_and_missing_step() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.zip");
        store_profiles_to_container(&sample_profiles(), &path).unwrap();

        let mut store = ContainerStore::open(&path).unwrap();
        let row = store.read_step_row(&key("load.p_mw"), 3).unwrap();
        assert_eq!(row, vec![(2, 4.0)]);

        let err = store.read_step_row(&key("load.p_mw"), 42).unwrap_err();
        match err {
            SbxError::Data(msg) => {
                assert!(msg.contains("load.p_mw"));
                assert!(msg.contains("42"));
            }
            other => panic!("expected Data error, got {other:?}"),
        }
    }

    #[test]
    fn test_open_missing_file_is_io_error() {
        let err = ContainerStore::open(Path::new("/definitely/not/here.zip")).unwrap_err();
        assert!(matches!(err, SbxError::Io(_)));
    }
}
