//! JSON folder-tree store for timeseries results.
//!
//! One folder per result table, one file per column, e.g.
//! `res_line/p_from_mw.json`. The file layout is column-oriented:
//! `{"<element>": {"<step>": value, ...}, ...}` with column order
//! preserved, so a store/load cycle reproduces the frame exactly.

use std::fs;
use std::path::Path;

use sbx_core::{ResultKey, SbxError, SbxResult, TableRef};
use serde_json::{Map, Number, Value};
use tracing::{info, warn};

use crate::frame::{ProfileFrame, ResultFrames};
use crate::store::check_file_existence;

/// Write result frames to a JSON folder tree.
///
/// With `overwrite` unset, an existing tree that already contains result
/// JSON files aborts the write with a warning instead of clobbering it.
pub fn write_results_to_json(
    results: &ResultFrames,
    path: &Path,
    time_steps: Option<&[i64]>,
    overwrite: bool,
) -> SbxResult<()> {
    if !path.exists() {
        fs::create_dir_all(path)?;
    } else if !overwrite && tree_has_results(path)? {
        warn!(
            "json result folders already exist under {}, write aborted",
            path.display()
        );
        return Ok(());
    }

    for (key, frame) in results {
        let folder = path.join(key.table.to_string());
        fs::create_dir_all(&folder)?;
        let frame = match time_steps {
            Some(steps) => frame.select_steps(&steps.iter().copied().collect())?,
            None => frame.clone(),
        };
        let value = frame_to_json(&frame)?;
        let file = folder.join(format!("{}.json", key.column));
        fs::write(&file, serde_json::to_string(&value)?)?;
    }
    Ok(())
}

/// Read a JSON folder tree back into result frames.
///
/// Files whose stem contains "param" or "net" are metadata, not profiles,
/// and are skipped. Empty frames are dropped unless `add_empty` asks for
/// a bare index frame instead.
pub fn read_results_from_json(
    path: &Path,
    ignore: &[ResultKey],
    include_only: Option<&[ResultKey]>,
    time_steps: Option<&[i64]>,
    add_empty: bool,
) -> SbxResult<ResultFrames> {
    let mut results = ResultFrames::new();
    if !path.is_dir() {
        return Err(SbxError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("result folder {} does not exist", path.display()),
        )));
    }

    let mut subdirs: Vec<_> = fs::read_dir(path)?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .collect();
    subdirs.sort_by_key(|e| e.file_name());

    for subdir in subdirs {
        let Ok(table) = subdir.file_name().to_string_lossy().parse::<TableRef>() else {
            continue;
        };
        let mut files: Vec<_> = fs::read_dir(subdir.path())?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        files.sort();

        for file in files {
            let stem = file
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            if stem.contains("param") || stem.contains("net") {
                continue;
            }
            let Ok(column) = stem.parse() else {
                continue;
            };
            let key = ResultKey::new(table, column);
            if ignore.contains(&key) {
                continue;
            }
            if include_only.is_some_and(|only| !only.contains(&key)) {
                continue;
            }

            let mut handle = check_file_existence(&file)?;
            let mut text = String::new();
            std::io::Read::read_to_string(&mut handle, &mut text)?;
            let value: Value = serde_json::from_str(&text)?;
            let frame = frame_from_json(&value)?;

            if frame.n_elements() > 0 {
                let frame = match time_steps {
                    Some(steps) => frame.select_steps(&steps.iter().copied().collect())?,
                    None => frame,
                };
                results.insert(key, frame);
            } else if add_empty {
                let steps = time_steps.map(|s| s.to_vec()).unwrap_or_default();
                results.insert(key, ProfileFrame::empty_with_steps(steps)?);
            } else {
                info!("skipping empty result frame {key}");
            }
        }
    }
    Ok(results)
}

fn tree_has_results(path: &Path) -> SbxResult<bool> {
    for entry in fs::read_dir(path)?.filter_map(|e| e.ok()) {
        if !entry.path().is_dir() {
            continue;
        }
        if entry
            .file_name()
            .to_string_lossy()
            .parse::<TableRef>()
            .is_err()
        {
            continue;
        }
        let has_json = fs::read_dir(entry.path())?
            .filter_map(|e| e.ok())
            .any(|e| e.path().extension().is_some_and(|ext| ext == "json"));
        if has_json {
            return Ok(true);
        }
    }
    Ok(false)
}

fn frame_to_json(frame: &ProfileFrame) -> SbxResult<Value> {
    let steps = frame.steps()?;
    let mut columns = Map::new();
    for id in frame.element_ids() {
        let values = frame
            .column_values(id)?
            .expect("element id taken from the frame itself");
        let mut column = Map::new();
        for (step, value) in steps.iter().zip(values) {
            let number = Number::from_f64(value)
                .map(Value::Number)
                .unwrap_or(Value::Null);
            column.insert(step.to_string(), number);
        }
        columns.insert(id.to_string(), Value::Object(column));
    }
    Ok(Value::Object(columns))
}

fn frame_from_json(value: &Value) -> SbxResult<ProfileFrame> {
    let Some(columns) = value.as_object() else {
        return Err(SbxError::Parse(
            "expected a column-oriented json object".into(),
        ));
    };

    let mut steps: Vec<i64> = Vec::new();
    let mut parsed: Vec<(usize, Vec<f64>)> = Vec::new();
    for (name, column) in columns {
        let id: usize = name
            .parse()
            .map_err(|_| SbxError::Parse(format!("column '{name}' is not an element index")))?;
        let Some(rows) = column.as_object() else {
            return Err(SbxError::Parse(format!("column '{name}' is not an object")));
        };
        let mut this_steps = Vec::with_capacity(rows.len());
        let mut values = Vec::with_capacity(rows.len());
        for (step, value) in rows {
            let step: i64 = step
                .parse()
                .map_err(|_| SbxError::Parse(format!("step '{step}' is not an integer")))?;
            this_steps.push(step);
            values.push(value.as_f64().unwrap_or(f64::NAN));
        }
        if steps.is_empty() {
            steps = this_steps;
        } else if steps != this_steps {
            return Err(SbxError::Parse(
                "json columns disagree on the step index".into(),
            ));
        }
        parsed.push((id, values));
    }
    ProfileFrame::new(steps, parsed)
}
