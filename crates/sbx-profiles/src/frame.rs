//! Time-indexed profile tables on polars frames.
//!
//! A [`ProfileFrame`] is a `DataFrame` whose first column (`step`) is the
//! time-step index and whose remaining columns are element indices of the
//! corresponding network table, named by their decimal index. A frame may
//! have rows but no element columns (an empty table that still carries
//! the year's index).

use std::collections::{BTreeMap, BTreeSet};

use polars::prelude::*;
use sbx_core::{ProfileKey, ResultKey, SbxError, SbxResult};

/// Name of the time-step index column inside every profile frame.
pub const STEP_COLUMN: &str = "step";

pub(crate) trait IntoSbx<T> {
    fn sbx(self) -> SbxResult<T>;
}

impl<T> IntoSbx<T> for PolarsResult<T> {
    fn sbx(self) -> SbxResult<T> {
        self.map_err(|e| SbxError::Other(e.to_string()))
    }
}

/// One time-indexed table: step index plus one column per element.
#[derive(Debug, Clone)]
pub struct ProfileFrame {
    df: DataFrame,
}

impl ProfileFrame {
    /// Build a frame from a step index and `(element index, values)` columns.
    pub fn new(steps: Vec<i64>, columns: Vec<(usize, Vec<f64>)>) -> SbxResult<Self> {
        let height = steps.len();
        let mut series = vec![Series::new(STEP_COLUMN, steps)];
        for (id, values) in columns {
            if values.len() != height {
                return Err(SbxError::Structure(format!(
                    "profile column {id} has {} rows, index has {height}",
                    values.len()
                )));
            }
            series.push(Series::new(&id.to_string(), values));
        }
        Ok(Self {
            df: DataFrame::new(series).sbx()?,
        })
    }

    /// A frame carrying only the step index (a table with no elements).
    pub fn empty_with_steps(steps: Vec<i64>) -> SbxResult<Self> {
        Self::new(steps, Vec::new())
    }

    /// Wrap an existing frame, checking the step column and column names.
    pub fn from_dataframe(df: DataFrame) -> SbxResult<Self> {
        if df.column(STEP_COLUMN).is_err() {
            return Err(SbxError::Parse(format!(
                "profile frame misses the '{STEP_COLUMN}' index column"
            )));
        }
        for name in df.get_column_names() {
            if name != STEP_COLUMN && name.parse::<usize>().is_err() {
                return Err(SbxError::Parse(format!(
                    "profile column '{name}' is not an element index"
                )));
            }
        }
        Ok(Self { df })
    }

    pub fn dataframe(&self) -> &DataFrame {
        &self.df
    }

    pub fn dataframe_mut(&mut self) -> &mut DataFrame {
        &mut self.df
    }

    /// Number of time steps.
    pub fn height(&self) -> usize {
        self.df.height()
    }

    /// Number of element columns.
    pub fn n_elements(&self) -> usize {
        self.df.width().saturating_sub(1)
    }

    pub fn steps(&self) -> SbxResult<Vec<i64>> {
        let col = self
            .df
            .column(STEP_COLUMN)
            .sbx()?
            .cast(&DataType::Int64)
            .sbx()?;
        Ok(col.i64().sbx()?.into_iter().flatten().collect())
    }

    pub fn contains_step(&self, step: i64) -> SbxResult<bool> {
        Ok(self.steps()?.contains(&step))
    }

    /// Element indices in stored column order.
    pub fn element_ids(&self) -> Vec<usize> {
        self.df
            .get_column_names()
            .into_iter()
            .filter(|name| *name != STEP_COLUMN)
            .filter_map(|name| name.parse().ok())
            .collect()
    }

    fn column_f64(&self, name: &str) -> SbxResult<Vec<f64>> {
        let col = self
            .df
            .column(name)
            .sbx()?
            .cast(&DataType::Float64)
            .sbx()?;
        Ok(col
            .f64()
            .sbx()?
            .into_iter()
            .map(|v| v.unwrap_or(f64::NAN))
            .collect())
    }

    /// Values of one element column, read as f64.
    pub fn column_values(&self, id: usize) -> SbxResult<Option<Vec<f64>>> {
        if self.df.column(&id.to_string()).is_err() {
            return Ok(None);
        }
        Ok(Some(self.column_f64(&id.to_string())?))
    }

    /// The row for a time step as `(element index, value)` pairs.
    pub fn row_at_step(&self, step: i64) -> SbxResult<Option<Vec<(usize, f64)>>> {
        let steps = self.steps()?;
        let Some(pos) = steps.iter().position(|&s| s == step) else {
            return Ok(None);
        };
        let mut row = Vec::with_capacity(self.n_elements());
        for id in self.element_ids() {
            let values = self.column_f64(&id.to_string())?;
            row.push((id, values[pos]));
        }
        Ok(Some(row))
    }

    /// Keep only the rows whose step is in `steps` (index intersection).
    pub fn select_steps(&self, steps: &BTreeSet<i64>) -> SbxResult<Self> {
        let index = self.steps()?;
        let mask: Vec<bool> = index.iter().map(|s| steps.contains(s)).collect();
        let mask = BooleanChunked::from_slice("mask", &mask);
        Ok(Self {
            df: self.df.filter(&mask).sbx()?,
        })
    }

    /// Keep only the rows whose step falls into `range` (half-open).
    pub fn select_step_range(&self, range: std::ops::Range<i64>) -> SbxResult<Self> {
        let index = self.steps()?;
        let mask: Vec<bool> = index.iter().map(|s| range.contains(s)).collect();
        let mask = BooleanChunked::from_slice("mask", &mask);
        Ok(Self {
            df: self.df.filter(&mask).sbx()?,
        })
    }

    /// Append another frame's rows; schemas must match.
    pub fn append_rows(&mut self, other: &ProfileFrame) -> SbxResult<()> {
        self.df = self.df.vstack(&other.df).sbx()?;
        Ok(())
    }

    /// Keep only the columns of the given elements (missing ids ignored),
    /// preserving this frame's column order.
    pub fn select_elements(&self, ids: &BTreeSet<usize>) -> SbxResult<Self> {
        let mut names: Vec<String> = vec![STEP_COLUMN.to_string()];
        for id in self.element_ids() {
            if ids.contains(&id) {
                names.push(id.to_string());
            }
        }
        Ok(Self {
            df: self.df.select(names).sbx()?,
        })
    }

    /// Maximum absolute value per element column.
    pub fn abs_max_per_element(&self) -> SbxResult<Vec<(usize, f64)>> {
        let mut out = Vec::with_capacity(self.n_elements());
        for id in self.element_ids() {
            let max = self
                .column_f64(&id.to_string())?
                .into_iter()
                .filter(|v| v.is_finite())
                .fold(0.0_f64, |acc, v| acc.max(v.abs()));
            out.push((id, max));
        }
        Ok(out)
    }

    /// Sum over all element columns per time step.
    pub fn row_sums(&self) -> SbxResult<Vec<(i64, f64)>> {
        let steps = self.steps()?;
        let mut sums = vec![0.0; steps.len()];
        for id in self.element_ids() {
            for (i, v) in self.column_f64(&id.to_string())?.into_iter().enumerate() {
                if v.is_finite() {
                    sums[i] += v;
                }
            }
        }
        Ok(steps.into_iter().zip(sums).collect())
    }

    /// Append a column for a new element; must match the frame height.
    pub fn push_column(&mut self, id: usize, values: Vec<f64>) -> SbxResult<()> {
        if values.len() != self.height() {
            return Err(SbxError::Structure(format!(
                "profile column {id} has {} rows, frame has {}",
                values.len(),
                self.height()
            )));
        }
        self.df
            .with_column(Series::new(&id.to_string(), values))
            .sbx()?;
        Ok(())
    }

    /// Column dtypes in order (step column excluded).
    pub fn element_dtypes(&self) -> Vec<DataType> {
        self.df
            .get_columns()
            .iter()
            .filter(|s| s.name() != STEP_COLUMN)
            .map(|s| s.dtype().clone())
            .collect()
    }

    /// Horizontally join frames on the union of their step indices,
    /// filling steps absent from a source frame with zero.
    pub fn concat_columns(frames: &[&ProfileFrame]) -> SbxResult<ProfileFrame> {
        let mut union: BTreeSet<i64> = BTreeSet::new();
        for frame in frames {
            union.extend(frame.steps()?);
        }
        let steps: Vec<i64> = union.iter().copied().collect();
        let positions: BTreeMap<i64, usize> =
            steps.iter().enumerate().map(|(i, &s)| (s, i)).collect();

        let mut columns: Vec<(usize, Vec<f64>)> = Vec::new();
        for frame in frames {
            let frame_steps = frame.steps()?;
            for id in frame.element_ids() {
                let source = frame.column_f64(&id.to_string())?;
                let mut values = vec![0.0; steps.len()];
                for (row, &step) in frame_steps.iter().enumerate() {
                    values[positions[&step]] = source[row];
                }
                columns.push((id, values));
            }
        }
        ProfileFrame::new(steps, columns)
    }
}

impl PartialEq for ProfileFrame {
    fn eq(&self, other: &Self) -> bool {
        let (Ok(a_steps), Ok(b_steps)) = (self.steps(), other.steps()) else {
            return false;
        };
        if a_steps != b_steps || self.element_ids() != other.element_ids() {
            return false;
        }
        for id in self.element_ids() {
            let (Ok(Some(a)), Ok(Some(b))) = (self.column_values(id), other.column_values(id))
            else {
                return false;
            };
            let same = a
                .iter()
                .zip(b.iter())
                .all(|(x, y)| (x.is_nan() && y.is_nan()) || x == y);
            if !same {
                return false;
            }
        }
        true
    }
}

/// An ordered mapping of profile keys to frames.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileSet {
    frames: BTreeMap<ProfileKey, ProfileFrame>,
}

/// Runner output frames, keyed like `res_line.p_from_mw`.
pub type ResultFrames = BTreeMap<ResultKey, ProfileFrame>;

impl ProfileSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: ProfileKey, frame: ProfileFrame) {
        self.frames.insert(key, frame);
    }

    pub fn get(&self, key: &ProfileKey) -> Option<&ProfileFrame> {
        self.frames.get(key)
    }

    pub fn get_mut(&mut self, key: &ProfileKey) -> Option<&mut ProfileFrame> {
        self.frames.get_mut(key)
    }

    pub fn remove(&mut self, key: &ProfileKey) -> Option<ProfileFrame> {
        self.frames.remove(key)
    }

    pub fn contains_key(&self, key: &ProfileKey) -> bool {
        self.frames.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &ProfileKey> {
        self.frames.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ProfileKey, &ProfileFrame)> {
        self.frames.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&ProfileKey, &mut ProfileFrame)> {
        self.frames.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Reduce every frame to the intersection of its index with `steps`.
    pub fn reduce_by_steps(&mut self, steps: &BTreeSet<i64>) -> SbxResult<()> {
        for frame in self.frames.values_mut() {
            if frame.height() > 0 {
                *frame = frame.select_steps(steps)?;
            }
        }
        Ok(())
    }
}

impl FromIterator<(ProfileKey, ProfileFrame)> for ProfileSet {
    fn from_iter<I: IntoIterator<Item = (ProfileKey, ProfileFrame)>>(iter: I) -> Self {
        Self {
            frames: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame() -> ProfileFrame {
        ProfileFrame::new(
            vec![0, 1, 2, 3],
            vec![
                (5, vec![1.0, 2.0, 3.0, 4.0]),
                (2, vec![-1.0, -5.0, 0.5, 0.0]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_column_order_is_preserved() {
        let frame = sample_frame();
        // insertion order, not sorted order
        assert_eq!(frame.element_ids(), vec![5, 2]);
    }

    #[test]
    fn test_row_at_step() {
        let frame = sample_frame();
        let row = frame.row_at_step(2).unwrap().unwrap();
        assert_eq!(row, vec![(5, 3.0), (2, 0.5)]);
        assert!(frame.row_at_step(99).unwrap().is_none());
    }

    #[test]
    fn test_select_steps_is_index_intersection() {
        let frame = sample_frame();
        let keep: BTreeSet<i64> = [1, 3, 17].into_iter().collect();
        let reduced = frame.select_steps(&keep).unwrap();
        assert_eq!(reduced.steps().unwrap(), vec![1, 3]);
        assert_eq!(reduced.column_values(5).unwrap().unwrap(), vec![2.0, 4.0]);
    }

    #[test]
    fn test_abs_max_and_row_sums() {
        let frame = sample_frame();
        assert_eq!(
            frame.abs_max_per_element().unwrap(),
            vec![(5, 4.0), (2, 5.0)]
        );
        let sums = frame.row_sums().unwrap();
        assert_eq!(sums[1], (1, -3.0));
    }

    #[test]
    fn test_concat_columns_pads_missing_steps_with_zero() {
        let a = ProfileFrame::new(vec![0, 1, 2], vec![(0, vec![1.0, 1.0, 1.0])]).unwrap();
        let b = ProfileFrame::new(vec![1, 2], vec![(7, vec![5.0, 6.0])]).unwrap();
        let joined = ProfileFrame::concat_columns(&[&a, &b]).unwrap();
        assert_eq!(joined.steps().unwrap(), vec![0, 1, 2]);
        assert_eq!(
            joined.column_values(7).unwrap().unwrap(),
            vec![0.0, 5.0, 6.0]
        );
    }

    #[test]
    fn test_empty_frame_has_rows_but_no_elements() {
        let frame = ProfileFrame::empty_with_steps(vec![0, 1]).unwrap();
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.n_elements(), 0);
    }
}
