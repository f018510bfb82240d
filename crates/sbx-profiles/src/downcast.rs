//! Value-preserving numeric downcasting for storage.
//!
//! Float columns narrow to `f32` only when every value survives the
//! round-trip unchanged; integer columns narrow to the smallest signed
//! width holding their range. The step index column keeps its width so
//! stored indices stay comparable across files. Downcasting twice is a
//! no-op.

use polars::prelude::*;
use sbx_core::SbxResult;

use crate::frame::{IntoSbx, ProfileFrame, ProfileSet, STEP_COLUMN};

/// Downcast every frame of a profile set in place.
pub fn downcast_profiles(profiles: &mut ProfileSet) -> SbxResult<()> {
    for (_, frame) in profiles.iter_mut() {
        downcast_frame(frame)?;
    }
    Ok(())
}

/// Downcast the element columns of one frame in place.
pub fn downcast_frame(frame: &mut ProfileFrame) -> SbxResult<()> {
    let names: Vec<String> = frame
        .dataframe()
        .get_column_names()
        .into_iter()
        .filter(|n| *n != STEP_COLUMN)
        .map(|n| n.to_string())
        .collect();

    for name in names {
        let series = frame.dataframe().column(&name).sbx()?.clone();
        if let Some(narrowed) = downcast_series(&series)? {
            frame.dataframe_mut().with_column(narrowed).sbx()?;
        }
    }
    Ok(())
}

fn downcast_series(series: &Series) -> SbxResult<Option<Series>> {
    match series.dtype() {
        DataType::Float64 => {
            let narrowed = series.cast(&DataType::Float32).sbx()?;
            let back = narrowed.cast(&DataType::Float64).sbx()?;
            if float_values_equal(series, &back)? {
                Ok(Some(narrowed))
            } else {
                Ok(None)
            }
        }
        DataType::Int64 | DataType::Int32 | DataType::Int16 => {
            let values = series.cast(&DataType::Int64).sbx()?;
            let ca = values.i64().sbx()?;
            let (mut min, mut max) = (i64::MAX, i64::MIN);
            for v in ca.into_iter().flatten() {
                min = min.min(v);
                max = max.max(v);
            }
            if min > max {
                // all-null column, nothing to narrow safely
                return Ok(None);
            }
            let target = smallest_int_dtype(min, max);
            if &target == series.dtype() {
                Ok(None)
            } else {
                Ok(Some(series.cast(&target).sbx()?))
            }
        }
        _ => Ok(None),
    }
}

fn smallest_int_dtype(min: i64, max: i64) -> DataType {
    if min >= i8::MIN as i64 && max <= i8::MAX as i64 {
        DataType::Int8
    } else if min >= i16::MIN as i64 && max <= i16::MAX as i64 {
        DataType::Int16
    } else if min >= i32::MIN as i64 && max <= i32::MAX as i64 {
        DataType::Int32
    } else {
        DataType::Int64
    }
}

fn float_values_equal(a: &Series, b: &Series) -> SbxResult<bool> {
    let a = a.f64().sbx()?;
    let b = b.f64().sbx()?;
    Ok(a.into_iter().zip(b.into_iter()).all(|(x, y)| match (x, y) {
        (Some(x), Some(y)) => x == y || (x.is_nan() && y.is_nan()),
        (None, None) => true,
        _ => false,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downcast_narrows_representable_floats() {
        let mut frame = ProfileFrame::new(
            vec![0, 1, 2],
            vec![(0, vec![1.0, 2.5, -3.0]), (1, vec![0.1, 0.2, 0.3])],
        )
        .unwrap();
        downcast_frame(&mut frame).unwrap();
        let dtypes = frame.element_dtypes();
        // 1.0/2.5/-3.0 survive f32; 0.1/0.2/0.3 do not
        assert_eq!(dtypes[0], DataType::Float32);
        assert_eq!(dtypes[1], DataType::Float64);
    }

    #[test]
    fn test_downcast_is_idempotent() {
        let mut frame =
            ProfileFrame::new(vec![0, 1], vec![(3, vec![4.0, 8.0]), (4, vec![1e40, 0.0])])
                .unwrap();
        downcast_frame(&mut frame).unwrap();
        let once = frame.element_dtypes();
        downcast_frame(&mut frame).unwrap();
        assert_eq!(frame.element_dtypes(), once);
    }

    #[test]
    fn test_downcast_preserves_values() {
        let original = ProfileFrame::new(vec![0, 1], vec![(0, vec![2.0, -0.5])]).unwrap();
        let mut frame = original.clone();
        downcast_frame(&mut frame).unwrap();
        assert_eq!(frame, original);
    }

    #[test]
    fn test_step_index_width_is_kept() {
        let mut frame = ProfileFrame::new(vec![0, 1], vec![(0, vec![1.0, 2.0])]).unwrap();
        downcast_frame(&mut frame).unwrap();
        assert_eq!(
            frame.dataframe().column(STEP_COLUMN).unwrap().dtype(),
            &DataType::Int64
        );
    }
}
