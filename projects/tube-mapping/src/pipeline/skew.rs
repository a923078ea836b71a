use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::types::TubeMap;
use opencv::core::{Mat, Scalar, Vec3b, CV_8UC3};
use opencv::prelude::*;
use std::f64::consts::PI;

/// Four full cosine periods across the map width.
const SKEW_PERIOD: f64 = 8.0 * PI;

/// Vertical shift, in rows, applied to column `x` of a `width`-wide map.
pub fn skew_offset(x: i32, width: i32, effect: i32) -> i32 {
    (((SKEW_PERIOD * x as f64 / width as f64).cos() + 1.0) * effect as f64).round() as i32
}

/// Shifts every column down by its cosine offset into a map `2 * effect` rows taller.
///
/// Rows not covered by a shifted column stay zero.
pub fn skew_map(map: &TubeMap, effect: i32) -> PipelineResult<TubeMap> {
    let rows = map.rows();
    let cols = map.cols();
    if rows <= 0 || cols <= 0 {
        return Err(PipelineError::GeometryViolation(format!(
            "cannot skew an empty {}x{} map",
            cols, rows
        )));
    }
    if map.typ() != CV_8UC3 {
        return Err(PipelineError::MalformedFrame(format!(
            "map has pixel type {}, expected 8-bit 3-channel",
            map.typ()
        )));
    }
    if effect < 0 {
        return Err(PipelineError::GeometryViolation(format!(
            "skew effect {} is negative",
            effect
        )));
    }

    let mut out =
        Mat::new_rows_cols_with_default(rows + 2 * effect, cols, CV_8UC3, Scalar::all(0.0))?;

    for x in 0..cols {
        let offset = skew_offset(x, cols, effect);
        for y in 0..rows {
            *out.at_2d_mut::<Vec3b>(y + offset, x)? = *map.at_2d::<Vec3b>(y, x)?;
        }
    }

    Ok(out)
}
