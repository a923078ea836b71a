use crate::error::{PipelineError, PipelineResult};
use opencv::core;
use opencv::prelude::*;

/// Removes `x_margin` columns from each side and `y_margin` rows from top and bottom.
///
/// The result is a deep copy of the centred sub-rectangle; no resampling.
pub fn crop_margins(img: &core::Mat, x_margin: i32, y_margin: i32) -> PipelineResult<core::Mat> {
    let size = img.size()?;

    if x_margin < 0 || y_margin < 0 {
        return Err(PipelineError::GeometryViolation(format!(
            "negative crop margins: x={} y={}",
            x_margin, y_margin
        )));
    }

    // Widened so oversized margins cannot overflow
    let w = size.width as i64 - 2 * x_margin as i64;
    let h = size.height as i64 - 2 * y_margin as i64;
    if w <= 0 || h <= 0 {
        return Err(PipelineError::GeometryViolation(format!(
            "crop margins x={} y={} leave {}x{} of a {}x{} image",
            x_margin, y_margin, w, h, size.width, size.height
        )));
    }

    let roi = core::Rect::new(x_margin, y_margin, w as i32, h as i32);
    let cropped = core::Mat::roi(img, roi)?;

    let mut out = core::Mat::default();
    cropped.copy_to(&mut out)?;

    Ok(out)
}
