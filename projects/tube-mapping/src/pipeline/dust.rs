// Dust detection: threshold + contour search on a fixed vertical band of the map
//
// The band bounds are tuned to where the tube wall sits in a 2240-wide unwrap
// map and are kept as exact fractions of the width.

use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::types::{Contour, DustReport, TubeMap};
use opencv::core::{self, Mat, Point, Rect, Scalar, Vector, CV_8UC3};
use opencv::imgproc;
use opencv::prelude::*;
use std::time::Instant;

pub const DUST_BAND_START: f64 = 970.0 / 2240.0;
pub const DUST_BAND_END: f64 = 1570.0 / 2240.0;

/// Stroke colour for detected contours (RGB red).
pub fn highlight_color() -> Scalar {
    Scalar::new(255.0, 0.0, 0.0, 0.0)
}

/// Column range `[start, end)` analysed for a map `width` pixels wide.
pub fn dust_band(width: i32) -> (i32, i32) {
    let start = (width as f64 * DUST_BAND_START).round() as i32;
    let end = (width as f64 * DUST_BAND_END).round() as i32;
    (start, end)
}

/// Finds bright regions inside the dust band and outlines them on a copy of `map`.
///
/// Pixels at or above `threshold` are foreground. Only contours enclosing
/// strictly more than `min_area` pixels are kept. `map` is left untouched.
pub fn detect_dust(map: &TubeMap, threshold: u32, min_area: f64) -> PipelineResult<DustReport> {
    let start_inst = Instant::now();

    if map.typ() != CV_8UC3 {
        return Err(PipelineError::MalformedFrame(format!(
            "map has pixel type {}, expected 8-bit 3-channel",
            map.typ()
        )));
    }

    let (band_start, band_end) = dust_band(map.cols());
    if map.rows() <= 0 || band_end <= band_start {
        return Err(PipelineError::GeometryViolation(format!(
            "dust band [{}, {}) is empty for a {}x{} map",
            band_start,
            band_end,
            map.cols(),
            map.rows()
        )));
    }

    let band = Mat::roi(map, Rect::new(band_start, 0, band_end - band_start, map.rows()))?;

    let mut gray = Mat::default();
    imgproc::cvt_color_def(&*band, &mut gray, imgproc::COLOR_RGB2GRAY)?;

    // THRESH_BINARY keeps values strictly above the cut
    let mut binary = Mat::default();
    imgproc::threshold(
        &gray,
        &mut binary,
        threshold as f64 - 1.0,
        255.0,
        imgproc::THRESH_BINARY,
    )?;

    let mut found = Vector::<Vector<Point>>::new();
    imgproc::find_contours(
        &binary,
        &mut found,
        imgproc::RETR_TREE,
        imgproc::CHAIN_APPROX_NONE,
        Point::new(0, 0),
    )?;

    let mut contours = Vec::new();
    let mut to_draw = Vector::<Vector<Point>>::new();
    for raw in found.iter() {
        let area = imgproc::contour_area(&raw, false)?;
        if area <= min_area {
            continue;
        }

        let shifted: Vector<Point> = raw
            .iter()
            .map(|p| Point::new(p.x + band_start, p.y))
            .collect();
        contours.push(Contour {
            points: shifted.to_vec(),
            area,
        });
        to_draw.push(shifted);
    }

    let mut annotated = map.try_clone()?;
    if !to_draw.is_empty() {
        imgproc::draw_contours(
            &mut annotated,
            &to_draw,
            -1,
            highlight_color(),
            1,
            imgproc::LINE_AA,
            &core::no_array(),
            i32::MAX,
            Point::new(0, 0),
        )?;
    }

    tracing::info!(
        "DustDetector: {} of {} contours kept (threshold={}, min_area={}) in {:.1}ms",
        contours.len(),
        found.len(),
        threshold,
        min_area,
        start_inst.elapsed().as_secs_f64() * 1000.0
    );

    Ok(DustReport {
        annotated,
        contours,
    })
}
