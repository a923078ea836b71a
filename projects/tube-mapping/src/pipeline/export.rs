use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::types::{Contour, TubeMap};
use image::{ImageBuffer, ImageFormat, Rgb, RgbImage};
use opencv::core::CV_8UC3;
use opencv::prelude::*;
use serde::Serialize;
use std::io::Cursor;
use std::path::Path;

/// Copies an RGB map into an `image` buffer.
pub fn map_to_image(map: &TubeMap) -> PipelineResult<RgbImage> {
    if map.typ() != CV_8UC3 || map.empty() {
        return Err(PipelineError::MalformedFrame(format!(
            "cannot export map of type {} ({}x{})",
            map.typ(),
            map.cols(),
            map.rows()
        )));
    }

    let width = map.cols() as u32;
    let height = map.rows() as u32;
    let buffer = if map.is_continuous() {
        map.data_bytes()?.to_vec()
    } else {
        map.try_clone()?.data_bytes()?.to_vec()
    };

    ImageBuffer::<Rgb<u8>, _>::from_vec(width, height, buffer).ok_or_else(|| {
        PipelineError::MalformedFrame("map buffer does not match its dimensions".to_string())
    })
}

fn format_for(path: &Path) -> PipelineResult<ImageFormat> {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "png" => Ok(ImageFormat::Png),
        "jpg" | "jpeg" => Ok(ImageFormat::Jpeg),
        _ => Err(PipelineError::UnsupportedFormat(format!(
            "{:?} (expected .png, .jpg or .jpeg)",
            path
        ))),
    }
}

/// Writes `map` as PNG or JPEG, chosen by the file extension.
pub fn save_map(map: &TubeMap, path: &Path) -> PipelineResult<()> {
    let format = format_for(path)?;
    let img = map_to_image(map)?;
    img.save_with_format(path, format)?;
    tracing::info!("Export: wrote {}x{} map to {:?}", img.width(), img.height(), path);
    Ok(())
}

/// Encodes `map` as PNG bytes.
pub fn encode_png(map: &TubeMap) -> PipelineResult<Vec<u8>> {
    let img = map_to_image(map)?;
    let mut bytes = Cursor::new(Vec::new());
    img.write_to(&mut bytes, ImageFormat::Png)?;
    Ok(bytes.into_inner())
}

#[derive(Serialize)]
struct DustRow {
    index: usize,
    area: f64,
    x: i32,
    y: i32,
    width: i32,
    height: i32,
    points: usize,
}

/// Writes one CSV row per detected contour.
pub fn write_dust_report(contours: &[Contour], path: &Path) -> PipelineResult<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for (index, contour) in contours.iter().enumerate() {
        let Some(bbox) = contour.bounding_box() else {
            continue;
        };
        writer.serialize(DustRow {
            index,
            area: contour.area,
            x: bbox.x,
            y: bbox.y,
            width: bbox.w,
            height: bbox.h,
            points: contour.points.len(),
        })?;
    }
    writer.flush()?;
    Ok(())
}
