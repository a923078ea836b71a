use opencv::core::{Mat, Point};
use serde::Serialize;

/// A working-resolution RGB frame (`CV_8UC3`).
pub type Frame = Mat;

/// One frame's border ring flattened to a `thickness x perimeter` strip.
pub type Slice = Mat;

/// Stacked slices: rows encode distance travelled, columns the angle around the tube.
pub type TubeMap = Mat;

/// Boundary of a bright region found by the dust detector, in full-map coordinates.
#[derive(Debug, Clone)]
pub struct Contour {
    pub points: Vec<Point>,
    pub area: f64,
}

/// Axis-aligned box around a contour, in pixels
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelBox {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl Contour {
    pub fn bounding_box(&self) -> Option<PixelBox> {
        let first = self.points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);

        for p in &self.points {
            min_x = min_x.min(p.x);
            max_x = max_x.max(p.x);
            min_y = min_y.min(p.y);
            max_y = max_y.max(p.y);
        }

        Some(PixelBox {
            x: min_x,
            y: min_y,
            w: max_x - min_x + 1,
            h: max_y - min_y + 1,
        })
    }
}

/// Result of dust detection: the annotated copy plus the contours drawn on it.
pub struct DustReport {
    pub annotated: TubeMap,
    pub contours: Vec<Contour>,
}
