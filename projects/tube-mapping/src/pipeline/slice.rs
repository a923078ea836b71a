// Border slice extraction
//
// Walks a fixed-thickness ring along the frame edges and flattens it into one
// strip. The traversal order and loop bounds are load-bearing: the strip column
// cursor is pre-incremented and shared by all five legs, so column 0 is never
// written and the last upper-right column is cut off by the perimeter guard.

use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::types::{Frame, Slice};
use opencv::core::{Mat, Scalar, Vec3b, CV_8UC3};
use opencv::prelude::*;

/// Strip length for a `width x height` frame.
pub fn perimeter(width: i32, height: i32) -> i32 {
    2 * width + 2 * height
}

#[inline]
fn copy_px(src: &Mat, sy: i32, sx: i32, dst: &mut Mat, dy: i32, dx: i32) -> opencv::Result<()> {
    *dst.at_2d_mut::<Vec3b>(dy, dx)? = *src.at_2d::<Vec3b>(sy, sx)?;
    Ok(())
}

/// Extracts the border ring of `frame` as a `thickness x perimeter` RGB strip.
pub fn extract_slice(frame: &Frame, thickness: i32) -> PipelineResult<Slice> {
    if frame.typ() != CV_8UC3 {
        return Err(PipelineError::MalformedFrame(format!(
            "slice source has pixel type {}, expected 8-bit 3-channel",
            frame.typ()
        )));
    }

    let width = frame.cols();
    let height = frame.rows();
    if thickness < 1 || thickness > width.min(height) {
        return Err(PipelineError::GeometryViolation(format!(
            "thickness {} does not fit a {}x{} frame",
            thickness, width, height
        )));
    }

    let p = perimeter(width, height);
    let mut slice = Mat::new_rows_cols_with_default(thickness, p, CV_8UC3, Scalar::all(0.0))?;
    let mut xc = 0;

    // Upper-left arc: midpoint back to column 0, top rows
    for x in (0..=width / 2).rev() {
        xc += 1;
        for y in 0..thickness {
            copy_px(frame, y, x, &mut slice, y, xc)?;
        }
    }

    // Left edge, top to bottom
    for y in 0..height {
        xc += 1;
        for x in 0..thickness {
            copy_px(frame, y, x, &mut slice, x, xc)?;
        }
    }

    // Bottom edge, left to right; strip rows reversed
    for x in 0..width {
        xc += 1;
        for k in 0..thickness {
            copy_px(frame, height - 1 - k, x, &mut slice, thickness - 1 - k, xc)?;
        }
    }

    // Right edge, bottom to top
    for y in (0..height).rev() {
        xc += 1;
        for k in 0..thickness {
            copy_px(frame, y, width - 1 - k, &mut slice, k, xc)?;
        }
    }

    // Upper-right arc: last column back towards the midpoint
    for x in (width / 2 + 1..width).rev() {
        xc += 1;
        if xc >= p {
            break;
        }
        for y in 0..thickness {
            copy_px(frame, y, x, &mut slice, y, xc)?;
        }
    }

    Ok(slice)
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::VecN;

    const MARK: u8 = 7;

    /// 10x6 frame whose pixels encode their own coordinates: [x, y, MARK].
    fn coordinate_frame(width: i32, height: i32) -> Mat {
        let mut frame =
            Mat::new_rows_cols_with_default(height, width, CV_8UC3, Scalar::all(0.0)).unwrap();
        for y in 0..height {
            for x in 0..width {
                *frame.at_2d_mut::<Vec3b>(y, x).unwrap() = VecN([x as u8, y as u8, MARK]);
            }
        }
        frame
    }

    fn px(slice: &Mat, row: i32, col: i32) -> [u8; 3] {
        let v = slice.at_2d::<Vec3b>(row, col).unwrap();
        [v[0], v[1], v[2]]
    }

    #[test]
    fn test_slice_shape() {
        let frame = Mat::new_rows_cols_with_default(480, 640, CV_8UC3, Scalar::all(0.0)).unwrap();
        let slice = extract_slice(&frame, 4).unwrap();
        assert_eq!(slice.rows(), 4);
        assert_eq!(slice.cols(), 2240);
        assert_eq!(slice.typ(), CV_8UC3);
    }

    #[test]
    fn test_traversal_order() {
        let frame = coordinate_frame(10, 6);
        let slice = extract_slice(&frame, 2).unwrap();
        assert_eq!(slice.cols(), 32);

        // Column 0 is never written
        assert_eq!(px(&slice, 0, 0), [0, 0, 0]);
        assert_eq!(px(&slice, 1, 0), [0, 0, 0]);

        // Upper-left arc starts at the midpoint and ends at column 0
        assert_eq!(px(&slice, 0, 1), [5, 0, MARK]);
        assert_eq!(px(&slice, 1, 1), [5, 1, MARK]);
        assert_eq!(px(&slice, 1, 6), [0, 1, MARK]);

        // Left edge: strip row k takes frame column k
        assert_eq!(px(&slice, 0, 7), [0, 0, MARK]);
        assert_eq!(px(&slice, 1, 7), [1, 0, MARK]);
        assert_eq!(px(&slice, 1, 12), [1, 5, MARK]);

        // Bottom edge: last frame row lands in the last strip row
        assert_eq!(px(&slice, 0, 13), [0, 4, MARK]);
        assert_eq!(px(&slice, 1, 13), [0, 5, MARK]);
        assert_eq!(px(&slice, 1, 22), [9, 5, MARK]);

        // Right edge walks bottom to top, outermost column first
        assert_eq!(px(&slice, 0, 23), [9, 5, MARK]);
        assert_eq!(px(&slice, 1, 23), [8, 5, MARK]);
        assert_eq!(px(&slice, 0, 28), [9, 0, MARK]);

        // Upper-right arc is cut off one column short of the midpoint
        assert_eq!(px(&slice, 0, 29), [9, 0, MARK]);
        assert_eq!(px(&slice, 1, 31), [7, 1, MARK]);
    }

    #[test]
    fn test_every_written_pixel_is_a_source_pixel() {
        let frame = coordinate_frame(11, 7);
        let slice = extract_slice(&frame, 3).unwrap();
        assert_eq!(slice.cols(), perimeter(11, 7));

        for row in 0..slice.rows() {
            assert_eq!(px(&slice, row, 0), [0, 0, 0]);
            for col in 1..slice.cols() {
                let [x, y, mark] = px(&slice, row, col);
                assert_eq!(mark, MARK, "row {row} col {col} was not copied");
                assert!((x as i32) < 11 && (y as i32) < 7);
            }
        }
    }

    #[test]
    fn test_thickness_must_fit_frame() {
        let frame = coordinate_frame(10, 6);
        assert!(matches!(
            extract_slice(&frame, 7),
            Err(PipelineError::GeometryViolation(_))
        ));
        assert!(matches!(
            extract_slice(&frame, 0),
            Err(PipelineError::GeometryViolation(_))
        ));
    }
}
