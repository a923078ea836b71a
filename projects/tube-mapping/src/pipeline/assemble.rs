use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::slice::extract_slice;
use crate::pipeline::types::{Frame, Slice, TubeMap};
use opencv::core::{Mat, Scalar, Size, Vec3b, CV_8UC3};
use opencv::prelude::*;
use std::path::Path;
use std::time::Instant;

/// Builds a tube map from an ordered frame sequence.
///
/// Slice dimensions come from the first frame; every later frame must match
/// it. Slice `i` lands at rows `[i * thickness, (i + 1) * thickness)`.
pub fn assemble_map<I>(frames: I, thickness: i32, source: &Path) -> PipelineResult<TubeMap>
where
    I: IntoIterator<Item = PipelineResult<Frame>>,
{
    let start_inst = Instant::now();
    let mut first_size: Option<Size> = None;
    let mut slices: Vec<Slice> = Vec::new();

    for (index, frame) in frames.into_iter().enumerate() {
        let frame = frame?;
        let size = frame.size()?;

        match first_size {
            None => first_size = Some(size),
            Some(expected) if expected != size => {
                return Err(PipelineError::MalformedFrame(format!(
                    "frame {} is {}x{}, expected {}x{}",
                    index, size.width, size.height, expected.width, expected.height
                )));
            }
            Some(_) => {}
        }

        slices.push(extract_slice(&frame, thickness)?);
    }

    if slices.is_empty() {
        return Err(PipelineError::NoFrames {
            path: source.to_path_buf(),
        });
    }

    let map = stack_slices(&slices)?;
    tracing::info!(
        "Assembler: stacked {} slices into {}x{} map in {:.1}ms",
        slices.len(),
        map.rows(),
        map.cols(),
        start_inst.elapsed().as_secs_f64() * 1000.0
    );
    Ok(map)
}

/// Stacks equally-sized slices vertically into a pre-sized map.
pub fn stack_slices(slices: &[Slice]) -> PipelineResult<TubeMap> {
    let first = slices.first().ok_or_else(|| {
        PipelineError::GeometryViolation("cannot stack an empty slice list".to_string())
    })?;
    let thickness = first.rows();
    let width = first.cols();

    let mut map = Mat::new_rows_cols_with_default(
        thickness * slices.len() as i32,
        width,
        CV_8UC3,
        Scalar::all(0.0),
    )?;

    for (i, slice) in slices.iter().enumerate() {
        if slice.rows() != thickness || slice.cols() != width {
            return Err(PipelineError::MalformedFrame(format!(
                "slice {} is {}x{}, expected {}x{}",
                i,
                slice.cols(),
                slice.rows(),
                width,
                thickness
            )));
        }

        let offset = i as i32 * thickness;
        for y in 0..thickness {
            let src = slice.at_row::<Vec3b>(y)?;
            let dst = map.at_row_mut::<Vec3b>(offset + y)?;
            dst.copy_from_slice(src);
        }
    }

    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::VecN;

    fn uniform(width: i32, height: i32, value: f64) -> Mat {
        Mat::new_rows_cols_with_default(height, width, CV_8UC3, Scalar::all(value)).unwrap()
    }

    #[test]
    fn test_black_frames_scenario() {
        let frames = (0..10).map(|_| Ok(uniform(640, 480, 0.0)));
        let map = assemble_map(frames, 4, Path::new("black.mp4")).unwrap();
        assert_eq!(map.rows(), 40);
        assert_eq!(map.cols(), 2240);
        assert_eq!(map.typ(), CV_8UC3);
        assert!(map.data_bytes().unwrap().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_row_blocks_match_slices() {
        let mut frames = Vec::new();
        for i in 0..3 {
            let mut frame = uniform(12, 8, (i * 40) as f64);
            *frame.at_2d_mut::<Vec3b>(0, 6).unwrap() = VecN([200, i as u8, 1]);
            frames.push(frame);
        }

        let map = assemble_map(frames.iter().cloned().map(Ok), 2, Path::new("x.mp4")).unwrap();
        assert_eq!(map.rows(), 6);

        for (i, frame) in frames.iter().enumerate() {
            let slice = extract_slice(frame, 2).unwrap();
            for y in 0..2 {
                let block_row = map.at_row::<Vec3b>(i as i32 * 2 + y).unwrap();
                assert_eq!(block_row, slice.at_row::<Vec3b>(y).unwrap());
            }
        }
    }

    #[test]
    fn test_empty_sequence_is_no_frames() {
        let frames: Vec<PipelineResult<Mat>> = Vec::new();
        let err = assemble_map(frames, 4, Path::new("empty.mp4")).unwrap_err();
        assert!(matches!(err, PipelineError::NoFrames { .. }));
    }

    #[test]
    fn test_mismatched_frame_is_malformed() {
        let frames = vec![Ok(uniform(12, 8, 0.0)), Ok(uniform(10, 8, 0.0))];
        let err = assemble_map(frames, 2, Path::new("x.mp4")).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedFrame(_)));
    }

    #[test]
    fn test_sampler_error_propagates() {
        let frames = vec![
            Ok(uniform(12, 8, 0.0)),
            Err(PipelineError::MalformedFrame("decode".to_string())),
        ];
        assert!(assemble_map(frames, 2, Path::new("x.mp4")).is_err());
    }
}
