// Frame sampler: strided, capped frame extraction from a video source
//
// Frames come out in strictly increasing source order, converted to RGB and
// resized to the working resolution.

use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::types::Frame;
use crate::video::{open_reader, Backend, VideoReader};
use indicatif::{ProgressBar, ProgressStyle};
use opencv::core::{Mat, Size, CV_8UC3};
use opencv::imgproc;
use opencv::prelude::*;
use std::path::Path;

/// Source index of the first sampled frame.
pub const FIRST_SAMPLED_FRAME: usize = 1;

/// Finite, non-restartable sequence of working-resolution RGB frames.
///
/// The decoder is released as soon as the sequence ends, whether by reaching
/// the cap, exhausting the source, or failing on a frame.
pub struct FrameSampler {
    reader: Option<Box<dyn VideoReader>>,
    target: Size,
    frequency: usize,
    cap: usize,
    /// Index of the next frame the reader will yield
    position: usize,
    /// Index of the next frame to keep
    next_sample: usize,
    sampled: usize,
    pb: ProgressBar,
}

impl FrameSampler {
    pub fn new(reader: Box<dyn VideoReader>, target: Size, frequency: usize) -> PipelineResult<Self> {
        if target.width <= 0 || target.height <= 0 {
            return Err(PipelineError::GeometryViolation(format!(
                "working resolution {}x{} is empty",
                target.width, target.height
            )));
        }
        let frequency = frequency.max(1);
        let total_frames = reader
            .frame_count()
            .map_err(|e| PipelineError::MalformedFrame(format!("unreadable frame count: {e}")))?;
        let cap = total_frames / frequency;

        tracing::info!(
            "FrameSampler: total_frames={}, fps={:.2}, frequency={}, cap={}",
            total_frames,
            reader.source_fps().unwrap_or(0.0),
            frequency,
            cap
        );

        Ok(Self {
            reader: Some(reader),
            target,
            frequency,
            cap,
            position: 0,
            next_sample: FIRST_SAMPLED_FRAME,
            sampled: 0,
            pb: ProgressBar::hidden(),
        })
    }

    /// Shows a terminal progress bar while sampling.
    pub fn with_progress(mut self) -> Self {
        let pb = ProgressBar::new(self.cap as u64);
        if let Ok(style) = ProgressStyle::default_bar().template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec:.1.yellow}, {eta})",
        ) {
            pb.set_style(style.progress_chars("#>-"));
        }
        self.pb = pb;
        self
    }

    /// Upper bound on the number of frames this sampler can yield.
    pub fn cap(&self) -> usize {
        self.cap
    }

    fn finish(&mut self) {
        if self.reader.take().is_some() {
            self.pb.finish_and_clear();
            tracing::debug!(
                "FrameSampler: released decoder after {} samples ({} frames read)",
                self.sampled,
                self.position
            );
        }
    }

    fn to_working_frame(&self, raw: &Mat) -> PipelineResult<Frame> {
        if raw.typ() != CV_8UC3 {
            return Err(PipelineError::MalformedFrame(format!(
                "frame {} has pixel type {}, expected 8-bit 3-channel",
                self.position, raw.typ()
            )));
        }

        let mut rgb = Mat::default();
        imgproc::cvt_color_def(raw, &mut rgb, imgproc::COLOR_BGR2RGB)?;

        let mut resized = Mat::default();
        imgproc::resize(
            &rgb,
            &mut resized,
            self.target,
            0.0,
            0.0,
            imgproc::INTER_LINEAR,
        )?;

        let size = resized.size()?;
        if size != self.target {
            return Err(PipelineError::MalformedFrame(format!(
                "frame {} resized to {}x{}, expected {}x{}",
                self.position, size.width, size.height, self.target.width, self.target.height
            )));
        }

        Ok(resized)
    }
}

impl Iterator for FrameSampler {
    type Item = PipelineResult<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.sampled >= self.cap {
            self.finish();
            return None;
        }

        loop {
            let reader = self.reader.as_mut()?;

            if self.position < self.next_sample {
                if let Err(e) = reader.grab_frame() {
                    tracing::debug!("FrameSampler: source exhausted at {}: {}", self.position, e);
                    self.finish();
                    return None;
                }
                self.position += 1;
                continue;
            }

            let raw = match reader.read_frame() {
                Ok(mat) => mat,
                Err(e) => {
                    tracing::debug!("FrameSampler: source exhausted at {}: {}", self.position, e);
                    self.finish();
                    return None;
                }
            };

            let frame = self.to_working_frame(&raw);
            self.position += 1;

            return match frame {
                Ok(frame) => {
                    self.sampled += 1;
                    self.next_sample += self.frequency;
                    self.pb.inc(1);
                    if self.sampled >= self.cap {
                        self.finish();
                    }
                    Some(Ok(frame))
                }
                Err(e) => {
                    self.finish();
                    Some(Err(e))
                }
            };
        }
    }
}

/// Opens `path` with the chosen backend.
///
/// An unopenable source is reported as `SourceUnavailable`; a source that
/// opens but yields nothing surfaces later as `NoFrames` from assembly.
pub fn open_sampler(
    path: &Path,
    backend: Backend,
    target: Size,
    frequency: usize,
) -> PipelineResult<FrameSampler> {
    let reader = open_reader(backend, path).map_err(|e| PipelineError::SourceUnavailable {
        path: path.to_path_buf(),
        reason: format!("{e:#}"),
    })?;
    FrameSampler::new(reader, target, frequency)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use opencv::core::{Scalar, Vec3b, CV_8UC1};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    /// In-memory reader yielding pre-built BGR frames.
    pub(crate) struct StubReader {
        frames: Vec<Mat>,
        cursor: usize,
        released: Arc<AtomicBool>,
    }

    impl StubReader {
        pub(crate) fn new(frames: Vec<Mat>) -> Self {
            Self {
                frames,
                cursor: 0,
                released: Arc::new(AtomicBool::new(false)),
            }
        }

        pub(crate) fn uniform(count: usize, width: i32, height: i32) -> Self {
            let frames = (0..count)
                .map(|i| {
                    let v = (i % 256) as f64;
                    Mat::new_rows_cols_with_default(height, width, CV_8UC3, Scalar::all(v))
                        .unwrap()
                })
                .collect();
            Self::new(frames)
        }

        /// Flag set once the reader has been dropped.
        pub(crate) fn released_flag(&self) -> Arc<AtomicBool> {
            self.released.clone()
        }
    }

    impl Drop for StubReader {
        fn drop(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    impl VideoReader for StubReader {
        fn frame_count(&self) -> Result<usize> {
            Ok(self.frames.len())
        }

        fn source_fps(&self) -> Result<f64> {
            Ok(25.0)
        }

        fn grab_frame(&mut self) -> Result<()> {
            if self.cursor >= self.frames.len() {
                return Err(anyhow!("End of stream"));
            }
            self.cursor += 1;
            Ok(())
        }

        fn read_frame(&mut self) -> Result<Mat> {
            let frame = self
                .frames
                .get(self.cursor)
                .ok_or_else(|| anyhow!("End of stream"))?
                .clone();
            self.cursor += 1;
            Ok(frame)
        }
    }

    fn first_value(frame: &Mat) -> u8 {
        frame.at_2d::<Vec3b>(0, 0).unwrap()[0]
    }

    #[test]
    fn test_stride_and_cap() {
        let reader = StubReader::uniform(10, 8, 6);
        let sampler = FrameSampler::new(Box::new(reader), Size::new(8, 6), 3).unwrap();
        assert_eq!(sampler.cap(), 3);

        let values: Vec<u8> = sampler.map(|f| first_value(&f.unwrap())).collect();
        assert_eq!(values, vec![1, 4, 7]);
    }

    #[test]
    fn test_stops_when_source_exhausted() {
        // Sampling starts at index 1, so a 5-frame source with frequency 1 yields 4 frames.
        let reader = StubReader::uniform(5, 8, 6);
        let frames: Vec<_> = FrameSampler::new(Box::new(reader), Size::new(8, 6), 1)
            .unwrap()
            .collect();
        assert_eq!(frames.len(), 4);
    }

    #[test]
    fn test_converts_to_rgb_and_resizes() {
        let bgr = Mat::new_rows_cols_with_default(
            12,
            16,
            CV_8UC3,
            Scalar::new(10.0, 20.0, 30.0, 0.0),
        )
        .unwrap();
        let reader = StubReader::new(vec![bgr.clone(), bgr]);

        let mut sampler = FrameSampler::new(Box::new(reader), Size::new(8, 6), 1).unwrap();
        let frame = sampler.next().unwrap().unwrap();
        assert_eq!(frame.size().unwrap(), Size::new(8, 6));
        let px = frame.at_2d::<Vec3b>(3, 4).unwrap();
        assert_eq!((px[0], px[1], px[2]), (30, 20, 10));
        assert!(sampler.next().is_none());
    }

    #[test]
    fn test_rejects_non_color_frames() {
        let gray = Mat::new_rows_cols_with_default(6, 8, CV_8UC1, Scalar::all(0.0)).unwrap();
        let reader = StubReader::new(vec![gray.clone(), gray.clone(), gray]);

        let mut sampler = FrameSampler::new(Box::new(reader), Size::new(8, 6), 1).unwrap();
        assert!(matches!(
            sampler.next(),
            Some(Err(PipelineError::MalformedFrame(_)))
        ));
        assert!(sampler.next().is_none());
    }

    #[test]
    fn test_reader_released_when_cap_reached() {
        let reader = StubReader::uniform(10, 8, 6);
        let released = reader.released_flag();
        let mut sampler = FrameSampler::new(Box::new(reader), Size::new(8, 6), 3).unwrap();

        for _ in 0..2 {
            assert!(sampler.next().unwrap().is_ok());
            assert!(!released.load(Ordering::SeqCst));
        }
        // Third sample hits the cap
        assert!(sampler.next().unwrap().is_ok());
        assert!(released.load(Ordering::SeqCst));
        assert!(sampler.next().is_none());
    }

    #[test]
    fn test_reader_released_when_source_exhausted() {
        // Cap is 5 but only frames 1..=4 exist past the starting offset
        let reader = StubReader::uniform(5, 8, 6);
        let released = reader.released_flag();
        let mut sampler = FrameSampler::new(Box::new(reader), Size::new(8, 6), 1).unwrap();

        for _ in 0..4 {
            assert!(sampler.next().unwrap().is_ok());
        }
        assert!(!released.load(Ordering::SeqCst));
        assert!(sampler.next().is_none());
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_reader_released_on_bad_frame() {
        let gray = Mat::new_rows_cols_with_default(6, 8, CV_8UC1, Scalar::all(0.0)).unwrap();
        let reader = StubReader::new(vec![gray.clone(), gray.clone(), gray]);
        let released = reader.released_flag();
        let mut sampler = FrameSampler::new(Box::new(reader), Size::new(8, 6), 1).unwrap();

        assert!(matches!(
            sampler.next(),
            Some(Err(PipelineError::MalformedFrame(_)))
        ));
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_unopenable_source_is_reported() {
        let path = std::env::temp_dir().join("tube-mapping-no-such-video.mp4");
        let result = open_sampler(&path, Backend::Opencv, Size::new(640, 480), 1);
        assert!(matches!(
            result,
            Err(PipelineError::SourceUnavailable { .. })
        ));
    }
}
