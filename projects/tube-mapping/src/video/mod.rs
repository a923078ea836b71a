pub mod ffmpeg_reader;
pub mod opencv_reader;
pub mod sampler;

use anyhow::Result;
use opencv::core::Mat;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Sequential access to a decoded video stream.
pub trait VideoReader: Send {
    /// Total number of frames reported by the container metadata.
    fn frame_count(&self) -> Result<usize>;
    fn source_fps(&self) -> Result<f64>;
    /// Advance past the next frame without converting it.
    fn grab_frame(&mut self) -> Result<()>;
    /// Decode the next frame as a BGR `CV_8UC3` Mat.
    fn read_frame(&mut self) -> Result<Mat>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Opencv,
    Ffmpeg,
}

pub fn open_reader(backend: Backend, path: &Path) -> Result<Box<dyn VideoReader>> {
    let reader: Box<dyn VideoReader> = match backend {
        Backend::Ffmpeg => Box::new(ffmpeg_reader::FfmpegReader::new(path)?),
        Backend::Opencv => Box::new(opencv_reader::OpencvReader::new(path)?),
    };
    Ok(reader)
}
