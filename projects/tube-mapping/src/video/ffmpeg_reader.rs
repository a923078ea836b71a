use super::VideoReader;
use anyhow::{anyhow, Context, Result};
use ffmpeg_next::ffi;
use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling;
use ffmpeg_next::util::frame::Video as VideoFrame;
use opencv::{core, prelude::*};
use std::path::Path;

/// Video reader backed by FFmpeg software decoding via ffmpeg-next.
pub struct FfmpegReader {
    input_ctx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::codec::decoder::Video,
    video_stream_index: usize,
    /// Created on the first converted frame, when the source format is known.
    scaler: Option<scaling::Context>,
    width: u32,
    height: u32,
    source_fps: f64,
    total_frames: usize,
    /// Frame reused by `grab_frame` to avoid an allocation per skipped frame.
    reuse_frame: VideoFrame,
    reuse_packet: ffmpeg_next::codec::packet::Packet,
    eof_sent: bool,
}

// SAFETY: a reader is owned by exactly one sampler on one worker thread; the raw
// pointers inside ffmpeg-next types are never shared.
unsafe impl Send for FfmpegReader {}

impl FfmpegReader {
    pub fn new(path: &Path) -> Result<Self> {
        ffmpeg_next::init().context("Failed to initialize FFmpeg")?;

        if !path.exists() {
            return Err(anyhow!("Video file not found: {:?}", path));
        }

        let input_ctx = ffmpeg_next::format::input(&path).context("Failed to open video file")?;

        let video_stream = input_ctx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| anyhow!("No video stream found in {:?}", path))?;
        let video_stream_index = video_stream.index();

        let rational_fps = video_stream.avg_frame_rate();
        let source_fps = if rational_fps.denominator() > 0 && rational_fps.numerator() > 0 {
            rational_fps.numerator() as f64 / rational_fps.denominator() as f64
        } else {
            tracing::warn!("FfmpegReader: could not determine FPS, defaulting to 30.0");
            30.0
        };

        let stream_frames = video_stream.frames().max(0) as usize;
        let duration_secs = input_ctx.duration().max(0) as f64 / ffi::AV_TIME_BASE as f64;
        let total_frames = if stream_frames == 0 {
            (duration_secs * source_fps).round() as usize
        } else {
            stream_frames
        };

        let decoder_ctx =
            ffmpeg_next::codec::context::Context::from_parameters(video_stream.parameters())
                .context("Failed to create decoder context")?;
        let decoder = decoder_ctx
            .decoder()
            .video()
            .context("Failed to open video decoder")?;

        let width = decoder.width();
        let height = decoder.height();

        tracing::info!(
            "FfmpegReader: opened {:?} ({}x{}), duration={:.2}s, fps={:.2}, stream_frames={}, estimated_total={}",
            path,
            width,
            height,
            duration_secs,
            source_fps,
            stream_frames,
            total_frames
        );

        Ok(Self {
            input_ctx,
            decoder,
            video_stream_index,
            scaler: None,
            width,
            height,
            source_fps,
            total_frames,
            reuse_frame: VideoFrame::empty(),
            reuse_packet: ffmpeg_next::codec::packet::Packet::empty(),
            eof_sent: false,
        })
    }

    /// Pulls the next decoded frame, feeding packets to the decoder as needed.
    fn decode_loop(&mut self, target_frame: &mut VideoFrame) -> Result<()> {
        loop {
            match self.decoder.receive_frame(target_frame) {
                Ok(()) => return Ok(()),
                Err(ffmpeg_next::Error::Other { errno: ffi::EAGAIN }) => {
                    if self.eof_sent {
                        return Err(anyhow!("End of stream"));
                    }
                }
                Err(ffmpeg_next::Error::Eof) => return Err(anyhow!("End of stream")),
                Err(e) => return Err(anyhow!("Decoder error: {}", e)),
            }

            let mut found_packet = false;
            while self.reuse_packet.read(&mut self.input_ctx).is_ok() {
                if self.reuse_packet.stream() == self.video_stream_index {
                    self.decoder
                        .send_packet(&self.reuse_packet)
                        .context("Failed to send packet to decoder")?;
                    found_packet = true;
                    break;
                }
            }

            if !found_packet {
                // Input exhausted: flush whatever the decoder still buffers.
                self.decoder
                    .send_eof()
                    .context("Failed to send EOF to decoder")?;
                self.eof_sent = true;
            }
        }
    }

    fn convert_to_bgr(&mut self, frame: &VideoFrame) -> Result<VideoFrame> {
        if self.scaler.is_none() {
            let scaler = scaling::Context::get(
                frame.format(),
                self.width,
                self.height,
                Pixel::BGR24,
                self.width,
                self.height,
                scaling::Flags::BILINEAR,
            )
            .context("Failed to create scaler")?;
            self.scaler = Some(scaler);
        }

        let scaler = self
            .scaler
            .as_mut()
            .ok_or_else(|| anyhow!("Scaler unavailable"))?;
        let mut bgr_frame = VideoFrame::empty();
        scaler.run(frame, &mut bgr_frame).context("Scaler failed")?;
        Ok(bgr_frame)
    }
}

/// Deep-copies a BGR24 ffmpeg frame into an owned OpenCV Mat, honouring the row stride.
fn bgr_frame_to_mat(frame: &VideoFrame) -> Result<core::Mat> {
    let width = frame.width() as i32;
    let height = frame.height() as i32;
    let data = frame.data(0);
    let stride = frame.stride(0);
    let row_bytes = width as usize * 3;

    let mut mat = core::Mat::new_rows_cols_with_default(
        height,
        width,
        core::CV_8UC3,
        core::Scalar::all(0.0),
    )?;

    for y in 0..height {
        let src_offset = y as usize * stride;
        let src_row = &data[src_offset..src_offset + row_bytes];
        let dst_row = mat.at_row_mut::<core::Vec3b>(y)?;
        for (dst, src) in dst_row.iter_mut().zip(src_row.chunks_exact(3)) {
            *dst = core::VecN([src[0], src[1], src[2]]);
        }
    }

    Ok(mat)
}

impl VideoReader for FfmpegReader {
    fn frame_count(&self) -> Result<usize> {
        Ok(self.total_frames)
    }

    fn source_fps(&self) -> Result<f64> {
        Ok(self.source_fps)
    }

    fn grab_frame(&mut self) -> Result<()> {
        let mut frame = VideoFrame::empty();
        std::mem::swap(&mut frame, &mut self.reuse_frame);
        let res = self.decode_loop(&mut frame);
        std::mem::swap(&mut frame, &mut self.reuse_frame);
        res
    }

    fn read_frame(&mut self) -> Result<core::Mat> {
        let mut raw_frame = VideoFrame::empty();
        self.decode_loop(&mut raw_frame)?;
        let bgr_frame = self.convert_to_bgr(&raw_frame)?;
        bgr_frame_to_mat(&bgr_frame)
    }
}
