// Pipeline orchestrator: runs one video through every map stage
//
// Sampler -> slice extraction -> assembly -> skew -> optional crop -> optional
// dust detection. Everything here is synchronous; callers that need to stay
// responsive run it through `jobs::JobRunner`.

use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::assemble::assemble_map;
use crate::pipeline::crop::crop_margins;
use crate::pipeline::dust::detect_dust;
use crate::pipeline::export::{save_map, write_dust_report};
use crate::pipeline::skew::skew_map;
use crate::pipeline::types::{DustReport, Frame, TubeMap};
use crate::run_context::{RunContext, RunMetadata};
use crate::settings::{MapSettings, FRAME_SIZE};
use crate::video::sampler::open_sampler;
use crate::video::Backend;
use chrono::Utc;
use opencv::core::Size;
use opencv::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Everything needed to compute one map.
#[derive(Debug, Clone)]
pub struct MapRequest {
    pub video_path: PathBuf,
    pub backend: Backend,
    pub settings: MapSettings,
    pub show_progress: bool,
}

pub struct MapOutcome {
    pub map: TubeMap,
    pub dust: Option<DustReport>,
    pub frames_sampled: usize,
}

/// Samples the video and runs every stage on it.
pub fn compute_map(request: &MapRequest) -> PipelineResult<MapOutcome> {
    let settings = request.settings.clamped();
    tracing::info!(
        "Pipeline: computing map for {:?} with {:?}",
        request.video_path,
        settings
    );

    let sampler = open_sampler(
        &request.video_path,
        request.backend,
        Size::new(FRAME_SIZE.0, FRAME_SIZE.1),
        settings.frame_frequency as usize,
    )?;
    tracing::info!("Pipeline: sampling up to {} frames", sampler.cap());
    let sampler = if request.show_progress {
        sampler.with_progress()
    } else {
        sampler
    };

    run_stages(sampler, &settings, &request.video_path)
}

/// Runs the post-sampling stages over an already-decoded frame sequence.
pub fn run_stages<I>(frames: I, settings: &MapSettings, source: &Path) -> PipelineResult<MapOutcome>
where
    I: IntoIterator<Item = PipelineResult<Frame>>,
{
    let mut frames_sampled = 0;
    let counted = frames.into_iter().inspect(|frame| {
        if frame.is_ok() {
            frames_sampled += 1;
        }
    });
    let map = assemble_map(counted, settings.thickness as i32, source)?;

    let start_inst = Instant::now();
    let mut map = skew_map(&map, settings.skew_effect as i32)?;
    tracing::info!(
        "Pipeline: skew effect {} -> {}x{} map in {:.1}ms",
        settings.skew_effect,
        map.cols(),
        map.rows(),
        start_inst.elapsed().as_secs_f64() * 1000.0
    );

    if settings.crop_enabled() {
        let margin = |name: &str, value: u32| {
            i32::try_from(value).map_err(|_| {
                PipelineError::GeometryViolation(format!("{} margin {} is out of range", name, value))
            })
        };
        map = crop_margins(
            &map,
            margin("crop_x", settings.crop_x)?,
            margin("crop_y", settings.crop_y)?,
        )?;
        tracing::info!("Pipeline: cropped to {}x{}", map.cols(), map.rows());
    }

    let dust = if settings.dust_selection_enabled {
        Some(detect_dust(
            &map,
            settings.dust_threshold,
            settings.dust_min_area,
        )?)
    } else {
        None
    };

    Ok(MapOutcome {
        map,
        dust,
        frames_sampled,
    })
}

/// Runs `work` for `run`; a failure removes the run directory so the video can be retried.
pub fn within_run<T, F>(run: &RunContext, work: F) -> PipelineResult<T>
where
    F: FnOnce() -> PipelineResult<T>,
{
    let result = work();
    if let Err(e) = &result {
        tracing::warn!("Pipeline: run {} failed: {}", run.run_id, e);
        run.discard();
    }
    result
}

/// Computes a map and writes its artifacts into the run directory.
pub fn process_video(request: &MapRequest, run: &RunContext) -> PipelineResult<(RunMetadata, MapOutcome)> {
    within_run(run, || {
        let outcome = compute_map(request)?;
        write_artifacts(request, run, outcome)
    })
}

fn write_artifacts(
    request: &MapRequest,
    run: &RunContext,
    outcome: MapOutcome,
) -> PipelineResult<(RunMetadata, MapOutcome)> {
    save_map(&outcome.map, &run.map_path())?;
    if let Some(dust) = &outcome.dust {
        save_map(&dust.annotated, &run.dust_map_path())?;
        write_dust_report(&dust.contours, &run.dust_report_path())?;
    }

    let original_name = run
        .video_path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| run.run_id.clone());

    let metadata = RunMetadata {
        original_name,
        created_at: Utc::now(),
        run_id: run.run_id.clone(),
        settings: request.settings.clamped(),
        frames_sampled: outcome.frames_sampled,
        map_rows: outcome.map.rows(),
        map_cols: outcome.map.cols(),
        dust_contours: outcome.dust.as_ref().map(|d| d.contours.len()),
        output_dir: run.output_dir.clone(),
    };
    run.write_metadata(&metadata)?;

    tracing::info!(
        "Pipeline: run {} finished ({} frames, {}x{} map)",
        run.run_id,
        metadata.frames_sampled,
        metadata.map_cols,
        metadata.map_rows
    );

    Ok((metadata, outcome))
}
