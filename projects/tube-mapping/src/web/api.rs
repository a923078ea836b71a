use crate::jobs::{JobError, JobStatus};
use crate::pipeline::export::encode_png;
use crate::pipeline::orchestrator::{process_video, MapRequest};
use crate::run_context::{create_run, list_runs, list_videos, RunMetadata};
use crate::settings::MapSettings;
use crate::web::server::{AppState, LatestMaps};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Serialize)]
pub struct VideoInfo {
    pub name: String,
    pub path: String,
}

#[derive(Deserialize)]
pub struct CreateMapRequest {
    pub video_path: String,
    #[serde(default)]
    pub settings: Option<MapSettings>,
}

#[derive(Serialize, Debug)]
pub struct CreateMapResponse {
    pub run_id: String,
}

pub async fn get_videos(State(state): State<Arc<AppState>>) -> Json<Vec<VideoInfo>> {
    let videos = list_videos(&state.args.video_root);

    let info_list = videos
        .into_iter()
        .map(|video_path| {
            let name = video_path
                .file_name()
                .and_then(|s| s.to_str())
                .unwrap_or("unknown")
                .to_string();
            // Relative to the video root, which is how create_map_handler resolves it
            let path_str = video_path
                .strip_prefix(&state.args.video_root)
                .unwrap_or(&video_path)
                .to_string_lossy()
                .to_string();
            VideoInfo {
                name,
                path: path_str,
            }
        })
        .collect();

    Json(info_list)
}

pub async fn get_runs(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<RunMetadata>>, StatusCode> {
    let runs = list_runs(&state.args.output_root).map_err(|e| {
        tracing::warn!("Failed to list runs: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(runs))
}

/// Resolves a requested video against the video root; anything outside it is refused.
fn resolve_video(video_root: &Path, video_path: &str) -> Result<PathBuf, StatusCode> {
    let root = video_root
        .canonicalize()
        .map_err(|_| StatusCode::NOT_FOUND)?;
    let path = root
        .join(video_path)
        .canonicalize()
        .map_err(|_| StatusCode::NOT_FOUND)?;

    if !path.starts_with(&root) {
        tracing::warn!("Refusing video outside the video root: {:?}", path);
        return Err(StatusCode::FORBIDDEN);
    }
    if !path.is_file() {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(path)
}

/// Makes a finished job's maps available to the `latest` endpoints.
fn store_latest(state: &AppState, latest: LatestMaps) {
    *state
        .latest
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner()) = latest;
}

pub async fn create_map_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateMapRequest>,
) -> Result<(StatusCode, Json<CreateMapResponse>), StatusCode> {
    if state.runner.is_busy() {
        return Err(StatusCode::CONFLICT);
    }

    let video_path = resolve_video(&state.args.video_root, &payload.video_path)?;

    let run = create_run(&state.args.output_root, &video_path).map_err(|e| {
        tracing::warn!("Cannot create run for {:?}: {}", video_path, e);
        StatusCode::CONFLICT
    })?;
    let run_id = run.run_id.clone();

    let request = MapRequest {
        video_path,
        backend: state.args.backend,
        settings: payload.settings.unwrap_or_default(),
        show_progress: false,
    };

    let job_run = run.clone();
    let job_state = state.clone();
    // Maps are published inside the job, so they are in place once the status reads Finished
    let launched = state.runner.launch(run_id.clone(), move || {
        let (_, outcome) = process_video(&request, &job_run)?;
        let map = encode_png(&outcome.map)?;
        let dust = outcome
            .dust
            .as_ref()
            .map(|report| encode_png(&report.annotated))
            .transpose()?;
        store_latest(
            &job_state,
            LatestMaps {
                map: Some(map),
                dust,
            },
        );
        Ok(())
    });

    let handle = match launched {
        Ok(handle) => handle,
        Err(JobError::Busy) => {
            // Lost the race for the slot
            run.discard();
            return Err(StatusCode::CONFLICT);
        }
        Err(e) => {
            tracing::error!("Failed to launch map job: {}", e);
            run.discard();
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    tokio::task::spawn_blocking(move || {
        if let Err(notification) = handle.wait() {
            run.discard();
            tracing::warn!(
                "Map job failed: {}: {}",
                notification.title,
                notification.message
            );
        }
    });

    Ok((StatusCode::ACCEPTED, Json(CreateMapResponse { run_id })))
}

pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<JobStatus> {
    Json(state.runner.status())
}

fn png_response(bytes: Option<Vec<u8>>) -> Result<Response, StatusCode> {
    let bytes = bytes.ok_or(StatusCode::NOT_FOUND)?;
    Ok(([(header::CONTENT_TYPE, "image/png")], bytes).into_response())
}

pub async fn get_latest_map(State(state): State<Arc<AppState>>) -> Result<Response, StatusCode> {
    let bytes = state
        .latest
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .map
        .clone();
    png_response(bytes)
}

pub async fn get_latest_dust_map(
    State(state): State<Arc<AppState>>,
) -> Result<Response, StatusCode> {
    let bytes = state
        .latest
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .dust
        .clone();
    png_response(bytes)
}
