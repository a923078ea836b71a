mod cli;
mod error;
mod jobs;
mod pipeline;
mod run_context;
mod settings;
mod video;
mod web;

use anyhow::Result;
use cli::{Args, Command, MapArgs};
use jobs::JobRunner;
use pipeline::orchestrator::{process_video, MapRequest};
use run_context::{create_run, list_videos};
use tracing::{info, warn};
use web::server::run_server;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    let args = Args::parse_args();

    match args.command {
        Command::Map(map_args) => tokio::task::spawn_blocking(move || run_map(map_args)).await??,
        Command::Serve(serve_args) => run_server(serve_args).await?,
    }

    Ok(())
}

/// Maps every input video in turn. A failed video is logged and skipped.
fn run_map(args: MapArgs) -> Result<()> {
    let settings = args.resolve_settings()?;

    let videos = if args.input.is_dir() {
        list_videos(&args.input)
    } else {
        vec![args.input.clone()]
    };
    if videos.is_empty() {
        warn!("No videos found under {:?}", args.input);
        return Ok(());
    }

    let runner = JobRunner::new();
    let mut completed = 0;

    for video in &videos {
        let run = match create_run(&args.output_root, video) {
            Ok(run) => run,
            Err(e) => {
                warn!("Skipping {:?}: {}", video, e);
                continue;
            }
        };

        let request = MapRequest {
            video_path: video.clone(),
            backend: args.backend,
            settings,
            show_progress: args.progress,
        };
        let job_run = run.clone();
        let handle = runner.launch(run.run_id.clone(), move || {
            process_video(&request, &job_run).map(|(metadata, _)| metadata)
        })?;
        info!("Launched job {}", handle.job());

        match handle.wait() {
            Ok(metadata) => {
                completed += 1;
                info!(
                    "Mapped {} -> {:?} ({}x{})",
                    metadata.original_name,
                    metadata.output_dir,
                    metadata.map_cols,
                    metadata.map_rows
                );
            }
            Err(notification) => {
                // Covers panics, which skip the pipeline's own cleanup
                run.discard();
                warn!(
                    "{:?}: {}: {}",
                    video, notification.title, notification.message
                );
            }
        }
    }

    info!("Mapped {} of {} videos", completed, videos.len());
    if completed == 0 {
        return Err(anyhow::anyhow!("No map could be produced"));
    }

    Ok(())
}
