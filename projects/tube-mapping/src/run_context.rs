use crate::error::PipelineResult;
use crate::settings::MapSettings;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const METADATA_FILE: &str = "metadata.json";
pub const MAP_FILE: &str = "map.png";
pub const DUST_MAP_FILE: &str = "dust.png";
pub const DUST_REPORT_FILE: &str = "dust.csv";

/// Summary of a finished map run, persisted as `metadata.json`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RunMetadata {
    pub original_name: String,
    pub created_at: DateTime<Utc>,
    pub run_id: String,
    pub settings: MapSettings,
    #[serde(default)]
    pub frames_sampled: usize,
    #[serde(default)]
    pub map_rows: i32,
    #[serde(default)]
    pub map_cols: i32,
    #[serde(default)]
    pub dust_contours: Option<usize>,
    #[serde(skip)]
    pub output_dir: PathBuf,
}

/// Output directory reserved for one video.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub video_path: PathBuf,
    pub output_dir: PathBuf,
}

impl RunContext {
    pub fn map_path(&self) -> PathBuf {
        self.output_dir.join(MAP_FILE)
    }

    pub fn dust_map_path(&self) -> PathBuf {
        self.output_dir.join(DUST_MAP_FILE)
    }

    pub fn dust_report_path(&self) -> PathBuf {
        self.output_dir.join(DUST_REPORT_FILE)
    }

    pub fn write_metadata(&self, metadata: &RunMetadata) -> PipelineResult<()> {
        let content = serde_json::to_string_pretty(metadata)?;
        fs::write(self.output_dir.join(METADATA_FILE), content)?;
        Ok(())
    }

    /// Removes the run directory of a failed run.
    pub fn discard(&self) {
        if !self.output_dir.exists() {
            return;
        }
        match fs::remove_dir_all(&self.output_dir) {
            Ok(()) => tracing::info!("Discarded run directory {:?}", self.output_dir),
            Err(e) => tracing::warn!(
                "Failed to remove run directory {:?}: {}",
                self.output_dir,
                e
            ),
        }
    }
}

pub fn is_video(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase() == "mp4")
        .unwrap_or(false)
}

pub fn list_videos(video_root: &Path) -> Vec<PathBuf> {
    let mut videos: Vec<PathBuf> = WalkDir::new(video_root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| is_video(e.path()))
        .map(|e| e.path().to_path_buf())
        .collect();
    videos.sort();
    videos
}

/// Creates `<output_root>/<video stem>`; an existing directory is an error.
pub fn create_run(output_root: &Path, video_path: &Path) -> Result<RunContext> {
    let stem = video_path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| anyhow::anyhow!("Invalid video name: {:?}", video_path))?;

    let output_dir = output_root.join(stem);
    if output_dir.exists() {
        return Err(anyhow::anyhow!(
            "Output directory already exists for: {}",
            stem
        ));
    }

    fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create run directory {:?}", output_dir))?;

    Ok(RunContext {
        run_id: stem.to_string(),
        video_path: video_path.to_path_buf(),
        output_dir,
    })
}

pub fn list_runs(output_root: &Path) -> Result<Vec<RunMetadata>> {
    let mut outputs = Vec::new();

    if !output_root.exists() {
        return Ok(outputs);
    }

    for entry in fs::read_dir(output_root)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }

        let metadata_path = path.join(METADATA_FILE);
        if metadata_path.exists() {
            let content = fs::read_to_string(&metadata_path)?;
            match serde_json::from_str::<RunMetadata>(&content) {
                Ok(mut metadata) => {
                    metadata.output_dir = path.clone();
                    outputs.push(metadata);
                }
                Err(e) => tracing::warn!("Skipping unreadable {:?}: {}", metadata_path, e),
            }
        }
    }

    outputs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "tube-mapping-run-{}-{}",
            std::process::id(),
            name
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_create_run_and_list() {
        let root = scratch_dir("create");
        let ctx = create_run(&root, Path::new("/videos/pipe_a.mp4")).unwrap();
        assert_eq!(ctx.run_id, "pipe_a");
        assert!(ctx.output_dir.is_dir());

        // Same stem cannot be reused
        assert!(create_run(&root, Path::new("/other/pipe_a.mp4")).is_err());

        let metadata = RunMetadata {
            original_name: "pipe_a.mp4".to_string(),
            created_at: Utc::now(),
            run_id: ctx.run_id.clone(),
            settings: MapSettings::default(),
            frames_sampled: 10,
            map_rows: 40,
            map_cols: 2240,
            dust_contours: None,
            output_dir: PathBuf::new(),
        };
        ctx.write_metadata(&metadata).unwrap();

        let runs = list_runs(&root).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].run_id, "pipe_a");
        assert_eq!(runs[0].map_cols, 2240);
        assert_eq!(runs[0].output_dir, ctx.output_dir);

        fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn test_discard_frees_the_stem() {
        let root = scratch_dir("discard");
        let ctx = create_run(&root, Path::new("/videos/pipe_b.mp4")).unwrap();
        fs::write(ctx.map_path(), b"partial").unwrap();

        ctx.discard();
        assert!(!ctx.output_dir.exists());
        // Discarding twice is harmless
        ctx.discard();

        assert!(create_run(&root, Path::new("/videos/pipe_b.mp4")).is_ok());
        fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn test_list_videos_filters_mp4() {
        let root = scratch_dir("videos");
        fs::create_dir_all(root.join("nested")).unwrap();
        fs::write(root.join("b.MP4"), b"").unwrap();
        fs::write(root.join("nested").join("a.mp4"), b"").unwrap();
        fs::write(root.join("notes.txt"), b"").unwrap();

        let videos = list_videos(&root);
        assert_eq!(videos.len(), 2);
        assert!(videos.iter().all(|p| is_video(p)));

        fs::remove_dir_all(root).unwrap();
    }
}
