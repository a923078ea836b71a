use crate::settings::MapSettings;
use crate::video::Backend;
use clap::{Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compute unwrap maps for a video file or every video under a directory
    Map(MapArgs),
    /// Serve the map API over HTTP
    Serve(ServeArgs),
}

#[derive(clap::Args, Debug)]
pub struct MapArgs {
    /// Video file or directory scanned recursively for .mp4 files
    pub input: PathBuf,

    /// Root directory for run outputs
    #[arg(long, env = "TUBE_MAPPING_OUTPUT_ROOT")]
    pub output_root: PathBuf,

    /// Decoder backend
    #[arg(long, value_enum, default_value_t = Backend::Opencv)]
    pub backend: Backend,

    /// JSON settings file; explicit flags override its values
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Rows taken from each frame border
    #[arg(long)]
    pub thickness: Option<u32>,

    /// Source frames advanced between two samples
    #[arg(long)]
    pub frame_frequency: Option<u32>,

    /// Cosine skew amplitude in rows
    #[arg(long)]
    pub skew_effect: Option<u32>,

    /// Enable dust detection on the final map
    #[arg(long)]
    pub dust: bool,

    #[arg(long)]
    pub dust_threshold: Option<u32>,

    #[arg(long)]
    pub dust_min_area: Option<f64>,

    /// Horizontal crop margin
    #[arg(long)]
    pub crop_x: Option<u32>,

    /// Vertical crop margin
    #[arg(long)]
    pub crop_y: Option<u32>,

    /// Show a progress bar while sampling
    #[arg(long)]
    pub progress: bool,
}

impl MapArgs {
    /// Settings file (or defaults) with command-line overrides applied.
    pub fn resolve_settings(&self) -> anyhow::Result<MapSettings> {
        let mut settings = match &self.settings {
            Some(path) => MapSettings::load(path)?,
            None => MapSettings::default(),
        };

        if let Some(v) = self.thickness {
            settings.thickness = v;
        }
        if let Some(v) = self.frame_frequency {
            settings.frame_frequency = v;
        }
        if let Some(v) = self.skew_effect {
            settings.skew_effect = v;
        }
        if self.dust {
            settings.dust_selection_enabled = true;
        }
        if let Some(v) = self.dust_threshold {
            settings.dust_threshold = v;
        }
        if let Some(v) = self.dust_min_area {
            settings.dust_min_area = v;
        }
        if let Some(v) = self.crop_x {
            settings.crop_x = v;
        }
        if let Some(v) = self.crop_y {
            settings.crop_y = v;
        }

        Ok(settings)
    }
}

#[derive(clap::Args, Debug, Clone)]
pub struct ServeArgs {
    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: IpAddr,

    /// Port to bind to
    #[arg(long, default_value_t = 12206)]
    pub port: u16,

    /// Root directory for video files
    #[arg(long, env = "TUBE_MAPPING_VIDEO_ROOT")]
    pub video_root: PathBuf,

    /// Root directory for output artifacts
    #[arg(long, env = "TUBE_MAPPING_OUTPUT_ROOT")]
    pub output_root: PathBuf,

    /// Decoder backend used for every job
    #[arg(long, value_enum, default_value_t = Backend::Opencv)]
    pub backend: Backend,
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{DEFAULT_DUST_MIN_AREA, DEFAULT_SKEW_EFFECT};

    #[test]
    fn test_map_flags_override_defaults() {
        let args = Args::try_parse_from([
            "tube-mapping",
            "map",
            "clip.mp4",
            "--output-root",
            "/tmp/out",
            "--thickness",
            "6",
            "--dust",
            "--crop-x",
            "12",
        ])
        .unwrap();

        let Command::Map(map) = args.command else {
            panic!("expected map subcommand");
        };
        assert_eq!(map.backend, Backend::Opencv);

        let settings = map.resolve_settings().unwrap();
        assert_eq!(settings.thickness, 6);
        assert!(settings.dust_selection_enabled);
        assert_eq!(settings.crop_x, 12);
        assert_eq!(settings.skew_effect, DEFAULT_SKEW_EFFECT);
        assert_eq!(settings.dust_min_area, DEFAULT_DUST_MIN_AREA);
    }

    #[test]
    fn test_serve_backend_flag() {
        let args = Args::try_parse_from([
            "tube-mapping",
            "serve",
            "--video-root",
            "/videos",
            "--output-root",
            "/out",
            "--backend",
            "ffmpeg",
        ])
        .unwrap();

        let Command::Serve(serve) = args.command else {
            panic!("expected serve subcommand");
        };
        assert_eq!(serve.port, 12206);
        assert_eq!(serve.backend, Backend::Ffmpeg);
    }
}
