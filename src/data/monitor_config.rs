use std::path::{Path, PathBuf};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use crate::common::ModelConfig;
use crate::data::{ensure_parent_dir, create_directory, DetectorFailurePolicy, FsAccess, HazardClass, LogFailurePolicy};

const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Camera tried first when the `opencv` feature is enabled.
    pub camera_index: i32,
    pub fallback_video: String,
    /// Directory of still frames, read in file-name order. Takes precedence over the camera when set.
    pub frames_dir: Option<String>,
    pub max_frames: Option<u64>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            camera_index: 0,
            fallback_video: "data/sample_video.mp4".to_string(),
            frames_dir: None,
            max_frames: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub event_log: String,
    pub video_path: String,
    /// Annotated frames are also written here as numbered JPEGs when set.
    pub frames_dir: Option<String>,
    pub fps: f64,
    /// TrueType font for overlay text. Without one only boxes and the banner bar are drawn.
    pub font_path: Option<String>,
    pub display: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            event_log: "data/event_log.csv".to_string(),
            video_path: "data/output_annotated.mp4".to_string(),
            frames_dir: None,
            fps: 20.0,
            font_path: None,
            display: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub bind: String,
    pub auto_refresh: bool,
    pub refresh_interval_secs: u64,
    pub recent_events: usize,
    pub camera_interval_ms: u64,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8501".to_string(),
            auto_refresh: true,
            refresh_interval_secs: 5,
            recent_events: 10,
            camera_interval_ms: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub model: ModelConfig,
    pub source: SourceConfig,
    pub output: OutputConfig,
    pub dashboard: DashboardConfig,
    pub hazard_classes: Vec<HazardClass>,
    pub relay_pin: u8,
    pub on_detector_error: DetectorFailurePolicy,
    pub on_log_error: LogFailurePolicy,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            source: SourceConfig::default(),
            output: OutputConfig::default(),
            dashboard: DashboardConfig::default(),
            hazard_classes: HazardClass::defaults(),
            relay_pin: 17,
            on_detector_error: DetectorFailurePolicy::default(),
            on_log_error: LogFailurePolicy::default(),
        }
    }
}

impl MonitorConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Loads `explicit` if given, else the first existing `config.json` in
    /// `./safety_monitor/` or the user config dir, else the defaults.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        for candidate in Self::candidate_paths() {
            if candidate.is_file() {
                log::info!("Using config file {}", candidate.display());
                return Self::from_file(&candidate);
            }
        }
        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn candidate_paths() -> Vec<PathBuf> {
        [FsAccess::Current, FsAccess::Config]
            .iter()
            .filter_map(|fs| fs.path().ok())
            .map(|dir| dir.join(CONFIG_FILE))
            .collect()
    }

    /// Creates every directory the monitor writes into.
    pub fn ensure_output_dirs(&self) -> anyhow::Result<()> {
        ensure_parent_dir(Path::new(&self.output.event_log))?;
        ensure_parent_dir(Path::new(&self.output.video_path))?;
        if let Some(dir) = &self.output.frames_dir {
            create_directory(Path::new(dir))?;
        }
        Ok(())
    }
}
