use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Which message bus the daemon registers on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    Session,
    System,
}

/// Daemon configuration: built-in defaults, then an optional TOML file
/// (`ROLLCALL_CONFIG`), then `ROLLCALL_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// V4L2 device path; `None` probes /dev/video0..4.
    pub camera_device: Option<String>,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Directory of registration photos named `<rollNumber>.<ext>`.
    pub student_dir: PathBuf,
    /// JSON attendance ledger.
    pub attendance_file: PathBuf,
    /// Maximum cosine distance for a match.
    pub acceptance_threshold: f32,
    /// Seconds before a matched roll number is evaluated again.
    pub cooldown_secs: u64,
    /// Delay between loop iterations.
    pub frame_interval_ms: u64,
    /// Upper bound on a single frame read.
    pub capture_timeout_ms: u64,
    /// Faces encoded per frame, most confident first.
    pub max_faces: usize,
    /// Skip frames that are almost entirely black.
    pub skip_dark_frames: bool,
    pub bus: BusKind,
}

/// Mirror of [`Config`] with every field optional, as read from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    camera_device: Option<String>,
    model_dir: Option<PathBuf>,
    student_dir: Option<PathBuf>,
    attendance_file: Option<PathBuf>,
    acceptance_threshold: Option<f32>,
    cooldown_secs: Option<u64>,
    frame_interval_ms: Option<u64>,
    capture_timeout_ms: Option<u64>,
    max_faces: Option<usize>,
    skip_dark_frames: Option<bool>,
    bus: Option<BusKind>,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("rollcall");

        Self {
            camera_device: None,
            model_dir: rollcall_core::default_model_dir(),
            student_dir: data_dir.join("student-images"),
            attendance_file: data_dir.join("attendance.json"),
            acceptance_threshold: rollcall_core::DEFAULT_ACCEPTANCE_THRESHOLD,
            cooldown_secs: 5,
            frame_interval_ms: 100,
            capture_timeout_ms: 2000,
            max_faces: 8,
            skip_dark_frames: true,
            bus: BusKind::Session,
        }
    }
}

impl Config {
    /// Load defaults, the optional config file, then environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(path) = std::env::var("ROLLCALL_CONFIG") {
            config.apply_file(Path::new(&path))?;
        }
        config.apply_env();
        Ok(config)
    }

    fn apply_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file = Self::parse_file(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        self.merge(file);
        Ok(())
    }

    fn parse_file(text: &str) -> Result<FileConfig, toml::de::Error> {
        toml::from_str(text)
    }

    fn merge(&mut self, file: FileConfig) {
        if let Some(v) = file.camera_device {
            self.camera_device = non_empty(v);
        }
        if let Some(v) = file.model_dir {
            self.model_dir = v;
        }
        if let Some(v) = file.student_dir {
            self.student_dir = v;
        }
        if let Some(v) = file.attendance_file {
            self.attendance_file = v;
        }
        if let Some(v) = file.acceptance_threshold {
            self.acceptance_threshold = v;
        }
        if let Some(v) = file.cooldown_secs {
            self.cooldown_secs = v;
        }
        if let Some(v) = file.frame_interval_ms {
            self.frame_interval_ms = v;
        }
        if let Some(v) = file.capture_timeout_ms {
            self.capture_timeout_ms = v;
        }
        if let Some(v) = file.max_faces {
            self.max_faces = v;
        }
        if let Some(v) = file.skip_dark_frames {
            self.skip_dark_frames = v;
        }
        if let Some(v) = file.bus {
            self.bus = v;
        }
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("ROLLCALL_CAMERA_DEVICE") {
            self.camera_device = non_empty(v);
        }
        if let Ok(v) = std::env::var("ROLLCALL_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("ROLLCALL_STUDENT_DIR") {
            self.student_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("ROLLCALL_ATTENDANCE_FILE") {
            self.attendance_file = PathBuf::from(v);
        }
        self.acceptance_threshold = env_parse("ROLLCALL_ACCEPTANCE_THRESHOLD", self.acceptance_threshold);
        self.cooldown_secs = env_parse("ROLLCALL_COOLDOWN_SECS", self.cooldown_secs);
        self.frame_interval_ms = env_parse("ROLLCALL_FRAME_INTERVAL_MS", self.frame_interval_ms);
        self.capture_timeout_ms = env_parse("ROLLCALL_CAPTURE_TIMEOUT_MS", self.capture_timeout_ms);
        self.max_faces = env_parse("ROLLCALL_MAX_FACES", self.max_faces);
        if let Ok(v) = std::env::var("ROLLCALL_SKIP_DARK_FRAMES") {
            self.skip_dark_frames = v != "0";
        }
        if let Ok(v) = std::env::var("ROLLCALL_BUS") {
            match v.as_str() {
                "system" => self.bus = BusKind::System,
                "session" => self.bus = BusKind::Session,
                other => tracing::warn!(value = other, "ignoring unknown ROLLCALL_BUS"),
            }
        }
    }

    /// Reference encoding cache, kept beside the photos.
    pub fn encoding_cache(&self) -> PathBuf {
        self.student_dir.join("encodings.json")
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_millis(self.capture_timeout_ms)
    }
}

fn non_empty(v: String) -> Option<String> {
    let v = v.trim();
    (!v.is_empty()).then(|| v.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
