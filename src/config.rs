//! Runtime configuration: file discovery, environment overrides, defaults

use crate::camera::{CameraConfig, Facing, PixelFormat};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const FILE_CANDIDATES: [&str; 3] = ["qcheckin.toml", "qcheckin.yaml", "qcheckin.yml"];
const XDG_CANDIDATES: [&str; 2] = ["config.toml", "config.yaml"];

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QcheckinConfig {
    /// Camera selection and capture settings
    pub camera: CameraOptions,
    /// Decode loop tuning
    pub scanner: ScannerOptions,
    /// Check-in service endpoint
    pub service: ServiceOptions,
    /// Operator sign-in
    pub auth: AuthOptions,
    /// Logging configuration
    pub logging: LoggingOptions,
}

impl QcheckinConfig {
    /// Load from `explicit_path`, or the first discovered config file, or defaults;
    /// then apply `QCHECKIN_*` environment overrides.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut config = match explicit_path {
            Some(path) => Self::from_file(path)?,
            None => match Self::discover_file()? {
                Some(path) => {
                    tracing::info!("Using configuration file: {}", path.display());
                    Self::from_file(&path)?
                }
                None => {
                    tracing::debug!("No qcheckin.toml / qcheckin.yaml found, using defaults");
                    Self::default()
                }
            },
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn discover_file() -> Result<Option<PathBuf>> {
        let cwd =
            env::current_dir().map_err(|e| Error::Config(format!("Failed to read cwd: {e}")))?;
        let local = FILE_CANDIDATES.iter().map(|name| cwd.join(name));

        let xdg = env::var_os("XDG_CONFIG_HOME")
            .map(|base| PathBuf::from(base).join("qcheckin"))
            .into_iter()
            .flat_map(|base| XDG_CANDIDATES.iter().map(move |name| base.join(name)));

        Ok(local.chain(xdg).find(|path| path.exists()))
    }

    /// Parse a TOML or YAML file, chosen by extension
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {e}", path.display())))?;

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        match extension.as_str() {
            "toml" => toml::from_str(&contents).map_err(|e| {
                Error::Config(format!("Failed to parse TOML {}: {e}", path.display()))
            }),
            "yaml" | "yml" => serde_yaml::from_str(&contents).map_err(|e| {
                Error::Config(format!("Failed to parse YAML {}: {e}", path.display()))
            }),
            other => Err(Error::Config(format!(
                "Unsupported config format '{other}', expected toml/yaml"
            ))),
        }
    }

    fn apply_env_overrides(&mut self) {
        self.camera.apply_env_overrides();
        self.scanner.apply_env_overrides();
        self.service.apply_env_overrides();
        self.auth.apply_env_overrides();
        self.logging.apply_env_overrides();
    }

    /// Fully resolved capture settings
    pub fn camera_config(&self) -> Result<CameraConfig> {
        self.camera.to_camera_config()
    }
}

/// Camera overrides merged on top of `CameraConfig::default()`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraOptions {
    /// Facing used for the first scan
    pub facing: Facing,
    /// Name substring of the rear camera
    pub environment_device: Option<String>,
    /// Name substring of the front camera
    pub user_device: Option<String>,
    /// Frame width in pixels
    pub width: Option<u32>,
    /// Frame height in pixels
    pub height: Option<u32>,
    /// Frames per second
    pub fps: Option<u32>,
    /// Pixel format (mjpeg/yuyv/rgb24)
    pub format: Option<String>,
    /// Number of driver buffers
    pub buffer_count: Option<u32>,
}

impl CameraOptions {
    fn apply_env_overrides(&mut self) {
        if let Some(facing) = env::var("QCHECKIN_CAMERA_FACING")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.facing = facing;
        }
        if let Ok(name) = env::var("QCHECKIN_CAMERA_ENVIRONMENT") {
            self.environment_device = Some(name);
        }
        if let Ok(name) = env::var("QCHECKIN_CAMERA_USER") {
            self.user_device = Some(name);
        }
        if let Ok(format) = env::var("QCHECKIN_CAMERA_FORMAT") {
            self.format = Some(format);
        }
        if let Some(fps) = env::var("QCHECKIN_CAMERA_FPS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.fps = Some(fps);
        }
    }

    /// Merge overrides onto the default capture settings
    pub fn to_camera_config(&self) -> Result<CameraConfig> {
        let defaults = CameraConfig::default();

        let format = match &self.format {
            Some(format) => PixelFormat::parse(format).ok_or_else(|| {
                Error::Config(format!(
                    "Unknown pixel format '{format}'. Use mjpeg, yuyv, or rgb24"
                ))
            })?,
            None => defaults.format,
        };

        Ok(CameraConfig {
            width: self.width.unwrap_or(defaults.width),
            height: self.height.unwrap_or(defaults.height),
            fps: self.fps.map(|fps| fps.max(1)).unwrap_or(defaults.fps),
            format,
            buffer_count: self
                .buffer_count
                .map(|n| n.max(2))
                .unwrap_or(defaults.buffer_count),
            environment_hint: self.environment_device.clone(),
            user_hint: self.user_device.clone(),
        })
    }
}

/// Decode loop tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerOptions {
    /// Pause between frames that held no readable code
    pub frame_interval_ms: u64,
}

impl Default for ScannerOptions {
    fn default() -> Self {
        Self {
            frame_interval_ms: 90,
        }
    }
}

impl ScannerOptions {
    fn apply_env_overrides(&mut self) {
        if let Some(ms) = env::var("QCHECKIN_FRAME_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.frame_interval_ms = ms;
        }
    }

    /// Frame interval as a duration
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

/// Check-in service endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceOptions {
    /// Base URL; requests go to `{base_url}/checkin/{ticketId}`
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Optional bearer token
    pub token: Option<String>,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            timeout_secs: 10,
            token: None,
        }
    }
}

impl ServiceOptions {
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = env::var("QCHECKIN_SERVICE_URL") {
            self.base_url = url;
        }
        if let Some(secs) = env::var("QCHECKIN_SERVICE_TIMEOUT")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.timeout_secs = secs;
        }
        if let Ok(token) = env::var("QCHECKIN_SERVICE_TOKEN") {
            self.token = Some(token).filter(|t| !t.trim().is_empty());
        }
    }
}

/// Operator sign-in
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthOptions {
    /// Shared secret operators sign in with
    pub operator_secret: Option<String>,
}

impl AuthOptions {
    fn apply_env_overrides(&mut self) {
        if let Ok(secret) = env::var("QCHECKIN_OPERATOR_SECRET") {
            self.operator_secret = Some(secret);
        }
    }
}

/// Structured logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingOptions {
    /// Default log level (overridable via `QCHECKIN_LOG_LEVEL`)
    pub level: String,
    /// Optional log file path
    pub file: Option<PathBuf>,
    /// ANSI colors on stdout
    pub color: bool,
    /// Optional rotation for `file`
    pub rotation: Option<LogRotation>,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            color: true,
            rotation: None,
        }
    }
}

impl LoggingOptions {
    fn apply_env_overrides(&mut self) {
        if let Ok(level) = env::var("QCHECKIN_LOG_LEVEL") {
            self.level = level;
        }
        if let Ok(file) = env::var("QCHECKIN_LOG_FILE") {
            self.file = Some(PathBuf::from(file));
        }
        if let Ok(color) = env::var("QCHECKIN_LOG_COLOR") {
            match color.to_ascii_lowercase().as_str() {
                "0" | "false" | "off" => self.color = false,
                "1" | "true" | "on" => self.color = true,
                _ => {}
            }
        }
        if let Some(rotation) = env::var("QCHECKIN_LOG_ROTATION")
            .ok()
            .and_then(|v| LogRotation::parse(&v))
        {
            self.rotation = Some(rotation);
        }
    }
}

/// Log file rotation policy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    /// Rotate log files once per hour
    Hourly,
    /// Rotate log files once per day
    Daily,
}

impl LogRotation {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "hourly" => Some(Self::Hourly),
            "daily" => Some(Self::Daily),
            _ => None,
        }
    }
}
