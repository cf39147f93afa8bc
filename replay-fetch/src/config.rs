//! Application configuration.
//!
//! Values are layered, later layers winning:
//! 1. built-in defaults
//! 2. a TOML file (`--config`, else `<config dir>/replay-fetch/config.toml`
//!    when it exists)
//! 3. `FFMPEG_PATH` / `FFPROBE_PATH` from the environment
//! 4. command line flags (applied by the binary)
//!
//! ```toml
//! [ffmpeg]
//! ffmpeg_path = "/usr/local/bin/ffmpeg"
//! remux_timeout_secs = 900
//!
//! [pipeline]
//! segment_tolerance_ms = 3000
//!
//! [http]
//! connect_timeout_secs = 10
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use ffmpeg_runner::FfmpegConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::utils::fs::io_error;
use crate::{Error, Result};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/142.0.0.0 Safari/537.36";

/// Directory name under the platform config dir.
const APP_DIR: &str = "replay-fetch";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub ffmpeg: FfmpegSection,
    pub pipeline: PipelineConfig,
    pub http: HttpConfig,
}

/// `[ffmpeg]`: external tool locations and time limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FfmpegSection {
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    pub probe_timeout_secs: u64,
    pub remux_timeout_secs: u64,
    pub concat_timeout_secs: u64,
}

impl Default for FfmpegSection {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            probe_timeout_secs: 10,
            remux_timeout_secs: 15 * 60,
            concat_timeout_secs: 20 * 60,
        }
    }
}

impl FfmpegSection {
    pub fn runner_config(&self) -> FfmpegConfig {
        FfmpegConfig::new(&self.ffmpeg_path, &self.ffprobe_path)
            .with_probe_timeout(Duration::from_secs(self.probe_timeout_secs))
    }

    pub fn remux_timeout(&self) -> Duration {
        Duration::from_secs(self.remux_timeout_secs)
    }

    pub fn concat_timeout(&self) -> Duration {
        Duration::from_secs(self.concat_timeout_secs)
    }
}

/// `[pipeline]`: verification tolerances, pacing and output naming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum difference between declared and probed segment duration.
    pub segment_tolerance_ms: u64,
    /// Maximum difference for accepting an existing merged recording.
    pub recording_tolerance_ms: u64,
    pub progress_interval_ms: u64,
    /// Per-index start delay of a task, capped at `stagger_max_ms`.
    pub stagger_step_ms: u64,
    pub stagger_max_ms: u64,
    /// Extension of remuxed segments.
    pub intermediate_extension: String,
    pub manifest_name: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            segment_tolerance_ms: 3_000,
            recording_tolerance_ms: 10_000,
            progress_interval_ms: 120,
            stagger_step_ms: 20,
            stagger_max_ms: 2_000,
            intermediate_extension: "ts".to_string(),
            manifest_name: "playlist.m3u8".to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn segment_tolerance(&self) -> Duration {
        Duration::from_millis(self.segment_tolerance_ms)
    }

    pub fn recording_tolerance(&self) -> Duration {
        Duration::from_millis(self.recording_tolerance_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn stagger_step(&self) -> Duration {
        Duration::from_millis(self.stagger_step_ms)
    }

    pub fn stagger_max(&self) -> Duration {
        Duration::from_millis(self.stagger_max_ms)
    }

    /// Intermediate extension without a leading dot.
    pub fn intermediate_extension(&self) -> &str {
        self.intermediate_extension.trim_start_matches('.')
    }
}

/// `[http]`: transfer client settings. Zero timeouts disable the limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            connect_timeout_secs: 10,
            read_timeout_secs: 30,
        }
    }
}

impl HttpConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

impl AppConfig {
    /// Default config file location, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::config(format!("invalid config file: {e}")))
    }

    /// Load the file layer.
    ///
    /// An explicit `path` must exist. Without one, the default location is
    /// used when present and built-in defaults otherwise.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) if tokio::fs::try_exists(&path).await.unwrap_or(false) => path,
                _ => {
                    debug!("No config file found, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| io_error("reading config file", &path, e))?;
        let config = Self::from_toml_str(&content)?;
        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Apply `FFMPEG_PATH` / `FFPROBE_PATH` from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("FFMPEG_PATH").filter(|v| !v.trim().is_empty()) {
            self.ffmpeg.ffmpeg_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("FFPROBE_PATH").filter(|v| !v.trim().is_empty()) {
            self.ffmpeg.ffprobe_path = PathBuf::from(path);
        }
    }

    pub fn validate(&self) -> Result<()> {
        let ext = self.pipeline.intermediate_extension();
        if ext.is_empty() || ext.contains(['/', '\\']) {
            return Err(Error::config(format!(
                "invalid intermediate extension `{}`",
                self.pipeline.intermediate_extension
            )));
        }
        if self.pipeline.manifest_name.is_empty()
            || self.pipeline.manifest_name.contains(['/', '\\'])
        {
            return Err(Error::config(format!(
                "invalid manifest name `{}`",
                self.pipeline.manifest_name
            )));
        }
        if self.pipeline.progress_interval_ms == 0 {
            return Err(Error::config("progress interval must be positive"));
        }
        if self.ffmpeg.probe_timeout_secs == 0 {
            return Err(Error::config("probe timeout must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.ffmpeg.remux_timeout(), Duration::from_secs(900));
        assert_eq!(config.ffmpeg.concat_timeout(), Duration::from_secs(1200));
        assert_eq!(config.pipeline.segment_tolerance(), Duration::from_secs(3));
        assert_eq!(config.pipeline.recording_tolerance(), Duration::from_secs(10));
        assert_eq!(config.pipeline.progress_interval(), Duration::from_millis(120));
        assert_eq!(config.pipeline.manifest_name, "playlist.m3u8");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [ffmpeg]
            ffmpeg_path = "/opt/ffmpeg/bin/ffmpeg"

            [pipeline]
            segment_tolerance_ms = 5000
            "#,
        )
        .unwrap();

        assert_eq!(config.ffmpeg.ffmpeg_path, PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));
        assert_eq!(config.ffmpeg.ffprobe_path, PathBuf::from("ffprobe"));
        assert_eq!(config.pipeline.segment_tolerance(), Duration::from_secs(5));
        assert_eq!(config.pipeline.stagger_step_ms, 20);
        assert_eq!(config.http, HttpConfig::default());
    }

    #[test]
    fn test_invalid_toml_is_configuration_error() {
        let err = AppConfig::from_toml_str("[ffmpeg]\nremux_timeout_secs = \"soon\"").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = AppConfig::from_toml_str("[ffmpeg]\nffmpeg_path = \"a\"").unwrap();
        config.apply_env_from(|key| match key {
            "FFMPEG_PATH" => Some("/env/ffmpeg".to_string()),
            "FFPROBE_PATH" => Some("  ".to_string()),
            _ => None,
        });
        assert_eq!(config.ffmpeg.ffmpeg_path, PathBuf::from("/env/ffmpeg"));
        assert_eq!(config.ffmpeg.ffprobe_path, PathBuf::from("ffprobe"));
    }

    #[test]
    fn test_validate_rejects_bad_names() {
        let mut config = AppConfig::default();
        config.pipeline.manifest_name = "../x.m3u8".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.pipeline.intermediate_extension = ".".to_string();
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_load_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        tokio::fs::write(&path, "[http]\nuser_agent = \"test-agent\"")
            .await
            .unwrap();

        let config = AppConfig::load(Some(&path)).await.unwrap();
        assert_eq!(config.http.user_agent, "test-agent");

        let err = AppConfig::load(Some(&dir.path().join("missing.toml")))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
