use crate::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Configuration for the media transcriber
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Input discovery settings
    pub processing: ProcessingConfig,

    /// Audio extraction settings
    pub audio: AudioConfig,

    /// Recognition engine settings
    pub transcription: TranscriptionConfig,

    /// Retry and backoff for external calls
    pub retry: RetryConfig,

    /// Log sink settings
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Media file extensions picked up by discovery (case-insensitive, no dot)
    pub supported_extensions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// ffmpeg executable name or path
    pub ffmpeg_binary: String,

    /// Target sample rate for transcription
    pub target_sample_rate: u32,

    /// Output channel count
    pub channels: u32,

    /// ffmpeg audio codec for the waveform
    pub codec: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WhisperBackend {
    /// Probe whisper-cli, whisper-cpp, then Python whisper
    Auto,
    WhisperCli,
    WhisperCpp,
    Python,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    /// Which Whisper implementation to run
    pub backend: WhisperBackend,

    /// Model name, or a path to a ggml model file
    pub model: String,

    /// Directory searched for `ggml-<model>.bin`
    pub model_dir: PathBuf,

    /// Language hint (None for auto-detect)
    pub language: Option<String>,

    /// Enable GPU acceleration
    pub use_gpu: bool,

    /// Threads for whisper.cpp
    pub threads: u32,

    /// Timeout for one recognition call (seconds)
    pub timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per external call, including the first
    pub max_attempts: u32,

    /// Delay after the first failed attempt; doubles after each further failure
    pub base_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log file, appended to on every run
    pub log_file: PathBuf,

    /// Default level when RUST_LOG is not set
    pub log_level: String,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            supported_extensions: ["mp4", "mkv", "avi", "mov", "webm", "m4v", "m4a", "mp3", "flac", "ogg"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            ffmpeg_binary: "ffmpeg".to_string(),
            target_sample_rate: 16000, // Optimal for Whisper
            channels: 1,
            codec: "pcm_s16le".to_string(),
        }
    }
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            backend: WhisperBackend::Auto,
            model: "distil-large-v3".to_string(),
            model_dir: PathBuf::from("models"),
            language: None,
            use_gpu: false,
            threads: 4,
            timeout: 3600, // 60 minutes for large files
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_file: PathBuf::from("transcription_pipeline.log"),
            log_level: "info".to_string(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.base_delay_ms))
    }
}

impl Config {
    /// Locations searched by [`Config::load`], in order
    pub const SEARCH_PATHS: [&'static str; 2] = ["media-transcriber.toml", "config/media-transcriber.toml"];

    /// Load configuration from the first config file found, falling back to the
    /// environment over defaults. Environment overrides apply in both cases.
    pub fn load() -> Result<Self> {
        for path in Self::SEARCH_PATHS {
            let path = Path::new(path);
            if path.is_file() {
                return Self::from_file(path);
            }
        }

        Ok(Self::default().with_env_overrides())
    }

    /// Load configuration from a specific TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::Config(format!("Cannot read {}: {}", path.display(), e)))?;
        let config: Self = toml::from_str(&config_str)
            .map_err(|e| PipelineError::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
        Ok(config.with_env_overrides())
    }

    /// Apply `MEDIA_TRANSCRIBER_*` environment variables
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(attempts) = env_parse("MEDIA_TRANSCRIBER_MAX_RETRIES") {
            self.retry.max_attempts = attempts;
        }

        if let Some(delay) = env_parse("MEDIA_TRANSCRIBER_BASE_DELAY_MS") {
            self.retry.base_delay_ms = delay;
        }

        if let Ok(model) = std::env::var("MEDIA_TRANSCRIBER_MODEL") {
            self.transcription.model = model;
        }

        if let Ok(ffmpeg) = std::env::var("MEDIA_TRANSCRIBER_FFMPEG") {
            self.audio.ffmpeg_binary = ffmpeg;
        }

        if let Ok(log_file) = std::env::var("MEDIA_TRANSCRIBER_LOG_FILE") {
            self.logging.log_file = PathBuf::from(log_file);
        }

        if let Ok(log_level) = std::env::var("MEDIA_TRANSCRIBER_LOG_LEVEL") {
            self.logging.log_level = log_level;
        }

        self
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let config_str = toml::to_string_pretty(self)
            .map_err(|e| PipelineError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, config_str)?;
        tracing::info!("💾 Configuration saved to: {}", path.display());
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(PipelineError::Config("max_attempts must be greater than 0".to_string()));
        }

        if self.audio.target_sample_rate == 0 || self.audio.channels == 0 {
            return Err(PipelineError::Config(
                "target_sample_rate and channels must be greater than 0".to_string(),
            ));
        }

        if self.processing.supported_extensions.is_empty() {
            return Err(PipelineError::Config("supported_extensions must not be empty".to_string()));
        }

        // The waveform is written next to the source as <name>.wav
        if self
            .processing
            .supported_extensions
            .iter()
            .any(|ext| ext.trim_start_matches('.').eq_ignore_ascii_case("wav"))
        {
            return Err(PipelineError::Config(
                "wav cannot be a source extension: it is the intermediate waveform format".to_string(),
            ));
        }

        if self.transcription.timeout == 0 {
            return Err(PipelineError::Config("transcription timeout must be greater than 0".to_string()));
        }

        Ok(())
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        format!(
            "Media Transcriber Configuration:\n\
            - Supported Extensions: {}\n\
            - Audio: {} {}Hz, {} channel(s) via {}\n\
            - Whisper: {:?} backend, model {}\n\
            - Retries: {} attempts, {}ms base backoff\n\
            - Log File: {}",
            self.processing.supported_extensions.join(", "),
            self.audio.codec,
            self.audio.target_sample_rate,
            self.audio.channels,
            self.audio.ffmpeg_binary,
            self.transcription.backend,
            self.transcription.model,
            self.retry.max_attempts,
            self.retry.base_delay_ms,
            self.logging.log_file.display()
        )
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Configuration builder for programmatic config creation
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.config.retry.max_attempts = attempts;
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.config.retry.base_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_model(mut self, model: String) -> Self {
        self.config.transcription.model = model;
        self
    }

    pub fn with_backend(mut self, backend: WhisperBackend) -> Self {
        self.config.transcription.backend = backend;
        self
    }

    pub fn with_extensions(mut self, extensions: &[&str]) -> Self {
        self.config.processing.supported_extensions = extensions.iter().map(|e| e.to_string()).collect();
        self
    }

    pub fn with_log_file(mut self, path: PathBuf) -> Self {
        self.config.logging.log_file = path;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.audio.target_sample_rate, 16000);
        assert_eq!(config.audio.channels, 1);
        assert_eq!(config.audio.codec, "pcm_s16le");
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.logging.log_file, PathBuf::from("transcription_pipeline.log"));
        assert!(config.processing.supported_extensions.contains(&"mp4".to_string()));
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .with_max_attempts(5)
            .with_model("base".to_string())
            .with_backend(WhisperBackend::Python)
            .build();

        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.transcription.model, "base");
        assert_eq!(config.transcription.backend, WhisperBackend::Python);
    }

    #[test]
    fn test_config_validation() {
        assert!(Config::default().validate().is_ok());

        let config = ConfigBuilder::new().with_max_attempts(0).build();
        assert!(config.validate().is_err());

        let config = ConfigBuilder::new().with_extensions(&["mp4", "WAV"]).build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_policy_from_config() {
        let policy = RetryConfig::default().policy();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.base_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("media-transcriber.toml");
        std::fs::write(
            &path,
            "[retry]\nmax_attempts = 5\n\n[transcription]\nbackend = \"whisper-cli\"\nmodel = \"small\"\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, 1000);
        assert_eq!(config.transcription.backend, WhisperBackend::WhisperCli);
        assert_eq!(config.transcription.model, "small");
        assert_eq!(config.audio.target_sample_rate, 16000);
    }

    #[test]
    fn test_save_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("saved.toml");

        let config = ConfigBuilder::new().with_model("medium".to_string()).build();
        config.save(&path).unwrap();

        let reloaded = Config::from_file(&path).unwrap();
        assert_eq!(reloaded.transcription.model, "medium");
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.toml");
        std::fs::write(&path, "[retry\nmax_attempts = ").unwrap();

        assert!(matches!(Config::from_file(&path), Err(PipelineError::Config(_))));
    }
}
