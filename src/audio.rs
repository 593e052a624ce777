use crate::config::AudioConfig;
use crate::discovery::verify_file_exists;
use crate::retry::{AttemptReport, RetryPolicy};
use crate::{PipelineError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tracing::{debug, info, warn};

/// Options handed to the transcoding tool for one extraction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionOptions {
    /// Drop every video stream
    pub disable_video: bool,
    pub sample_rate: u32,
    pub channels: u32,
    /// ffmpeg codec name, `pcm_s16le` for 16-bit PCM
    pub codec: String,
    /// Replace an existing target
    pub overwrite: bool,
}

impl ExtractionOptions {
    pub fn from_config(config: &AudioConfig) -> Self {
        Self {
            disable_video: true,
            sample_rate: config.target_sample_rate,
            channels: config.channels,
            codec: config.codec.clone(),
            overwrite: true,
        }
    }

    /// Command line for ffmpeg
    pub fn ffmpeg_args(&self, source: &Path, target: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-i".into(), source.into()];

        if self.disable_video {
            args.push("-vn".into());
        }

        args.extend([
            OsString::from("-acodec"),
            OsString::from(&self.codec),
            OsString::from("-ar"),
            OsString::from(self.sample_rate.to_string()),
            OsString::from("-ac"),
            OsString::from(self.channels.to_string()),
        ]);

        if self.overwrite {
            args.push("-y".into());
        }

        args.push(target.into());
        args
    }
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self::from_config(&AudioConfig::default())
    }
}

/// Exit status and captured diagnostics of one tool invocation
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub exit_code: Option<i32>,
    pub success: bool,
    pub diagnostics: String,
}

impl ToolOutput {
    /// Last few diagnostic lines, enough to explain a failure in the log
    pub fn diagnostic_tail(&self, lines: usize) -> String {
        let all: Vec<&str> = self.diagnostics.lines().filter(|l| !l.trim().is_empty()).collect();
        all[all.len().saturating_sub(lines)..].join(" | ")
    }
}

/// External tool that turns a media file into a waveform
#[async_trait]
pub trait AudioTool: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, source: &Path, target: &Path, options: &ExtractionOptions) -> Result<ToolOutput>;
}

/// ffmpeg invoked as a subprocess
#[derive(Debug, Clone)]
pub struct FfmpegTool {
    binary: String,
}

impl FfmpegTool {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    /// Check if the ffmpeg binary can be launched
    pub async fn is_available(&self) -> bool {
        tokio::process::Command::new(&self.binary)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }
}

impl Default for FfmpegTool {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

#[async_trait]
impl AudioTool for FfmpegTool {
    fn name(&self) -> &str {
        &self.binary
    }

    async fn run(&self, source: &Path, target: &Path, options: &ExtractionOptions) -> Result<ToolOutput> {
        let args = options.ffmpeg_args(source, target);
        debug!("Executing {} {:?}", self.binary, args);

        let output = tokio::process::Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| PipelineError::tool_failure(&self.binary, format!("failed to spawn: {}", e)))?;

        Ok(ToolOutput {
            exit_code: output.status.code(),
            success: output.status.success(),
            diagnostics: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Media transcoder adapter: precondition checks, output verification and retries
/// around an [`AudioTool`]
pub struct AudioExtractor {
    tool: Box<dyn AudioTool>,
    options: ExtractionOptions,
    retry: RetryPolicy,
}

impl AudioExtractor {
    pub fn new(tool: Box<dyn AudioTool>, options: ExtractionOptions, retry: RetryPolicy) -> Self {
        Self { tool, options, retry }
    }

    /// ffmpeg-backed extractor from configuration
    pub fn from_config(config: &AudioConfig, retry: RetryPolicy) -> Self {
        Self::new(
            Box::new(FfmpegTool::new(config.ffmpeg_binary.clone())),
            ExtractionOptions::from_config(config),
            retry,
        )
    }

    pub fn options(&self) -> &ExtractionOptions {
        &self.options
    }

    /// Waveform path for a source: same location, `.wav` extension
    pub fn waveform_path(source: &Path) -> PathBuf {
        source.with_extension("wav")
    }

    /// Extract a waveform from `source` into `target`, retrying tool failures
    pub async fn extract(&self, source: &Path, target: &Path) -> AttemptReport<PathBuf> {
        let label = source.display().to_string();

        let report = self
            .retry
            .run(&label, |attempt| async move {
                self.extract_once(source, target, attempt).await
            })
            .await;

        if report.is_success() {
            info!(
                "✅ Audio extracted: {} ({} attempt{})",
                target.display(),
                report.attempts,
                if report.attempts == 1 { "" } else { "s" }
            );
        } else if target.exists() {
            warn!("Leaving unverified waveform on disk: {}", target.display());
        }

        report
    }

    async fn extract_once(&self, source: &Path, target: &Path, attempt: u32) -> Result<PathBuf> {
        if !verify_file_exists(source) {
            return Err(PipelineError::not_found(source));
        }

        if source == target {
            return Err(PipelineError::InvalidInput(format!(
                "{} is already a waveform; extraction would overwrite the source",
                source.display()
            )));
        }

        debug!("🎵 Extraction attempt {} for {}", attempt, source.display());
        let output = self.tool.run(source, target, &self.options).await?;

        if !output.success {
            let code = output
                .exit_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            return Err(PipelineError::tool_failure(
                self.tool.name(),
                format!("exit code {}: {}", code, output.diagnostic_tail(5)),
            ));
        }

        if !verify_file_exists(target) {
            return Err(PipelineError::tool_failure(
                self.tool.name(),
                format!("audio file was not created: {}", target.display()),
            ));
        }

        Ok(target.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Succeeds from attempt `succeed_on` onwards, writing the target
    struct ScriptedTool {
        calls: Arc<AtomicU32>,
        succeed_on: u32,
        write_output: bool,
    }

    #[async_trait]
    impl AudioTool for ScriptedTool {
        fn name(&self) -> &str {
            "scripted-ffmpeg"
        }

        async fn run(&self, _source: &Path, target: &Path, _options: &ExtractionOptions) -> Result<ToolOutput> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call < self.succeed_on {
                return Ok(ToolOutput {
                    exit_code: Some(1),
                    success: false,
                    diagnostics: "Invalid data found when processing input\n".to_string(),
                });
            }
            if self.write_output {
                tokio::fs::write(target, b"RIFF").await?;
            }
            Ok(ToolOutput {
                exit_code: Some(0),
                success: true,
                diagnostics: String::new(),
            })
        }
    }

    fn extractor(calls: &Arc<AtomicU32>, succeed_on: u32, write_output: bool) -> AudioExtractor {
        AudioExtractor::new(
            Box::new(ScriptedTool {
                calls: Arc::clone(calls),
                succeed_on,
                write_output,
            }),
            ExtractionOptions::default(),
            RetryPolicy::new(3, Duration::from_secs(1)),
        )
    }

    #[test]
    fn test_ffmpeg_arguments() {
        let args = ExtractionOptions::default().ffmpeg_args(Path::new("in.mp4"), Path::new("out.wav"));
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().to_string()).collect();
        assert_eq!(
            args,
            vec!["-i", "in.mp4", "-vn", "-acodec", "pcm_s16le", "-ar", "16000", "-ac", "1", "-y", "out.wav"]
        );
    }

    #[test]
    fn test_waveform_path() {
        assert_eq!(
            AudioExtractor::waveform_path(Path::new("/videos/talk.final.mp4")),
            PathBuf::from("/videos/talk.final.wav")
        );
    }

    #[test]
    fn test_diagnostic_tail() {
        let output = ToolOutput {
            exit_code: Some(1),
            success: false,
            diagnostics: "line1\n\nline2\nline3\n".to_string(),
        };
        assert_eq!(output.diagnostic_tail(2), "line2 | line3");
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_then_succeeds() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("talk.mp4");
        std::fs::write(&source, b"mock video").unwrap();
        let target = AudioExtractor::waveform_path(&source);

        let calls = Arc::new(AtomicU32::new(0));
        let report = extractor(&calls, 2, true).extract(&source, &target).await;

        assert!(report.is_success());
        assert_eq!(report.attempts, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(target.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_output_counts_as_failure() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("talk.mp4");
        std::fs::write(&source, b"mock video").unwrap();

        let calls = Arc::new(AtomicU32::new(0));
        let report = extractor(&calls, 1, false)
            .extract(&source, &AudioExtractor::waveform_path(&source))
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(report.backoff, vec![Duration::from_secs(1), Duration::from_secs(2)]);
        assert!(report.last_diagnostic().unwrap().contains("was not created"));
    }

    #[tokio::test]
    async fn test_missing_source_is_not_retried() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("gone.mp4");

        let calls = Arc::new(AtomicU32::new(0));
        let report = extractor(&calls, 1, true)
            .extract(&source, &AudioExtractor::waveform_path(&source))
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(report.attempts, 1);
        assert!(matches!(report.outcome, Err(PipelineError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_wav_source_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("memo.wav");
        std::fs::write(&source, b"RIFF").unwrap();

        let calls = Arc::new(AtomicU32::new(0));
        let report = extractor(&calls, 1, true)
            .extract(&source, &AudioExtractor::waveform_path(&source))
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(matches!(report.outcome, Err(PipelineError::InvalidInput(_))));
    }
}
