/// Media Transcriber - batch subtitle and transcript generation
///
/// Walks a directory tree of recordings, extracts a 16kHz mono waveform from each
/// with ffmpeg, runs Whisper over the waveforms and writes `.srt` subtitles and
/// `.txt` transcripts next to the sources.

pub mod audio;
pub mod config;
pub mod discovery;
pub mod logging;
pub mod processing;
pub mod retry;
pub mod transcription;

// Re-export main types for easy access
pub use crate::audio::{AudioExtractor, AudioTool, ExtractionOptions, FfmpegTool, ToolOutput};
pub use crate::config::Config;
pub use crate::discovery::{MediaDiscovery, MediaFile};
pub use crate::processing::{BatchProcessor, FileRecord, InputSource, Phase, PhaseCounts, PipelineRun, ProcessingStage, RunSummary};
pub use crate::retry::{AttemptReport, RetryPolicy};
pub use crate::transcription::{EngineLoader, Segment, SpeechRecognizer, SRTGenerator, Transcriber, WhisperLoader};

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Error types for pipeline operations
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    /// Source or intermediate file is missing or unreadable. Never retried.
    #[error("File not found or not accessible: {}", path.display())]
    NotFound { path: std::path::PathBuf },

    /// External tool exited non-zero or did not produce its expected output.
    #[error("{tool} failed: {message}")]
    ExternalToolFailure { tool: String, message: String },

    /// An artifact could not be interpreted.
    #[error("Malformed artifact: {0}")]
    MalformedArtifact(String),

    /// Input that can never succeed, such as a source whose waveform path is itself.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Condition that stops the whole run before any phase executes.
    #[error("Run aborted: {0}")]
    RunFatal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn not_found(path: impl Into<std::path::PathBuf>) -> Self {
        Self::NotFound { path: path.into() }
    }

    pub fn tool_failure(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExternalToolFailure {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Whether another attempt could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ExternalToolFailure { .. } | Self::Io(_))
    }
}
