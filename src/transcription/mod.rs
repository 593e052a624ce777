pub mod recognizer;
pub mod srt;
pub mod whisper;

pub use recognizer::Transcriber;
pub use srt::{extract_text, format_time, SRTEntry, SRTFormatter, SRTGenerator};
pub use whisper::{WhisperEngine, WhisperLoader};

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One recognized span of speech
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
    /// Recognized text, untrimmed as returned by the engine
    pub text: String,
}

impl Segment {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }
}

/// A loaded speech recognition engine
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Recognize a waveform into ordered segments
    async fn transcribe(&self, waveform: &Path) -> Result<Vec<Segment>>;

    fn description(&self) -> String;
}

/// Performs the expensive engine initialization. Called once per pipeline run.
#[async_trait]
pub trait EngineLoader: Send + Sync {
    async fn load(&self) -> Result<Box<dyn SpeechRecognizer>>;
}
