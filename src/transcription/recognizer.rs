//! Recognition adapter: precondition check and retries around an engine call

use crate::discovery::verify_file_exists;
use crate::retry::{AttemptReport, RetryPolicy};
use crate::PipelineError;
use std::path::Path;
use tracing::info;

use super::{Segment, SpeechRecognizer};

#[derive(Debug, Clone, Default)]
pub struct Transcriber {
    retry: RetryPolicy,
}

impl Transcriber {
    pub fn new(retry: RetryPolicy) -> Self {
        Self { retry }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Recognize `waveform` with an already loaded engine
    pub async fn recognize(&self, engine: &dyn SpeechRecognizer, waveform: &Path) -> AttemptReport<Vec<Segment>> {
        let label = waveform.display().to_string();

        let report = self
            .retry
            .run(&label, |_| async move {
                if !verify_file_exists(waveform) {
                    return Err(PipelineError::not_found(waveform));
                }
                engine.transcribe(waveform).await
            })
            .await;

        if let Ok(segments) = &report.outcome {
            info!(
                "🎤 Transcribed {}: {} segments after {} attempt(s)",
                waveform.display(),
                segments.len(),
                report.attempts
            );
        }

        report
    }
}
