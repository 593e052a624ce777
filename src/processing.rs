use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::audio::AudioExtractor;
use crate::config::Config;
use crate::discovery::{verify_file_exists, MediaDiscovery, MediaFile};
use crate::transcription::{extract_text, EngineLoader, SRTGenerator, Segment, Transcriber, WhisperLoader};
use crate::{PipelineError, Result};

/// How the set of source files is enumerated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    /// Recursive discovery under a root directory
    Directory(PathBuf),
    /// One user-supplied file
    SingleFile(PathBuf),
}

impl InputSource {
    pub fn path(&self) -> &Path {
        match self {
            InputSource::Directory(path) | InputSource::SingleFile(path) => path,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    AudioExtraction,
    Transcription,
    TextExtraction,
    Cleanup,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::AudioExtraction => "Audio Extraction",
            Phase::Transcription => "Transcription",
            Phase::TextExtraction => "Text Extraction",
            Phase::Cleanup => "Cleanup",
        };
        f.write_str(name)
    }
}

/// Per-file lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessingStage {
    Discovered,
    AudioExtracted,
    Transcribed,
    TextExtracted,
    CleanedUp,
    Failed(Phase),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseCounts {
    pub success: usize,
    pub failed: usize,
}

impl PhaseCounts {
    fn record(&mut self, ok: bool) {
        if ok {
            self.success += 1;
        } else {
            self.failed += 1;
        }
    }

    pub fn total(&self) -> usize {
        self.success + self.failed
    }
}

/// Aggregate counters emitted at the end of a run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub root: PathBuf,
    pub discovered: usize,
    pub audio_extraction: PhaseCounts,
    pub transcription: PhaseCounts,
    pub text_extraction: PhaseCounts,
    pub waveforms_removed: usize,
    pub total_time: Duration,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Processing Summary:")?;
        for (phase, counts) in [
            (Phase::AudioExtraction, self.audio_extraction),
            (Phase::Transcription, self.transcription),
            (Phase::TextExtraction, self.text_extraction),
        ] {
            writeln!(f, "{}:", phase)?;
            writeln!(f, "  Successful: {}", counts.success)?;
            writeln!(f, "  Failed: {}", counts.failed)?;
        }
        write!(f, "Total time: {:.1}s", self.total_time.as_secs_f64())
    }
}

/// What happened to one source file during the run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub media: MediaFile,
    pub stage: ProcessingStage,
    pub waveform: Option<PathBuf>,
    pub srt_path: Option<PathBuf>,
    pub text_path: Option<PathBuf>,
    pub waveform_removed: bool,
    pub error_message: Option<String>,
    #[serde(skip)]
    segments: Option<Vec<Segment>>,
}

impl FileRecord {
    fn new(media: MediaFile) -> Self {
        Self {
            media,
            stage: ProcessingStage::Discovered,
            waveform: None,
            srt_path: None,
            text_path: None,
            waveform_removed: false,
            error_message: None,
            segments: None,
        }
    }

    fn fail(&mut self, phase: Phase, error: &PipelineError) {
        self.stage = ProcessingStage::Failed(phase);
        self.error_message = Some(error.to_string());
    }

    /// Reached `Transcribed`, whatever happened in text extraction
    fn was_transcribed(&self) -> bool {
        matches!(
            self.stage,
            ProcessingStage::Transcribed | ProcessingStage::TextExtracted | ProcessingStage::Failed(Phase::TextExtraction)
        )
    }
}

/// Result of one pipeline invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub summary: RunSummary,
    pub files: Vec<FileRecord>,
}

impl PipelineRun {
    pub fn stage_of(&self, path: &Path) -> Option<ProcessingStage> {
        self.files
            .iter()
            .find(|record| record.media.path() == path)
            .map(|record| record.stage)
    }

    pub fn record_for(&self, path: &Path) -> Option<&FileRecord> {
        self.files.iter().find(|record| record.media.path() == path)
    }

    pub fn completed(&self) -> impl Iterator<Item = &FileRecord> {
        self.files
            .iter()
            .filter(|record| record.stage == ProcessingStage::CleanedUp)
    }
}

/// Phase-wave batch orchestrator
pub struct BatchProcessor {
    discovery: MediaDiscovery,
    extractor: AudioExtractor,
    transcriber: Transcriber,
    loader: Box<dyn EngineLoader>,
}

impl BatchProcessor {
    /// ffmpeg and Whisper backed processor from configuration
    pub fn new(config: &Config) -> Self {
        let retry = config.retry.policy();

        info!(
            "🔧 Initializing BatchProcessor ({} attempts, {}ms base delay)",
            retry.max_attempts(),
            retry.base_delay().as_millis()
        );

        Self::with_components(
            MediaDiscovery::new(&config.processing.supported_extensions),
            AudioExtractor::from_config(&config.audio, retry),
            Transcriber::new(retry),
            Box::new(WhisperLoader::new(config.transcription.clone())),
        )
    }

    pub fn with_components(
        discovery: MediaDiscovery,
        extractor: AudioExtractor,
        transcriber: Transcriber,
        loader: Box<dyn EngineLoader>,
    ) -> Self {
        Self {
            discovery,
            extractor,
            transcriber,
            loader,
        }
    }

    /// Run every phase over the files from `input`.
    ///
    /// Only an inaccessible input or an empty discovery fails the run; per-file
    /// failures are recorded and counted.
    pub async fn run(&self, input: InputSource) -> Result<PipelineRun> {
        let start_time = Instant::now();

        let media_files = match &input {
            InputSource::Directory(root) => self.discovery.discover(root)?,
            InputSource::SingleFile(path) => vec![self.discovery.single_file(path)?],
        };

        if media_files.is_empty() {
            error!("No media files found!");
            return Err(PipelineError::RunFatal(format!(
                "No media files found under {}",
                input.path().display()
            )));
        }

        info!("🚀 Starting pipeline over {} files", media_files.len());

        let mut summary = RunSummary {
            root: input.path().to_path_buf(),
            discovered: media_files.len(),
            ..RunSummary::default()
        };
        let mut files: Vec<FileRecord> = media_files.into_iter().map(FileRecord::new).collect();

        self.extract_audio(&mut files, &mut summary).await;
        self.transcribe(&mut files, &mut summary).await;
        self.extract_text(&mut files, &mut summary).await;
        self.cleanup(&mut files, &mut summary).await;

        summary.total_time = start_time.elapsed();
        info!(
            "🎉 Pipeline finished in {:.1}s: {} fully processed",
            summary.total_time.as_secs_f64(),
            files.iter().filter(|r| r.stage == ProcessingStage::CleanedUp).count()
        );

        Ok(PipelineRun { summary, files })
    }

    async fn extract_audio(&self, files: &mut [FileRecord], summary: &mut RunSummary) {
        let phase_start = Instant::now();
        reject_output_collisions(files, summary);

        let pending = files
            .iter()
            .filter(|r| r.stage == ProcessingStage::Discovered)
            .count();
        info!("Phase 1: Extracting audio from {} files...", pending);

        for record in files.iter_mut().filter(|r| r.stage == ProcessingStage::Discovered) {
            let source = record.media.path().to_path_buf();
            let target = AudioExtractor::waveform_path(&source);
            info!("Extracting audio: {}", source.display());

            let report = self.extractor.extract(&source, &target).await;
            let attempts = report.attempts;

            match report.into_result() {
                Ok(waveform) => {
                    record.stage = ProcessingStage::AudioExtracted;
                    record.waveform = Some(waveform);
                    summary.audio_extraction.record(true);
                }
                Err(e) => {
                    error!("Audio extraction failed for {} after {} attempt(s): {}", source.display(), attempts, e);
                    record.fail(Phase::AudioExtraction, &e);
                    summary.audio_extraction.record(false);
                }
            }
        }

        info!(
            "Phase 1 done in {:.1}s: {} extracted, {} failed",
            phase_start.elapsed().as_secs_f64(),
            summary.audio_extraction.success,
            summary.audio_extraction.failed
        );
    }

    async fn transcribe(&self, files: &mut [FileRecord], summary: &mut RunSummary) {
        let phase_start = Instant::now();
        let pending = files
            .iter()
            .filter(|r| r.stage == ProcessingStage::AudioExtracted)
            .count();

        if pending == 0 {
            info!("Phase 2: No waveforms to transcribe");
            return;
        }

        info!("Phase 2: Transcribing {} audio files...", pending);
        info!("Loading recognition engine...");

        // The engine lives for this phase only
        let engine = match self.loader.load().await {
            Ok(engine) => engine,
            Err(e) => {
                error!("Failed to load recognition engine: {}", e);
                for record in files.iter_mut().filter(|r| r.stage == ProcessingStage::AudioExtracted) {
                    record.fail(Phase::Transcription, &e);
                    summary.transcription.record(false);
                }
                return;
            }
        };

        info!("Using {}", engine.description());

        for record in files.iter_mut().filter(|r| r.stage == ProcessingStage::AudioExtracted) {
            let Some(waveform) = record.waveform.clone() else {
                continue;
            };
            info!("Transcribing: {}", waveform.display());

            let report = self.transcriber.recognize(&*engine, &waveform).await;
            let attempts = report.attempts;

            match report.into_result() {
                Ok(segments) => {
                    record.stage = ProcessingStage::Transcribed;
                    record.segments = Some(segments);
                    summary.transcription.record(true);
                }
                Err(e) => {
                    error!("Transcription failed for {} after {} attempt(s): {}", waveform.display(), attempts, e);
                    record.fail(Phase::Transcription, &e);
                    summary.transcription.record(false);
                }
            }
        }

        info!(
            "Phase 2 done in {:.1}s: {} transcribed, {} failed",
            phase_start.elapsed().as_secs_f64(),
            summary.transcription.success,
            summary.transcription.failed
        );
    }

    async fn extract_text(&self, files: &mut [FileRecord], summary: &mut RunSummary) {
        let phase_start = Instant::now();
        info!("Phase 3: Writing subtitles and transcripts...");

        for record in files.iter_mut().filter(|r| r.stage == ProcessingStage::Transcribed) {
            let segments = record.segments.take().unwrap_or_default();

            match write_artifacts(&record.media, &segments).await {
                Ok((srt_path, text_path)) => {
                    record.stage = ProcessingStage::TextExtracted;
                    record.srt_path = Some(srt_path);
                    record.text_path = Some(text_path);
                    summary.text_extraction.record(true);
                }
                Err(e) => {
                    error!("Text extraction failed for {}: {}", record.media.path().display(), e);
                    record.fail(Phase::TextExtraction, &e);
                    summary.text_extraction.record(false);
                }
            }
        }

        info!(
            "Phase 3 done in {:.1}s: {} extracted, {} failed",
            phase_start.elapsed().as_secs_f64(),
            summary.text_extraction.success,
            summary.text_extraction.failed
        );
    }

    /// Remove the waveform of every file that reached `Transcribed`
    async fn cleanup(&self, files: &mut [FileRecord], summary: &mut RunSummary) {
        let phase_start = Instant::now();
        info!("Phase 4: Cleaning up temporary WAV files...");

        for record in files.iter_mut().filter(|r| r.was_transcribed()) {
            let Some(waveform) = record.waveform.clone() else {
                continue;
            };

            if verify_file_exists(&waveform) {
                if let Err(e) = tokio::fs::remove_file(&waveform).await {
                    error!("Error removing WAV file {}: {}", waveform.display(), e);
                    continue;
                }
                info!("Removed: {}", waveform.display());
                record.waveform_removed = true;
                summary.waveforms_removed += 1;
            } else {
                debug!("Waveform already gone: {}", waveform.display());
            }

            if record.stage == ProcessingStage::TextExtracted {
                record.stage = ProcessingStage::CleanedUp;
            }
        }

        info!(
            "Phase 4 done in {:.1}s: {} waveforms removed",
            phase_start.elapsed().as_secs_f64(),
            summary.waveforms_removed
        );
    }
}

/// Sources that share a stem in one directory (`talk.mp4`, `talk.m4a`) would
/// share the waveform and output paths. The lexicographically first source
/// keeps them; the others fail Phase 1 without running the transcoder.
fn reject_output_collisions(files: &mut [FileRecord], summary: &mut RunSummary) {
    let mut owners: HashMap<PathBuf, usize> = HashMap::new();

    for (i, record) in files.iter().enumerate() {
        let waveform = AudioExtractor::waveform_path(record.media.path());
        owners
            .entry(waveform)
            .and_modify(|owner| {
                if record.media.path() < files[*owner].media.path() {
                    *owner = i;
                }
            })
            .or_insert(i);
    }

    for (i, record) in files.iter_mut().enumerate() {
        let waveform = AudioExtractor::waveform_path(record.media.path());
        if owners.get(&waveform) == Some(&i) {
            continue;
        }

        let error = PipelineError::InvalidInput(format!(
            "{} would write the same waveform and outputs as another source ({})",
            record.media.path().display(),
            waveform.display()
        ));
        warn!("Skipping {}", error);
        record.fail(Phase::AudioExtraction, &error);
        summary.audio_extraction.record(false);
    }
}

/// Encode the subtitle document, then decode it back into the transcript
async fn write_artifacts(media: &MediaFile, segments: &[Segment]) -> Result<(PathBuf, PathBuf)> {
    let srt_path = media.sibling_with_extension("srt");
    let text_path = media.sibling_with_extension("txt");

    let generator = SRTGenerator::from_segments(segments);
    let issues = generator.validate();
    if !issues.is_empty() {
        warn!("SRT validation issues for {}: {:?}", media.path().display(), issues);
    }

    generator.save_to_file(&srt_path).await?;
    info!("💾 SRT file saved: {} ({} entries)", srt_path.display(), generator.len());

    let content = tokio::fs::read_to_string(&srt_path).await?;
    let transcript = extract_text(&content);
    tokio::fs::write(&text_path, &transcript).await?;
    info!("Successfully extracted text: '{}'", text_path.display());

    Ok((srt_path, text_path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_counts() {
        let mut counts = PhaseCounts::default();
        counts.record(true);
        counts.record(false);
        counts.record(true);
        assert_eq!(counts, PhaseCounts { success: 2, failed: 1 });
        assert_eq!(counts.total(), 3);
    }

    #[test]
    fn test_summary_display() {
        let summary = RunSummary {
            audio_extraction: PhaseCounts { success: 2, failed: 1 },
            transcription: PhaseCounts { success: 1, failed: 1 },
            text_extraction: PhaseCounts { success: 1, failed: 0 },
            total_time: Duration::from_millis(1500),
            ..RunSummary::default()
        };

        let text = summary.to_string();
        assert!(text.starts_with("Processing Summary:\nAudio Extraction:\n  Successful: 2\n  Failed: 1\n"));
        assert!(text.contains("Text Extraction:\n  Successful: 1\n  Failed: 0"));
        assert!(text.ends_with("Total time: 1.5s"));
    }

    #[test]
    fn test_cleanup_eligibility() {
        let mut record = FileRecord::new(MediaFile::new(PathBuf::from("/m/a.mp4")));
        assert!(!record.was_transcribed());

        record.stage = ProcessingStage::Failed(Phase::TextExtraction);
        assert!(record.was_transcribed());

        record.stage = ProcessingStage::Failed(Phase::Transcription);
        assert!(!record.was_transcribed());
    }

    #[test]
    fn test_colliding_outputs_rejected() {
        let mut files: Vec<FileRecord> = ["/m/talk.mp4", "/m/talk.m4a", "/m/other.mp4", "/n/talk.mp4"]
            .iter()
            .map(|p| FileRecord::new(MediaFile::new(PathBuf::from(p))))
            .collect();
        let mut summary = RunSummary::default();

        reject_output_collisions(&mut files, &mut summary);

        let stages: Vec<ProcessingStage> = files.iter().map(|r| r.stage).collect();
        assert_eq!(
            stages,
            vec![
                ProcessingStage::Failed(Phase::AudioExtraction),
                ProcessingStage::Discovered,
                ProcessingStage::Discovered,
                ProcessingStage::Discovered,
            ]
        );
        assert_eq!(summary.audio_extraction, PhaseCounts { success: 0, failed: 1 });
        assert!(files[0].error_message.as_deref().unwrap().contains("same waveform"));
    }

    #[tokio::test]
    async fn test_write_artifacts() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let media = MediaFile::new(temp_dir.path().join("talk.mp4"));

        let (srt_path, text_path) = write_artifacts(
            &media,
            &[Segment::new(0.0, 2.5, " hello"), Segment::new(3.0, 5.0, " world")],
        )
        .await
        .unwrap();

        let srt = std::fs::read_to_string(srt_path).unwrap();
        assert!(srt.contains("00:00:00,000 --> 00:00:02,500"));
        assert_eq!(std::fs::read_to_string(text_path).unwrap(), "hello world");
    }
}
