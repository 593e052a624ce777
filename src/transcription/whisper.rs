use async_trait::async_trait;
use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use super::srt::SRTFormatter;
use super::{EngineLoader, Segment, SpeechRecognizer};
use crate::config::{TranscriptionConfig, WhisperBackend};
use crate::{PipelineError, Result};

/// Shared model locations checked after the configured model directory
const SHARED_MODEL_DIRS: [&str; 2] = ["/usr/local/share/whisper-cpp", "/opt/homebrew/share/whisper-cpp"];

/// Backend chosen at load time
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedBackend {
    /// whisper.cpp binary with a ggml model file
    Cpp { command: String, model_path: PathBuf },
    /// OpenAI Python `whisper` CLI, which fetches models by name
    Python,
}

impl ResolvedBackend {
    pub fn command(&self) -> &str {
        match self {
            ResolvedBackend::Cpp { command, .. } => command,
            ResolvedBackend::Python => "whisper",
        }
    }
}

/// Loads a [`WhisperEngine`] from configuration
#[derive(Debug, Clone)]
pub struct WhisperLoader {
    config: TranscriptionConfig,
}

impl WhisperLoader {
    pub fn new(config: TranscriptionConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl EngineLoader for WhisperLoader {
    async fn load(&self) -> Result<Box<dyn SpeechRecognizer>> {
        let engine = WhisperEngine::load(&self.config).await?;
        Ok(Box::new(engine))
    }
}

/// A resolved Whisper backend and model, ready to transcribe waveforms
#[derive(Debug, Clone)]
pub struct WhisperEngine {
    config: TranscriptionConfig,
    backend: ResolvedBackend,
    use_gpu: bool,
}

impl WhisperEngine {
    /// Resolve backend and model. Fails if no backend is installed or the
    /// whisper.cpp model file cannot be found.
    pub async fn load(config: &TranscriptionConfig) -> Result<Self> {
        let started = Instant::now();
        info!("🔍 Detecting available Whisper backends...");

        let backend = match detect_backend(config.backend).await {
            Some(WhisperBackend::Python) => ResolvedBackend::Python,
            Some(found) => {
                let command = cpp_command_name(found).to_string();
                let model_path = resolve_model_path(config).ok_or_else(|| {
                    error!("❌ No ggml model found for {}", config.model);
                    PipelineError::not_found(config.model_dir.join(format!("ggml-{}.bin", config.model)))
                })?;
                ResolvedBackend::Cpp { command, model_path }
            }
            None => {
                error!("❌ No Whisper backend found!");
                return Err(PipelineError::tool_failure(
                    "whisper",
                    "no Whisper backend found, install whisper.cpp or openai-whisper",
                ));
            }
        };

        let use_gpu = detect_gpu_support(config);
        let engine = Self {
            config: config.clone(),
            backend,
            use_gpu,
        };

        info!(
            "✅ Loaded {} in {:.1}s (GPU: {})",
            engine.description(),
            started.elapsed().as_secs_f64(),
            use_gpu
        );
        Ok(engine)
    }

    /// Build an engine without probing the system
    pub fn with_backend(config: TranscriptionConfig, backend: ResolvedBackend, use_gpu: bool) -> Self {
        Self {
            config,
            backend,
            use_gpu,
        }
    }

    pub fn backend(&self) -> &ResolvedBackend {
        &self.backend
    }

    /// Arguments for one recognition run writing JSON into `output_dir`
    pub fn command_args(&self, waveform: &Path, output_dir: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();

        match &self.backend {
            ResolvedBackend::Cpp { model_path, .. } => {
                let stem = waveform.file_stem().unwrap_or_default();
                args.push("-f".into());
                args.push(waveform.into());
                args.push("-oj".into());
                args.push("-of".into());
                args.push(output_dir.join(stem).into());
                args.push("-m".into());
                args.push(model_path.into());
                args.push("-t".into());
                args.push(self.config.threads.to_string().into());
                args.push("-l".into());
                args.push(self.config.language.as_deref().unwrap_or("auto").into());
                if !self.use_gpu {
                    args.push("-ng".into());
                }
            }
            ResolvedBackend::Python => {
                args.push(waveform.into());
                args.push("--model".into());
                args.push(self.config.model.as_str().into());
                args.push("--output_dir".into());
                args.push(output_dir.into());
                args.push("--output_format".into());
                args.push("json".into());
                args.push("--verbose".into());
                args.push("False".into());
                if let Some(language) = &self.config.language {
                    args.push("--language".into());
                    args.push(language.into());
                }
                args.push("--device".into());
                if self.use_gpu {
                    args.push("cuda".into());
                } else {
                    args.push("cpu".into());
                    args.push("--fp16".into());
                    args.push("False".into());
                }
            }
        }

        args
    }

    async fn run_backend(&self, waveform: &Path, output_dir: &Path) -> Result<()> {
        let name = self.backend.command();
        let args = self.command_args(waveform, output_dir);
        debug!("Executing command: {} {:?}", name, args);

        let mut cmd = Command::new(name);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let limit = Duration::from_secs(self.config.timeout);
        let started = Instant::now();

        let output = match tokio::time::timeout(limit, cmd.output()).await {
            Ok(result) => result.map_err(|e| PipelineError::tool_failure(name, format!("failed to spawn: {}", e)))?,
            Err(_) => {
                error!(
                    "⏰ {} timed out after {:.1}s (limit: {}s)",
                    name,
                    started.elapsed().as_secs_f64(),
                    self.config.timeout
                );
                return Err(PipelineError::tool_failure(
                    name,
                    format!("timed out after {} seconds", self.config.timeout),
                ));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
            let tail = tail[tail.len().saturating_sub(3)..].join(" | ");
            return Err(PipelineError::tool_failure(
                name,
                format!("exit status {}: {}", output.status, tail),
            ));
        }

        debug!("{} finished in {:.1}s", name, started.elapsed().as_secs_f64());
        Ok(())
    }
}

#[async_trait]
impl SpeechRecognizer for WhisperEngine {
    async fn transcribe(&self, waveform: &Path) -> Result<Vec<Segment>> {
        let temp_dir = tempfile::Builder::new().prefix("whisper_").tempdir()?;

        self.run_backend(waveform, temp_dir.path()).await?;

        let json_path = find_json_output(temp_dir.path()).await?.ok_or_else(|| {
            PipelineError::tool_failure(self.backend.command(), "no JSON output produced")
        })?;

        let content = tokio::fs::read_to_string(&json_path).await?;
        let segments = parse_whisper_json(&content)
            .map_err(|e| PipelineError::tool_failure(self.backend.command(), e.to_string()))?;

        for segment in &segments {
            if segment.end < segment.start {
                warn!(
                    "Segment ends before it starts ({:.3} > {:.3}) in {}",
                    segment.start,
                    segment.end,
                    waveform.display()
                );
            }
        }

        Ok(segments)
    }

    fn description(&self) -> String {
        match &self.backend {
            ResolvedBackend::Cpp { command, model_path } => {
                format!("{} ({})", command, model_path.display())
            }
            ResolvedBackend::Python => format!("Python whisper ({})", self.config.model),
        }
    }
}

fn cpp_command_name(backend: WhisperBackend) -> &'static str {
    match backend {
        WhisperBackend::WhisperCpp => "whisper-cpp",
        _ => "whisper-cli",
    }
}

/// Check if a command is available
pub async fn check_command_available(cmd_name: &str) -> bool {
    Command::new(cmd_name)
        .arg("--help")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Pick the backend to use. `Auto` probes whisper-cli, whisper-cpp, then
/// Python whisper; an explicit preference is only checked for availability.
pub async fn detect_backend(preference: WhisperBackend) -> Option<WhisperBackend> {
    let candidates: &[(WhisperBackend, &str)] = match preference {
        WhisperBackend::Auto => &[
            (WhisperBackend::WhisperCli, "whisper-cli"),
            (WhisperBackend::WhisperCpp, "whisper-cpp"),
            (WhisperBackend::Python, "whisper"),
        ],
        WhisperBackend::WhisperCli => &[(WhisperBackend::WhisperCli, "whisper-cli")],
        WhisperBackend::WhisperCpp => &[(WhisperBackend::WhisperCpp, "whisper-cpp")],
        WhisperBackend::Python => &[(WhisperBackend::Python, "whisper")],
    };

    for (backend, cmd_name) in candidates {
        if check_command_available(cmd_name).await {
            info!("✅ Found {} backend", cmd_name);
            return Some(*backend);
        }
        debug!("❌ {} not available", cmd_name);
    }

    None
}

/// Locate the ggml model file: the model name as a path, then
/// `<model_dir>/ggml-<model>.bin`, then the shared whisper.cpp directories.
pub fn resolve_model_path(config: &TranscriptionConfig) -> Option<PathBuf> {
    let file_name = format!("ggml-{}.bin", config.model);

    let mut candidates = vec![PathBuf::from(&config.model), config.model_dir.join(&file_name)];
    candidates.extend(SHARED_MODEL_DIRS.iter().map(|dir| Path::new(dir).join(&file_name)));

    candidates.into_iter().find(|candidate| {
        let found = candidate.is_file();
        debug!("Checking model {}: {}", candidate.display(), if found { "found" } else { "missing" });
        found
    })
}

/// GPU is used when configured or when the environment asks for it
pub fn detect_gpu_support(config: &TranscriptionConfig) -> bool {
    config.use_gpu
        || std::env::var("CUDA_VISIBLE_DEVICES").map_or(false, |v| !v.is_empty())
        || std::env::var("WHISPER_USE_GPU").map_or(false, |v| v == "1" || v.eq_ignore_ascii_case("true"))
}

async fn find_json_output(dir: &Path) -> Result<Option<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().map_or(false, |ext| ext == "json") {
            return Ok(Some(path));
        }
    }

    Ok(None)
}

/// Parse Whisper JSON output into segments.
///
/// Accepts the whisper.cpp `transcription` array (offsets in milliseconds,
/// with the textual timestamps as fallback), the nested `result.segments`
/// layout, and the Python `segments` layout.
pub fn parse_whisper_json(content: &str) -> Result<Vec<Segment>> {
    let output: WhisperOutput = serde_json::from_str(content)
        .map_err(|e| PipelineError::MalformedArtifact(format!("Failed to parse Whisper JSON: {}", e)))?;

    if !output.transcription.is_empty() {
        debug!("whisper.cpp JSON with {} entries", output.transcription.len());
        return output
            .transcription
            .into_iter()
            .map(|entry| {
                let (start, end) = match (entry.offsets, entry.timestamps) {
                    (Some(offsets), _) => (offsets.from as f64 / 1000.0, offsets.to as f64 / 1000.0),
                    (None, Some(timestamps)) => (
                        SRTFormatter::parse_timestamp(&timestamps.from)?,
                        SRTFormatter::parse_timestamp(&timestamps.to)?,
                    ),
                    (None, None) => {
                        return Err(PipelineError::MalformedArtifact(
                            "transcription entry without offsets or timestamps".to_string(),
                        ))
                    }
                };
                Ok(Segment::new(start, end, entry.text))
            })
            .collect();
    }

    let segments = match output.result {
        Some(result) if !result.segments.is_empty() => result.segments,
        _ => output.segments,
    };

    Ok(segments
        .into_iter()
        .map(|segment| Segment::new(segment.start, segment.end, segment.text))
        .collect())
}

#[derive(Debug, Deserialize)]
struct WhisperOutput {
    #[serde(default)]
    segments: Vec<WhisperSegment>,
    #[serde(default)]
    transcription: Vec<WhisperTranscriptionEntry>,
    #[serde(default)]
    result: Option<WhisperResult>,
}

#[derive(Debug, Deserialize)]
struct WhisperResult {
    #[serde(default)]
    segments: Vec<WhisperSegment>,
}

#[derive(Debug, Deserialize)]
struct WhisperTranscriptionEntry {
    #[serde(default)]
    timestamps: Option<WhisperTimestamps>,
    #[serde(default)]
    offsets: Option<WhisperOffsets>,
    text: String,
}

#[derive(Debug, Deserialize)]
struct WhisperTimestamps {
    from: String,
    to: String,
}

#[derive(Debug, Deserialize)]
struct WhisperOffsets {
    from: u64,
    to: u64,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    start: f64,
    end: f64,
    text: String,
}
