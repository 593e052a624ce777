use anyhow::Result;
use media_transcriber::config::WhisperBackend;
use media_transcriber::transcription::whisper::{detect_backend, detect_gpu_support, resolve_model_path};
use media_transcriber::{Config, FfmpegTool};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("media_transcriber=info,check_tools=info")
        .init();

    let config = Config::load().unwrap_or_default();
    let mut ready = true;

    info!("{}", config.summary());
    info!("🔍 Checking external tool availability...");

    let ffmpeg = FfmpegTool::new(config.audio.ffmpeg_binary.clone());
    if ffmpeg.is_available().await {
        info!("✅ {} available", config.audio.ffmpeg_binary);
    } else {
        info!("❌ {} not found", config.audio.ffmpeg_binary);
        ready = false;
    }

    match detect_backend(config.transcription.backend).await {
        Some(WhisperBackend::Python) => {
            info!("✅ OpenAI Whisper (Python) available, model: {}", config.transcription.model);
        }
        Some(backend) => {
            info!("✅ whisper.cpp available ({:?})", backend);
            match resolve_model_path(&config.transcription) {
                Some(path) => info!("✅ Model: {}", path.display()),
                None => {
                    info!(
                        "❌ No ggml model for {} in {}",
                        config.transcription.model,
                        config.transcription.model_dir.display()
                    );
                    info!("💡 Download models: ./models/download-ggml-model.sh {}", config.transcription.model);
                    ready = false;
                }
            }
        }
        None => {
            info!("❌ No Whisper backend found");
            info!("💡 Install whisper.cpp (recommended): https://github.com/ggerganov/whisper.cpp");
            info!("💡 Or OpenAI Whisper: pip install openai-whisper");
            ready = false;
        }
    }

    info!("🖥️  GPU acceleration: {}", detect_gpu_support(&config.transcription));

    if ready {
        info!("🎉 All pipeline tools ready!");
    } else {
        info!("⚠️  Some tools are missing; affected phases will fail per file");
    }

    Ok(())
}
