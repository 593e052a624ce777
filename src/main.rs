use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use media_transcriber::logging::init_logging;
use media_transcriber::{BatchProcessor, Config, InputSource, PipelineRun};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("Media Transcriber")
        .version(env!("CARGO_PKG_VERSION"))
        .author("TigreRoll")
        .about("Batch conversion of recordings into SRT subtitles and plain-text transcripts")
        .arg(
            Arg::new("root")
                .short('r')
                .long("root")
                .value_name("DIR")
                .help("Root folder to search recursively for media files")
                .conflicts_with("file"),
        )
        .arg(
            Arg::new("file")
                .short('f')
                .long("file")
                .value_name("FILE")
                .help("Transcribe a single media file"),
        )
        .arg(
            Arg::new("max-retries")
                .long("max-retries")
                .value_name("NUM")
                .help("Attempts per external call")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("model")
                .short('m')
                .long("model")
                .value_name("MODEL")
                .help("Whisper model name or ggml model path"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file (TOML)"),
        )
        .arg(
            Arg::new("summary-json")
                .long("summary-json")
                .value_name("FILE")
                .help("Also write the run summary as JSON"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let verbose = matches.get_flag("verbose");

    // Logging is configured from the config file, so problems with an
    // implicit config file are reported once the logger exists
    let (mut config, config_warning) = match matches.get_one::<String>("config") {
        Some(path) => (Config::from_file(Path::new(path))?, None),
        None => match Config::load() {
            Ok(config) => (config, None),
            Err(e) => (Config::default().with_env_overrides(), Some(e)),
        },
    };

    if let Some(attempts) = matches.get_one::<u32>("max-retries") {
        config.retry.max_attempts = *attempts;
    }
    if let Some(model) = matches.get_one::<String>("model") {
        config.transcription.model = model.clone();
    }

    config.validate()?;
    init_logging(&config.logging, verbose)?;

    if let Some(e) = config_warning {
        warn!("Failed to load config, using defaults: {}", e);
    }

    info!("🚀 Media Transcriber starting...");
    tracing::debug!("{}", config.summary());

    let input = match (matches.get_one::<String>("file"), matches.get_one::<String>("root")) {
        (Some(file), _) => InputSource::SingleFile(PathBuf::from(file)),
        (None, Some(root)) => InputSource::Directory(PathBuf::from(root)),
        (None, None) => InputSource::Directory(prompt_for_root()?),
    };

    let processor = BatchProcessor::new(&config);
    let run = match processor.run(input.clone()).await {
        Ok(run) => run,
        Err(e) => {
            error!("Fatal error in main process: {}", e);
            return Err(e.into());
        }
    };

    for line in run.summary.to_string().lines() {
        info!("{}", line);
    }
    println!("{}", run.summary);

    if let Some(path) = matches.get_one::<String>("summary-json") {
        let json = serde_json::to_string_pretty(&run.summary)?;
        std::fs::write(path, json).with_context(|| format!("Failed to write summary to {}", path))?;
        info!("💾 Summary saved to: {}", path);
    }

    if let InputSource::SingleFile(_) = input {
        report_single_file(&run);
    }

    Ok(())
}

fn prompt_for_root() -> Result<PathBuf> {
    print!("Enter the root folder path: ");
    std::io::stdout().flush()?;

    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .context("Failed to read root folder from stdin")?;

    Ok(PathBuf::from(line.trim()))
}

fn report_single_file(run: &PipelineRun) {
    match run.files.first() {
        Some(record) if record.srt_path.is_some() && record.text_path.is_some() => {
            println!("Transcription completed successfully!");
            println!("Output files created:");
            if let Some(srt) = &record.srt_path {
                println!("  - {} (with timestamps)", srt.display());
            }
            if let Some(txt) = &record.text_path {
                println!("  - {} (plain text)", txt.display());
            }
        }
        _ => println!("Transcription failed. Check the log file for details."),
    }
}
