use crate::{PipelineError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, warn};

use super::Segment;

/// SRT (SubRip Subtitle) entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SRTEntry {
    /// Sequential number, starting at 1
    pub index: usize,
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
    /// Subtitle text, one or more lines
    pub text: String,
}

impl SRTEntry {
    /// Create a new SRT entry. Blank lines are dropped from the text since a
    /// blank line terminates the block.
    pub fn new(index: usize, start: f64, end: f64, text: &str) -> Self {
        let text = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        Self { index, start, end, text }
    }
}

impl fmt::Display for SRTEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\n{} --> {}\n{}\n",
            self.index,
            format_time(self.start),
            format_time(self.end),
            self.text
        )
    }
}

/// SRT document builder
#[derive(Debug, Clone, Default)]
pub struct SRTGenerator {
    entries: Vec<SRTEntry>,
}

impl SRTGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// One numbered entry per segment, in recognition order
    pub fn from_segments(segments: &[Segment]) -> Self {
        let entries = segments
            .iter()
            .enumerate()
            .map(|(i, segment)| SRTEntry::new(i + 1, segment.start, segment.end, &segment.text))
            .collect();

        Self { entries }
    }

    /// Append an entry, numbering it after the existing ones
    pub fn add_entry(&mut self, start: f64, end: f64, text: &str) {
        let index = self.entries.len() + 1;
        self.entries.push(SRTEntry::new(index, start, end, text));
    }

    /// Render the document: every block followed by a blank line
    pub fn generate(&self) -> String {
        let mut srt_content = String::new();

        for entry in &self.entries {
            srt_content.push_str(&entry.to_string());
            srt_content.push('\n');
        }

        srt_content
    }

    /// Save SRT to file as UTF-8
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        tokio::fs::write(path.as_ref(), self.generate()).await?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[SRTEntry] {
        &self.entries
    }

    /// Report timing anomalies. Entries are still emitted as-is.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        for entry in &self.entries {
            if !entry.start.is_finite() || !entry.end.is_finite() || entry.start < 0.0 {
                issues.push(format!("Entry {}: Invalid timestamps ({}, {})", entry.index, entry.start, entry.end));
            } else if entry.end < entry.start {
                issues.push(format!("Entry {}: End time is before start time", entry.index));
            }
        }

        for pair in self.entries.windows(2) {
            if pair[1].start < pair[0].start {
                issues.push(format!(
                    "Entries {} and {}: Start time goes backwards",
                    pair[0].index, pair[1].index
                ));
            }
        }

        issues
    }
}

/// SRT formatting utilities
pub struct SRTFormatter;

impl SRTFormatter {
    /// Format seconds as an SRT timestamp (HH:MM:SS,mmm)
    pub fn format_timestamp(seconds: f64) -> String {
        format_time(seconds)
    }

    /// Parse an SRT timestamp (HH:MM:SS,mmm) into seconds. A period is accepted
    /// as the fractional separator.
    pub fn parse_timestamp(timestamp: &str) -> Result<f64> {
        static TIMESTAMP: OnceLock<Regex> = OnceLock::new();
        let re = TIMESTAMP.get_or_init(|| {
            Regex::new(r"^(\d{2,}):(\d{2}):(\d{2})[,.](\d{3})$").expect("timestamp regex is valid")
        });

        let caps = re
            .captures(timestamp.trim())
            .ok_or_else(|| PipelineError::MalformedArtifact(format!("Invalid timestamp format: {}", timestamp)))?;

        let field = |i: usize| caps[i].parse::<u64>().unwrap_or(0);
        let total_millis = ((field(1) * 60 + field(2)) * 60 + field(3)) * 1000 + field(4);

        Ok(total_millis as f64 / 1000.0)
    }
}

/// Format seconds as `HH:MM:SS,mmm`.
///
/// The value is rounded to the microsecond and then truncated to milliseconds.
/// Negative or non-finite input renders as `00:00:00,000` with a warning.
pub fn format_time(seconds: f64) -> String {
    let duration = match Duration::try_from_secs_f64(seconds) {
        Ok(duration) => duration,
        Err(e) => {
            warn!("Error formatting time {}: {}", seconds, e);
            return "00:00:00,000".to_string();
        }
    };

    let total_micros = (duration.as_nanos() + 500) / 1_000;
    let total_millis = total_micros / 1_000;

    let milliseconds = total_millis % 1_000;
    let total_seconds = total_millis / 1_000;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, milliseconds)
}

/// Strip numbering and timestamps from an SRT document, leaving the
/// space-joined subtitle text. Blocks with fewer than three lines are skipped.
///
/// Runs of blank or whitespace-only lines count as a single block boundary, so
/// an entry with empty text does not pull the next block's timestamp into the
/// transcript. The lines of a multi-line entry are joined with a space, like
/// the entries themselves.
pub fn extract_text(content: &str) -> String {
    static BLOCK_BOUNDARY: OnceLock<Regex> = OnceLock::new();
    let boundary = BLOCK_BOUNDARY.get_or_init(|| Regex::new(r"\n(?:[ \t]*\n)+").expect("boundary regex is valid"));

    let normalized = content.replace("\r\n", "\n");

    boundary
        .split(normalized.trim())
        .filter_map(|block| {
            let lines: Vec<&str> = block.split('\n').collect();
            if lines.len() >= 3 {
                Some(lines[2..].join(" "))
            } else {
                debug!("Skipping malformed subtitle block: {:?}", block);
                None
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
