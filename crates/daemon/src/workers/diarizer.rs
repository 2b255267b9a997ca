//! Speaker diarization worker.
//!
//! Identifies who speaks when, producing time-stamped turns that the
//! `segments` module normalizes into the job's segment list.

use super::WorkerError;
use crate::jobs::Segment;
use serde::Deserialize;
use std::path::Path;
use std::process::Command;
use tracing::info;

/// One speaker turn as reported by the diarizer.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DiarizedTurn {
    pub speaker: String,
    pub start: f64,
    pub end: f64,
}

/// Detects speaker turns in an audio file.
pub trait Diarizer: Send + Sync {
    /// Diarize `vocals_wav`, returning segments sorted by start time.
    /// Speaker identifiers are opaque and stable within one call.
    fn diarize(
        &self,
        vocals_wav: &Path,
        min_speakers: u32,
        max_speakers: u32,
    ) -> Result<Vec<Segment>, WorkerError>;
}

/// Diarizer backed by an external command.
///
/// Invocation contract:
/// `<command> <vocals.wav> --min-speakers N --max-speakers N`, emitting a
/// JSON array of `{"speaker", "start", "end"}` objects on stdout.
pub struct CommandDiarizer {
    command: String,
}

impl CommandDiarizer {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
        }
    }

    /// Build the diarizer invocation.
    pub fn build_command(
        &self,
        vocals_wav: &Path,
        min_speakers: u32,
        max_speakers: u32,
    ) -> Command {
        let mut cmd = Command::new(&self.command);
        cmd.arg(vocals_wav);
        cmd.arg("--min-speakers").arg(min_speakers.to_string());
        cmd.arg("--max-speakers").arg(max_speakers.to_string());
        cmd
    }
}

impl Diarizer for CommandDiarizer {
    fn diarize(
        &self,
        vocals_wav: &Path,
        min_speakers: u32,
        max_speakers: u32,
    ) -> Result<Vec<Segment>, WorkerError> {
        info!(
            input = %vocals_wav.display(),
            min_speakers,
            max_speakers,
            "running speaker diarization"
        );

        let output = self
            .build_command(vocals_wav, min_speakers, max_speakers)
            .output()
            .map_err(|source| crate::media::ToolError::Spawn {
                tool: "diarizer".to_string(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(crate::media::ToolError::Failed {
                tool: "diarizer".to_string(),
                code: output.status.code().unwrap_or(-1),
                stderr,
            }
            .into());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let segments = parse_turns(&stdout)?;
        info!(segments = segments.len(), "diarization complete");
        Ok(segments)
    }
}

/// Parse diarizer JSON output into segments sorted by start time.
pub fn parse_turns(json_str: &str) -> Result<Vec<Segment>, WorkerError> {
    let turns: Vec<DiarizedTurn> =
        serde_json::from_str(json_str).map_err(|e| WorkerError::Parse(e.to_string()))?;

    let mut segments: Vec<Segment> = turns
        .into_iter()
        .map(|turn| Segment {
            speaker_id: turn.speaker,
            start_time: turn.start,
            end_time: turn.end,
            text: String::new(),
        })
        .collect();

    segments.sort_by(|a, b| {
        a.start_time
            .partial_cmp(&b.start_time)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(segments)
}
