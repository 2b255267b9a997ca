//! Speech transcription worker.
//!
//! Transcribes per-segment clips cut from the isolated vocal track. The
//! engine must tolerate silence and empty input; a failed segment degrades
//! to empty text without aborting the batch.

use super::WorkerError;
use crate::audio::AudioClip;
use crate::jobs::Segment;
use std::path::Path;
use std::process::Command;
use tracing::{info, warn};

/// Transcribes one audio clip to text.
pub trait Transcriber: Send + Sync {
    fn transcribe(&self, clip_wav: &Path) -> Result<String, WorkerError>;
}

/// Transcriber backed by an external command.
///
/// Invocation contract: `<command> <clip.wav>`, emitting the transcript
/// (possibly empty) on stdout.
pub struct CommandTranscriber {
    command: String,
}

impl CommandTranscriber {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
        }
    }

    /// Build the transcriber invocation.
    pub fn build_command(&self, clip_wav: &Path) -> Command {
        let mut cmd = Command::new(&self.command);
        cmd.arg(clip_wav);
        cmd
    }
}

impl Transcriber for CommandTranscriber {
    fn transcribe(&self, clip_wav: &Path) -> Result<String, WorkerError> {
        let output = self
            .build_command(clip_wav)
            .output()
            .map_err(|source| crate::media::ToolError::Spawn {
                tool: "transcriber".to_string(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(crate::media::ToolError::Failed {
                tool: "transcriber".to_string(),
                code: output.status.code().unwrap_or(-1),
                stderr,
            }
            .into());
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Transcribe every segment in place.
///
/// The vocal track is loaded once; each segment's samples are cut out and
/// written to `scratch_dir/part_<index:04>.wav` before the transcriber runs
/// on them. Per-segment failures leave that segment's text empty.
pub fn transcribe_segments(
    transcriber: &dyn Transcriber,
    vocals_wav: &Path,
    segments: &mut [Segment],
    scratch_dir: &Path,
) -> Result<(), WorkerError> {
    if segments.is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(scratch_dir)?;

    let vocals = AudioClip::load(vocals_wav)?;
    let sample_rate = vocals.sample_rate;
    let total = segments.len();

    for (idx, segment) in segments.iter_mut().enumerate() {
        let start = ((segment.start_time * sample_rate as f64) as usize).min(vocals.samples.len());
        let end = ((segment.end_time * sample_rate as f64) as usize)
            .min(vocals.samples.len())
            .max(start);

        let clip = AudioClip {
            samples: vocals.samples[start..end].to_vec(),
            sample_rate,
        };
        let clip_path = scratch_dir.join(format!("part_{:04}.wav", idx));

        let text = match clip
            .save(&clip_path)
            .map_err(WorkerError::from)
            .and_then(|_| transcriber.transcribe(&clip_path))
        {
            Ok(text) => text,
            Err(err) => {
                warn!(index = idx, total, %err, "segment transcription failed, keeping empty text");
                String::new()
            }
        };
        segment.text = text;
    }

    info!(segments = total, "transcription pass complete");
    Ok(())
}
