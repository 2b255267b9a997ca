//! Job data model for the voice-replacement pipeline.
//!
//! Defines the central `Job` record together with its `Speaker` and
//! `Segment` children. Jobs are persisted as pretty-printed JSON documents
//! (`job.json`) inside their workspace; see the `store` module.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Lifecycle states for a processing job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job has been created but no workflow has started.
    Pending,
    /// Extracting or converting the uploaded media to WAV.
    ExtractingAudio,
    /// Separating vocals from background music.
    Separating,
    /// Running speaker diarization.
    Diarizing,
    /// Transcribing diarized segments.
    Transcribing,
    /// Analysis finished; waiting for the client to assign voices.
    AwaitingVoiceAssignment,
    /// Synthesizing replacement speech.
    GeneratingSpeech,
    /// Time-aligning synthesized segments.
    Aligning,
    /// Mixing speech with the background track.
    Merging,
    /// Job finished successfully.
    Completed,
    /// Job failed with an error.
    Failed,
}

impl Default for JobStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::ExtractingAudio => "extracting_audio",
            JobStatus::Separating => "separating",
            JobStatus::Diarizing => "diarizing",
            JobStatus::Transcribing => "transcribing",
            JobStatus::AwaitingVoiceAssignment => "awaiting_voice_assignment",
            JobStatus::GeneratingSpeech => "generating_speech",
            JobStatus::Aligning => "aligning",
            JobStatus::Merging => "merging",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Kind of input the job was created from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    Audio,
    Video,
    Text,
}

impl Default for InputKind {
    fn default() -> Self {
        Self::Audio
    }
}

impl std::fmt::Display for InputKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputKind::Audio => write!(f, "audio"),
            InputKind::Video => write!(f, "video"),
            InputKind::Text => write!(f, "text"),
        }
    }
}

impl std::str::FromStr for InputKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "audio" => Ok(InputKind::Audio),
            "video" => Ok(InputKind::Video),
            "text" => Ok(InputKind::Text),
            other => Err(format!("unknown input kind: {}", other)),
        }
    }
}

/// A contiguous, single-speaker region of the source audio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Identifier of the speaker this segment belongs to.
    pub speaker_id: String,
    /// Segment start in seconds from the beginning of the media.
    pub start_time: f64,
    /// Segment end in seconds from the beginning of the media.
    pub end_time: f64,
    /// Transcribed text; empty until the transcription stage runs.
    #[serde(default)]
    pub text: String,
}

impl Segment {
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// Aggregated metadata for a detected speaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Speaker {
    /// Identifier unique within the job, as returned by the diarizer.
    pub speaker_id: String,
    /// Human-friendly label, "Speaker N" by order of first appearance.
    #[serde(default)]
    pub label: String,
    /// Number of segments attributed to this speaker.
    #[serde(default)]
    pub segment_count: u32,
    /// Cumulative speaking duration in seconds.
    #[serde(default)]
    pub total_duration: f64,
    /// Reference-audio filename under the job's `references/` directory,
    /// set once the client assigns a voice.
    #[serde(default)]
    pub assigned_voice_ref: Option<String>,
}

/// Maps a detected speaker to a reference voice.
///
/// Either `reference_audio_filename` (a file already uploaded to the job's
/// `references/` directory) or `voice_id` (a saved voice profile) must be
/// provided.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceAssignment {
    pub speaker_id: String,
    #[serde(default)]
    pub reference_audio_filename: String,
    #[serde(default)]
    pub voice_id: Option<String>,
}

/// Complete state of a processing job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique 12-character hex identifier, assigned at creation.
    pub job_id: String,
    /// Current lifecycle status.
    pub status: JobStatus,
    /// Kind of the uploaded input.
    pub input_kind: InputKind,
    /// Original filename of the upload, used for display and as a stable
    /// name inside the workspace.
    pub input_filename: String,
    /// Detected speakers with aggregated metadata.
    #[serde(default)]
    pub speakers: Vec<Speaker>,
    /// Diarized segments, sorted by `start_time` ascending.
    #[serde(default)]
    pub segments: Vec<Segment>,
    /// Processing progress in [0.0, 1.0].
    #[serde(default)]
    pub progress: f64,
    /// Error message; set exactly when `status` is `Failed`.
    #[serde(default)]
    pub error: Option<String>,
    /// UTC timestamp when the job was created.
    pub created_at: DateTime<Utc>,
    /// UTC timestamp of the last mutation.
    pub updated_at: DateTime<Utc>,
    /// Absolute path to the final artifact once the job completes.
    #[serde(default)]
    pub output_file: Option<PathBuf>,
}

impl Job {
    /// Create a new job with a fresh identifier in `Pending` state.
    pub fn new(input_kind: InputKind, input_filename: &str) -> Self {
        let now = Utc::now();
        Self {
            job_id: new_job_id(),
            status: JobStatus::Pending,
            input_kind,
            input_filename: input_filename.to_string(),
            speakers: Vec::new(),
            segments: Vec::new(),
            progress: 0.0,
            error: None,
            created_at: now,
            updated_at: now,
            output_file: None,
        }
    }

    /// Refresh `updated_at` to now.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Mark the job as failed with a reason.
    pub fn fail(&mut self, reason: &str) {
        self.status = JobStatus::Failed;
        self.error = Some(reason.to_string());
        self.touch();
    }

    /// Mark the job as completed with its final artifact.
    pub fn complete(&mut self, output_file: PathBuf) {
        self.status = JobStatus::Completed;
        self.progress = 1.0;
        self.output_file = Some(output_file);
        self.touch();
    }

    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, JobStatus::Completed | JobStatus::Failed)
    }

    /// Check if the job is idle waiting for external input.
    pub fn is_quiescent(&self) -> bool {
        self.status == JobStatus::AwaitingVoiceAssignment
    }
}

/// Generate a fresh job identifier: 12 hex characters from a v4 UUID.
pub fn new_job_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    id[..12].to_string()
}
