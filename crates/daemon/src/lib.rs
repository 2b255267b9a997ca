//! Revoice daemon
//!
//! Voice-replacement media pipeline: accepts uploads, isolates and
//! re-synthesizes speech with assigned reference voices, and reassembles
//! the result over the original background track. Also drives standalone
//! TTS, music generation, and mixing workflows over the same job engine.

pub mod aligner;
pub mod audio;
pub mod daemon;
pub mod jobs;
pub mod media;
pub mod merger;
pub mod mixer;
pub mod orchestrator;
pub mod segments;
pub mod server;
pub mod startup;
pub mod store;
pub mod voices;
pub mod workers;
pub mod workspace;

pub use revoice_daemon_config as config;
pub use revoice_daemon_config::Config;

pub use aligner::{align_clip, align_file, align_segments, crossfade, pad_or_trim, time_stretch, AlignError, PlacedClip};
pub use audio::{db_to_amplitude, normalize_peak, wav_duration, AudioClip, AudioError};
pub use daemon::{Daemon, DaemonError};
pub use jobs::{new_job_id, InputKind, Job, JobStatus, Segment, Speaker, VoiceAssignment};
pub use media::{
    build_extract_wav_command, build_mp3_command, build_mux_command, build_probe_command,
    is_allowed_upload, is_video_file, parse_probe_output, probe_media, MediaInfo, ToolError,
    ALLOWED_UPLOAD_EXTENSIONS, VIDEO_EXTENSIONS,
};
pub use merger::{apply_ducking, export_mp3, merge_speech_and_music, rebuild_video, MergeError};
pub use mixer::{mix_tracks, MixError, MixParams};
pub use orchestrator::{MusicJob, Orchestrator, TtsJob, WorkflowError};
pub use segments::{
    derive_speakers, merge_short_segments, MERGE_GAP_THRESHOLD, MIN_SEGMENT_DURATION,
};
pub use server::{create_api_router, run_api_server, AppState, ServerError};
pub use startup::{check_ffmpeg_available, check_ffprobe_available, run_startup_checks, StartupError};
pub use store::{JobStore, StoreError};
pub use voices::{VoiceError, VoiceManager, VoiceProfile};
pub use workers::{
    CommandDiarizer, CommandMusicGenerator, CommandSeparator, CommandSynthesizer,
    CommandTranscriber, Diarizer, FfmpegExtractor, MediaExtractor, MusicGenerator, MusicRequest,
    Separator, SpeechSynthesizer, StemPaths, Transcriber, TtsRequest, WorkerError, Workers,
};
pub use workspace::{Workspace, WorkspaceError, EXTRACTED_WAV_NAME, JOB_SUBDIRS};
