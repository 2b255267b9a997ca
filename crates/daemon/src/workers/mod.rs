//! External worker interfaces.
//!
//! The neural engines (separation, diarization, transcription, TTS, music
//! generation) are opaque workers behind narrow traits. The default
//! implementations shell out to configured commands; tests inject fakes.
//! All trait methods are blocking and run on the worker-thread pool via
//! `spawn_blocking`.

pub mod diarizer;
pub mod extractor;
pub mod music;
pub mod separator;
pub mod transcriber;
pub mod tts;

pub use diarizer::{CommandDiarizer, Diarizer};
pub use extractor::{FfmpegExtractor, MediaExtractor};
pub use music::{CommandMusicGenerator, MusicGenerator, MusicRequest};
pub use separator::{CommandSeparator, Separator, StemPaths};
pub use transcriber::{transcribe_segments, CommandTranscriber, Transcriber};
pub use tts::{CommandSynthesizer, SpeechSynthesizer, TtsRequest};

use crate::audio::AudioError;
use crate::media::ToolError;
use revoice_daemon_config::Config;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Error type for external worker invocations
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The worker subprocess failed.
    #[error("worker error: {0}")]
    Tool(#[from] ToolError),

    /// Audio processing around the worker failed.
    #[error("audio error: {0}")]
    Audio(#[from] AudioError),

    /// Worker output could not be parsed.
    #[error("failed to parse worker output: {0}")]
    Parse(String),

    /// The worker finished but an expected output file is missing.
    #[error("worker did not produce expected output: {0}")]
    MissingOutput(PathBuf),

    /// The separator produced a vocal stem but nothing to build an
    /// accompaniment from.
    #[error("separator produced only a vocals stem; cannot build accompaniment")]
    OnlyVocals,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The full set of workers the orchestrator depends on.
///
/// Held behind trait objects so tests can swap in fakes without touching
/// the orchestrator.
#[derive(Clone)]
pub struct Workers {
    pub extractor: Arc<dyn MediaExtractor>,
    pub separator: Arc<dyn Separator>,
    pub diarizer: Arc<dyn Diarizer>,
    pub transcriber: Arc<dyn Transcriber>,
    pub tts: Arc<dyn SpeechSynthesizer>,
    pub music: Arc<dyn MusicGenerator>,
}

impl Workers {
    /// Command-backed workers wired from the configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            extractor: Arc::new(FfmpegExtractor::new(
                &config.tools.ffmpeg_path,
                &config.tools.ffprobe_path,
            )),
            separator: Arc::new(CommandSeparator::new(&config.tools.separator_cmd)),
            diarizer: Arc::new(CommandDiarizer::new(&config.tools.diarizer_cmd)),
            transcriber: Arc::new(CommandTranscriber::new(&config.tools.transcriber_cmd)),
            tts: Arc::new(CommandSynthesizer::new(
                &config.tools.tts_cmd,
                &config.models.tts_model,
            )),
            music: Arc::new(CommandMusicGenerator::new(
                &config.tools.music_cmd,
                &config.models.music_model,
            )),
        }
    }
}
