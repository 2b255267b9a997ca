//! Media extraction worker: demux/transcode to the pipeline's canonical
//! mono WAV, and probe media metadata.

use super::WorkerError;
use crate::media::{self, MediaInfo};
use std::path::Path;

/// Demuxes or transcodes media into mono 16-bit PCM WAV and probes files.
pub trait MediaExtractor: Send + Sync {
    /// Produce a mono 16-bit PCM WAV at `sample_rate` from any input.
    fn extract_wav(&self, input: &Path, output: &Path, sample_rate: u32)
        -> Result<(), WorkerError>;

    /// Structured metadata for a media file.
    fn probe(&self, input: &Path) -> Result<MediaInfo, WorkerError>;
}

/// Extractor backed by ffmpeg/ffprobe.
pub struct FfmpegExtractor {
    ffmpeg_path: String,
    ffprobe_path: String,
}

impl FfmpegExtractor {
    pub fn new(ffmpeg_path: &str, ffprobe_path: &str) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.to_string(),
            ffprobe_path: ffprobe_path.to_string(),
        }
    }
}

impl MediaExtractor for FfmpegExtractor {
    fn extract_wav(
        &self,
        input: &Path,
        output: &Path,
        sample_rate: u32,
    ) -> Result<(), WorkerError> {
        media::extract_wav(&self.ffmpeg_path, input, output, sample_rate)?;
        Ok(())
    }

    fn probe(&self, input: &Path) -> Result<MediaInfo, WorkerError> {
        Ok(media::probe_media(&self.ffprobe_path, input)?)
    }
}
