//! Final-mix composition: speech segments over background music with ducking.
//!
//! Lays aligned speech clips onto a silent canvas at their original time
//! offsets, attenuates the music wherever speech is active, normalizes the
//! sum, and writes the result. Also rebuilds video containers and exports
//! MP3 copies through ffmpeg.

use crate::aligner::PlacedClip;
use crate::audio::{db_to_amplitude, normalize_peak, AudioClip, AudioError};
use crate::media::{self, ToolError};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Music gain while speech is active.
const DUCK_FACTOR: f32 = 0.40;

/// Speech amplitude below this is treated as silence.
const SPEECH_THRESHOLD_DB: f32 = -40.0;

/// Boundary fade applied to each stamped clip.
const BOUNDARY_FADE: f64 = 0.015;

/// Peak target of the final mix.
const NORMALIZATION_HEADROOM_DB: f32 = -1.0;

/// Error type for merge operations
#[derive(Debug, Error)]
pub enum MergeError {
    /// Audio load/save error.
    #[error("audio error: {0}")]
    Audio(#[from] AudioError),

    /// External tool error (mux, mp3 export).
    #[error("tool error: {0}")]
    Tool(#[from] ToolError),

    /// Required input file is missing.
    #[error("input file not found: {0}")]
    InputMissing(PathBuf),
}

/// Merge aligned speech clips with a background music track.
///
/// 1. Allocate a silent mono canvas of `ceil(total_duration * sample_rate)`
///    samples and stamp each clip at `floor(target_start * sample_rate)`,
///    clamped to the canvas and with 15 ms boundary fades. Overlapping
///    clips sum.
/// 2. Load the music, fitted to the canvas length.
/// 3. Duck the music under active speech and add the two tracks.
/// 4. Peak-normalize to -1 dBFS and write 16-bit PCM WAV.
pub fn merge_speech_and_music(
    clips: &[PlacedClip],
    music_path: &Path,
    output_path: &Path,
    total_duration: f64,
    sample_rate: u32,
) -> Result<PathBuf, MergeError> {
    let total_samples = (total_duration * sample_rate as f64).ceil() as usize;

    let mut speech_canvas = vec![0.0f32; total_samples];
    let music = load_and_fit(music_path, total_samples, sample_rate);

    let fade_len = ((BOUNDARY_FADE * sample_rate as f64) as usize).max(1);
    for clip in clips {
        let path = clip.audio_path();
        if !path.exists() {
            warn!(path = %path.display(), "aligned clip missing, skipping");
            continue;
        }

        let audio = AudioClip::load(path)?.resampled(sample_rate);
        let mut samples = audio.samples;

        let mut start_sample = (clip.target_start * sample_rate as f64).floor() as i64;
        if start_sample < 0 {
            let drop = (-start_sample) as usize;
            if drop >= samples.len() {
                continue;
            }
            samples.drain(..drop);
            start_sample = 0;
        }
        let start = start_sample as usize;
        if start >= total_samples {
            continue;
        }
        if start + samples.len() > total_samples {
            samples.truncate(total_samples - start);
        }
        if samples.is_empty() {
            continue;
        }

        apply_boundary_fades(&mut samples, fade_len);
        for (i, &s) in samples.iter().enumerate() {
            speech_canvas[start + i] += s;
        }
    }

    let ducked_music = apply_ducking(&speech_canvas, &music, sample_rate);

    let mut mixed: Vec<f32> = speech_canvas
        .iter()
        .zip(ducked_music.iter())
        .map(|(&s, &m)| s + m)
        .collect();
    normalize_peak(&mut mixed, NORMALIZATION_HEADROOM_DB);

    let out = AudioClip {
        samples: mixed,
        sample_rate,
    };
    out.save(output_path)?;

    info!(
        clips = clips.len(),
        duration = total_duration,
        output = %output_path.display(),
        "merged speech and music"
    );
    Ok(output_path.to_path_buf())
}

/// Load an audio file fitted to exactly `target_samples` at `sample_rate`.
/// A missing file yields silence so a lost stem degrades instead of aborting.
fn load_and_fit(path: &Path, target_samples: usize, sample_rate: u32) -> Vec<f32> {
    let clip = match AudioClip::load(path) {
        Ok(clip) => clip.resampled(sample_rate),
        Err(err) => {
            warn!(path = %path.display(), %err, "music track unreadable, using silence");
            return vec![0.0; target_samples];
        }
    };

    let mut samples = clip.samples;
    if samples.len() >= target_samples {
        samples.truncate(target_samples);
    } else {
        samples.resize(target_samples, 0.0);
    }
    samples
}

/// Attenuate `music` wherever `speech` is active.
///
/// The binary activity mask (|speech| above -40 dBFS) is smoothed with a
/// 20 ms box filter and re-thresholded at 0.3 to avoid rapid gain toggling,
/// then music under the mask is scaled by 0.4.
pub fn apply_ducking(speech: &[f32], music: &[f32], sample_rate: u32) -> Vec<f32> {
    let threshold = db_to_amplitude(SPEECH_THRESHOLD_DB);

    let mut mask: Vec<f32> = speech
        .iter()
        .map(|&s| if s.abs() > threshold { 1.0 } else { 0.0 })
        .collect();

    let window = ((0.02 * sample_rate as f64) as usize).max(1);
    if window > 1 {
        mask = box_filter(&mask, window);
        for value in mask.iter_mut() {
            *value = if *value > 0.3 { 1.0 } else { 0.0 };
        }
    }

    music
        .iter()
        .zip(mask.iter())
        .map(|(&m, &active)| {
            if active > 0.5 {
                m * DUCK_FACTOR
            } else {
                m
            }
        })
        .collect()
}

/// Moving average with a centred window (same-length output).
fn box_filter(input: &[f32], window: usize) -> Vec<f32> {
    let len = input.len();
    if len == 0 || window <= 1 {
        return input.to_vec();
    }

    // Prefix sums give O(n) averaging.
    let mut prefix = Vec::with_capacity(len + 1);
    prefix.push(0.0f64);
    for &v in input {
        prefix.push(prefix.last().unwrap() + v as f64);
    }

    let half = window / 2;
    (0..len)
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + window - half).min(len);
            ((prefix[hi] - prefix[lo]) / window as f64) as f32
        })
        .collect()
}

/// Symmetric linear fade-in/fade-out, each capped at half the clip length.
fn apply_boundary_fades(samples: &mut [f32], fade_len: usize) {
    let len = samples.len();
    let fade = fade_len.min(len / 2);
    if fade == 0 {
        return;
    }

    for i in 0..fade {
        let gain = i as f32 / fade as f32;
        samples[i] *= gain;
        samples[len - 1 - i] *= gain;
    }
}

/// Replace the audio track of `original_video` with `new_audio`.
///
/// The video stream is copied without re-encoding; the audio is encoded
/// with the container's default codec; output stops at the shorter stream.
pub fn rebuild_video(
    ffmpeg_path: &str,
    original_video: &Path,
    new_audio: &Path,
    output_path: &Path,
) -> Result<PathBuf, MergeError> {
    if !original_video.exists() {
        return Err(MergeError::InputMissing(original_video.to_path_buf()));
    }
    if !new_audio.exists() {
        return Err(MergeError::InputMissing(new_audio.to_path_buf()));
    }
    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent).map_err(AudioError::Io)?;
    }

    info!(
        video = %original_video.display(),
        audio = %new_audio.display(),
        output = %output_path.display(),
        "rebuilding video"
    );
    media::run_tool(
        &mut media::build_mux_command(ffmpeg_path, original_video, new_audio, output_path),
        "ffmpeg",
    )?;
    Ok(output_path.to_path_buf())
}

/// Encode an MP3 copy of `wav_path` alongside it in `output_dir`.
///
/// MP3 failure is logged and tolerated; the WAV remains the primary
/// artifact. Returns the MP3 path when the export succeeded.
pub fn export_mp3(ffmpeg_path: &str, wav_path: &Path, output_dir: &Path) -> Option<PathBuf> {
    if !wav_path.exists() {
        warn!(path = %wav_path.display(), "WAV missing, skipping MP3 export");
        return None;
    }
    if let Err(err) = std::fs::create_dir_all(output_dir) {
        warn!(%err, "could not create output dir for MP3 export");
        return None;
    }

    let stem = wav_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    let mp3_path = output_dir.join(format!("{}.mp3", stem));

    match media::run_tool(
        &mut media::build_mp3_command(ffmpeg_path, wav_path, &mp3_path),
        "ffmpeg",
    ) {
        Ok(()) => {
            info!(output = %mp3_path.display(), "MP3 export complete");
            Some(mp3_path)
        }
        Err(err) => {
            warn!(%err, "MP3 export failed, keeping WAV only");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::db_to_amplitude;
    use tempfile::TempDir;

    const SR: u32 = 24000;

    fn sine_clip(duration: f64, freq: f32, amplitude: f32) -> AudioClip {
        let len = (duration * SR as f64) as usize;
        let samples = (0..len)
            .map(|i| {
                let t = i as f32 / SR as f32;
                amplitude * (2.0 * std::f32::consts::PI * freq * t).sin()
            })
            .collect();
        AudioClip {
            samples,
            sample_rate: SR,
        }
    }

    fn placed(path: PathBuf, start: f64, end: f64) -> PlacedClip {
        PlacedClip {
            speaker_id: "S0".to_string(),
            source_path: path.clone(),
            aligned_path: Some(path),
            target_start: start,
            target_end: end,
        }
    }

    // Mix length law: output has exactly ceil(T * R) samples.
    #[test]
    fn test_merge_output_length() {
        let dir = TempDir::new().unwrap();
        let music = dir.path().join("music.wav");
        sine_clip(2.0, 220.0, 0.4).save(&music).unwrap();

        let speech = dir.path().join("speech.wav");
        sine_clip(0.5, 440.0, 0.4).save(&speech).unwrap();

        let out = dir.path().join("final.wav");
        merge_speech_and_music(&[placed(speech, 0.5, 1.0)], &music, &out, 3.0, SR).unwrap();

        let mixed = AudioClip::load(&out).unwrap();
        assert_eq!(mixed.samples.len(), 3 * SR as usize);
        assert_eq!(mixed.sample_rate, SR);
    }

    // Normalization bound: non-silent output peaks at -1 dBFS.
    #[test]
    fn test_merge_normalizes_to_minus_one_db() {
        let dir = TempDir::new().unwrap();
        let music = dir.path().join("music.wav");
        sine_clip(1.0, 220.0, 0.8).save(&music).unwrap();

        let speech = dir.path().join("speech.wav");
        sine_clip(0.5, 440.0, 0.8).save(&speech).unwrap();

        let out = dir.path().join("final.wav");
        merge_speech_and_music(&[placed(speech, 0.0, 0.5)], &music, &out, 1.0, SR).unwrap();

        let mixed = AudioClip::load(&out).unwrap();
        let target = db_to_amplitude(-1.0);
        // 16-bit quantization allows a small tolerance.
        assert!((mixed.peak() - target).abs() < 2e-3, "peak {}", mixed.peak());
    }

    // Empty clip list: output equals the (fitted, normalized) music track.
    #[test]
    fn test_merge_empty_segments_is_music_only() {
        let dir = TempDir::new().unwrap();
        let music = dir.path().join("music.wav");
        sine_clip(1.0, 220.0, 0.5).save(&music).unwrap();

        let out = dir.path().join("final.wav");
        merge_speech_and_music(&[], &music, &out, 2.0, SR).unwrap();

        let mixed = AudioClip::load(&out).unwrap();
        assert_eq!(mixed.samples.len(), 2 * SR as usize);
        // Second half is padded silence.
        assert!(mixed.samples[SR as usize + 100..]
            .iter()
            .all(|&s| s.abs() < 1e-4));
        // First half is the normalized sine.
        let target = db_to_amplitude(-1.0);
        assert!((mixed.peak() - target).abs() < 2e-3);
    }

    // Music longer than the canvas is truncated without error.
    #[test]
    fn test_merge_truncates_long_music() {
        let dir = TempDir::new().unwrap();
        let music = dir.path().join("music.wav");
        sine_clip(5.0, 220.0, 0.5).save(&music).unwrap();

        let out = dir.path().join("final.wav");
        merge_speech_and_music(&[], &music, &out, 1.0, SR).unwrap();

        let mixed = AudioClip::load(&out).unwrap();
        assert_eq!(mixed.samples.len(), SR as usize);
    }

    // Missing music degrades to silence rather than failing the merge.
    #[test]
    fn test_merge_missing_music_yields_speech_only() {
        let dir = TempDir::new().unwrap();
        let speech = dir.path().join("speech.wav");
        sine_clip(0.5, 440.0, 0.5).save(&speech).unwrap();

        let out = dir.path().join("final.wav");
        merge_speech_and_music(
            &[placed(speech, 0.0, 0.5)],
            &dir.path().join("missing.wav"),
            &out,
            1.0,
            SR,
        )
        .unwrap();

        let mixed = AudioClip::load(&out).unwrap();
        assert_eq!(mixed.samples.len(), SR as usize);
        assert!(mixed.peak() > 0.1);
    }

    #[test]
    fn test_clip_running_past_canvas_is_truncated() {
        let dir = TempDir::new().unwrap();
        let music = dir.path().join("music.wav");
        sine_clip(1.0, 220.0, 0.3).save(&music).unwrap();

        let speech = dir.path().join("speech.wav");
        sine_clip(1.0, 440.0, 0.5).save(&speech).unwrap();

        let out = dir.path().join("final.wav");
        // Clip starts 0.5 s before the canvas ends.
        merge_speech_and_music(&[placed(speech, 0.5, 1.5)], &music, &out, 1.0, SR).unwrap();

        let mixed = AudioClip::load(&out).unwrap();
        assert_eq!(mixed.samples.len(), SR as usize);
    }

    #[test]
    fn test_ducking_attenuates_under_speech() {
        let len = SR as usize;
        let mut speech = vec![0.0f32; len];
        // Speech active in the middle half-second.
        for s in speech[len / 4..3 * len / 4].iter_mut() {
            *s = 0.5;
        }
        let music = vec![1.0f32; len];

        let ducked = apply_ducking(&speech, &music, SR);

        // Well inside the active region the gain is DUCK_FACTOR.
        assert!((ducked[len / 2] - DUCK_FACTOR).abs() < 1e-6);
        // Well outside it the music is untouched.
        assert!((ducked[0] - 1.0).abs() < 1e-6);
        assert!((ducked[len - 1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_ducking_ignores_subthreshold_speech() {
        let len = SR as usize / 2;
        // -60 dBFS, well below the -40 dBFS threshold.
        let speech = vec![db_to_amplitude(-60.0); len];
        let music = vec![0.8f32; len];

        let ducked = apply_ducking(&speech, &music, SR);
        assert!(ducked.iter().all(|&m| (m - 0.8).abs() < 1e-6));
    }

    #[test]
    fn test_boundary_fades_are_symmetric_and_capped() {
        let mut samples = vec![1.0f32; 10];
        apply_boundary_fades(&mut samples, 100);

        // Fade capped at half the clip: 5 samples each side.
        assert_eq!(samples[0], 0.0);
        assert_eq!(samples[9], 0.0);
        assert!(samples[4] < 1.0);
        assert!(samples[5] < 1.0);
    }

    #[test]
    fn test_box_filter_preserves_length_and_mean() {
        let input = vec![1.0f32; 100];
        let out = box_filter(&input, 9);
        assert_eq!(out.len(), 100);
        // Interior values average to one.
        assert!((out[50] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_rebuild_video_rejects_missing_inputs() {
        let dir = TempDir::new().unwrap();
        let err = rebuild_video(
            "ffmpeg",
            &dir.path().join("missing.mp4"),
            &dir.path().join("missing.wav"),
            &dir.path().join("out.mp4"),
        )
        .unwrap_err();
        assert!(matches!(err, MergeError::InputMissing(_)));
    }

    #[test]
    fn test_export_mp3_missing_wav_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(export_mp3("ffmpeg", &dir.path().join("missing.wav"), dir.path()).is_none());
    }
}
