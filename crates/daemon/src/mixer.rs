//! Two-track mixing of TTS narration with background music.
//!
//! The convenience path behind the mix workflow: one speech clip at time
//! zero, music with an optional start delay, per-track volume scaling, and
//! gentle fades on the music. No ducking in this mode; levels are the
//! caller's choice.

use crate::audio::{normalize_peak, AudioClip, AudioError};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Fade length applied to the music at its start and at the canvas end.
const MUSIC_FADE: f64 = 0.5;

/// Peak target of the final mix.
const NORMALIZATION_HEADROOM_DB: f32 = -1.0;

/// Error type for mix operations
#[derive(Debug, Error)]
pub enum MixError {
    /// Audio load/save error.
    #[error("audio error: {0}")]
    Audio(#[from] AudioError),

    /// A mixing parameter is out of range.
    #[error("invalid mix parameter: {0}")]
    InvalidParam(String),
}

/// Volume and timing parameters for a two-track mix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixParams {
    /// Speech track gain in [0.0, 1.0].
    pub tts_volume: f32,
    /// Music track gain in [0.0, 1.0].
    pub music_volume: f32,
    /// Leading silence on the music track, in seconds.
    pub music_delay: f64,
}

impl Default for MixParams {
    fn default() -> Self {
        Self {
            tts_volume: 0.85,
            music_volume: 0.30,
            music_delay: 0.0,
        }
    }
}

impl MixParams {
    fn validate(&self) -> Result<(), MixError> {
        if !(0.0..=1.0).contains(&self.tts_volume) {
            return Err(MixError::InvalidParam(format!(
                "tts_volume must be in [0.0, 1.0], got {}",
                self.tts_volume
            )));
        }
        if !(0.0..=1.0).contains(&self.music_volume) {
            return Err(MixError::InvalidParam(format!(
                "music_volume must be in [0.0, 1.0], got {}",
                self.music_volume
            )));
        }
        if self.music_delay < 0.0 {
            return Err(MixError::InvalidParam(format!(
                "music_delay must be non-negative, got {}",
                self.music_delay
            )));
        }
        Ok(())
    }
}

/// Mix a TTS clip with background music into `output_path`.
///
/// The output length equals the TTS clip length. The music is delayed by
/// `music_delay` seconds of leading silence, fitted to the canvas, faded in
/// over 0.5 s where it starts and out over the last 0.5 s, scaled, summed
/// with the scaled speech, and peak-normalized to -1 dBFS.
pub fn mix_tracks(
    tts_path: &Path,
    music_path: &Path,
    output_path: &Path,
    params: MixParams,
    sample_rate: u32,
) -> Result<PathBuf, MixError> {
    params.validate()?;

    let tts = AudioClip::load(tts_path)?.resampled(sample_rate);
    let music = AudioClip::load(music_path)?.resampled(sample_rate);

    let target_samples = tts.samples.len();
    let delay_samples = (params.music_delay * sample_rate as f64) as usize;

    let mut music_fitted = apply_delay_and_fit(&music.samples, delay_samples, target_samples);
    apply_music_fades(&mut music_fitted, delay_samples, sample_rate);

    let mut mixed: Vec<f32> = tts
        .samples
        .iter()
        .zip(music_fitted.iter())
        .map(|(&t, &m)| t * params.tts_volume + m * params.music_volume)
        .collect();
    normalize_peak(&mut mixed, NORMALIZATION_HEADROOM_DB);

    let out = AudioClip {
        samples: mixed,
        sample_rate,
    };
    out.save(output_path)?;

    info!(
        tts = %tts_path.display(),
        music = %music_path.display(),
        output = %output_path.display(),
        tts_volume = params.tts_volume,
        music_volume = params.music_volume,
        delay = params.music_delay,
        "two-track mix complete"
    );
    Ok(output_path.to_path_buf())
}

/// Prepend `delay_samples` of silence and fit to `target_samples`.
fn apply_delay_and_fit(music: &[f32], delay_samples: usize, target_samples: usize) -> Vec<f32> {
    let mut out = Vec::with_capacity(target_samples);
    out.resize(delay_samples.min(target_samples), 0.0);

    let remaining = target_samples - out.len();
    out.extend_from_slice(&music[..music.len().min(remaining)]);
    out.resize(target_samples, 0.0);
    out
}

/// Linear fade-in where the music starts and fade-out at the canvas end.
fn apply_music_fades(music: &mut [f32], start_offset: usize, sample_rate: u32) {
    let fade_len = (MUSIC_FADE * sample_rate as f64) as usize;
    let len = music.len();

    if start_offset < len {
        let fade_end = (start_offset + fade_len).min(len);
        let span = fade_end - start_offset;
        if span > 0 {
            for i in 0..span {
                music[start_offset + i] *= i as f32 / span as f32;
            }
        }
    }

    if len > fade_len && fade_len > 0 {
        for i in 0..fade_len {
            let gain = 1.0 - i as f32 / fade_len as f32;
            music[len - fade_len + i] *= gain;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::db_to_amplitude;
    use tempfile::TempDir;

    const SR: u32 = 24000;

    fn sine(duration: f64, freq: f32, amplitude: f32) -> AudioClip {
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

    fn write_pair(dir: &TempDir) -> (PathBuf, PathBuf) {
        let tts = dir.path().join("tts.wav");
        let music = dir.path().join("music.wav");
        sine(3.0, 440.0, 0.5).save(&tts).unwrap();
        sine(5.0, 220.0, 0.5).save(&music).unwrap();
        (tts, music)
    }

    #[test]
    fn test_mix_output_matches_tts_length() {
        let dir = TempDir::new().unwrap();
        let (tts, music) = write_pair(&dir);
        let out = dir.path().join("mixed.wav");

        mix_tracks(&tts, &music, &out, MixParams::default(), SR).unwrap();

        let mixed = AudioClip::load(&out).unwrap();
        assert_eq!(mixed.samples.len(), 3 * SR as usize);
        assert_eq!(mixed.sample_rate, SR);
    }

    #[test]
    fn test_mix_peak_bounded_by_headroom() {
        let dir = TempDir::new().unwrap();
        let (tts, music) = write_pair(&dir);
        let out = dir.path().join("mixed.wav");

        mix_tracks(&tts, &music, &out, MixParams::default(), SR).unwrap();

        let mixed = AudioClip::load(&out).unwrap();
        assert!(mixed.peak() <= db_to_amplitude(-1.0) + 2e-3);
    }

    #[test]
    fn test_music_delay_leaves_leading_region_tts_only() {
        let dir = TempDir::new().unwrap();
        let tts = dir.path().join("tts.wav");
        let music = dir.path().join("music.wav");
        // Silent TTS makes the leading region directly observable.
        AudioClip::silence(3 * SR as usize, SR).save(&tts).unwrap();
        sine(5.0, 220.0, 0.5).save(&music).unwrap();

        let out = dir.path().join("mixed.wav");
        let params = MixParams {
            music_delay: 1.0,
            ..MixParams::default()
        };
        mix_tracks(&tts, &music, &out, params, SR).unwrap();

        let mixed = AudioClip::load(&out).unwrap();
        // First second: only (silent) TTS, so nothing audible.
        assert!(mixed.samples[..SR as usize].iter().all(|&s| s.abs() < 1e-4));
        // Music is audible later.
        let tail_peak = mixed.samples[2 * SR as usize..]
            .iter()
            .fold(0.0f32, |a, &s| a.max(s.abs()));
        assert!(tail_peak > 0.1);
    }

    #[test]
    fn test_invalid_volume_rejected() {
        let dir = TempDir::new().unwrap();
        let (tts, music) = write_pair(&dir);

        let params = MixParams {
            tts_volume: 1.5,
            ..MixParams::default()
        };
        let err = mix_tracks(&tts, &music, &dir.path().join("x.wav"), params, SR).unwrap_err();
        assert!(matches!(err, MixError::InvalidParam(_)));

        let params = MixParams {
            music_delay: -0.5,
            ..MixParams::default()
        };
        let err = mix_tracks(&tts, &music, &dir.path().join("x.wav"), params, SR).unwrap_err();
        assert!(matches!(err, MixError::InvalidParam(_)));
    }

    #[test]
    fn test_missing_input_rejected() {
        let dir = TempDir::new().unwrap();
        let (_, music) = write_pair(&dir);

        let err = mix_tracks(
            &dir.path().join("missing.wav"),
            &music,
            &dir.path().join("x.wav"),
            MixParams::default(),
            SR,
        )
        .unwrap_err();
        assert!(matches!(err, MixError::Audio(AudioError::NotFound(_))));
    }

    #[test]
    fn test_short_music_is_padded() {
        let dir = TempDir::new().unwrap();
        let tts = dir.path().join("tts.wav");
        let music = dir.path().join("music.wav");
        sine(4.0, 440.0, 0.5).save(&tts).unwrap();
        sine(1.0, 220.0, 0.5).save(&music).unwrap();

        let out = dir.path().join("mixed.wav");
        mix_tracks(&tts, &music, &out, MixParams::default(), SR).unwrap();

        let mixed = AudioClip::load(&out).unwrap();
        assert_eq!(mixed.samples.len(), 4 * SR as usize);
    }

    #[test]
    fn test_apply_delay_and_fit_exact_length() {
        let music = vec![0.5f32; 100];

        let fitted = apply_delay_and_fit(&music, 20, 60);
        assert_eq!(fitted.len(), 60);
        assert!(fitted[..20].iter().all(|&s| s == 0.0));
        assert!(fitted[20..].iter().all(|&s| s == 0.5));

        // Delay longer than the canvas yields pure silence.
        let fitted = apply_delay_and_fit(&music, 100, 50);
        assert_eq!(fitted.len(), 50);
        assert!(fitted.iter().all(|&s| s == 0.0));
    }
}
