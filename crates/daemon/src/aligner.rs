//! Time-alignment of synthesized speech segments to original timing.
//!
//! Stretches, pads, or trims generated clips so they occupy exactly the same
//! time slots as the original speech, keeping lip-sync and allowing the
//! merger to stamp them onto the timeline without drift.

use crate::audio::{AudioClip, AudioError};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Stretch ratio bounds. Beyond these the artifacts from time-stretching are
/// worse than a plain length mismatch, so pad/trim is used instead.
const MIN_STRETCH: f64 = 0.5;
const MAX_STRETCH: f64 = 2.5;

/// Clips within this margin of the target duration are not re-processed.
const DURATION_TOLERANCE: f64 = 0.05;

/// Fade length applied at truncation points to avoid clicks.
const FADE_DURATION: f64 = 0.01;

/// Error type for alignment operations
#[derive(Debug, Error)]
pub enum AlignError {
    /// Audio load/save error.
    #[error("audio error: {0}")]
    Audio(#[from] AudioError),

    /// IO error creating the output directory.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// A synthesized clip scheduled for a time slot on the final timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedClip {
    /// Speaker the clip belongs to; used for aligned filenames.
    pub speaker_id: String,
    /// WAV produced by the synthesis stage.
    pub source_path: PathBuf,
    /// WAV produced by the alignment stage; `None` until aligned.
    pub aligned_path: Option<PathBuf>,
    /// Desired start time on the timeline, in seconds.
    pub target_start: f64,
    /// Desired end time on the timeline, in seconds.
    pub target_end: f64,
}

impl PlacedClip {
    pub fn target_duration(&self) -> f64 {
        self.target_end - self.target_start
    }

    /// Path the merger should read: the aligned file when alignment ran,
    /// otherwise the raw synthesis output.
    pub fn audio_path(&self) -> &Path {
        self.aligned_path.as_deref().unwrap_or(&self.source_path)
    }
}

/// Pad with silence or truncate `samples` to exactly `target_len` samples.
///
/// Truncation applies a short linear fade-out at the cut point; padding
/// appends zeros.
pub fn pad_or_trim(samples: &[f32], target_len: usize, sample_rate: u32) -> Vec<f32> {
    if samples.len() == target_len {
        return samples.to_vec();
    }

    if samples.len() > target_len {
        let mut trimmed = samples[..target_len].to_vec();
        let fade_len = ((FADE_DURATION * sample_rate as f64) as usize).min(target_len);
        if fade_len > 1 {
            for i in 0..fade_len {
                let gain = 1.0 - i as f32 / (fade_len - 1) as f32;
                trimmed[target_len - fade_len + i] *= gain;
            }
        }
        return trimmed;
    }

    let mut padded = samples.to_vec();
    padded.resize(target_len, 0.0);
    padded
}

/// Join two clips with a linear crossfade of `fade_duration` seconds.
///
/// The last `f` samples of `a` are blended with the first `f` samples of `b`
/// under complementary envelopes, where `f` is capped at both clip lengths.
/// The result has `a.len() + b.len() - f` samples.
pub fn crossfade(a: &[f32], b: &[f32], fade_duration: f64, sample_rate: u32) -> Vec<f32> {
    let fade_len = ((fade_duration * sample_rate as f64) as usize)
        .min(a.len())
        .min(b.len());

    if fade_len == 0 {
        let mut out = a.to_vec();
        out.extend_from_slice(b);
        return out;
    }

    let mut out = Vec::with_capacity(a.len() + b.len() - fade_len);
    out.extend_from_slice(&a[..a.len() - fade_len]);

    for i in 0..fade_len {
        let t = if fade_len > 1 {
            i as f32 / (fade_len - 1) as f32
        } else {
            1.0
        };
        out.push(a[a.len() - fade_len + i] * (1.0 - t) + b[i] * t);
    }

    out.extend_from_slice(&b[fade_len..]);
    out
}

/// Time-stretch `input` by `rate` without changing pitch (WSOLA).
///
/// `rate > 1.0` shortens the clip, `rate < 1.0` lengthens it; the output is
/// approximately `input.len() / rate` samples. Callers enforce the exact
/// sample count afterwards with [`pad_or_trim`].
pub fn time_stretch(input: &[f32], rate: f64, sample_rate: u32) -> Vec<f32> {
    let window = ((sample_rate as f64 * 0.04) as usize).max(64);
    if input.len() <= window || (rate - 1.0).abs() < 1e-6 || rate <= 0.0 {
        return input.to_vec();
    }

    let half = window / 2;
    let tolerance = ((sample_rate as f64 * 0.01) as usize).max(16);
    let out_len = (input.len() as f64 / rate).round() as usize;

    // Hann window; overlapping halves sum to unity after weight division.
    let hann: Vec<f32> = (0..window)
        .map(|i| {
            let phase = std::f32::consts::PI * i as f32 / (window - 1) as f32;
            phase.sin() * phase.sin()
        })
        .collect();

    let mut output = vec![0.0f32; out_len + window];
    let mut weights = vec![0.0f32; out_len + window];

    let max_analysis = input.len() - window;
    let mut prev_analysis = 0usize;
    let mut syn_pos = 0usize;

    while syn_pos < out_len {
        let ideal = ((syn_pos as f64 * rate) as usize).min(max_analysis);

        let analysis = if syn_pos == 0 {
            ideal
        } else {
            // The natural continuation of the previous frame keeps waveform
            // similarity; search near the ideal position for the candidate
            // that best matches it.
            let natural = (prev_analysis + half).min(max_analysis);
            let lo = ideal.saturating_sub(tolerance);
            let hi = (ideal + tolerance).min(max_analysis);

            let mut best = ideal;
            let mut best_score = f64::MIN;
            for cand in lo..=hi {
                let mut score = 0.0f64;
                for i in 0..half {
                    score += input[cand + i] as f64 * input[natural + i] as f64;
                }
                if score > best_score {
                    best_score = score;
                    best = cand;
                }
            }
            best
        };

        for i in 0..window {
            output[syn_pos + i] += input[analysis + i] * hann[i];
            weights[syn_pos + i] += hann[i];
        }

        prev_analysis = analysis;
        syn_pos += half;
    }

    output.truncate(out_len);
    for (sample, &weight) in output.iter_mut().zip(weights.iter()) {
        if weight > 1e-6 {
            *sample /= weight;
        }
    }
    output
}

/// Align one clip to occupy exactly `target_duration` seconds.
///
/// Within 50 ms of the target only an exact-length pad/trim is applied.
/// When the required stretch ratio is inside [0.5, 2.5] the clip is
/// time-stretched first; otherwise pad/trim is the fallback and an audible
/// length mismatch is logged.
pub fn align_clip(clip: &AudioClip, target_duration: f64) -> AudioClip {
    let sample_rate = clip.sample_rate;
    let target_len = (target_duration * sample_rate as f64) as usize;
    let actual_duration = clip.duration();

    let samples = if (actual_duration - target_duration).abs() <= DURATION_TOLERANCE {
        pad_or_trim(&clip.samples, target_len, sample_rate)
    } else {
        let ratio = actual_duration / target_duration;
        if (MIN_STRETCH..=MAX_STRETCH).contains(&ratio) {
            debug!(
                actual = actual_duration,
                target = target_duration,
                ratio,
                "time-stretching clip"
            );
            let stretched = time_stretch(&clip.samples, ratio, sample_rate);
            pad_or_trim(&stretched, target_len, sample_rate)
        } else {
            warn!(
                actual = actual_duration,
                target = target_duration,
                ratio,
                "stretch ratio out of bounds, falling back to pad/trim"
            );
            pad_or_trim(&clip.samples, target_len, sample_rate)
        }
    };

    AudioClip {
        samples,
        sample_rate,
    }
}

/// Align one WAV file to `target_duration` seconds and write the result.
pub fn align_file(
    input_path: &Path,
    target_duration: f64,
    output_path: &Path,
) -> Result<PathBuf, AlignError> {
    let clip = AudioClip::load(input_path)?;
    let aligned = align_clip(&clip, target_duration);
    aligned.save(output_path)?;
    Ok(output_path.to_path_buf())
}

/// Align a batch of clips, writing `aligned_<speaker>_<index:04>.wav` files
/// into `out_dir` and recording the path on each clip.
///
/// Clips with a non-positive target duration are skipped (the source path is
/// reused). Per-clip alignment failures are logged and the batch continues
/// with the unaligned source.
pub fn align_segments(clips: &mut [PlacedClip], out_dir: &Path) -> Result<(), AlignError> {
    std::fs::create_dir_all(out_dir)?;

    for (idx, clip) in clips.iter_mut().enumerate() {
        let target_duration = clip.target_duration();
        if target_duration <= 0.0 {
            warn!(
                index = idx,
                speaker = %clip.speaker_id,
                target_duration,
                "non-positive target duration, skipping alignment"
            );
            clip.aligned_path = Some(clip.source_path.clone());
            continue;
        }

        let aligned_name = format!("aligned_{}_{:04}.wav", clip.speaker_id, idx);
        let aligned_path = out_dir.join(aligned_name);

        match align_file(&clip.source_path, target_duration, &aligned_path) {
            Ok(path) => clip.aligned_path = Some(path),
            Err(err) => {
                warn!(index = idx, speaker = %clip.speaker_id, %err, "alignment failed, using unaligned clip");
                clip.aligned_path = Some(clip.source_path.clone());
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    const SR: u32 = 24000;

    fn sine(duration: f64, freq: f32) -> AudioClip {
        let len = (duration * SR as f64) as usize;
        let samples = (0..len)
            .map(|i| {
                let t = i as f32 / SR as f32;
                0.5 * (2.0 * std::f32::consts::PI * freq * t).sin()
            })
            .collect();
        AudioClip {
            samples,
            sample_rate: SR,
        }
    }

    #[test]
    fn test_pad_extends_with_zeros() {
        let samples = vec![0.5f32; 100];
        let out = pad_or_trim(&samples, 150, SR);

        assert_eq!(out.len(), 150);
        assert!(out[100..].iter().all(|&s| s == 0.0));
        assert!(out[..100].iter().all(|&s| s == 0.5));
    }

    #[test]
    fn test_trim_fades_out_at_cut() {
        let samples = vec![0.5f32; SR as usize];
        let out = pad_or_trim(&samples, SR as usize / 2, SR);

        assert_eq!(out.len(), SR as usize / 2);
        // The very last sample of the fade is fully attenuated.
        assert!(out.last().unwrap().abs() < 1e-6);
        // Samples before the fade region are untouched.
        assert_eq!(out[0], 0.5);
    }

    #[test]
    fn test_pad_or_trim_noop() {
        let samples = vec![0.25f32; 64];
        assert_eq!(pad_or_trim(&samples, 64, SR), samples);
    }

    #[test]
    fn test_crossfade_length_and_envelopes() {
        let a = vec![1.0f32; 1000];
        let b = vec![1.0f32; 1000];
        let fade_duration = 0.01; // 240 samples at 24 kHz
        let fade_len = (fade_duration * SR as f64) as usize;

        let out = crossfade(&a, &b, fade_duration, SR);
        assert_eq!(out.len(), a.len() + b.len() - fade_len);

        // Complementary linear envelopes sum to one over the overlap.
        for &s in &out {
            assert!((s - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_crossfade_caps_at_clip_length() {
        let a = vec![1.0f32; 10];
        let b = vec![1.0f32; 10];
        let out = crossfade(&a, &b, 10.0, SR);
        // Fade capped at min(len(a), len(b)) = 10.
        assert_eq!(out.len(), 10);
    }

    #[test]
    fn test_crossfade_zero_fade_is_concat() {
        let a = vec![0.1f32; 5];
        let b = vec![0.2f32; 7];
        let out = crossfade(&a, &b, 0.0, SR);
        assert_eq!(out.len(), 12);
    }

    #[test]
    fn test_time_stretch_rate_one_is_identity() {
        let clip = sine(0.5, 440.0);
        let out = time_stretch(&clip.samples, 1.0, SR);
        assert_eq!(out, clip.samples);
    }

    #[test]
    fn test_time_stretch_output_length() {
        let clip = sine(1.0, 440.0);

        for rate in [0.5, 0.8, 1.25, 2.0] {
            let out = time_stretch(&clip.samples, rate, SR);
            let expected = (clip.samples.len() as f64 / rate).round() as usize;
            assert_eq!(out.len(), expected, "rate {}", rate);
        }
    }

    #[test]
    fn test_time_stretch_preserves_amplitude_scale() {
        let clip = sine(1.0, 440.0);
        let out = time_stretch(&clip.samples, 1.5, SR);

        let peak = out.iter().fold(0.0f32, |a, &s| a.max(s.abs()));
        assert!(peak > 0.3 && peak < 0.7, "peak {}", peak);
    }

    // Alignment length law: output always has exactly
    // floor(target_duration * sample_rate) samples.
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_align_clip_exact_length(
            input_duration in 0.05f64..3.0,
            target_duration in 0.05f64..3.0,
        ) {
            let clip = sine(input_duration, 330.0);
            let aligned = align_clip(&clip, target_duration);

            let expected = (target_duration * SR as f64) as usize;
            prop_assert_eq!(aligned.samples.len(), expected);
        }

        #[test]
        fn prop_align_is_length_idempotent(
            input_duration in 0.05f64..2.0,
            target_duration in 0.05f64..2.0,
        ) {
            let clip = sine(input_duration, 330.0);
            let once = align_clip(&clip, target_duration);
            let twice = align_clip(&once, target_duration);

            prop_assert_eq!(once.samples.len(), twice.samples.len());
        }
    }

    #[test]
    fn test_align_within_tolerance_skips_stretch() {
        // 20 ms short of the target: only pad, no stretch.
        let clip = sine(0.98, 440.0);
        let aligned = align_clip(&clip, 1.0);

        let expected = SR as usize;
        assert_eq!(aligned.samples.len(), expected);
        // Padding means the original samples survive verbatim at the front.
        assert_eq!(&aligned.samples[..clip.samples.len()], &clip.samples[..]);
    }

    #[test]
    fn test_align_out_of_bounds_ratio_falls_back() {
        // 0.2s -> 1.5s would need ratio 0.133, far below MIN_STRETCH.
        let clip = sine(0.2, 440.0);
        let aligned = align_clip(&clip, 1.5);

        assert_eq!(aligned.samples.len(), (1.5 * SR as f64) as usize);
        // Tail is padded silence.
        assert!(aligned.samples[clip.samples.len()..]
            .iter()
            .all(|&s| s == 0.0));
    }

    #[test]
    fn test_align_segments_batch_names_and_paths() {
        let dir = TempDir::new().unwrap();
        let src_dir = dir.path().join("src");
        let out_dir = dir.path().join("aligned");
        std::fs::create_dir_all(&src_dir).unwrap();

        let a = src_dir.join("0.wav");
        let b = src_dir.join("1.wav");
        sine(0.4, 440.0).save(&a).unwrap();
        sine(0.6, 220.0).save(&b).unwrap();

        let mut clips = vec![
            PlacedClip {
                speaker_id: "S0".to_string(),
                source_path: a,
                aligned_path: None,
                target_start: 0.0,
                target_end: 0.5,
            },
            PlacedClip {
                speaker_id: "S1".to_string(),
                source_path: b,
                aligned_path: None,
                target_start: 1.0,
                target_end: 1.5,
            },
        ];

        align_segments(&mut clips, &out_dir).unwrap();

        assert_eq!(
            clips[0].aligned_path,
            Some(out_dir.join("aligned_S0_0000.wav"))
        );
        assert_eq!(
            clips[1].aligned_path,
            Some(out_dir.join("aligned_S1_0001.wav"))
        );
        for clip in &clips {
            let aligned = AudioClip::load(clip.audio_path()).unwrap();
            assert_eq!(aligned.samples.len(), SR as usize / 2);
        }
    }

    #[test]
    fn test_align_segments_skips_non_positive_duration() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("0.wav");
        sine(0.4, 440.0).save(&src).unwrap();

        let mut clips = vec![PlacedClip {
            speaker_id: "S0".to_string(),
            source_path: src.clone(),
            aligned_path: None,
            target_start: 2.0,
            target_end: 2.0,
        }];

        align_segments(&mut clips, &dir.path().join("aligned")).unwrap();
        assert_eq!(clips[0].aligned_path, Some(src));
    }

    #[test]
    fn test_align_segments_survives_missing_source() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.wav");

        let mut clips = vec![PlacedClip {
            speaker_id: "S0".to_string(),
            source_path: missing.clone(),
            aligned_path: None,
            target_start: 0.0,
            target_end: 1.0,
        }];

        align_segments(&mut clips, &dir.path().join("aligned")).unwrap();
        // Falls back to the (missing) source so the merger can decide.
        assert_eq!(clips[0].aligned_path, Some(missing));
    }
}
