//! Mono audio buffers and WAV I/O.
//!
//! All DSP stages in the pipeline operate on mono `f32` sample buffers at a
//! known sample rate. Loading down-mixes multi-channel material by
//! arithmetic mean; saving always writes 16-bit PCM.

use std::io;
use std::path::Path;
use thiserror::Error;

/// Error type for audio buffer operations
#[derive(Debug, Error)]
pub enum AudioError {
    /// WAV read/write error.
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Input file is missing.
    #[error("audio file not found: {0}")]
    NotFound(std::path::PathBuf),
}

/// A mono audio clip: samples in [-1.0, 1.0] at a fixed sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioClip {
    /// Clip of `len` zero-valued samples.
    pub fn silence(len: usize, sample_rate: u32) -> Self {
        Self {
            samples: vec![0.0; len],
            sample_rate,
        }
    }

    /// Load a WAV file, down-mixing to mono.
    pub fn load(path: &Path) -> Result<Self, AudioError> {
        if !path.exists() {
            return Err(AudioError::NotFound(path.to_path_buf()));
        }

        let mut reader = hound::WavReader::open(path)?;
        let spec = reader.spec();
        let channels = spec.channels.max(1) as usize;

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<Result<Vec<_>, _>>()?,
            hound::SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<Result<Vec<_>, _>>()?
            }
        };

        let samples = if channels == 1 {
            interleaved
        } else {
            interleaved
                .chunks_exact(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32)
                .collect()
        };

        Ok(Self {
            samples,
            sample_rate: spec.sample_rate,
        })
    }

    /// Load a WAV file and resample it to `sample_rate` if needed.
    pub fn load_at(path: &Path, sample_rate: u32) -> Result<Self, AudioError> {
        Ok(Self::load(path)?.resampled(sample_rate))
    }

    /// Write the clip as 16-bit PCM WAV, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), AudioError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut writer = hound::WavWriter::create(path, spec)?;
        for &sample in &self.samples {
            let clamped = sample.clamp(-1.0, 1.0);
            writer.write_sample((clamped * i16::MAX as f32) as i16)?;
        }
        writer.finalize()?;
        Ok(())
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Peak absolute amplitude.
    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |acc, &s| acc.max(s.abs()))
    }

    /// Return the clip resampled to `target_rate` by linear interpolation.
    /// A no-op (clone) when the rate already matches.
    pub fn resampled(self, target_rate: u32) -> Self {
        if self.sample_rate == target_rate {
            return self;
        }
        if self.samples.is_empty() {
            return Self {
                samples: Vec::new(),
                sample_rate: target_rate,
            };
        }

        let ratio = self.sample_rate as f64 / target_rate as f64;
        let out_len =
            ((self.samples.len() as f64 * target_rate as f64 / self.sample_rate as f64).round()
                as usize)
                .max(1);

        let mut out = Vec::with_capacity(out_len);
        for i in 0..out_len {
            let src_pos = i as f64 * ratio;
            let idx = src_pos.floor() as usize;
            let frac = (src_pos - idx as f64) as f32;

            let a = self.samples[idx.min(self.samples.len() - 1)];
            let b = self.samples[(idx + 1).min(self.samples.len() - 1)];
            out.push(a + (b - a) * frac);
        }

        Self {
            samples: out,
            sample_rate: target_rate,
        }
    }
}

/// Duration of a WAV file in seconds, reading only the header.
/// Returns 0.0 when the file cannot be read.
pub fn wav_duration(path: &Path) -> f64 {
    match hound::WavReader::open(path) {
        Ok(reader) => {
            let spec = reader.spec();
            if spec.sample_rate == 0 {
                return 0.0;
            }
            reader.duration() as f64 / spec.sample_rate as f64
        }
        Err(_) => 0.0,
    }
}

/// Convert a dBFS value to linear amplitude.
pub fn db_to_amplitude(db: f32) -> f32 {
    10.0f32.powf(db / 20.0)
}

/// Peak-normalize `samples` in place to `target_db` dBFS.
/// Silent signals (peak below 1e-8) are left unchanged.
pub fn normalize_peak(samples: &mut [f32], target_db: f32) {
    let peak = samples.iter().fold(0.0f32, |acc, &s| acc.max(s.abs()));
    if peak < 1e-8 {
        return;
    }
    let gain = db_to_amplitude(target_db) / peak;
    for sample in samples.iter_mut() {
        *sample *= gain;
    }
}
