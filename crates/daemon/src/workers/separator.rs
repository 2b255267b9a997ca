//! Source separation worker.
//!
//! Invokes the configured separator command and normalizes whatever stems it
//! produces into the canonical two-file output the pipeline expects:
//! a vocal stem and an accompaniment stem.

use super::WorkerError;
use crate::audio::AudioClip;
use crate::media::run_tool;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Canonical destinations for the separated stems.
#[derive(Debug, Clone, PartialEq)]
pub struct StemPaths {
    pub vocals: PathBuf,
    pub accompaniment: PathBuf,
}

/// Splits an audio file into isolated vocal and accompaniment stems.
pub trait Separator: Send + Sync {
    /// Separate `input_wav`, writing the canonical stems to `dest`.
    /// `scratch_dir` receives the tool's raw output.
    fn separate(
        &self,
        input_wav: &Path,
        dest: &StemPaths,
        scratch_dir: &Path,
    ) -> Result<(), WorkerError>;
}

/// Separator backed by an external command.
///
/// Invocation contract: `<command> <input.wav> <scratch_dir>`. The tool may
/// write any set of stems (two-stem `vocals`/`no_vocals`, or per-instrument
/// `drums`/`bass`/`other`/`vocals`), at any nesting depth; the adapter
/// normalizes afterwards.
pub struct CommandSeparator {
    command: String,
}

impl CommandSeparator {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
        }
    }

    /// Build the separator invocation.
    pub fn build_command(&self, input_wav: &Path, scratch_dir: &Path) -> Command {
        let mut cmd = Command::new(&self.command);
        cmd.arg(input_wav);
        cmd.arg(scratch_dir);
        cmd
    }
}

impl Separator for CommandSeparator {
    fn separate(
        &self,
        input_wav: &Path,
        dest: &StemPaths,
        scratch_dir: &Path,
    ) -> Result<(), WorkerError> {
        fs::create_dir_all(scratch_dir)?;

        info!(input = %input_wav.display(), "running source separation");
        run_tool(&mut self.build_command(input_wav, scratch_dir), "separator")?;

        normalize_stems(scratch_dir, dest)
    }
}

/// Classify and copy/mix the raw stems under `scratch_dir` into `dest`.
///
/// - a stem named `vocals*` becomes the vocal output (required);
/// - `no_vocals*` or `accompaniment*` becomes the accompaniment directly;
/// - otherwise every remaining stem is summed sample-wise into a single
///   accompaniment;
/// - a vocals-only result is an error.
pub fn normalize_stems(scratch_dir: &Path, dest: &StemPaths) -> Result<(), WorkerError> {
    let mut vocal_stem: Option<PathBuf> = None;
    let mut accompaniment_stem: Option<PathBuf> = None;
    let mut other_stems: Vec<PathBuf> = Vec::new();

    for entry in WalkDir::new(scratch_dir).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let is_wav = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("wav"))
            .unwrap_or(false);
        if !is_wav {
            continue;
        }

        let stem_name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_lowercase();

        if stem_name.contains("no_vocals") || stem_name.contains("accompaniment") {
            accompaniment_stem = Some(path.to_path_buf());
        } else if stem_name.contains("vocals") {
            vocal_stem = Some(path.to_path_buf());
        } else {
            other_stems.push(path.to_path_buf());
        }
    }

    let vocal_stem = vocal_stem.ok_or_else(|| WorkerError::MissingOutput(
        scratch_dir.join("vocals.wav"),
    ))?;

    copy_stem(&vocal_stem, &dest.vocals)?;
    debug!(from = %vocal_stem.display(), to = %dest.vocals.display(), "vocal stem");

    if let Some(stem) = accompaniment_stem {
        copy_stem(&stem, &dest.accompaniment)?;
        debug!(from = %stem.display(), to = %dest.accompaniment.display(), "accompaniment stem");
        return Ok(());
    }

    if other_stems.is_empty() {
        return Err(WorkerError::OnlyVocals);
    }

    if other_stems.len() == 1 {
        copy_stem(&other_stems[0], &dest.accompaniment)?;
        return Ok(());
    }

    // Multi-stem separator: mix all non-vocal stems into one accompaniment.
    mix_stems(&other_stems, &dest.accompaniment)?;
    info!(
        stems = other_stems.len(),
        output = %dest.accompaniment.display(),
        "summed non-vocal stems into accompaniment"
    );
    Ok(())
}

fn copy_stem(from: &Path, to: &Path) -> Result<(), WorkerError> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(from, to)?;
    Ok(())
}

/// Sum stems sample-wise; stems are resampled to the first stem's rate and
/// the result is truncated to the shortest stem.
fn mix_stems(stems: &[PathBuf], output: &Path) -> Result<(), WorkerError> {
    let first = AudioClip::load(&stems[0])?;
    let sample_rate = first.sample_rate;
    let mut mixed = first.samples;

    for stem_path in &stems[1..] {
        let clip = match AudioClip::load(stem_path) {
            Ok(clip) => clip.resampled(sample_rate),
            Err(err) => {
                warn!(path = %stem_path.display(), %err, "unreadable stem skipped in mixdown");
                continue;
            }
        };
        let min_len = mixed.len().min(clip.samples.len());
        mixed.truncate(min_len);
        for (i, sample) in mixed.iter_mut().enumerate() {
            *sample += clip.samples[i];
        }
    }

    AudioClip {
        samples: mixed,
        sample_rate,
    }
    .save(output)?;
    Ok(())
}
