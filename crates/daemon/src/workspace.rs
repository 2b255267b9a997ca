//! Per-job workspace layout on the filesystem.
//!
//! Every job owns a directory tree under the jobs root:
//!
//! ```text
//! jobs/<job_id>/
//!   job.json       -- serialized Job record
//!   input/         -- original upload + extracted audio.wav
//!   vocals/        -- isolated speech track
//!   music/         -- isolated background track
//!   segments/      -- synthesized and aligned per-segment clips
//!   references/    -- reference voice audio for assignments
//!   output/        -- final artifacts
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Sub-directories created inside every job workspace.
pub const JOB_SUBDIRS: [&str; 6] = [
    "input",
    "vocals",
    "music",
    "segments",
    "references",
    "output",
];

/// Canonical name of the extracted/converted audio inside `input/`.
pub const EXTRACTED_WAV_NAME: &str = "audio.wav";

/// Error type for workspace operations
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// IO error creating or removing the directory tree.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// No accompaniment/music track could be located.
    #[error("no accompaniment/music track found in {0}")]
    MusicNotFound(PathBuf),
}

/// Handle to one job's directory tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Workspace handle for `job_id` under `jobs_root`. Does not touch disk.
    pub fn new(jobs_root: &Path, job_id: &str) -> Self {
        Self {
            root: jobs_root.join(job_id),
        }
    }

    /// Root directory of this workspace.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the directory tree. Idempotent.
    pub fn create(&self) -> Result<(), WorkspaceError> {
        for subdir in JOB_SUBDIRS {
            fs::create_dir_all(self.root.join(subdir))?;
        }
        Ok(())
    }

    /// Remove the whole directory tree. Succeeds when already gone.
    pub fn destroy(&self) -> Result<(), WorkspaceError> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root)?;
        }
        Ok(())
    }

    /// Path of the persisted job document.
    pub fn job_file(&self) -> PathBuf {
        self.root.join("job.json")
    }

    pub fn input_dir(&self) -> PathBuf {
        self.root.join("input")
    }

    pub fn vocals_dir(&self) -> PathBuf {
        self.root.join("vocals")
    }

    pub fn music_dir(&self) -> PathBuf {
        self.root.join("music")
    }

    pub fn segments_dir(&self) -> PathBuf {
        self.root.join("segments")
    }

    pub fn references_dir(&self) -> PathBuf {
        self.root.join("references")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join("output")
    }

    /// Canonical mono WAV produced by the extraction stage.
    pub fn extracted_wav(&self) -> PathBuf {
        self.input_dir().join(EXTRACTED_WAV_NAME)
    }

    /// Locate the isolated background track.
    ///
    /// Separators name their stems inconsistently, so this scans `music/`,
    /// `vocals/`, and the workspace root for a file whose name contains
    /// `accompaniment`, `no_vocals`, or `music`, then falls back to any
    /// `.wav` under `music/`.
    pub fn resolve_music(&self) -> Result<PathBuf, WorkspaceError> {
        let candidates = [self.music_dir(), self.vocals_dir(), self.root.clone()];

        for parent in &candidates {
            if let Some(found) = Self::scan_for_music(parent)? {
                return Ok(found);
            }
        }

        // Fallback: any WAV inside music/.
        let music_dir = self.music_dir();
        if music_dir.exists() {
            for entry in fs::read_dir(&music_dir)? {
                let path = entry?.path();
                let is_wav = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|e| e.eq_ignore_ascii_case("wav"))
                    .unwrap_or(false);
                if path.is_file() && is_wav {
                    return Ok(path);
                }
            }
        }

        Err(WorkspaceError::MusicNotFound(self.root.clone()))
    }

    fn scan_for_music(parent: &Path) -> Result<Option<PathBuf>, WorkspaceError> {
        if !parent.exists() {
            return Ok(None);
        }
        for entry in fs::read_dir(parent)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("")
                .to_lowercase();
            if name.contains("accompaniment") || name.contains("no_vocals") || name.contains("music")
            {
                return Ok(Some(path));
            }
        }
        Ok(None)
    }

    /// Return the original upload inside `input/`, i.e. the first file whose
    /// name is not the canonical `audio.wav`. `None` for text-entry jobs.
    pub fn resolve_original(&self) -> Result<Option<PathBuf>, WorkspaceError> {
        let input_dir = self.input_dir();
        if !input_dir.exists() {
            return Ok(None);
        }
        for entry in fs::read_dir(&input_dir)? {
            let path = entry?.path();
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if path.is_file() && name != EXTRACTED_WAV_NAME {
                return Ok(Some(path));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_workspace(dir: &TempDir) -> Workspace {
        let ws = Workspace::new(dir.path(), "abc123def456");
        ws.create().expect("workspace should create");
        ws
    }

    #[test]
    fn test_create_makes_all_subdirs() {
        let dir = TempDir::new().unwrap();
        let ws = make_workspace(&dir);

        for subdir in JOB_SUBDIRS {
            assert!(ws.root().join(subdir).is_dir(), "missing {}", subdir);
        }
    }

    #[test]
    fn test_create_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let ws = make_workspace(&dir);
        ws.create().expect("second create should succeed");
    }

    #[test]
    fn test_destroy_removes_tree() {
        let dir = TempDir::new().unwrap();
        let ws = make_workspace(&dir);
        assert!(ws.root().exists());

        ws.destroy().expect("destroy should succeed");
        assert!(!ws.root().exists());

        // Destroying an already-removed workspace is fine.
        ws.destroy().expect("destroy should be idempotent");
    }

    #[test]
    fn test_resolve_music_prefers_named_stems() {
        let dir = TempDir::new().unwrap();
        let ws = make_workspace(&dir);

        std::fs::write(ws.music_dir().join("accompaniment.wav"), b"x").unwrap();
        std::fs::write(ws.music_dir().join("other.wav"), b"x").unwrap();

        let found = ws.resolve_music().expect("should find music");
        assert_eq!(found, ws.music_dir().join("accompaniment.wav"));
    }

    #[test]
    fn test_resolve_music_scans_vocals_and_root() {
        let dir = TempDir::new().unwrap();
        let ws = make_workspace(&dir);

        std::fs::write(ws.root().join("no_vocals.wav"), b"x").unwrap();

        let found = ws.resolve_music().expect("should find music in root");
        assert_eq!(found, ws.root().join("no_vocals.wav"));
    }

    #[test]
    fn test_resolve_music_falls_back_to_any_wav() {
        let dir = TempDir::new().unwrap();
        let ws = make_workspace(&dir);

        std::fs::write(ws.music_dir().join("stem_03.wav"), b"x").unwrap();

        let found = ws.resolve_music().expect("should fall back to any wav");
        assert_eq!(found, ws.music_dir().join("stem_03.wav"));
    }

    #[test]
    fn test_resolve_music_fails_when_empty() {
        let dir = TempDir::new().unwrap();
        let ws = make_workspace(&dir);

        let err = ws.resolve_music().unwrap_err();
        assert!(matches!(err, WorkspaceError::MusicNotFound(_)));
    }

    #[test]
    fn test_resolve_original_skips_extracted_wav() {
        let dir = TempDir::new().unwrap();
        let ws = make_workspace(&dir);

        std::fs::write(ws.extracted_wav(), b"x").unwrap();
        std::fs::write(ws.input_dir().join("interview.mp4"), b"x").unwrap();

        let found = ws.resolve_original().unwrap();
        assert_eq!(found, Some(ws.input_dir().join("interview.mp4")));
    }

    #[test]
    fn test_resolve_original_none_for_text_jobs() {
        let dir = TempDir::new().unwrap();
        let ws = make_workspace(&dir);

        assert_eq!(ws.resolve_original().unwrap(), None);
    }
}
