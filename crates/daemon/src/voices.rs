//! Voice profile management.
//!
//! Saved reference voices live outside any job, under
//! `voices/<voice_id>/profile.json` plus the reference audio file, so they
//! can be reused across jobs and standalone TTS sessions. Same
//! write-through discipline as the job store.

use crate::jobs::new_job_id;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Error type for voice profile operations
#[derive(Debug, Error)]
pub enum VoiceError {
    /// No voice with the given id exists.
    #[error("voice not found: {0}")]
    NotFound(String),

    /// IO error accessing the voices root.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// A saved reference voice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceProfile {
    /// Unique 12-character hex identifier.
    pub voice_id: String,
    /// Display name.
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Filename of the reference audio inside the voice directory.
    #[serde(default)]
    pub audio_filename: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub sample_rate: u32,
    #[serde(default)]
    pub duration: f64,
}

impl VoiceProfile {
    fn new(name: &str, description: &str) -> Self {
        Self {
            voice_id: new_job_id(),
            name: name.to_string(),
            description: description.to_string(),
            audio_filename: String::new(),
            created_at: Utc::now(),
            sample_rate: 0,
            duration: 0.0,
        }
    }
}

/// In-memory map of voice profiles backed by per-voice `profile.json` files.
pub struct VoiceManager {
    voices: Mutex<HashMap<String, VoiceProfile>>,
    voices_root: PathBuf,
}

impl VoiceManager {
    /// Open a manager rooted at `voices_root`, rehydrating persisted
    /// profiles. Malformed documents are logged and skipped.
    pub fn open(voices_root: PathBuf) -> Result<Self, VoiceError> {
        fs::create_dir_all(&voices_root)?;

        let mut voices = HashMap::new();
        for entry in fs::read_dir(&voices_root)? {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }
            let voice_id = entry.file_name().to_string_lossy().to_string();
            match load_profile(&voices_root, &voice_id) {
                Ok(Some(profile)) => {
                    voices.insert(profile.voice_id.clone(), profile);
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(%voice_id, %err, "failed to load voice profile, skipping");
                }
            }
        }

        if !voices.is_empty() {
            info!(count = voices.len(), "rehydrated voice profiles");
        }

        Ok(Self {
            voices: Mutex::new(voices),
            voices_root,
        })
    }

    /// Create a new profile and its directory.
    pub async fn create(&self, name: &str, description: &str) -> Result<VoiceProfile, VoiceError> {
        let profile = VoiceProfile::new(name, description);
        fs::create_dir_all(self.voice_dir(&profile.voice_id))?;

        let mut voices = self.voices.lock().await;
        persist_profile(&self.voices_root, &profile);
        voices.insert(profile.voice_id.clone(), profile.clone());

        info!(voice_id = %profile.voice_id, name, "voice profile created");
        Ok(profile)
    }

    /// Return the profile with `voice_id`, falling back to disk.
    pub async fn get(&self, voice_id: &str) -> Option<VoiceProfile> {
        let mut voices = self.voices.lock().await;
        if let Some(profile) = voices.get(voice_id) {
            return Some(profile.clone());
        }
        match load_profile(&self.voices_root, voice_id) {
            Ok(Some(profile)) => {
                voices.insert(profile.voice_id.clone(), profile.clone());
                Some(profile)
            }
            _ => None,
        }
    }

    /// Apply `mutate` to the profile and persist.
    pub async fn update<F>(&self, voice_id: &str, mutate: F) -> Result<VoiceProfile, VoiceError>
    where
        F: FnOnce(&mut VoiceProfile),
    {
        let mut voices = self.voices.lock().await;
        let profile = voices
            .get_mut(voice_id)
            .ok_or_else(|| VoiceError::NotFound(voice_id.to_string()))?;
        mutate(profile);

        let updated = profile.clone();
        persist_profile(&self.voices_root, &updated);
        Ok(updated)
    }

    /// All known profiles, newest first.
    pub async fn list(&self) -> Vec<VoiceProfile> {
        let voices = self.voices.lock().await;
        let mut all: Vec<VoiceProfile> = voices.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all
    }

    /// Delete a profile and its directory. Returns `true` when it existed.
    pub async fn delete(&self, voice_id: &str) -> bool {
        let mut voices = self.voices.lock().await;
        let in_memory = voices.remove(voice_id).is_some();

        let dir = self.voice_dir(voice_id);
        let on_disk = dir.exists();
        if on_disk {
            if let Err(err) = fs::remove_dir_all(&dir) {
                error!(voice_id, %err, "failed to remove voice directory");
            }
        }

        if in_memory || on_disk {
            info!(voice_id, "voice profile deleted");
        }
        in_memory || on_disk
    }

    /// Directory holding one voice's files.
    pub fn voice_dir(&self, voice_id: &str) -> PathBuf {
        self.voices_root.join(voice_id)
    }

    /// Full path of the voice's reference audio, when present on disk.
    pub async fn audio_path(&self, voice_id: &str) -> Option<PathBuf> {
        let profile = self.get(voice_id).await?;
        if profile.audio_filename.is_empty() {
            return None;
        }
        let path = self.voice_dir(voice_id).join(&profile.audio_filename);
        path.exists().then_some(path)
    }
}

fn persist_profile(voices_root: &Path, profile: &VoiceProfile) {
    let dir = voices_root.join(&profile.voice_id);
    if let Err(err) = fs::create_dir_all(&dir) {
        error!(voice_id = %profile.voice_id, %err, "failed to create voice directory");
        return;
    }
    let json = match serde_json::to_string_pretty(profile) {
        Ok(json) => json,
        Err(err) => {
            error!(voice_id = %profile.voice_id, %err, "failed to serialize voice profile");
            return;
        }
    };
    if let Err(err) = fs::write(dir.join("profile.json"), json) {
        error!(voice_id = %profile.voice_id, %err, "failed to persist profile.json");
    }
}

fn load_profile(voices_root: &Path, voice_id: &str) -> Result<Option<VoiceProfile>, io::Error> {
    let profile_file = voices_root.join(voice_id).join("profile.json");
    if !profile_file.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(&profile_file)?;
    let profile = serde_json::from_str(&raw)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(Some(profile))
}
