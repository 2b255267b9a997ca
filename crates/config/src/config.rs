//! Core configuration structures and loading logic
//!
//! Every value comes from an environment variable with a built-in default,
//! so a bare `revoiced` invocation works out of the box. Configuration is
//! read once at process start and is immutable afterwards.

use std::env;
use std::path::PathBuf;

/// HTTP server bind configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Bind address for the HTTP API (REVOICE_HOST)
    pub host: String,
    /// Bind port for the HTTP API (REVOICE_PORT)
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// Persistent storage layout configuration
#[derive(Debug, Clone, PartialEq)]
pub struct StorageConfig {
    /// Root directory for all persistent state (STORAGE_DIR)
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("storage"),
        }
    }
}

impl StorageConfig {
    /// Directory holding per-job workspaces.
    pub fn jobs_dir(&self) -> PathBuf {
        self.root.join("jobs")
    }

    /// Directory holding saved voice profiles.
    pub fn voices_dir(&self) -> PathBuf {
        self.root.join("voices")
    }
}

/// Audio processing configuration
#[derive(Debug, Clone, PartialEq)]
pub struct AudioConfig {
    /// Common sample rate in Hz for all intermediate audio (SAMPLE_RATE)
    pub sample_rate: u32,
}

fn default_sample_rate() -> u32 {
    24000
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
        }
    }
}

/// Paths and command names for external tools and workers
#[derive(Debug, Clone, PartialEq)]
pub struct ToolsConfig {
    /// Path to the ffmpeg binary (FFMPEG_PATH)
    pub ffmpeg_path: String,
    /// Path to the ffprobe binary (FFPROBE_PATH)
    pub ffprobe_path: String,
    /// Source-separation worker command (SEPARATOR_CMD)
    pub separator_cmd: String,
    /// Speaker-diarization worker command (DIARIZER_CMD)
    pub diarizer_cmd: String,
    /// Transcription worker command (TRANSCRIBER_CMD)
    pub transcriber_cmd: String,
    /// Text-to-speech worker command (TTS_CMD)
    pub tts_cmd: String,
    /// Music-generation worker command (MUSIC_CMD)
    pub music_cmd: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            separator_cmd: "revoice-separate".to_string(),
            diarizer_cmd: "revoice-diarize".to_string(),
            transcriber_cmd: "revoice-transcribe".to_string(),
            tts_cmd: "revoice-tts".to_string(),
            music_cmd: "revoice-musicgen".to_string(),
        }
    }
}

/// Model identifiers passed through to the worker command lines
#[derive(Debug, Clone, PartialEq)]
pub struct ModelsConfig {
    /// Default TTS model identifier (TTS_MODEL)
    pub tts_model: String,
    /// Default music-generation model identifier (MUSIC_MODEL)
    pub music_model: String,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            tts_model: "default".to_string(),
            music_model: "default".to_string(),
        }
    }
}

/// Request validation limits
#[derive(Debug, Clone, PartialEq)]
pub struct LimitsConfig {
    /// Maximum upload size in megabytes (MAX_FILE_SIZE_MB, default 500)
    pub max_upload_mb: u64,
    /// Minimum expected speaker count for diarization (MIN_SPEAKERS)
    pub min_speakers: u32,
    /// Maximum expected speaker count for diarization (MAX_SPEAKERS)
    pub max_speakers: u32,
}

fn default_max_upload_mb() -> u64 {
    500
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_upload_mb: default_max_upload_mb(),
            min_speakers: 1,
            max_speakers: 10,
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub audio: AudioConfig,
    pub tools: ToolsConfig,
    pub models: ModelsConfig,
    pub limits: LimitsConfig,
}

/// Read an environment variable, falling back to `current` when the variable
/// is unset or fails to parse.
fn env_parsed<T: std::str::FromStr>(name: &str, current: T) -> T {
    match env::var(name) {
        Ok(val) => val.parse().unwrap_or(current),
        Err(_) => current,
    }
}

fn env_string(name: &str, current: String) -> String {
    env::var(name).unwrap_or(current)
}

impl Config {
    /// Build the configuration from environment variables, starting from the
    /// built-in defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Unset variables keep the current value; values that fail to parse are
    /// ignored. Recognised variables:
    /// - REVOICE_HOST, REVOICE_PORT
    /// - STORAGE_DIR
    /// - SAMPLE_RATE
    /// - FFMPEG_PATH, FFPROBE_PATH
    /// - SEPARATOR_CMD, DIARIZER_CMD, TRANSCRIBER_CMD, TTS_CMD, MUSIC_CMD
    /// - TTS_MODEL, MUSIC_MODEL
    /// - MAX_FILE_SIZE_MB, MIN_SPEAKERS, MAX_SPEAKERS
    pub fn apply_env_overrides(&mut self) {
        self.server.host = env_string("REVOICE_HOST", self.server.host.clone());
        self.server.port = env_parsed("REVOICE_PORT", self.server.port);

        if let Ok(val) = env::var("STORAGE_DIR") {
            if !val.is_empty() {
                self.storage.root = PathBuf::from(val);
            }
        }

        self.audio.sample_rate = env_parsed("SAMPLE_RATE", self.audio.sample_rate);

        self.tools.ffmpeg_path = env_string("FFMPEG_PATH", self.tools.ffmpeg_path.clone());
        self.tools.ffprobe_path = env_string("FFPROBE_PATH", self.tools.ffprobe_path.clone());
        self.tools.separator_cmd = env_string("SEPARATOR_CMD", self.tools.separator_cmd.clone());
        self.tools.diarizer_cmd = env_string("DIARIZER_CMD", self.tools.diarizer_cmd.clone());
        self.tools.transcriber_cmd =
            env_string("TRANSCRIBER_CMD", self.tools.transcriber_cmd.clone());
        self.tools.tts_cmd = env_string("TTS_CMD", self.tools.tts_cmd.clone());
        self.tools.music_cmd = env_string("MUSIC_CMD", self.tools.music_cmd.clone());

        self.models.tts_model = env_string("TTS_MODEL", self.models.tts_model.clone());
        self.models.music_model = env_string("MUSIC_MODEL", self.models.music_model.clone());

        self.limits.max_upload_mb = env_parsed("MAX_FILE_SIZE_MB", self.limits.max_upload_mb);
        self.limits.min_speakers = env_parsed("MIN_SPEAKERS", self.limits.min_speakers);
        self.limits.max_speakers = env_parsed("MAX_SPEAKERS", self.limits.max_speakers);
    }

    /// Maximum upload size in bytes.
    pub fn max_upload_bytes(&self) -> u64 {
        self.limits.max_upload_mb * 1024 * 1024
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Mutex;

    // Mutex to ensure env var tests don't interfere with each other
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Helper to clear all config-related env vars
    fn clear_env_vars() {
        for name in [
            "REVOICE_HOST",
            "REVOICE_PORT",
            "STORAGE_DIR",
            "SAMPLE_RATE",
            "FFMPEG_PATH",
            "FFPROBE_PATH",
            "SEPARATOR_CMD",
            "DIARIZER_CMD",
            "TRANSCRIBER_CMD",
            "TTS_CMD",
            "MUSIC_CMD",
            "TTS_MODEL",
            "MUSIC_MODEL",
            "MAX_FILE_SIZE_MB",
            "MIN_SPEAKERS",
            "MAX_SPEAKERS",
        ] {
            env::remove_var(name);
        }
    }

    #[test]
    fn test_defaults() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();

        let config = Config::from_env();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.storage.root, PathBuf::from("storage"));
        assert_eq!(config.audio.sample_rate, 24000);
        assert_eq!(config.tools.ffmpeg_path, "ffmpeg");
        assert_eq!(config.tools.ffprobe_path, "ffprobe");
        assert_eq!(config.limits.max_upload_mb, 500);
        assert_eq!(config.limits.min_speakers, 1);
        assert_eq!(config.limits.max_speakers, 10);
    }

    #[test]
    fn test_derived_storage_paths() {
        let config = Config {
            storage: StorageConfig {
                root: PathBuf::from("/var/lib/revoice"),
            },
            ..Config::default()
        };

        assert_eq!(config.storage.jobs_dir(), PathBuf::from("/var/lib/revoice/jobs"));
        assert_eq!(
            config.storage.voices_dir(),
            PathBuf::from("/var/lib/revoice/voices")
        );
    }

    #[test]
    fn test_max_upload_bytes() {
        let mut config = Config::default();
        config.limits.max_upload_mb = 2;
        assert_eq!(config.max_upload_bytes(), 2 * 1024 * 1024);
    }

    #[test]
    fn test_invalid_numeric_env_keeps_default() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();

        env::set_var("REVOICE_PORT", "not-a-number");
        env::set_var("SAMPLE_RATE", "");
        let config = Config::from_env();
        clear_env_vars();

        assert_eq!(config.server.port, 8000);
        assert_eq!(config.audio.sample_rate, 24000);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_env_overrides_port(override_port in 1u16..u16::MAX) {
            let _guard = ENV_MUTEX.lock().unwrap();
            clear_env_vars();

            env::set_var("REVOICE_PORT", override_port.to_string());
            let config = Config::from_env();
            clear_env_vars();

            prop_assert_eq!(config.server.port, override_port);
        }

        #[test]
        fn prop_env_overrides_sample_rate(rate in 8000u32..192_000) {
            let _guard = ENV_MUTEX.lock().unwrap();
            clear_env_vars();

            env::set_var("SAMPLE_RATE", rate.to_string());
            let config = Config::from_env();
            clear_env_vars();

            prop_assert_eq!(config.audio.sample_rate, rate);
        }

        #[test]
        fn prop_env_overrides_speaker_bounds(
            min_speakers in 1u32..8,
            max_speakers in 8u32..32,
        ) {
            let _guard = ENV_MUTEX.lock().unwrap();
            clear_env_vars();

            env::set_var("MIN_SPEAKERS", min_speakers.to_string());
            env::set_var("MAX_SPEAKERS", max_speakers.to_string());
            let config = Config::from_env();
            clear_env_vars();

            prop_assert_eq!(config.limits.min_speakers, min_speakers);
            prop_assert_eq!(config.limits.max_speakers, max_speakers);
        }

        #[test]
        fn prop_env_overrides_tool_paths(
            ffmpeg in "[a-z/_-]{1,30}",
            tts in "[a-z/_-]{1,30}",
        ) {
            let _guard = ENV_MUTEX.lock().unwrap();
            clear_env_vars();

            env::set_var("FFMPEG_PATH", &ffmpeg);
            env::set_var("TTS_CMD", &tts);
            let config = Config::from_env();
            clear_env_vars();

            prop_assert_eq!(config.tools.ffmpeg_path, ffmpeg);
            prop_assert_eq!(config.tools.tts_cmd, tts);
        }

        #[test]
        fn prop_env_overrides_storage_dir(dir in "[a-z][a-z0-9/_-]{0,40}") {
            let _guard = ENV_MUTEX.lock().unwrap();
            clear_env_vars();

            env::set_var("STORAGE_DIR", &dir);
            let config = Config::from_env();
            clear_env_vars();

            prop_assert_eq!(config.storage.root, PathBuf::from(dir));
        }
    }
}
