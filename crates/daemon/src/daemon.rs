//! Daemon assembly and entry point.
//!
//! Wires the configuration, job store, voice manager, workers, and
//! orchestrator together and runs the HTTP API server.

use crate::orchestrator::Orchestrator;
use crate::server::{run_api_server, AppState, ServerError};
use crate::startup::{run_startup_checks, StartupError};
use crate::store::{JobStore, StoreError};
use crate::voices::{VoiceManager, VoiceError};
use crate::workers::Workers;
use revoice_daemon_config::Config;
use std::fs;
use std::io;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Error type for daemon operations
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Startup check failed
    #[error("startup check failed: {0}")]
    Startup(#[from] StartupError),

    /// Job store could not be opened
    #[error("job store error: {0}")]
    Store(#[from] StoreError),

    /// Voice manager could not be opened
    #[error("voice manager error: {0}")]
    Voices(#[from] VoiceError),

    /// Server error
    #[error("server error: {0}")]
    Server(#[from] ServerError),

    /// IO error (e.g. storage directory creation)
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Daemon state containing all runtime components.
pub struct Daemon {
    pub config: Config,
    pub store: Arc<JobStore>,
    pub voices: Arc<VoiceManager>,
    pub orchestrator: Arc<Orchestrator>,
}

impl std::fmt::Debug for Daemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Daemon").field("config", &self.config).finish()
    }
}

impl Daemon {
    /// Initialize the daemon:
    /// 1. Run startup checks (ffmpeg, ffprobe).
    /// 2. Create the storage tree.
    /// 3. Open the job store (rehydrates persisted jobs) and voice manager.
    /// 4. Wire command-backed workers and the orchestrator.
    pub fn new(config: Config) -> Result<Self, DaemonError> {
        run_startup_checks(&config)?;
        Self::new_without_checks(config)
    }

    /// Initialize without startup checks. Useful for tests where the
    /// external tools are absent.
    pub fn new_without_checks(config: Config) -> Result<Self, DaemonError> {
        fs::create_dir_all(&config.storage.root)?;

        let store = Arc::new(JobStore::open(config.storage.jobs_dir())?);
        let voices = Arc::new(VoiceManager::open(config.storage.voices_dir())?);
        let workers = Workers::from_config(&config);
        let orchestrator = Arc::new(Orchestrator::new(
            Arc::clone(&store),
            workers,
            config.clone(),
        ));

        info!(
            storage = %config.storage.root.display(),
            sample_rate = config.audio.sample_rate,
            "daemon initialized"
        );

        Ok(Self {
            config,
            store,
            voices,
            orchestrator,
        })
    }

    /// Run the HTTP API server until it exits.
    pub async fn run(self) -> Result<(), DaemonError> {
        let state = AppState {
            store: self.store,
            voices: self.voices,
            orchestrator: self.orchestrator,
            config: self.config,
        };
        run_api_server(state).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::InputKind;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.storage.root = dir.path().join("storage");
        config
    }

    #[tokio::test]
    async fn test_daemon_initializes_storage_tree() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);

        let daemon = Daemon::new_without_checks(config.clone()).unwrap();

        assert!(config.storage.jobs_dir().is_dir());
        assert!(config.storage.voices_dir().is_dir());
        assert_eq!(daemon.config.storage.root, config.storage.root);
    }

    #[tokio::test]
    async fn test_daemon_recovers_jobs_across_instances() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);

        let job = {
            let daemon = Daemon::new_without_checks(config.clone()).unwrap();
            daemon
                .store
                .create(InputKind::Audio, "talk.wav")
                .await
                .unwrap()
        };

        let daemon = Daemon::new_without_checks(config).unwrap();
        let recovered = daemon.store.get(&job.job_id).await.unwrap();
        assert_eq!(recovered.job_id, job.job_id);
    }

    #[test]
    fn test_daemon_with_checks_fails_without_tools() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(&dir);
        config.tools.ffmpeg_path = "/nonexistent/ffmpeg-binary".to_string();

        let err = Daemon::new(config).unwrap_err();
        assert!(matches!(err, DaemonError::Startup(_)));
    }
}
