//! Music generation worker.

use super::WorkerError;
use crate::media::run_tool;
use std::path::PathBuf;
use std::process::Command;
use tracing::info;

/// Parameters for one music-generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct MusicRequest {
    /// Text description of the desired music.
    pub prompt: String,
    /// Length of generated audio in seconds.
    pub duration: f64,
    /// Destination WAV path.
    pub output: PathBuf,
    /// Optional genre/style preset.
    pub style: Option<String>,
    /// Optional reference audio to condition on.
    pub reference: Option<PathBuf>,
    /// Model identifier.
    pub model: String,
}

/// Generates music from a text prompt.
pub trait MusicGenerator: Send + Sync {
    /// Generate per `request`, returning the written WAV path.
    fn generate(&self, request: &MusicRequest) -> Result<PathBuf, WorkerError>;
}

/// Music generator backed by an external command.
///
/// Invocation contract:
/// `<command> --prompt P --duration D --output O --model M [--style S]
/// [--reference R]`.
pub struct CommandMusicGenerator {
    command: String,
    default_model: String,
}

impl CommandMusicGenerator {
    pub fn new(command: &str, default_model: &str) -> Self {
        Self {
            command: command.to_string(),
            default_model: default_model.to_string(),
        }
    }

    /// Build the generation invocation.
    pub fn build_command(&self, request: &MusicRequest) -> Command {
        let mut cmd = Command::new(&self.command);
        cmd.arg("--prompt").arg(&request.prompt);
        cmd.arg("--duration").arg(format!("{:.1}", request.duration));
        cmd.arg("--output").arg(&request.output);

        let model = if request.model.is_empty() {
            &self.default_model
        } else {
            &request.model
        };
        cmd.arg("--model").arg(model);

        if let Some(style) = &request.style {
            cmd.arg("--style").arg(style);
        }
        if let Some(reference) = &request.reference {
            cmd.arg("--reference").arg(reference);
        }
        cmd
    }
}

impl MusicGenerator for CommandMusicGenerator {
    fn generate(&self, request: &MusicRequest) -> Result<PathBuf, WorkerError> {
        if let Some(parent) = request.output.parent() {
            std::fs::create_dir_all(parent)?;
        }

        info!(
            prompt = %request.prompt,
            duration = request.duration,
            output = %request.output.display(),
            "generating music"
        );
        run_tool(&mut self.build_command(request), "music generator")?;

        if !request.output.exists() {
            return Err(WorkerError::MissingOutput(request.output.clone()));
        }
        Ok(request.output.clone())
    }
}
