//! Text-to-speech worker.
//!
//! Synthesizes speech from text, optionally conditioned on a reference
//! voice. When a target duration is requested the engine applies its own
//! internal time-stretch to land within 100 ms of it.

use super::WorkerError;
use crate::media::run_tool;
use std::path::PathBuf;
use std::process::Command;
use tracing::info;

/// Parameters for one synthesis call.
#[derive(Debug, Clone, PartialEq)]
pub struct TtsRequest {
    /// Text to synthesize.
    pub text: String,
    /// Destination WAV path.
    pub output: PathBuf,
    /// Optional reference audio for voice cloning.
    pub reference: Option<PathBuf>,
    /// Optional language code.
    pub language: Option<String>,
    /// Optional transcript of the reference audio.
    pub ref_text: Option<String>,
    /// Desired output duration in seconds, honored to within 100 ms.
    pub target_duration: Option<f64>,
    /// Playback speed multiplier.
    pub speed: Option<f64>,
    /// Pitch shift multiplier.
    pub pitch: Option<f64>,
    /// Model identifier.
    pub model: String,
}

impl TtsRequest {
    pub fn new(text: &str, output: PathBuf, model: &str) -> Self {
        Self {
            text: text.to_string(),
            output,
            reference: None,
            language: None,
            ref_text: None,
            target_duration: None,
            speed: None,
            pitch: None,
            model: model.to_string(),
        }
    }
}

/// Synthesizes speech from text.
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize per `request`, returning the written WAV path.
    fn synthesize(&self, request: &TtsRequest) -> Result<PathBuf, WorkerError>;
}

/// Synthesizer backed by an external command.
///
/// Invocation contract:
/// `<command> --text T --output O --model M [--reference R] [--language L]
/// [--ref-text RT] [--target-duration D] [--speed S] [--pitch P]`.
pub struct CommandSynthesizer {
    command: String,
    default_model: String,
}

impl CommandSynthesizer {
    pub fn new(command: &str, default_model: &str) -> Self {
        Self {
            command: command.to_string(),
            default_model: default_model.to_string(),
        }
    }

    /// Build the synthesis invocation.
    pub fn build_command(&self, request: &TtsRequest) -> Command {
        let mut cmd = Command::new(&self.command);
        cmd.arg("--text").arg(&request.text);
        cmd.arg("--output").arg(&request.output);

        let model = if request.model.is_empty() {
            &self.default_model
        } else {
            &request.model
        };
        cmd.arg("--model").arg(model);

        if let Some(reference) = &request.reference {
            cmd.arg("--reference").arg(reference);
        }
        if let Some(language) = &request.language {
            cmd.arg("--language").arg(language);
        }
        if let Some(ref_text) = &request.ref_text {
            cmd.arg("--ref-text").arg(ref_text);
        }
        if let Some(duration) = request.target_duration {
            cmd.arg("--target-duration").arg(format!("{:.3}", duration));
        }
        if let Some(speed) = request.speed {
            cmd.arg("--speed").arg(format!("{:.2}", speed));
        }
        if let Some(pitch) = request.pitch {
            cmd.arg("--pitch").arg(format!("{:.2}", pitch));
        }
        cmd
    }
}

impl SpeechSynthesizer for CommandSynthesizer {
    fn synthesize(&self, request: &TtsRequest) -> Result<PathBuf, WorkerError> {
        if let Some(parent) = request.output.parent() {
            std::fs::create_dir_all(parent)?;
        }

        info!(
            chars = request.text.len(),
            output = %request.output.display(),
            "synthesizing speech"
        );
        run_tool(&mut self.build_command(request), "tts")?;

        if !request.output.exists() {
            return Err(WorkerError::MissingOutput(request.output.clone()));
        }
        Ok(request.output.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get_args(cmd: &Command) -> Vec<String> {
        cmd.get_args()
            .filter_map(|a| a.to_str().map(String::from))
            .collect()
    }

    fn has_pair(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2)
            .any(|pair| pair[0] == flag && pair[1] == value)
    }

    #[test]
    fn test_minimal_command() {
        let synth = CommandSynthesizer::new("revoice-tts", "default");
        let request = TtsRequest::new("hello world", PathBuf::from("out.wav"), "default");
        let cmd = synth.build_command(&request);
        let args = get_args(&cmd);

        assert_eq!(cmd.get_program(), "revoice-tts");
        assert!(has_pair(&args, "--text", "hello world"));
        assert!(has_pair(&args, "--output", "out.wav"));
        assert!(has_pair(&args, "--model", "default"));
        assert!(!args.contains(&"--reference".to_string()));
        assert!(!args.contains(&"--target-duration".to_string()));
    }

    #[test]
    fn test_full_command() {
        let synth = CommandSynthesizer::new("revoice-tts", "default");
        let request = TtsRequest {
            text: "bonjour".to_string(),
            output: PathBuf::from("seg.wav"),
            reference: Some(PathBuf::from("ref.wav")),
            language: Some("fr".to_string()),
            ref_text: Some("salut".to_string()),
            target_duration: Some(2.5),
            speed: Some(1.25),
            pitch: Some(0.9),
            model: "big-model".to_string(),
        };
        let args = get_args(&synth.build_command(&request));

        assert!(has_pair(&args, "--reference", "ref.wav"));
        assert!(has_pair(&args, "--language", "fr"));
        assert!(has_pair(&args, "--ref-text", "salut"));
        assert!(has_pair(&args, "--target-duration", "2.500"));
        assert!(has_pair(&args, "--speed", "1.25"));
        assert!(has_pair(&args, "--pitch", "0.90"));
        assert!(has_pair(&args, "--model", "big-model"));
    }

    #[test]
    fn test_empty_model_falls_back_to_default() {
        let synth = CommandSynthesizer::new("revoice-tts", "fallback-model");
        let request = TtsRequest::new("hi", PathBuf::from("out.wav"), "");
        let args = get_args(&synth.build_command(&request));

        assert!(has_pair(&args, "--model", "fallback-model"));
    }
}
