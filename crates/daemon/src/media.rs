//! FFmpeg/FFprobe integration: demux, transcode, probe, mux, MP3 export.
//!
//! Every operation is a plain subprocess invocation; builders are separated
//! from runners so command construction stays testable without the tools
//! installed.

use std::path::Path;
use std::process::Command;
use thiserror::Error;
use tracing::info;

/// File extensions treated as video containers.
pub const VIDEO_EXTENSIONS: [&str; 6] = ["mp4", "mkv", "avi", "mov", "webm", "flv"];

/// File extensions accepted by the upload endpoint.
pub const ALLOWED_UPLOAD_EXTENSIONS: [&str; 8] =
    ["mp4", "mkv", "avi", "mov", "webm", "flv", "wav", "mp3"];

/// Error type for external tool invocations
#[derive(Debug, Error)]
pub enum ToolError {
    /// The tool exited with a non-zero status.
    #[error("{tool} failed with exit code {code}: {stderr}")]
    Failed {
        tool: String,
        code: i32,
        stderr: String,
    },

    /// The tool was terminated by a signal.
    #[error("{0} was terminated by signal")]
    Terminated(String),

    /// The tool could not be spawned.
    #[error("failed to run {tool}: {source}")]
    Spawn {
        tool: String,
        source: std::io::Error,
    },

    /// Tool output could not be parsed.
    #[error("failed to parse {tool} output: {message}")]
    Parse { tool: String, message: String },

    /// IO error around the invocation.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Check whether a path has a recognised video extension (case-insensitive).
pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let lower = e.to_lowercase();
            VIDEO_EXTENSIONS.contains(&lower.as_str())
        })
        .unwrap_or(false)
}

/// Check whether a filename is acceptable for upload.
pub fn is_allowed_upload(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let lower = e.to_lowercase();
            ALLOWED_UPLOAD_EXTENSIONS.contains(&lower.as_str())
        })
        .unwrap_or(false)
}

/// Build the ffmpeg command that extracts/transcodes any media input to
/// mono 16-bit PCM WAV at `sample_rate`. Works for both video demuxing and
/// audio conversion (`-vn` drops any video stream).
pub fn build_extract_wav_command(
    ffmpeg_path: &str,
    input: &Path,
    output: &Path,
    sample_rate: u32,
) -> Command {
    let mut cmd = Command::new(ffmpeg_path);
    cmd.arg("-y");
    cmd.arg("-i").arg(input);
    cmd.arg("-vn");
    cmd.arg("-acodec").arg("pcm_s16le");
    cmd.arg("-ar").arg(sample_rate.to_string());
    cmd.arg("-ac").arg("1");
    cmd.arg(output);
    cmd
}

/// Build the ffprobe command emitting stream/format metadata as JSON.
pub fn build_probe_command(ffprobe_path: &str, input: &Path) -> Command {
    let mut cmd = Command::new(ffprobe_path);
    cmd.args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"]);
    cmd.arg(input);
    cmd
}

/// Build the ffmpeg command that remuxes `video_in` with `audio_in`,
/// copying the video stream byte-for-byte.
pub fn build_mux_command(
    ffmpeg_path: &str,
    video_in: &Path,
    audio_in: &Path,
    output: &Path,
) -> Command {
    let mut cmd = Command::new(ffmpeg_path);
    cmd.arg("-y");
    cmd.arg("-i").arg(video_in);
    cmd.arg("-i").arg(audio_in);
    cmd.arg("-c:v").arg("copy");
    cmd.arg("-map").arg("0:v:0");
    cmd.arg("-map").arg("1:a:0");
    cmd.arg("-shortest");
    cmd.arg(output);
    cmd
}

/// Build the ffmpeg command encoding a WAV to MP3 at VBR quality 2.
pub fn build_mp3_command(ffmpeg_path: &str, wav_in: &Path, mp3_out: &Path) -> Command {
    let mut cmd = Command::new(ffmpeg_path);
    cmd.arg("-y");
    cmd.arg("-i").arg(wav_in);
    cmd.arg("-codec:a").arg("libmp3lame");
    cmd.arg("-qscale:a").arg("2");
    cmd.arg(mp3_out);
    cmd
}

/// Run an external tool to completion, surfacing stderr on failure.
pub fn run_tool(cmd: &mut Command, tool: &str) -> Result<(), ToolError> {
    let output = cmd.output().map_err(|source| ToolError::Spawn {
        tool: tool.to_string(),
        source,
    })?;

    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    match output.status.code() {
        Some(code) => Err(ToolError::Failed {
            tool: tool.to_string(),
            code,
            stderr,
        }),
        None => Err(ToolError::Terminated(tool.to_string())),
    }
}

/// Extract/transcode `input` into a mono 16-bit WAV at `sample_rate`.
pub fn extract_wav(
    ffmpeg_path: &str,
    input: &Path,
    output: &Path,
    sample_rate: u32,
) -> Result<(), ToolError> {
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    info!(input = %input.display(), output = %output.display(), sample_rate, "extracting audio");
    run_tool(
        &mut build_extract_wav_command(ffmpeg_path, input, output, sample_rate),
        "ffmpeg",
    )
}

/// Structured metadata about a media file.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    /// Total duration in seconds (0.0 when unknown).
    pub duration: f64,
    /// First audio codec name (empty when absent).
    pub codec: String,
    /// First audio stream sample rate in Hz (0 when absent).
    pub sample_rate: u32,
    /// First audio stream channel count (0 when absent).
    pub channels: u32,
    /// Whether at least one video stream exists.
    pub has_video: bool,
    /// Whether at least one audio stream exists.
    pub has_audio: bool,
}

/// Raw ffprobe JSON structures for parsing.
mod ffprobe_json {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct FfprobeOutput {
        pub streams: Option<Vec<Stream>>,
        pub format: Option<Format>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Stream {
        pub codec_type: Option<String>,
        pub codec_name: Option<String>,
        pub sample_rate: Option<String>,
        pub channels: Option<u32>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Format {
        pub duration: Option<String>,
    }
}

/// Probe a media file with ffprobe.
pub fn probe_media(ffprobe_path: &str, input: &Path) -> Result<MediaInfo, ToolError> {
    let output = build_probe_command(ffprobe_path, input)
        .output()
        .map_err(|source| ToolError::Spawn {
            tool: "ffprobe".to_string(),
            source,
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(ToolError::Failed {
            tool: "ffprobe".to_string(),
            code: output.status.code().unwrap_or(-1),
            stderr,
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_probe_output(&stdout)
}

/// Parse ffprobe JSON output into a `MediaInfo`.
pub fn parse_probe_output(json_str: &str) -> Result<MediaInfo, ToolError> {
    let probe: ffprobe_json::FfprobeOutput =
        serde_json::from_str(json_str).map_err(|e| ToolError::Parse {
            tool: "ffprobe".to_string(),
            message: e.to_string(),
        })?;

    let streams = probe.streams.unwrap_or_default();

    let mut has_video = false;
    let mut has_audio = false;
    let mut codec = String::new();
    let mut sample_rate = 0u32;
    let mut channels = 0u32;

    for stream in streams {
        match stream.codec_type.as_deref() {
            Some("video") => has_video = true,
            Some("audio") => {
                has_audio = true;
                if codec.is_empty() {
                    codec = stream.codec_name.unwrap_or_default();
                    sample_rate = stream
                        .sample_rate
                        .as_deref()
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(0);
                    channels = stream.channels.unwrap_or(0);
                }
            }
            _ => {}
        }
    }

    let duration = probe
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    Ok(MediaInfo {
        duration,
        codec,
        sample_rate,
        channels,
        has_video,
        has_audio,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::ffi::OsStr;
    use std::path::PathBuf;

    /// Helper to convert Command args to a Vec of strings for easier testing
    fn get_command_args(cmd: &Command) -> Vec<String> {
        cmd.get_args()
            .filter_map(|arg| arg.to_str().map(String::from))
            .collect()
    }

    fn has_flag_with_value(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2)
            .any(|pair| pair[0] == flag && pair[1] == value)
    }

    fn has_flag(args: &[String], flag: &str) -> bool {
        args.iter().any(|arg| arg == flag)
    }

    fn path_strategy() -> impl Strategy<Value = String> {
        prop::string::string_regex("[a-zA-Z0-9_/.-]{1,40}")
            .unwrap()
            .prop_filter("non-empty path", |s| !s.is_empty())
    }

    // For any paths and sample rate, the extraction command carries every
    // flag needed to produce mono 16-bit PCM at the requested rate.
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_extract_command_completeness(
            input in path_strategy(),
            output in path_strategy(),
            sample_rate in 8000u32..96_000,
        ) {
            let cmd = build_extract_wav_command(
                "ffmpeg",
                &PathBuf::from(&input),
                &PathBuf::from(&output),
                sample_rate,
            );
            let args = get_command_args(&cmd);

            prop_assert_eq!(cmd.get_program(), OsStr::new("ffmpeg"));
            prop_assert!(has_flag(&args, "-y"));
            prop_assert!(has_flag_with_value(&args, "-i", &input));
            prop_assert!(has_flag(&args, "-vn"));
            prop_assert!(has_flag_with_value(&args, "-acodec", "pcm_s16le"));
            prop_assert!(has_flag_with_value(&args, "-ar", &sample_rate.to_string()));
            prop_assert!(has_flag_with_value(&args, "-ac", "1"));
            prop_assert_eq!(args.last().map(String::as_str), Some(output.as_str()));
        }

        #[test]
        fn prop_mux_command_completeness(
            video in path_strategy(),
            audio in path_strategy(),
            output in path_strategy(),
        ) {
            let cmd = build_mux_command(
                "ffmpeg",
                &PathBuf::from(&video),
                &PathBuf::from(&audio),
                &PathBuf::from(&output),
            );
            let args = get_command_args(&cmd);

            prop_assert!(has_flag_with_value(&args, "-c:v", "copy"));
            prop_assert!(has_flag_with_value(&args, "-map", "0:v:0"));
            prop_assert!(has_flag_with_value(&args, "-map", "1:a:0"));
            prop_assert!(has_flag(&args, "-shortest"));
            prop_assert!(has_flag_with_value(&args, "-i", &video));
            prop_assert!(has_flag_with_value(&args, "-i", &audio));
            prop_assert_eq!(args.last().map(String::as_str), Some(output.as_str()));
        }

        #[test]
        fn prop_mp3_command_completeness(
            wav in path_strategy(),
            mp3 in path_strategy(),
        ) {
            let cmd = build_mp3_command("ffmpeg", &PathBuf::from(&wav), &PathBuf::from(&mp3));
            let args = get_command_args(&cmd);

            prop_assert!(has_flag_with_value(&args, "-codec:a", "libmp3lame"));
            prop_assert!(has_flag_with_value(&args, "-qscale:a", "2"));
            prop_assert!(has_flag_with_value(&args, "-i", &wav));
            prop_assert_eq!(args.last().map(String::as_str), Some(mp3.as_str()));
        }
    }

    #[test]
    fn test_probe_command_shape() {
        let cmd = build_probe_command("ffprobe", &PathBuf::from("clip.mp4"));
        let args = get_command_args(&cmd);

        assert!(has_flag_with_value(&args, "-print_format", "json"));
        assert!(has_flag(&args, "-show_format"));
        assert!(has_flag(&args, "-show_streams"));
        assert_eq!(args.last().map(String::as_str), Some("clip.mp4"));
    }

    #[test]
    fn test_is_video_file() {
        assert!(is_video_file(Path::new("movie.mp4")));
        assert!(is_video_file(Path::new("movie.MKV")));
        assert!(!is_video_file(Path::new("song.wav")));
        assert!(!is_video_file(Path::new("noextension")));
    }

    #[test]
    fn test_is_allowed_upload() {
        assert!(is_allowed_upload("talk.wav"));
        assert!(is_allowed_upload("talk.MP3"));
        assert!(is_allowed_upload("clip.webm"));
        assert!(!is_allowed_upload("notes.txt"));
        assert!(!is_allowed_upload("archive.flac"));
    }

    #[test]
    fn test_parse_probe_output_full() {
        let json = r#"{
            "streams": [
                {"codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080},
                {"codec_type": "audio", "codec_name": "aac", "sample_rate": "48000", "channels": 2}
            ],
            "format": {"duration": "12.480000"}
        }"#;

        let info = parse_probe_output(json).unwrap();
        assert!(info.has_video);
        assert!(info.has_audio);
        assert_eq!(info.codec, "aac");
        assert_eq!(info.sample_rate, 48000);
        assert_eq!(info.channels, 2);
        assert!((info.duration - 12.48).abs() < 1e-9);
    }

    #[test]
    fn test_parse_probe_output_audio_only() {
        let json = r#"{
            "streams": [
                {"codec_type": "audio", "codec_name": "pcm_s16le", "sample_rate": "24000", "channels": 1}
            ],
            "format": {"duration": "3.0"}
        }"#;

        let info = parse_probe_output(json).unwrap();
        assert!(!info.has_video);
        assert!(info.has_audio);
        assert_eq!(info.sample_rate, 24000);
    }

    #[test]
    fn test_parse_probe_output_missing_fields() {
        let info = parse_probe_output("{}").unwrap();
        assert!(!info.has_video);
        assert!(!info.has_audio);
        assert_eq!(info.duration, 0.0);
    }

    #[test]
    fn test_parse_probe_output_invalid_json() {
        let err = parse_probe_output("{not json").unwrap_err();
        assert!(matches!(err, ToolError::Parse { .. }));
    }
}
