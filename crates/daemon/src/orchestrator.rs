//! Workflow orchestration.
//!
//! Drives every job through its state machine: analysis (extract, separate,
//! diarize, transcribe), voice replacement (synthesize, align, merge,
//! remux), standalone TTS, music generation, and two-track mixing. Each
//! public `run_*` method is designed to be launched as a fire-and-forget
//! background task; it reports progress exclusively through job store
//! updates and converts any step failure into a `Failed` status instead of
//! propagating it.

use crate::aligner::{self, PlacedClip};
use crate::audio::wav_duration;
use crate::jobs::{JobStatus, VoiceAssignment};
use crate::media::is_video_file;
use crate::merger;
use crate::mixer::{self, MixParams};
use crate::segments::{derive_speakers, merge_short_segments, MERGE_GAP_THRESHOLD, MIN_SEGMENT_DURATION};
use crate::store::{JobStore, StoreError};
use crate::workers::{MusicRequest, StemPaths, TtsRequest, Workers};
use revoice_daemon_config::Config;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

// Published progress fractions per stage.
const PROGRESS_EXTRACTING: f64 = 0.05;
const PROGRESS_SEPARATING: f64 = 0.15;
const PROGRESS_DIARIZING: f64 = 0.35;
const PROGRESS_TRANSCRIBING: f64 = 0.50;
const PROGRESS_AWAITING: f64 = 0.65;
const PROGRESS_GENERATING: f64 = 0.70;
const PROGRESS_SYNTH_SPAN: f64 = 0.15;
const PROGRESS_ALIGNING: f64 = 0.85;
const PROGRESS_MERGING: f64 = 0.90;

/// Error type for workflow execution. Never escapes a workflow: the single
/// failure sink converts it into `Failed` status plus error text.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Workspace(#[from] crate::workspace::WorkspaceError),

    #[error("{0}")]
    Worker(#[from] crate::workers::WorkerError),

    #[error("{0}")]
    Align(#[from] crate::aligner::AlignError),

    #[error("{0}")]
    Merge(#[from] crate::merger::MergeError),

    #[error("{0}")]
    Mix(#[from] crate::mixer::MixError),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("background task panicked: {0}")]
    TaskPanic(String),
}

/// Parameters for a standalone TTS job.
#[derive(Debug, Clone, Default)]
pub struct TtsJob {
    pub text: String,
    pub reference: Option<PathBuf>,
    pub speed: Option<f64>,
    pub pitch: Option<f64>,
    pub language: Option<String>,
    pub ref_text: Option<String>,
    pub model: String,
}

/// Parameters for a music generation job.
#[derive(Debug, Clone, Default)]
pub struct MusicJob {
    pub prompt: String,
    pub duration: f64,
    pub style: Option<String>,
    pub reference: Option<PathBuf>,
}

/// Drives workflows against the job store using the injected workers.
pub struct Orchestrator {
    store: Arc<JobStore>,
    workers: Workers,
    config: Config,
}

impl Orchestrator {
    pub fn new(store: Arc<JobStore>, workers: Workers, config: Config) -> Self {
        Self {
            store,
            workers,
            config,
        }
    }

    // ------------------------------------------------------------------
    // Fire-and-forget entry points
    // ------------------------------------------------------------------

    pub fn spawn_analysis(self: &Arc<Self>, job_id: String, file_path: PathBuf) {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run_analysis(&job_id, &file_path).await });
    }

    pub fn spawn_replacement(self: &Arc<Self>, job_id: String, assignments: Vec<VoiceAssignment>) {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run_replacement(&job_id, assignments).await });
    }

    pub fn spawn_tts(self: &Arc<Self>, job_id: String, params: TtsJob) {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run_tts(&job_id, params).await });
    }

    pub fn spawn_music(self: &Arc<Self>, job_id: String, params: MusicJob) {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run_music(&job_id, params).await });
    }

    pub fn spawn_mix(
        self: &Arc<Self>,
        job_id: String,
        tts_output: PathBuf,
        music_output: PathBuf,
        params: MixParams,
    ) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run_mix(&job_id, &tts_output, &music_output, params).await
        });
    }

    // ------------------------------------------------------------------
    // Analysis workflow
    // ------------------------------------------------------------------

    /// Run the analysis pipeline on an uploaded media file:
    /// extract -> separate -> diarize -> transcribe, ending in
    /// `AwaitingVoiceAssignment`.
    pub async fn run_analysis(&self, job_id: &str, file_path: &std::path::Path) {
        if let Err(err) = self.analysis_steps(job_id, file_path).await {
            self.fail_job(job_id, &err).await;
        }
    }

    async fn analysis_steps(
        &self,
        job_id: &str,
        file_path: &std::path::Path,
    ) -> Result<(), WorkflowError> {
        let workspace = self.store.workspace(job_id);
        let sample_rate = self.config.audio.sample_rate;

        // 1. Extract / convert audio.
        self.set_stage(job_id, JobStatus::ExtractingAudio, PROGRESS_EXTRACTING)
            .await?;

        let extracted = workspace.extracted_wav();
        if is_video_file(file_path) {
            info!(job_id, "extracting audio from video");
        } else {
            info!(job_id, "converting audio to WAV");
        }
        {
            let extractor = Arc::clone(&self.workers.extractor);
            let input = file_path.to_path_buf();
            let output = extracted.clone();
            run_blocking(move || extractor.extract_wav(&input, &output, sample_rate)).await??;
        }

        // 2. Separate vocals and music.
        self.set_stage(job_id, JobStatus::Separating, PROGRESS_SEPARATING)
            .await?;

        let stems = StemPaths {
            vocals: workspace.vocals_dir().join("vocals.wav"),
            accompaniment: workspace.music_dir().join("accompaniment.wav"),
        };
        let vocals_path = stems.vocals.clone();
        {
            let separator = Arc::clone(&self.workers.separator);
            let input = extracted.clone();
            let scratch = workspace.music_dir().join("stems");
            let stems = stems.clone();
            run_blocking(move || separator.separate(&input, &stems, &scratch)).await??;
        }

        // 3. Speaker diarization.
        self.set_stage(job_id, JobStatus::Diarizing, PROGRESS_DIARIZING)
            .await?;

        let (min_speakers, max_speakers) = (
            self.config.limits.min_speakers,
            self.config.limits.max_speakers,
        );
        let raw_segments = {
            let diarizer = Arc::clone(&self.workers.diarizer);
            let input = vocals_path.clone();
            run_blocking(move || diarizer.diarize(&input, min_speakers, max_speakers)).await??
        };

        let mut segments =
            merge_short_segments(raw_segments, MIN_SEGMENT_DURATION, MERGE_GAP_THRESHOLD);

        // 4. Transcription. Per-segment failures degrade to empty text.
        self.set_stage(job_id, JobStatus::Transcribing, PROGRESS_TRANSCRIBING)
            .await?;

        segments = {
            let transcriber = Arc::clone(&self.workers.transcriber);
            let vocals = vocals_path.clone();
            let scratch = workspace.segments_dir().join("transcribe");
            let mut segments = segments;
            run_blocking(move || {
                crate::workers::transcribe_segments(
                    transcriber.as_ref(),
                    &vocals,
                    &mut segments,
                    &scratch,
                )
                .map(|_| segments)
            })
            .await??
        };

        // 5. Aggregate speakers and hand control back to the client.
        let speakers = derive_speakers(&segments);
        info!(
            job_id,
            speakers = speakers.len(),
            segments = segments.len(),
            "analysis complete"
        );

        self.store
            .update(job_id, |job| {
                job.speakers = speakers;
                job.segments = segments;
                job.status = JobStatus::AwaitingVoiceAssignment;
                job.progress = PROGRESS_AWAITING;
            })
            .await?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Replacement workflow
    // ------------------------------------------------------------------

    /// Replace detected speaker voices with synthesized speech:
    /// synthesize per segment -> align -> merge with music -> optional
    /// video rebuild -> MP3 export.
    pub async fn run_replacement(&self, job_id: &str, assignments: Vec<VoiceAssignment>) {
        if let Err(err) = self.replacement_steps(job_id, assignments).await {
            self.fail_job(job_id, &err).await;
        }
    }

    async fn replacement_steps(
        &self,
        job_id: &str,
        assignments: Vec<VoiceAssignment>,
    ) -> Result<(), WorkflowError> {
        let workspace = self.store.workspace(job_id);
        let sample_rate = self.config.audio.sample_rate;

        let job = self
            .store
            .get(job_id)
            .await
            .ok_or_else(|| WorkflowError::JobNotFound(job_id.to_string()))?;

        // 1. Persist the voice assignment on each matching speaker.
        let ref_map: HashMap<String, PathBuf> = assignments
            .iter()
            .map(|a| {
                (
                    a.speaker_id.clone(),
                    workspace.references_dir().join(&a.reference_audio_filename),
                )
            })
            .collect();

        self.store
            .update(job_id, |job| {
                for speaker in job.speakers.iter_mut() {
                    if let Some(assignment) = assignments
                        .iter()
                        .find(|a| a.speaker_id == speaker.speaker_id)
                    {
                        speaker.assigned_voice_ref =
                            Some(assignment.reference_audio_filename.clone());
                    }
                }
                job.status = JobStatus::GeneratingSpeech;
                job.progress = PROGRESS_GENERATING;
            })
            .await?;

        // 2. Synthesize a clip for every segment, in input order.
        let total_segments = job.segments.len();
        let mut clips: Vec<PlacedClip> = Vec::new();

        for (idx, segment) in job.segments.iter().enumerate() {
            let Some(reference) = ref_map.get(&segment.speaker_id) else {
                warn!(
                    job_id,
                    segment = idx,
                    speaker = %segment.speaker_id,
                    "no reference voice assigned, segment left silent"
                );
                continue;
            };

            let clip_path = workspace.segments_dir().join(format!("{}.wav", idx));
            let request = TtsRequest {
                text: segment.text.clone(),
                output: clip_path.clone(),
                reference: Some(reference.clone()),
                language: None,
                ref_text: None,
                target_duration: Some(segment.duration()),
                speed: None,
                pitch: None,
                model: self.config.models.tts_model.clone(),
            };

            {
                let tts = Arc::clone(&self.workers.tts);
                run_blocking(move || tts.synthesize(&request)).await??;
            }

            clips.push(PlacedClip {
                speaker_id: segment.speaker_id.clone(),
                source_path: clip_path,
                aligned_path: None,
                target_start: segment.start_time,
                target_end: segment.end_time,
            });

            let progress =
                PROGRESS_GENERATING + PROGRESS_SYNTH_SPAN * (idx + 1) as f64 / total_segments as f64;
            self.store
                .update(job_id, |job| job.progress = progress)
                .await?;
        }

        // 3. Align every clip to its original time slot.
        self.set_stage(job_id, JobStatus::Aligning, PROGRESS_ALIGNING)
            .await?;

        let segments_dir = workspace.segments_dir();
        let clips = {
            let mut clips = clips;
            run_blocking(move || aligner::align_segments(&mut clips, &segments_dir).map(|_| clips))
                .await??
        };

        // 4-6. Merge onto the background track across the full duration.
        self.set_stage(job_id, JobStatus::Merging, PROGRESS_MERGING)
            .await?;

        let music_path = workspace.resolve_music()?;
        let total_duration = wav_duration(&workspace.extracted_wav());
        let final_wav = workspace.output_dir().join("final.wav");

        {
            let music = music_path.clone();
            let output = final_wav.clone();
            run_blocking(move || {
                merger::merge_speech_and_music(&clips, &music, &output, total_duration, sample_rate)
            })
            .await??;
        }

        // 7. Rebuild the video container when the upload was video.
        let mut output_file = final_wav.clone();
        if let Some(original) = workspace.resolve_original()? {
            if is_video_file(&original) {
                let final_video = workspace.output_dir().join("final.mp4");
                let ffmpeg = self.config.tools.ffmpeg_path.clone();
                let audio = final_wav.clone();
                let video_out = final_video.clone();
                run_blocking(move || {
                    merger::rebuild_video(&ffmpeg, &original, &audio, &video_out)
                })
                .await??;
                output_file = final_video;
            }
        }

        // 8. Export MP3 alongside; failure keeps the WAV as primary.
        {
            let ffmpeg = self.config.tools.ffmpeg_path.clone();
            let wav = final_wav.clone();
            let out_dir = workspace.output_dir();
            run_blocking(move || merger::export_mp3(&ffmpeg, &wav, &out_dir)).await?;
        }

        // 9. Done.
        self.store
            .update(job_id, |job| job.complete(output_file.clone()))
            .await?;
        info!(job_id, "voice replacement complete");
        Ok(())
    }

    // ------------------------------------------------------------------
    // TTS workflow
    // ------------------------------------------------------------------

    /// Synthesize one clip from text; no alignment or merging.
    pub async fn run_tts(&self, job_id: &str, params: TtsJob) {
        if let Err(err) = self.tts_steps(job_id, params).await {
            self.fail_job(job_id, &err).await;
        }
    }

    async fn tts_steps(&self, job_id: &str, params: TtsJob) -> Result<(), WorkflowError> {
        let workspace = self.store.workspace(job_id);

        self.set_stage(job_id, JobStatus::GeneratingSpeech, 0.30).await?;

        let output_path = workspace.output_dir().join("tts_output.wav");
        let request = TtsRequest {
            text: params.text,
            output: output_path.clone(),
            reference: params.reference,
            language: params.language,
            ref_text: params.ref_text,
            target_duration: None,
            speed: params.speed,
            pitch: params.pitch,
            model: if params.model.is_empty() {
                self.config.models.tts_model.clone()
            } else {
                params.model
            },
        };

        {
            let tts = Arc::clone(&self.workers.tts);
            run_blocking(move || tts.synthesize(&request)).await??;
        }

        {
            let ffmpeg = self.config.tools.ffmpeg_path.clone();
            let wav = output_path.clone();
            let out_dir = workspace.output_dir();
            run_blocking(move || merger::export_mp3(&ffmpeg, &wav, &out_dir)).await?;
        }

        self.store
            .update(job_id, |job| job.complete(output_path.clone()))
            .await?;
        info!(job_id, "TTS synthesis complete");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Music workflow
    // ------------------------------------------------------------------

    /// Generate one music clip from a prompt.
    pub async fn run_music(&self, job_id: &str, params: MusicJob) {
        if let Err(err) = self.music_steps(job_id, params).await {
            self.fail_job(job_id, &err).await;
        }
    }

    async fn music_steps(&self, job_id: &str, params: MusicJob) -> Result<(), WorkflowError> {
        let workspace = self.store.workspace(job_id);

        self.set_stage(job_id, JobStatus::GeneratingSpeech, 0.30).await?;

        let output_path = workspace.output_dir().join("music_output.wav");
        let request = MusicRequest {
            prompt: params.prompt,
            duration: params.duration,
            output: output_path.clone(),
            style: params.style,
            reference: params.reference,
            model: self.config.models.music_model.clone(),
        };

        {
            let music = Arc::clone(&self.workers.music);
            run_blocking(move || music.generate(&request)).await??;
        }

        {
            let ffmpeg = self.config.tools.ffmpeg_path.clone();
            let wav = output_path.clone();
            let out_dir = workspace.output_dir();
            run_blocking(move || merger::export_mp3(&ffmpeg, &wav, &out_dir)).await?;
        }

        self.store
            .update(job_id, |job| job.complete(output_path.clone()))
            .await?;
        info!(job_id, "music generation complete");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Mix workflow
    // ------------------------------------------------------------------

    /// Mix the outputs of a completed TTS job and a completed music job.
    pub async fn run_mix(
        &self,
        job_id: &str,
        tts_output: &std::path::Path,
        music_output: &std::path::Path,
        params: MixParams,
    ) {
        if let Err(err) = self.mix_steps(job_id, tts_output, music_output, params).await {
            self.fail_job(job_id, &err).await;
        }
    }

    async fn mix_steps(
        &self,
        job_id: &str,
        tts_output: &std::path::Path,
        music_output: &std::path::Path,
        params: MixParams,
    ) -> Result<(), WorkflowError> {
        let workspace = self.store.workspace(job_id);
        let sample_rate = self.config.audio.sample_rate;

        self.set_stage(job_id, JobStatus::Merging, 0.50).await?;

        let output_path = workspace.output_dir().join("mixed_output.wav");
        {
            let tts = tts_output.to_path_buf();
            let music = music_output.to_path_buf();
            let output = output_path.clone();
            run_blocking(move || mixer::mix_tracks(&tts, &music, &output, params, sample_rate))
                .await??;
        }

        {
            let ffmpeg = self.config.tools.ffmpeg_path.clone();
            let wav = output_path.clone();
            let out_dir = workspace.output_dir();
            run_blocking(move || merger::export_mp3(&ffmpeg, &wav, &out_dir)).await?;
        }

        self.store
            .update(job_id, |job| job.complete(output_path.clone()))
            .await?;
        info!(job_id, "mix complete");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Shared helpers
    // ------------------------------------------------------------------

    async fn set_stage(
        &self,
        job_id: &str,
        status: JobStatus,
        progress: f64,
    ) -> Result<(), WorkflowError> {
        self.store
            .update(job_id, |job| {
                job.status = status;
                job.progress = progress;
            })
            .await?;
        Ok(())
    }

    /// Single failure sink: record the error on the job and stop.
    async fn fail_job(&self, job_id: &str, err: &WorkflowError) {
        error!(job_id, %err, "workflow failed");
        let message = err.to_string();
        if let Err(store_err) = self.store.update(job_id, |job| job.fail(&message)).await {
            error!(job_id, %store_err, "could not record workflow failure");
        }
    }

}

/// Dispatch blocking work to the worker-thread pool.
async fn run_blocking<T, F>(f: F) -> Result<T, WorkflowError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| WorkflowError::TaskPanic(e.to_string()))
}
