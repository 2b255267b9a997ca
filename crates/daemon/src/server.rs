//! HTTP API for the revoice daemon.
//!
//! Exposes the control plane: uploads, job inspection, voice assignment,
//! standalone TTS, music generation, mixing, downloads, and voice profile
//! management. Handlers perform cheap validation, mutate the job store, and
//! launch workflows as background tasks; clients observe progress by
//! polling the job detail endpoint.

use crate::jobs::{InputKind, Job, JobStatus, Segment, Speaker, VoiceAssignment};
use crate::media::is_allowed_upload;
use crate::mixer::MixParams;
use crate::orchestrator::{MusicJob, Orchestrator, TtsJob};
use crate::store::JobStore;
use crate::voices::{VoiceManager, VoiceProfile};
use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Multipart, Path as AxumPath, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use revoice_daemon_config::Config;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::io::ReaderStream;
use tracing::info;

/// Errors that can occur when running the API server
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind to address: {0}")]
    Bind(#[from] std::io::Error),
}

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<JobStore>,
    pub voices: Arc<VoiceManager>,
    pub orchestrator: Arc<Orchestrator>,
    pub config: Config,
}

/// API-level error, rendered as `{"detail": ...}` with the matching status.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({ "detail": self.to_string() }));
        (status, body).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> ApiError {
    ApiError::BadRequest(message.into())
}

fn job_not_found(job_id: &str) -> ApiError {
    ApiError::NotFound(format!("Job not found: {}", job_id))
}

// ---------------------------------------------------------------------------
// Response models
// ---------------------------------------------------------------------------

/// Lightweight response returned after job creation or a workflow start.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub message: String,
}

/// Full job state for polling or inspection.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobDetail {
    pub job_id: String,
    pub status: JobStatus,
    pub input_kind: InputKind,
    pub input_filename: String,
    pub speakers: Vec<Speaker>,
    pub segments: Vec<Segment>,
    pub progress: f64,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub output_file: Option<PathBuf>,
}

impl From<Job> for JobDetail {
    fn from(job: Job) -> Self {
        Self {
            job_id: job.job_id,
            status: job.status,
            input_kind: job.input_kind,
            input_filename: job.input_filename,
            speakers: job.speakers,
            segments: job.segments,
            progress: job.progress,
            error: job.error,
            created_at: job.created_at,
            updated_at: job.updated_at,
            output_file: job.output_file,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TtsResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub output_file: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MusicResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub output_file: Option<PathBuf>,
    pub duration: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MixResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub output_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Request models
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct AssignVoicesRequest {
    pub assignments: Vec<VoiceAssignment>,
}

fn default_tts_volume() -> f32 {
    0.85
}

fn default_music_volume() -> f32 {
    0.30
}

#[derive(Debug, Deserialize)]
pub struct MixRequest {
    pub tts_job_id: String,
    pub music_job_id: String,
    #[serde(default = "default_tts_volume")]
    pub tts_volume: f32,
    #[serde(default = "default_music_volume")]
    pub music_volume: f32,
    #[serde(default)]
    pub music_delay: f64,
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    #[serde(default)]
    pub format: Option<String>,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Creates the axum Router with the full API surface.
pub fn create_api_router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes() as usize + 1024 * 1024;

    Router::new()
        .route("/api/health", get(health))
        .route("/api/upload", post(upload_file))
        .route("/api/jobs", get(list_jobs))
        .route("/api/jobs/:job_id", get(get_job).delete(delete_job))
        .route("/api/jobs/:job_id/reference-voice", post(upload_reference_voice))
        .route("/api/jobs/:job_id/assign-voices", post(assign_voices))
        .route("/api/jobs/:job_id/download", get(download_output))
        .route("/api/tts", post(text_to_speech))
        .route("/api/music", post(generate_music))
        .route("/api/mix", post(mix_jobs))
        .route("/api/voices", get(list_voices).post(create_voice))
        .route("/api/voices/:voice_id", delete(delete_voice))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Runs the API server on the configured bind address.
pub async fn run_api_server(state: AppState) -> Result<(), ServerError> {
    let addr: SocketAddr = format!("{}:{}", state.config.server.host, state.config.server.port)
        .parse()
        .map_err(|e| {
            ServerError::Bind(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
        })?;

    let app = create_api_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "revoice",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "ok",
    }))
}

/// Keep only the final path component of a client-supplied filename.
fn sanitize_filename(raw: &str) -> Option<String> {
    let name = Path::new(raw).file_name()?.to_str()?.to_string();
    if name.is_empty() || name == "." || name == ".." {
        None
    } else {
        Some(name)
    }
}

fn detect_input_kind(filename: &str) -> InputKind {
    if crate::media::is_video_file(Path::new(filename)) {
        InputKind::Video
    } else {
        InputKind::Audio
    }
}

async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<JobResponse>, ApiError> {
    let mut filename: Option<String> = None;
    let mut data: Option<axum::body::Bytes> = None;
    let mut input_type: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                filename = field.file_name().and_then(sanitize_filename);
                data = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| bad_request(format!("failed to read upload: {}", e)))?,
                );
            }
            "input_type" => {
                input_type = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| bad_request(format!("invalid input_type field: {}", e)))?,
                );
            }
            _ => {}
        }
    }

    let filename = filename.ok_or_else(|| bad_request("Filename is required."))?;
    let data = data.ok_or_else(|| bad_request("File is required."))?;

    if !is_allowed_upload(&filename) {
        return Err(bad_request(format!(
            "Unsupported file extension: {}",
            filename
        )));
    }
    if data.len() as u64 > state.config.max_upload_bytes() {
        return Err(bad_request(format!(
            "File size exceeds maximum of {} MB.",
            state.config.limits.max_upload_mb
        )));
    }

    let kind = match input_type.as_deref() {
        Some(raw) if !raw.is_empty() => raw
            .parse::<InputKind>()
            .map_err(|_| bad_request(format!("Invalid input_type '{}'. Use 'audio' or 'video'.", raw)))?,
        _ => detect_input_kind(&filename),
    };

    let job = state
        .store
        .create(kind, &filename)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let dest_path = state.store.workspace(&job.job_id).input_dir().join(&filename);
    if let Err(err) = tokio::fs::write(&dest_path, &data).await {
        state.store.delete(&job.job_id).await;
        return Err(ApiError::Internal(format!("failed to save upload: {}", err)));
    }

    info!(
        job_id = %job.job_id,
        file = %filename,
        kind = %kind,
        size_mb = data.len() as f64 / (1024.0 * 1024.0),
        "upload received"
    );

    state.orchestrator.spawn_analysis(job.job_id.clone(), dest_path);

    Ok(Json(JobResponse {
        job_id: job.job_id,
        status: job.status,
        message: "Upload received. Processing started.".to_string(),
    }))
}

async fn list_jobs(State(state): State<AppState>) -> Json<Vec<JobDetail>> {
    let jobs = state.store.list().await;
    Json(jobs.into_iter().map(JobDetail::from).collect())
}

async fn get_job(
    State(state): State<AppState>,
    AxumPath(job_id): AxumPath<String>,
) -> Result<Json<JobDetail>, ApiError> {
    let job = state
        .store
        .get(&job_id)
        .await
        .ok_or_else(|| job_not_found(&job_id))?;
    Ok(Json(JobDetail::from(job)))
}

async fn delete_job(
    State(state): State<AppState>,
    AxumPath(job_id): AxumPath<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !state.store.delete(&job_id).await {
        return Err(job_not_found(&job_id));
    }
    Ok(Json(serde_json::json!({
        "message": "Job deleted",
        "job_id": job_id,
    })))
}

async fn upload_reference_voice(
    State(state): State<AppState>,
    AxumPath(job_id): AxumPath<String>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .store
        .get(&job_id)
        .await
        .ok_or_else(|| job_not_found(&job_id))?;

    let mut filename: Option<String> = None;
    let mut data: Option<axum::body::Bytes> = None;
    let mut speaker_id: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                filename = field.file_name().and_then(sanitize_filename);
                data = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| bad_request(format!("failed to read upload: {}", e)))?,
                );
            }
            "speaker_id" => {
                speaker_id = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| bad_request(format!("invalid speaker_id field: {}", e)))?,
                );
            }
            _ => {}
        }
    }

    let filename = filename.ok_or_else(|| bad_request("Filename is required."))?;
    let data = data.ok_or_else(|| bad_request("File is required."))?;
    let speaker_id = speaker_id.ok_or_else(|| bad_request("speaker_id is required."))?;

    let dest_path = state
        .store
        .workspace(&job_id)
        .references_dir()
        .join(&filename);
    tokio::fs::write(&dest_path, &data)
        .await
        .map_err(|e| ApiError::Internal(format!("failed to save reference: {}", e)))?;

    info!(%job_id, %speaker_id, file = %filename, "reference voice uploaded");

    Ok(Json(serde_json::json!({
        "message": "Reference voice uploaded",
        "speaker_id": speaker_id,
        "filename": filename,
    })))
}

async fn assign_voices(
    State(state): State<AppState>,
    AxumPath(job_id): AxumPath<String>,
    Json(request): Json<AssignVoicesRequest>,
) -> Result<Json<JobResponse>, ApiError> {
    let job = state
        .store
        .get(&job_id)
        .await
        .ok_or_else(|| job_not_found(&job_id))?;

    if job.status != JobStatus::AwaitingVoiceAssignment {
        return Err(bad_request(format!(
            "Job is not awaiting voice assignment. Current status: {}",
            job.status
        )));
    }

    let workspace = state.store.workspace(&job_id);
    let mut assignments = request.assignments;

    for assignment in assignments.iter_mut() {
        if !job
            .speakers
            .iter()
            .any(|s| s.speaker_id == assignment.speaker_id)
        {
            return Err(bad_request(format!(
                "Unknown speaker: {}",
                assignment.speaker_id
            )));
        }

        // A saved voice profile is materialized into the job's references.
        if let Some(voice_id) = assignment.voice_id.clone() {
            let audio_path = state
                .voices
                .audio_path(&voice_id)
                .await
                .ok_or_else(|| bad_request(format!("Voice profile has no audio: {}", voice_id)))?;

            let ext = audio_path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("wav");
            let local_name = format!("voice_{}.{}", voice_id, ext);
            let dest = workspace.references_dir().join(&local_name);
            tokio::fs::copy(&audio_path, &dest)
                .await
                .map_err(|e| ApiError::Internal(format!("failed to copy voice audio: {}", e)))?;
            assignment.reference_audio_filename = local_name;
        }

        if assignment.reference_audio_filename.is_empty() {
            return Err(bad_request(format!(
                "Assignment for speaker {} names no reference audio",
                assignment.speaker_id
            )));
        }

        let ref_path = workspace
            .references_dir()
            .join(&assignment.reference_audio_filename);
        if !ref_path.exists() {
            return Err(bad_request(format!(
                "Reference audio file not found: {}",
                assignment.reference_audio_filename
            )));
        }
    }

    info!(%job_id, assignments = assignments.len(), "voice replacement started");
    state
        .orchestrator
        .spawn_replacement(job_id.clone(), assignments);

    Ok(Json(JobResponse {
        job_id: job.job_id,
        status: job.status,
        message: "Voice replacement started.".to_string(),
    }))
}

async fn text_to_speech(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<TtsResponse>, ApiError> {
    let mut text: Option<String> = None;
    let mut reference: Option<(String, axum::body::Bytes)> = None;
    let mut voice_id: Option<String> = None;
    let mut speed: Option<f64> = None;
    let mut pitch: Option<f64> = None;
    let mut language: Option<String> = None;
    let mut ref_text: Option<String> = None;
    let mut model = String::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "text" => text = Some(field.text().await.map_err(|e| bad_request(e.to_string()))?),
            "reference_audio" => {
                let filename = field.file_name().and_then(sanitize_filename);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(format!("failed to read reference: {}", e)))?;
                if let Some(filename) = filename {
                    reference = Some((filename, bytes));
                }
            }
            "voice_id" => {
                voice_id = Some(field.text().await.map_err(|e| bad_request(e.to_string()))?)
            }
            "speed" => {
                let raw = field.text().await.map_err(|e| bad_request(e.to_string()))?;
                speed = Some(raw.parse().map_err(|_| bad_request("Invalid speed value."))?);
            }
            "pitch" => {
                let raw = field.text().await.map_err(|e| bad_request(e.to_string()))?;
                pitch = Some(raw.parse().map_err(|_| bad_request("Invalid pitch value."))?);
            }
            "language" => {
                language = Some(field.text().await.map_err(|e| bad_request(e.to_string()))?)
            }
            "ref_text" => {
                ref_text = Some(field.text().await.map_err(|e| bad_request(e.to_string()))?)
            }
            "tts_model" => {
                model = field.text().await.map_err(|e| bad_request(e.to_string()))?
            }
            _ => {}
        }
    }

    let text = text
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| bad_request("Text must not be empty."))?;

    if let Some(speed) = speed {
        if !(0.5..=2.0).contains(&speed) {
            return Err(bad_request("Speed must be between 0.5 and 2.0."));
        }
    }
    if let Some(pitch) = pitch {
        if !(0.5..=2.0).contains(&pitch) {
            return Err(bad_request("Pitch must be between 0.5 and 2.0."));
        }
    }

    let job = state
        .store
        .create(InputKind::Text, "tts_request")
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let workspace = state.store.workspace(&job.job_id);

    let mut ref_path: Option<PathBuf> = None;
    if let Some((filename, bytes)) = reference {
        let dest = workspace.references_dir().join(&filename);
        tokio::fs::write(&dest, &bytes)
            .await
            .map_err(|e| ApiError::Internal(format!("failed to save reference: {}", e)))?;
        ref_path = Some(dest);
    } else if let Some(voice_id) = voice_id {
        let audio_path = state
            .voices
            .audio_path(&voice_id)
            .await
            .ok_or_else(|| bad_request(format!("Voice profile has no audio: {}", voice_id)))?;
        ref_path = Some(audio_path);
    }

    info!(job_id = %job.job_id, chars = text.len(), "TTS request accepted");

    state.orchestrator.spawn_tts(
        job.job_id.clone(),
        TtsJob {
            text,
            reference: ref_path,
            speed,
            pitch,
            language,
            ref_text,
            model,
        },
    );

    Ok(Json(TtsResponse {
        job_id: job.job_id,
        status: job.status,
        output_file: None,
    }))
}

async fn generate_music(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<MusicResponse>, ApiError> {
    let mut prompt: Option<String> = None;
    let mut duration: f64 = 10.0;
    let mut style: Option<String> = None;
    let mut reference: Option<(String, axum::body::Bytes)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "prompt" => {
                prompt = Some(field.text().await.map_err(|e| bad_request(e.to_string()))?)
            }
            "duration" => {
                let raw = field.text().await.map_err(|e| bad_request(e.to_string()))?;
                duration = raw
                    .parse()
                    .map_err(|_| bad_request("Invalid duration value."))?;
            }
            "style" => {
                let value = field.text().await.map_err(|e| bad_request(e.to_string()))?;
                if !value.is_empty() {
                    style = Some(value);
                }
            }
            "reference_audio" => {
                let filename = field.file_name().and_then(sanitize_filename);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(format!("failed to read reference: {}", e)))?;
                if let Some(filename) = filename {
                    reference = Some((filename, bytes));
                }
            }
            _ => {}
        }
    }

    let prompt = prompt
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .ok_or_else(|| bad_request("Prompt must not be empty."))?;

    if !(5.0..=30.0).contains(&duration) {
        return Err(bad_request("Duration must be between 5 and 30 seconds."));
    }

    let job = state
        .store
        .create(InputKind::Text, "music_request")
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let workspace = state.store.workspace(&job.job_id);

    let mut ref_path: Option<PathBuf> = None;
    if let Some((filename, bytes)) = reference {
        let dest = workspace.references_dir().join(&filename);
        tokio::fs::write(&dest, &bytes)
            .await
            .map_err(|e| ApiError::Internal(format!("failed to save reference: {}", e)))?;
        ref_path = Some(dest);
    }

    info!(job_id = %job.job_id, duration, "music generation request accepted");

    state.orchestrator.spawn_music(
        job.job_id.clone(),
        MusicJob {
            prompt,
            duration,
            style,
            reference: ref_path,
        },
    );

    Ok(Json(MusicResponse {
        job_id: job.job_id,
        status: job.status,
        output_file: None,
        duration,
    }))
}

async fn mix_jobs(
    State(state): State<AppState>,
    Json(request): Json<MixRequest>,
) -> Result<Json<MixResponse>, ApiError> {
    if !(0.0..=1.0).contains(&request.tts_volume) {
        return Err(bad_request("tts_volume must be between 0.0 and 1.0."));
    }
    if !(0.0..=1.0).contains(&request.music_volume) {
        return Err(bad_request("music_volume must be between 0.0 and 1.0."));
    }
    if !(0.0..=30.0).contains(&request.music_delay) {
        return Err(bad_request("music_delay must be between 0 and 30 seconds."));
    }

    let tts_output = completed_output(&state, &request.tts_job_id).await?;
    let music_output = completed_output(&state, &request.music_job_id).await?;

    let job = state
        .store
        .create(InputKind::Text, "mix_request")
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    info!(
        job_id = %job.job_id,
        tts_job = %request.tts_job_id,
        music_job = %request.music_job_id,
        "mix request accepted"
    );

    state.orchestrator.spawn_mix(
        job.job_id.clone(),
        tts_output,
        music_output,
        MixParams {
            tts_volume: request.tts_volume,
            music_volume: request.music_volume,
            music_delay: request.music_delay,
        },
    );

    Ok(Json(MixResponse {
        job_id: job.job_id,
        status: job.status,
        output_file: None,
    }))
}

/// Resolve a referenced job that must be completed with an existing output.
async fn completed_output(state: &AppState, job_id: &str) -> Result<PathBuf, ApiError> {
    let job = state
        .store
        .get(job_id)
        .await
        .ok_or_else(|| job_not_found(job_id))?;

    if job.status != JobStatus::Completed {
        return Err(bad_request(format!(
            "Job {} is not completed. Current status: {}",
            job_id, job.status
        )));
    }

    match job.output_file {
        Some(path) if path.exists() => Ok(path),
        _ => Err(bad_request(format!(
            "Job {} has no output file on disk.",
            job_id
        ))),
    }
}

async fn download_output(
    State(state): State<AppState>,
    AxumPath(job_id): AxumPath<String>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, ApiError> {
    let format = query.format.unwrap_or_else(|| "wav".to_string());
    if !["wav", "mp3", "mp4"].contains(&format.as_str()) {
        return Err(bad_request(format!("Unsupported format: {}", format)));
    }

    let job = state
        .store
        .get(&job_id)
        .await
        .ok_or_else(|| job_not_found(&job_id))?;

    if job.status != JobStatus::Completed {
        return Err(bad_request(format!(
            "Job is not completed. Current status: {}",
            job.status
        )));
    }

    let output_dir = state.store.workspace(&job_id).output_dir();
    let mut target: Option<PathBuf> = None;

    if output_dir.exists() {
        let mut entries = tokio::fs::read_dir(&output_dir)
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?
        {
            let path = entry.path();
            let matches = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case(&format))
                .unwrap_or(false);
            if path.is_file() && matches {
                target = Some(path);
                break;
            }
        }
    }

    // Fallback: the output_file recorded on the job.
    let target = match target {
        Some(path) => path,
        None => match job.output_file {
            Some(path) if path.exists() => path,
            _ => {
                return Err(ApiError::NotFound(format!(
                    "No {} output file found for job {}.",
                    format, job_id
                )))
            }
        },
    };

    let media_type = match format.as_str() {
        "mp3" => "audio/mpeg",
        "mp4" => "video/mp4",
        _ => "audio/wav",
    };
    let download_name = target
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("output")
        .to_string();

    let file = tokio::fs::File::open(&target)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let stream = ReaderStream::new(file);
    let body = Body::from_stream(stream);

    info!(%job_id, file = %download_name, %format, "download");

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, media_type)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", download_name),
        )
        .body(body)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(response)
}

// ---------------------------------------------------------------------------
// Voice profile handlers
// ---------------------------------------------------------------------------

async fn list_voices(State(state): State<AppState>) -> Json<Vec<VoiceProfile>> {
    Json(state.voices.list().await)
}

async fn create_voice(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<VoiceProfile>, ApiError> {
    let mut name: Option<String> = None;
    let mut description = String::new();
    let mut audio: Option<(String, axum::body::Bytes)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {}", e)))?
    {
        let field_name = field.name().unwrap_or("").to_string();
        match field_name.as_str() {
            "name" => name = Some(field.text().await.map_err(|e| bad_request(e.to_string()))?),
            "description" => {
                description = field.text().await.map_err(|e| bad_request(e.to_string()))?
            }
            "file" => {
                let filename = field.file_name().and_then(sanitize_filename);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(format!("failed to read audio: {}", e)))?;
                if let Some(filename) = filename {
                    audio = Some((filename, bytes));
                }
            }
            _ => {}
        }
    }

    let name = name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| bad_request("Name must not be empty."))?;
    let (filename, bytes) = audio.ok_or_else(|| bad_request("Audio file is required."))?;

    let profile = state
        .voices
        .create(&name, &description)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let audio_path = state.voices.voice_dir(&profile.voice_id).join(&filename);
    tokio::fs::write(&audio_path, &bytes)
        .await
        .map_err(|e| ApiError::Internal(format!("failed to save voice audio: {}", e)))?;

    let duration = crate::audio::wav_duration(&audio_path);
    let sample_rate = hound::WavReader::open(&audio_path)
        .map(|r| r.spec().sample_rate)
        .unwrap_or(0);

    let profile = state
        .voices
        .update(&profile.voice_id, |p| {
            p.audio_filename = filename.clone();
            p.duration = duration;
            p.sample_rate = sample_rate;
        })
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(profile))
}

async fn delete_voice(
    State(state): State<AppState>,
    AxumPath(voice_id): AxumPath<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !state.voices.delete(&voice_id).await {
        return Err(ApiError::NotFound(format!("Voice not found: {}", voice_id)));
    }
    Ok(Json(serde_json::json!({
        "message": "Voice deleted",
        "voice_id": voice_id,
    })))
}
