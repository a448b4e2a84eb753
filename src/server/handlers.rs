//! HTTP endpoint handlers
//!
//! `compress` is the orchestration point for the request lifecycle:
//! authenticate → rate-check → validate → stage → run the engine →
//! negotiate the representation → release. Gate failures short-circuit
//! before any temp file exists; once files are staged, a `ReleaseGuard`
//! guarantees they are removed on every exit path.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::multipart::MultipartError;
use axum::extract::{ConnectInfo, Multipart, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use uuid::Uuid;

use crate::auth::{AuthOutcome, Caller};
use crate::error::ApiError;
use crate::ghostscript;
use crate::ghostscript::executor::CompressionOutcome;
use crate::server::negotiation::{derive_download_name, wants_json};
use crate::server::request::{CompressionRequest, RawForm, UploadedFile};
use crate::server::AppState;
use crate::staging::ReleaseGuard;

/// Header carrying the caller's API key
const API_KEY_HEADER: &str = "x-api-key";

/// Application and engine status
pub async fn healthz(State(state): State<AppState>) -> Response {
    let version = state.config.app_version();

    match ghostscript::detect_executable(state.config.ghostscript.command.as_deref()) {
        Some(path) => Json(json!({
            "status": "ok",
            "ghostscript": path.display().to_string(),
            "version": version,
        }))
        .into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "degraded",
                "ghostscript": serde_json::Value::Null,
                "version": version,
            })),
        )
            .into_response(),
    }
}

/// Build and version metadata for programmatic clients
pub async fn version(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    authenticate(&state, &headers)?;

    let mut payload = serde_json::Map::new();
    payload.insert("version".to_string(), json!(state.config.app_version()));
    if let Some(commit) = &state.config.build.commit {
        payload.insert("commit".to_string(), json!(commit));
    }
    if let Some(build_time) = &state.config.build.build_time {
        payload.insert("build_time".to_string(), json!(build_time));
    }

    Ok(Json(serde_json::Value::Object(payload)).into_response())
}

/// Compress an uploaded PDF and return the document or a JSON summary
pub async fn compress(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let caller = authenticate(&state, &headers)?;

    // Per-caller accounting when a key is resolved, per-IP otherwise.
    // The key itself never reaches the logs, only the display name.
    let client_key = caller
        .as_ref()
        .map(|caller| caller.key.clone())
        .unwrap_or_else(|| addr.ip().to_string());
    if !state.limiter.allow(&client_key) {
        let client = caller
            .as_ref()
            .map(|caller| caller.name.clone())
            .unwrap_or_else(|| addr.ip().to_string());
        tracing::warn!(client = %client, "Rate limit exceeded");
        return Err(ApiError::RateLimited(
            "Too many requests, please try again later.".to_string(),
        ));
    }

    let max_upload_bytes = state.config.limits.max_upload_bytes;
    let form = read_form(multipart, max_upload_bytes).await?;
    let request = CompressionRequest::from_form(form, max_upload_bytes)?;

    let request_id = Uuid::new_v4().simple().to_string();

    let mut guard = ReleaseGuard::new();
    let input = state.artifacts.stage(&request.data).await.map_err(|error| {
        tracing::error!(error = %error, "Failed to save uploaded file");
        ApiError::StorageError("Failed to save the uploaded file.".to_string())
    })?;
    guard.track(&input);
    let output = state.artifacts.reserve_output();
    guard.track(&output);

    let outcome = state
        .executor
        .run(&input, request.profile, request.keep_images, &output)
        .await;

    let response = match outcome {
        CompressionOutcome::Success {
            original_size,
            compressed_size,
        } => {
            tracing::info!(
                request_id = %request_id,
                profile = %request.profile,
                keep_images = request.keep_images,
                caller = caller.as_ref().map(|c| c.name.as_str()),
                original_bytes = original_size,
                compressed_bytes = compressed_size,
                "Compression completed"
            );

            let accept = headers
                .get(header::ACCEPT)
                .and_then(|value| value.to_str().ok());
            if wants_json(accept) {
                let ratio = if original_size > 0 {
                    compressed_size as f64 / original_size as f64
                } else {
                    0.0
                };
                Json(json!({
                    "ok": true,
                    "original_bytes": original_size,
                    "compressed_bytes": compressed_size,
                    "ratio": (ratio * 10_000.0).round() / 10_000.0,
                    "profile": request.profile.as_str(),
                    "request_id": request_id,
                }))
                .into_response()
            } else {
                let body = tokio::fs::read(output.path()).await.map_err(|error| {
                    tracing::error!(error = %error, "Failed to read compressed output");
                    ApiError::StorageError("Failed to read the compressed file.".to_string())
                })?;
                let download_name = derive_download_name(request.filename.as_deref());
                (
                    StatusCode::OK,
                    [
                        (header::CONTENT_TYPE, "application/pdf".to_string()),
                        (
                            header::CONTENT_DISPOSITION,
                            format!("attachment; filename=\"{}\"", download_name),
                        ),
                    ],
                    body,
                )
                    .into_response()
            }
        }
        CompressionOutcome::Unavailable { .. } => {
            return Err(ApiError::EngineUnavailable(
                "Ghostscript is not available on the server. Please install it and ensure it can be executed.".to_string(),
            ));
        }
        CompressionOutcome::Failure { .. } => {
            return Err(ApiError::EngineFailure(
                "Ghostscript failed while compressing the file.".to_string(),
            ));
        }
        CompressionOutcome::TimedOut { .. } => {
            // Reported with the generic engine-error kind; the log record
            // written by the executor identifies the timeout
            return Err(ApiError::EngineFailure(
                "Ghostscript failed while compressing the file.".to_string(),
            ));
        }
    };

    guard.release();
    Ok(response)
}

/// Resolve the request's caller, failing closed when keys are configured
fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Option<Arc<Caller>>, ApiError> {
    let presented = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    match state.authenticator.authenticate(presented) {
        AuthOutcome::Open => Ok(None),
        AuthOutcome::Authorized(caller) => Ok(Some(caller)),
        AuthOutcome::Unauthorized => Err(ApiError::Unauthorized(
            "A valid API key must be supplied via the X-API-Key header.".to_string(),
        )),
    }
}

/// Collect the multipart form fields, enforcing the upload cap while the
/// file part streams in
async fn read_form(mut multipart: Multipart, max_upload_bytes: u64) -> Result<RawForm, ApiError> {
    let mut form = RawForm::default();

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().map(|name| name.to_string());
                let content_type = field.content_type().map(|ct| ct.to_string());

                let mut data: Vec<u8> = Vec::new();
                while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
                    if (data.len() + chunk.len()) as u64 > max_upload_bytes {
                        let limit_mib = max_upload_bytes as f64 / (1024.0 * 1024.0);
                        return Err(ApiError::PayloadTooLarge(format!(
                            "The uploaded file exceeds the {:.0} MiB limit.",
                            limit_mib
                        )));
                    }
                    data.extend_from_slice(&chunk);
                }

                form.file = Some(UploadedFile {
                    filename,
                    content_type,
                    data: data.into(),
                });
            }
            Some("profile") => {
                form.profile = Some(field.text().await.map_err(multipart_error)?);
            }
            Some("keep_images") => {
                form.keep_images = Some(field.text().await.map_err(multipart_error)?);
            }
            _ => {
                // Drain unknown fields so the stream stays consumable
                while field.chunk().await.map_err(multipart_error)?.is_some() {}
            }
        }
    }

    Ok(form)
}

/// Classify a multipart read failure: a body over the transport limit is
/// an oversized payload, anything else is an unusable form
fn multipart_error(error: MultipartError) -> ApiError {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(&error);
    while let Some(current) = source {
        if current.to_string().contains("length limit") {
            return ApiError::PayloadTooLarge(
                "The uploaded file exceeds the configured size limit.".to_string(),
            );
        }
        source = current.source();
    }

    ApiError::MissingFile("The multipart form body could not be read.".to_string())
}
