//! Attachment upload/download handlers
//!
//! Uploaded bytes live on disk under `storage.files_path`, named by file id.
//! The returned `Media` value is what clients attach to non-text messages.

use axum::{
    body::Body,
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::{header, StatusCode},
    response::Response,
    Json,
};
use bytes::Bytes;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::{
    error::{AppError, Result},
    models::*,
    AppState,
};

use super::AuthUser;

fn file_path(state: &AppState, file_id: &str) -> PathBuf {
    PathBuf::from(&state.config.storage.files_path).join(file_id)
}

/// Bodies cut off by the request size limit surface as multipart errors
fn multipart_error(context: &str, e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge
    } else {
        AppError::validation(format!("{}: {}", context, e))
    }
}

pub async fn upload_file(
    State(state): State<AppState>,
    auth: AuthUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<Media>>)> {
    let max_size = state.config.limits.max_upload_size_mb * 1024 * 1024;
    let files_path = PathBuf::from(&state.config.storage.files_path);
    fs::create_dir_all(&files_path).await?;

    let mut upload: Option<(String, String, Bytes)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error("Failed to read multipart", e))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or("unnamed").to_string();
        let mime_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();

        let data = field
            .bytes()
            .await
            .map_err(|e| multipart_error("Failed to read file", e))?;

        if data.len() as u64 > max_size {
            return Err(AppError::PayloadTooLarge);
        }

        upload = Some((file_name, mime_type, data));
    }

    let (file_name, mime_type, data) =
        upload.ok_or_else(|| AppError::validation("No file provided"))?;

    let metadata = state
        .storage
        .create_file_metadata(&auth.user_id, &file_name, data.len() as i64, &mime_type)
        .await?;

    let mut file = fs::File::create(files_path.join(&metadata.file_id)).await?;
    file.write_all(&data).await?;
    file.flush().await?;

    tracing::info!(
        "File uploaded: id={}, name={}, size={}",
        metadata.file_id,
        metadata.file_name,
        metadata.file_size
    );

    let media = Media {
        url: format!("/api/files/{}", metadata.file_id),
        public_id: Some(metadata.file_id),
        file_name: Some(metadata.file_name),
        file_size: Some(metadata.file_size),
        mime_type: Some(metadata.mime_type),
    };

    Ok((StatusCode::CREATED, Json(ApiResponse::ok("File uploaded", media))))
}

pub async fn download_file(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(file_id): Path<String>,
) -> Result<Response> {
    let metadata = state
        .storage
        .get_file_metadata(&file_id)
        .await?
        .ok_or_else(|| AppError::not_found("File not found"))?;

    let path = file_path(&state, &metadata.file_id);
    if !path.exists() {
        return Err(AppError::not_found("File not found"));
    }

    let data = fs::read(&path).await?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, &metadata.mime_type)
        .header(header::CONTENT_LENGTH, data.len())
        .header(
            header::CONTENT_DISPOSITION,
            format!("inline; filename=\"{}\"", metadata.file_name.replace('"', "")),
        )
        .body(Body::from(data))
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to build response: {}", e)))
}

/// Only the uploader may delete an attachment
pub async fn delete_file(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(file_id): Path<String>,
) -> Result<Json<ApiResponse<()>>> {
    let metadata = state
        .storage
        .get_file_metadata(&file_id)
        .await?
        .ok_or_else(|| AppError::not_found("File not found"))?;

    if metadata.uploader_id != auth.user_id {
        return Err(AppError::forbidden("Only the uploader can delete this file"));
    }

    let path = file_path(&state, &metadata.file_id);
    if path.exists() {
        fs::remove_file(&path).await?;
    }

    state.storage.delete_file_metadata(&metadata.file_id).await?;

    Ok(Json(ApiResponse::message("File deleted")))
}
