//! Operator routes over the data file: backups, restore, import and reset.
//! Every handler here requires the admin key.

use axum::{
    Json,
    body::{Body, Bytes},
    extract::{Multipart, Path, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::info;

use crate::handlers::Success;
use crate::middleware::RequireAdminKey;
use crate::service::backup::{BackupFormat, BackupInfo, ResetReport, content_disposition};
use crate::{AdminError, router::AdminState};

#[derive(Debug, Serialize)]
pub struct BackupList {
    pub backups: Vec<BackupInfo>,
}

#[derive(Debug, Deserialize)]
pub struct CreateBackupRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub format: BackupFormat,
}

#[derive(Debug, Deserialize)]
pub struct RestoreRequest {
    #[serde(alias = "backupId")]
    pub id: String,
}

pub async fn list_backups(
    _auth: RequireAdminKey,
    State(state): State<AdminState>,
) -> Result<Json<BackupList>, AdminError> {
    let backups = state.backups.list_backups().await?;
    Ok(Json(BackupList { backups }))
}

pub async fn create_backup(
    _auth: RequireAdminKey,
    State(state): State<AdminState>,
    Json(body): Json<CreateBackupRequest>,
) -> Result<(StatusCode, Json<BackupInfo>), AdminError> {
    let info = state.backups.create_backup(&body.name, body.format).await?;
    Ok((StatusCode::CREATED, Json(info)))
}

pub async fn delete_backup(
    _auth: RequireAdminKey,
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> Result<Json<Success>, AdminError> {
    state.backups.delete_backup(&id).await?;
    Ok(Json(Success::OK))
}

pub async fn download_backup(
    _auth: RequireAdminKey,
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> Result<Response, AdminError> {
    let download = state.backups.download_backup(&id).await?;
    let disposition = HeaderValue::from_str(&content_disposition(&download.file_name))
        .map_err(|e| AdminError::Validation(format!("unusable file name: {e}")))?;
    let headers = [
        (
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/octet-stream"),
        ),
        (header::CONTENT_LENGTH, HeaderValue::from(download.size)),
        (header::CONTENT_DISPOSITION, disposition),
    ];
    Ok((headers, file_body(download.file)).into_response())
}

const DOWNLOAD_CHUNK: usize = 64 * 1024;

/// Stream a file in fixed-size chunks instead of buffering it whole.
fn file_body(file: File) -> Body {
    let chunks = futures::stream::try_unfold(file, |mut file| async move {
        let mut buf = vec![0u8; DOWNLOAD_CHUNK];
        let read: std::io::Result<usize> = file.read(&mut buf).await;
        read.map(move |n| {
            buf.truncate(n);
            (n > 0).then(|| (Bytes::from(buf), file))
        })
    });
    Body::from_stream(chunks)
}

pub async fn restore_backup(
    _auth: RequireAdminKey,
    State(state): State<AdminState>,
    Json(body): Json<RestoreRequest>,
) -> Result<Json<BackupInfo>, AdminError> {
    Ok(Json(state.backups.restore_backup(&body.id).await?))
}

/// POST /api/database/import, multipart with a `file` field.
pub async fn import_backup(
    _auth: RequireAdminKey,
    State(state): State<AdminState>,
    mut multipart: Multipart,
) -> Result<Json<BackupInfo>, AdminError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AdminError::Upload(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field
            .file_name()
            .map(str::to_owned)
            .ok_or_else(|| AdminError::Upload("`file` field has no file name".to_string()))?;
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AdminError::Upload(e.body_text()))?;
        info!(file = %file_name, size = bytes.len(), "backup upload received");
        let imported = state.backups.import_backup(&file_name, &bytes).await?;
        return Ok(Json(imported));
    }
    Err(AdminError::Upload("missing `file` field".to_string()))
}

/// POST /api/database/reset, retried per the configured policy.
pub async fn reset_database(
    _auth: RequireAdminKey,
    State(state): State<AdminState>,
) -> Result<Json<ResetReport>, AdminError> {
    let report = state
        .reset_retry
        .run("reset database", || state.backups.reset_database())
        .await?;
    Ok(Json(report))
}
