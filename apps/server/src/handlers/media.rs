//! Media endpoints under `/api`.
//!
//! The caller's id travels in `user_id`, as a query parameter or as a multipart part
//! preceding the files. Single uploads are streamed straight into storage when the id
//! is already known; batch uploads are buffered part by part because the whole batch
//! is handed to storage at once.

use crate::error::ApiError;
use amora_storage::{BatchReport, ItemOutcome, MediaType, Removal, Storage, Upload};
use axum::Json;
use axum::extract::multipart::{Field, MultipartError};
use axum::extract::{Multipart, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::channel::mpsc;
use futures::{SinkExt, StreamExt, stream};
use serde::{Deserialize, Serialize};
use std::io;
use tracing::debug;

pub(crate) const PARAM_USER_ID: &str = "user_id";
pub(crate) const PARAM_FILE: &str = "file";
pub(crate) const PARAM_FILES: &str = "files";

const OCTET_STREAM: &str = "application/octet-stream";
/// Chunks buffered between the request body and the disk writer.
const CHANNEL_DEPTH: usize = 8;

#[derive(Debug, Deserialize)]
pub(crate) struct UserQuery {
    user_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FileQuery {
    user_id: String,
    file_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct UploadQuery {
    user_id: Option<String>,
}

/// Per-file result as returned to clients.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub(crate) enum OutcomeBody {
    Stored { name: String, bytes: u64 },
    Failed { name: String, reason: &'static str, message: String },
}

impl From<&ItemOutcome> for OutcomeBody {
    fn from(outcome: &ItemOutcome) -> Self {
        match &outcome.result {
            Ok(bytes) => Self::Stored { name: outcome.name.clone(), bytes: *bytes },
            Err(failure) => Self::Failed {
                name: outcome.name.clone(),
                reason: failure.kind(),
                message: failure.to_string(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub(crate) enum BatchBody {
    Empty,
    Processed { stored: usize, items: Vec<OutcomeBody> },
}

impl From<&BatchReport> for BatchBody {
    fn from(report: &BatchReport) -> Self {
        match report {
            BatchReport::Empty => Self::Empty,
            BatchReport::Processed(items) => Self::Processed {
                stored: report.stored_count(),
                items: items.iter().map(OutcomeBody::from).collect(),
            },
        }
    }
}

pub(crate) async fn get_resource(
    State(storage): State<Storage>,
    Query(query): Query<FileQuery>,
) -> Result<Response, ApiError> {
    let file = storage
        .read_file(&query.user_id, &query.file_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("File not found: {}", query.file_id)))?;

    let content_type = file.media_type.map_or(OCTET_STREAM, MediaType::as_str);
    Ok(([(header::CONTENT_TYPE, content_type)], file.bytes).into_response())
}

pub(crate) async fn list_uploads(
    State(storage): State<Storage>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(storage.list_files(&query.user_id).await?))
}

pub(crate) async fn upload_one(
    State(storage): State<Storage>,
    Query(query): Query<UploadQuery>,
    mut multipart: Multipart,
) -> Result<Json<OutcomeBody>, ApiError> {
    let mut user_id = query.user_id;
    let mut pending: Option<Upload> = None;
    let mut outcome: Option<ItemOutcome> = None;

    loop {
        let mut field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            // A body that dies after the file part still yields that part's outcome.
            Err(_) if pending.is_some() => break,
            Err(err) => return Err(err.into()),
        };

        let part = field.name().map(str::to_owned);
        match part.as_deref() {
            Some(PARAM_USER_ID) => user_id = Some(field.text().await?),
            Some(PARAM_FILE) if pending.is_none() => {
                let name = upload_name(&field);
                if let Some(user) = user_id.as_deref() {
                    outcome = Some(stream_into(&storage, user, name, &mut field).await?);
                    break;
                }
                pending = Some(buffer(name, field).await.0);
            },
            _ => {},
        }
    }

    let outcome = match (outcome, pending) {
        (Some(outcome), _) => outcome,
        (None, Some(upload)) => {
            let user = user_id.ok_or_else(|| ApiError::bad_request("Missing user_id"))?;
            storage.save_one(&user, upload).await?
        },
        (None, None) => return Err(ApiError::bad_request("Missing file part")),
    };

    Ok(Json(OutcomeBody::from(&outcome)))
}

pub(crate) async fn upload_many(
    State(storage): State<Storage>,
    Query(query): Query<UploadQuery>,
    mut multipart: Multipart,
) -> Result<Json<BatchBody>, ApiError> {
    let mut user_id = query.user_id;
    let mut uploads = Vec::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(_) if !uploads.is_empty() => break,
            Err(err) => return Err(err.into()),
        };

        let part = field.name().map(str::to_owned);
        match part.as_deref() {
            Some(PARAM_USER_ID) => user_id = Some(field.text().await?),
            Some(PARAM_FILES) => {
                let name = upload_name(&field);
                let (upload, complete) = buffer(name, field).await;
                uploads.push(upload);
                if !complete {
                    break;
                }
            },
            _ => {},
        }
    }

    let user = user_id.ok_or_else(|| ApiError::bad_request("Missing user_id"))?;
    let report = storage.save_many(&user, uploads).await?;
    Ok(Json(BatchBody::from(&report)))
}

pub(crate) async fn delete_upload(
    State(storage): State<Storage>,
    Query(query): Query<FileQuery>,
) -> Result<StatusCode, ApiError> {
    Ok(removal_status(storage.delete_file(&query.user_id, &query.file_id).await?))
}

pub(crate) async fn delete_all(
    State(storage): State<Storage>,
    Query(query): Query<UserQuery>,
) -> Result<StatusCode, ApiError> {
    Ok(removal_status(storage.delete_namespace(&query.user_id).await?))
}

const fn removal_status(removal: Removal) -> StatusCode {
    match removal {
        Removal::Deleted => StatusCode::ACCEPTED,
        Removal::NotFound => StatusCode::NOT_MODIFIED,
    }
}

fn upload_name(field: &Field<'_>) -> String {
    field.file_name().map(str::to_owned).unwrap_or_default()
}

/// A body that stops mid-part is a client abort.
fn aborted(err: &MultipartError) -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionAborted, err.body_text())
}

/// Pipes one part into storage while it is still arriving.
async fn stream_into(
    storage: &Storage,
    user_id: &str,
    name: String,
    field: &mut Field<'_>,
) -> Result<ItemOutcome, ApiError> {
    let (mut tx, rx) = mpsc::channel::<io::Result<Bytes>>(CHANNEL_DEPTH);
    let upload = Upload::new(name, rx.boxed());

    let pump = async move {
        loop {
            let item = match field.chunk().await {
                Ok(Some(chunk)) => Ok(chunk),
                Ok(None) => break,
                Err(err) => Err(aborted(&err)),
            };
            let failed = item.is_err();
            // Storage hangs up early on rejection or size limits.
            if tx.send(item).await.is_err() || failed {
                break;
            }
        }
    };

    let (outcome, ()) = tokio::join!(storage.save_one(user_id, upload), pump);
    Ok(outcome?)
}

/// Reads a whole part into memory. The flag is `false` when the body broke off.
async fn buffer(name: String, field: Field<'_>) -> (Upload, bool) {
    match field.bytes().await {
        Ok(bytes) => (Upload::from_bytes(name, bytes), true),
        Err(err) => {
            debug!(file = %name, error = %err, "Upload part ended early");
            let err = aborted(&err);
            (Upload::new(name, stream::once(async move { Err(err) }).boxed()), false)
        },
    }
}
