//! HTTP handlers for the transfer lifecycle.
//!
//! These only translate HTTP shapes; every lifecycle decision lives in
//! `TransferService` and the registry behind it. Downloads stream from disk
//! without buffering the payload in memory.

use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::io;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::{
    errors::AppError,
    models::transfer::TransferSummary,
    services::transfer::TransferService,
};

#[derive(Debug, Serialize)]
pub struct CreateTransferResponse {
    pub id: Uuid,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct RequestCodeResponse {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyCodeRequest {
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyCodeResponse {
    pub file_name: String,
    pub download_url: String,
}

/// POST `/api/transfers` — multipart upload creating a transfer.
///
/// Expects a `file` part plus a `recipient_email` text part (and an optional
/// `sender_email`). The file is persisted before the record is created; if
/// the notification cannot be delivered the whole creation is rolled back.
pub async fn create_transfer(
    State(service): State<TransferService>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut stored = None;
    let mut file_name = None;
    let mut recipient_email = None;
    let mut sender_email = None;

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        AppError::new(StatusCode::BAD_REQUEST, format!("multipart error: {err}"))
    })? {
        match field.name().unwrap_or("") {
            // Only the first file part counts; extras are ignored.
            "file" if stored.is_none() => {
                file_name = Some(field.file_name().unwrap_or("download.bin").to_string());
                let data = field.bytes().await.map_err(|err| {
                    AppError::new(
                        StatusCode::BAD_REQUEST,
                        format!("failed to read upload: {err}"),
                    )
                })?;
                let stream = futures::stream::iter([io::Result::Ok(data)]);
                stored = Some(service.store_upload(stream).await?);
            }
            "recipient_email" => {
                recipient_email = Some(read_text_field(field).await?);
            }
            "sender_email" => {
                sender_email = Some(read_text_field(field).await?);
            }
            _ => {}
        }
    }

    let (Some(stored), Some(file_name)) = (stored, file_name) else {
        return Err(AppError::new(StatusCode::BAD_REQUEST, "no file was uploaded"));
    };
    let Some(recipient_email) = recipient_email.filter(|email| !email.trim().is_empty()) else {
        // The payload already landed on disk; don't leave it orphaned.
        service.discard_upload(stored.file_ref).await;
        return Err(AppError::new(
            StatusCode::BAD_REQUEST,
            "recipient_email is required",
        ));
    };

    let id = service
        .create_transfer(stored, &file_name, &recipient_email, sender_email.as_deref())
        .await?;

    Ok(Json(CreateTransferResponse {
        id,
        message: format!("File uploaded and retrieval link sent to {recipient_email}."),
    }))
}

/// GET `/api/transfers/{id}` — public status view (never the code).
pub async fn transfer_status(
    State(service): State<TransferService>,
    Path(id): Path<Uuid>,
) -> Result<Json<TransferSummary>, AppError> {
    Ok(Json(service.get_transfer(id).await?))
}

/// POST `/api/transfers/{id}/otp` — issue and deliver a verification code.
pub async fn request_code(
    State(service): State<TransferService>,
    Path(id): Path<Uuid>,
) -> Result<Json<RequestCodeResponse>, AppError> {
    service.request_code(id).await?;
    Ok(Json(RequestCodeResponse {
        message: "A verification code has been sent to the recipient's email.".into(),
    }))
}

/// POST `/api/transfers/{id}/verify` — submit a code; on success returns the
/// single-use download URL.
pub async fn verify_code(
    State(service): State<TransferService>,
    Path(id): Path<Uuid>,
    Json(payload): Json<VerifyCodeRequest>,
) -> Result<Json<VerifyCodeResponse>, AppError> {
    let auth = service.verify_code(id, &payload.code).await?;
    let download_url = service.download_url(auth.download_ref);
    Ok(Json(VerifyCodeResponse {
        file_name: auth.file_name,
        download_url,
    }))
}

/// GET `/api/download/{id}` — the single permitted retrieval, streamed.
pub async fn download_file(
    State(service): State<TransferService>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let (claim, file) = service.consume_download(id).await?;

    let stream = ReaderStream::new(file);
    let mut response = Response::new(Body::from_stream(stream));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&claim.size_bytes.to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("0")),
    );
    let disposition = format!("attachment; filename=\"{}\"", sanitize_filename(&claim.file_name));
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}

async fn read_text_field(field: axum::extract::multipart::Field<'_>) -> Result<String, AppError> {
    field.text().await.map_err(|err| {
        AppError::new(StatusCode::BAD_REQUEST, format!("invalid form field: {err}"))
    })
}

/// Strip quotes and control bytes so the name cannot break the header.
fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| if c == '"' || c.is_control() { '_' } else { c })
        .collect()
}
