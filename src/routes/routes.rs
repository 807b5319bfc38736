//! Defines routes for the gated file-transfer service.
//!
//! ## Structure
//! - **Pages**
//!   - `GET  /`       — sender upload form
//!   - `GET  /d/{id}` — recipient verification page (404 for unknown ids)
//!
//! - **API**
//!   - `POST /api/transfers`             — upload a file, create a transfer
//!   - `GET  /api/transfers/{id}`        — public status view
//!   - `POST /api/transfers/{id}/otp`    — issue a verification code
//!   - `POST /api/transfers/{id}/verify` — submit a code
//!   - `GET  /api/download/{id}`         — the single permitted download
//!
//! Health endpoints (`/healthz`, `/readyz`) are mounted at the root.

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        page_handlers::{download_page, sender_page},
        transfer_handlers::{
            create_transfer, download_file, request_code, transfer_status, verify_code,
        },
    },
    services::transfer::TransferService,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

/// Build and return the router for the whole HTTP surface.
///
/// The router carries shared state (`TransferService`) to all handlers.
pub fn routes(max_upload_bytes: usize) -> Router<TransferService> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // pages
        .route("/", get(sender_page))
        .route("/d/{id}", get(download_page))
        // transfer lifecycle API
        .route("/api/transfers", post(create_transfer))
        .route("/api/transfers/{id}", get(transfer_status))
        .route("/api/transfers/{id}/otp", post(request_code))
        .route("/api/transfers/{id}/verify", post(verify_code))
        .route("/api/download/{id}", get(download_file))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
}
