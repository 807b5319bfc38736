//! Embedded frontend pages: the sender upload form and the recipient
//! verification page, compiled into the binary.

use axum::{
    extract::{Path, State},
    response::Html,
};
use uuid::Uuid;

use crate::{errors::AppError, services::transfer::TransferService};

/// GET `/` — sender upload form.
pub async fn sender_page() -> Html<&'static str> {
    Html(include_str!("../../public/sender.html"))
}

/// GET `/d/{id}` — recipient verification page. Unknown ids get a 404
/// rather than a page for a transfer that does not exist.
pub async fn download_page(
    State(service): State<TransferService>,
    Path(id): Path<Uuid>,
) -> Result<Html<&'static str>, AppError> {
    service.get_transfer(id).await?;
    Ok(Html(include_str!("../../public/download.html")))
}
