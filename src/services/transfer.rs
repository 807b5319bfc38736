//! Transfer orchestration: code issuance, verification, and the download
//! gate, wired to the storage and mail collaborators.
//!
//! Record mutations are committed through the registry first; mail delivery
//! and file streaming always happen after the critical section. A failed
//! delivery is reported to the caller and never retried.

use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use futures::Stream;
use rand::Rng;
use std::{io, path::Path, sync::Arc};
use tokio::fs::File;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::TransferError;
use crate::models::transfer::TransferSummary;
use crate::services::{
    clock::Clock,
    file_store::{FileStore, StoredFile},
    mailer::Mailer,
    registry::{Authorization, DownloadClaim, TransferRegistry},
};

/// How long an issued code stays valid.
const OTP_TTL_MINUTES: i64 = 5;
/// The fixed-width code space: every code is six digits.
const OTP_MIN: u32 = 100_000;
const OTP_MAX: u32 = 999_999;
/// Abandoned transfers are reclaimed after this many days.
const TRANSFER_TTL_DAYS: i64 = 7;

/// Front door for the whole transfer lifecycle. Cheap to clone; shared as
/// router state.
#[derive(Clone)]
pub struct TransferService {
    registry: Arc<TransferRegistry>,
    files: FileStore,
    mailer: Arc<dyn Mailer>,
    clock: Arc<dyn Clock>,
    base_url: String,
}

impl TransferService {
    pub fn new(
        registry: Arc<TransferRegistry>,
        files: FileStore,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            files,
            mailer,
            clock,
            base_url: base_url.into(),
        }
    }

    /// Persist uploaded bytes. Must succeed before a record may be created;
    /// a failure here is `StorageUnavailable` and nothing is registered.
    pub async fn store_upload<S>(&self, stream: S) -> Result<StoredFile, TransferError>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        Ok(self.files.store_stream(stream).await?)
    }

    /// Drop a stored payload that never became a transfer.
    pub async fn discard_upload(&self, file_ref: Uuid) {
        self.files.discard(file_ref).await;
    }

    /// Register a transfer for an already-persisted file and notify the
    /// recipient of the retrieval link.
    ///
    /// An unreachable recipient makes the transfer meaningless, so a failed
    /// notification rolls the whole creation back: the record is removed and
    /// the stored payload discarded.
    pub async fn create_transfer(
        &self,
        stored: StoredFile,
        file_name: &str,
        recipient_email: &str,
        sender_email: Option<&str>,
    ) -> Result<Uuid, TransferError> {
        let id = self
            .registry
            .insert(
                stored.file_ref,
                file_name,
                stored.size_bytes,
                recipient_email,
                self.clock.now(),
            )
            .await;

        let link = format!("{}/d/{}", self.base_url, id);
        let subject = match sender_email {
            Some(sender) => format!("[Secure] {file_name} from {sender} awaits verification"),
            None => format!("[Secure] {file_name} awaits verification"),
        };
        let body = notification_body(file_name, stored.size_bytes, &link);

        if let Err(err) = self.mailer.send(recipient_email, &subject, body).await {
            warn!(id = %id, error = %err, "notification delivery failed, rolling back transfer");
            self.registry.remove(id).await;
            self.files.discard(stored.file_ref).await;
            return Err(TransferError::DeliveryFailed(err));
        }

        info!(id = %id, file_name, "transfer created, retrieval link sent");
        Ok(id)
    }

    /// Public status view.
    pub async fn get_transfer(&self, id: Uuid) -> Result<TransferSummary, TransferError> {
        self.registry.get(id).await.ok_or(TransferError::NotFound)
    }

    /// Issue a fresh verification code and deliver it to the recipient.
    ///
    /// The code is committed to the record before delivery is attempted, and
    /// re-issuance invalidates any previous code immediately. If delivery
    /// fails the code is cleared again but the record survives — unlike the
    /// creation path, which deletes everything.
    pub async fn request_code(&self, id: Uuid) -> Result<(), TransferError> {
        let code = generate_code();
        let expires_at = self.clock.now() + Duration::minutes(OTP_TTL_MINUTES);
        let recipient = self.registry.arm_code(id, &code, expires_at).await?;

        let subject = format!("Your download verification code: {code}");
        let body = code_body(&code, expires_at);
        if let Err(err) = self.mailer.send(&recipient, &subject, body).await {
            warn!(id = %id, error = %err, "code delivery failed, disarming code");
            self.registry.disarm_code(id).await;
            return Err(TransferError::DeliveryFailed(err));
        }

        info!(id = %id, "verification code issued");
        Ok(())
    }

    /// Check a submitted code against the record.
    pub async fn verify_code(
        &self,
        id: Uuid,
        submitted: &str,
    ) -> Result<Authorization, TransferError> {
        self.registry.verify_code(id, submitted, self.clock.now()).await
    }

    /// Claim the single permitted download and open its payload.
    ///
    /// The claim is committed before the file is touched; a storage failure
    /// after that point leaves the record consumed. A partially failed
    /// transfer does not get a second chance.
    pub async fn consume_download(
        &self,
        id: Uuid,
    ) -> Result<(DownloadClaim, File), TransferError> {
        let claim = self.registry.consume(id).await?;
        let file = self.files.open(claim.file_ref).await?;
        Ok((claim, file))
    }

    /// Where a verified recipient fetches the payload.
    pub fn download_url(&self, download_ref: Uuid) -> String {
        format!("{}/api/download/{}", self.base_url, download_ref)
    }

    /// Root of the payload store, for readiness probes.
    pub fn storage_root(&self) -> &Path {
        self.files.base_path()
    }

    /// Reclaim transfers older than the retention window, discarding their
    /// payloads. Returns how many were removed.
    pub async fn purge_stale(&self) -> usize {
        let cutoff = self.clock.now() - Duration::days(TRANSFER_TTL_DAYS);
        let removed = self.registry.purge_created_before(cutoff).await;
        for transfer in &removed {
            self.files.discard(transfer.file_ref).await;
        }
        if !removed.is_empty() {
            info!(count = removed.len(), "reclaimed stale transfers");
        }
        removed.len()
    }
}

/// Six digits, uniform over the whole width.
fn generate_code() -> String {
    rand::thread_rng().gen_range(OTP_MIN..=OTP_MAX).to_string()
}

fn notification_body(file_name: &str, size_bytes: u64, link: &str) -> String {
    let size_mb = size_bytes as f64 / 1024.0 / 1024.0;
    format!(
        "<p>A file is waiting for you.</p>\
         <ul><li>Name: <b>{file_name}</b></li><li>Size: {size_mb:.2} MB</li></ul>\
         <p><a href=\"{link}\">Continue to code verification</a></p>\
         <p>The link expires in {TRANSFER_TTL_DAYS} days.</p>"
    )
}

fn code_body(code: &str, expires_at: DateTime<Utc>) -> String {
    format!(
        "<p>Your six-digit verification code is: <b>{code}</b></p>\
         <p>It is valid until {}.</p>\
         <p>Enter it on the download page right away.</p>",
        expires_at.format("%H:%M:%S UTC")
    )
}
