//! Represents a single gated file transfer.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Lifecycle of a transfer. Transitions are one-directional:
/// `Created -> OtpPending -> OtpVerified -> Downloaded`.
///
/// `OtpPending` may be re-entered by clearing or replacing the code; the
/// label itself never moves backwards. `Downloaded` is terminal.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Created,
    OtpPending,
    OtpVerified,
    Downloaded,
}

/// Verification-code sub-state of a transfer.
///
/// A code and its expiry always travel together; a code without an expiry
/// is unrepresentable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OtpState {
    /// No code has been issued, or the last one was cleared.
    NoCode,
    /// A code is live until `expires_at` (inclusive).
    Pending {
        code: String,
        expires_at: DateTime<Utc>,
    },
}

impl OtpState {
    /// Whether a code is currently attached to the record.
    pub fn is_pending(&self) -> bool {
        matches!(self, OtpState::Pending { .. })
    }
}

/// A single file transfer: one file, one recipient, at most one download.
///
/// Records are owned exclusively by the registry; nothing outside it may
/// mutate these fields.
#[derive(Clone, Debug)]
pub struct Transfer {
    /// Opaque unique handle used in all recipient-facing URLs. Never reused.
    pub id: Uuid,

    /// Original display name of the uploaded file.
    pub file_name: String,

    /// Opaque reference into the file store. The registry never opens it.
    pub file_ref: Uuid,

    /// Size of the stored payload, reported in the notification mail.
    pub size_bytes: u64,

    /// Destination for every notification tied to this transfer.
    pub recipient_email: String,

    /// Current verification-code state.
    pub otp: OtpState,

    /// Lifecycle state, see [`TransferStatus`].
    pub status: TransferStatus,

    /// When the transfer was created; drives stale-record reclamation.
    pub created_at: DateTime<Utc>,
}

impl Transfer {
    /// Public view of the record. Never carries the code or its expiry.
    pub fn summary(&self) -> TransferSummary {
        TransferSummary {
            id: self.id,
            file_name: self.file_name.clone(),
            size_bytes: self.size_bytes,
            status: self.status,
            created_at: self.created_at,
        }
    }
}

/// What the outside world may see about a transfer.
#[derive(Serialize, Clone, Debug)]
pub struct TransferSummary {
    pub id: Uuid,
    pub file_name: String,
    pub size_bytes: u64,
    pub status: TransferStatus,
    pub created_at: DateTime<Utc>,
}
