//! The transfer registry — single source of truth for all lifecycle state.
//!
//! Every state-changing operation is one atomic read-modify-write under the
//! registry lock, so two concurrent claims on the same transfer resolve to
//! exactly one winner. No mail or file I/O ever happens while the lock is
//! held: callers commit the record mutation first and perform delivery or
//! streaming outside the critical section.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::errors::TransferError;
use crate::models::transfer::{OtpState, Transfer, TransferStatus, TransferSummary};

/// A successful code verification: the capability to download, plus what to
/// call the file. The capability is the transfer id — never the code itself.
#[derive(Clone, Debug)]
pub struct Authorization {
    pub download_ref: Uuid,
    pub file_name: String,
}

/// A claimed download. The terminal transition is already committed; the
/// holder may stream the payload exactly once.
#[derive(Clone, Debug)]
pub struct DownloadClaim {
    pub file_ref: Uuid,
    pub file_name: String,
    pub size_bytes: u64,
}

/// Owning store of all transfer records.
///
/// One global mutex guards the map. Critical sections are single map
/// operations, so per-record locking is not worth its bookkeeping here.
#[derive(Debug, Default)]
pub struct TransferRegistry {
    records: Mutex<HashMap<Uuid, Transfer>>,
}

impl TransferRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh id and store a record in `Created` state.
    pub async fn insert(
        &self,
        file_ref: Uuid,
        file_name: &str,
        size_bytes: u64,
        recipient_email: &str,
        now: DateTime<Utc>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        let transfer = Transfer {
            id,
            file_name: file_name.to_string(),
            file_ref,
            size_bytes,
            recipient_email: recipient_email.to_string(),
            otp: OtpState::NoCode,
            status: TransferStatus::Created,
            created_at: now,
        };
        self.records.lock().await.insert(id, transfer);
        debug!(id = %id, "registered transfer");
        id
    }

    /// Public view of a record. The code and its expiry are never exposed.
    pub async fn get(&self, id: Uuid) -> Option<TransferSummary> {
        self.records.lock().await.get(&id).map(Transfer::summary)
    }

    /// Remove a record outright. Only used to roll back a creation whose
    /// notification could not be delivered.
    pub async fn remove(&self, id: Uuid) -> Option<Transfer> {
        self.records.lock().await.remove(&id)
    }

    /// Attach a freshly issued code, replacing any pending one — only the
    /// newest code is ever valid. Returns the address the code must be
    /// delivered to.
    pub async fn arm_code(
        &self,
        id: Uuid,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<String, TransferError> {
        let mut records = self.records.lock().await;
        let transfer = records.get_mut(&id).ok_or(TransferError::NotFound)?;
        if transfer.status == TransferStatus::Downloaded {
            return Err(TransferError::AlreadyConsumed);
        }
        transfer.otp = OtpState::Pending {
            code: code.to_string(),
            expires_at,
        };
        if transfer.status == TransferStatus::Created {
            transfer.status = TransferStatus::OtpPending;
        }
        Ok(transfer.recipient_email.clone())
    }

    /// Clear a pending code whose delivery failed. The record itself
    /// survives and status is never regressed.
    pub async fn disarm_code(&self, id: Uuid) {
        if let Some(transfer) = self.records.lock().await.get_mut(&id) {
            transfer.otp = OtpState::NoCode;
        }
    }

    /// Check a submitted code.
    ///
    /// Checks run in a fixed order: record existence and terminal state,
    /// then exact string equality, then expiry. Only expiry clears the
    /// code — a plain mismatch may be retried until the code lapses.
    pub async fn verify_code(
        &self,
        id: Uuid,
        submitted: &str,
        now: DateTime<Utc>,
    ) -> Result<Authorization, TransferError> {
        let mut records = self.records.lock().await;
        let transfer = records.get_mut(&id).ok_or(TransferError::NotFound)?;
        if transfer.status == TransferStatus::Downloaded {
            return Err(TransferError::AlreadyConsumed);
        }
        let expires_at = match &transfer.otp {
            // A cleared code can never match.
            OtpState::NoCode => return Err(TransferError::InvalidCode),
            OtpState::Pending { code, expires_at } => {
                if code != submitted {
                    return Err(TransferError::InvalidCode);
                }
                *expires_at
            }
        };
        if now > expires_at {
            transfer.otp = OtpState::NoCode;
            return Err(TransferError::Expired);
        }
        transfer.status = TransferStatus::OtpVerified;
        debug!(id = %id, "code verified, download authorized");
        Ok(Authorization {
            download_ref: transfer.id,
            file_name: transfer.file_name.clone(),
        })
    }

    /// Claim the single permitted download.
    ///
    /// Authorized only while the record is `OtpVerified` with its code still
    /// present. The winning caller atomically moves the record to
    /// `Downloaded` and clears the code, so a concurrent claim on the same
    /// id loses with `Forbidden`.
    pub async fn consume(&self, id: Uuid) -> Result<DownloadClaim, TransferError> {
        let mut records = self.records.lock().await;
        let transfer = records.get_mut(&id).ok_or(TransferError::NotFound)?;
        if transfer.status != TransferStatus::OtpVerified || !transfer.otp.is_pending() {
            return Err(TransferError::Forbidden);
        }
        transfer.status = TransferStatus::Downloaded;
        transfer.otp = OtpState::NoCode;
        debug!(id = %id, "transfer consumed");
        Ok(DownloadClaim {
            file_ref: transfer.file_ref,
            file_name: transfer.file_name.clone(),
            size_bytes: transfer.size_bytes,
        })
    }

    /// Drop every record created strictly before `cutoff`, returning the
    /// removed records so their payloads can be discarded.
    pub async fn purge_created_before(&self, cutoff: DateTime<Utc>) -> Vec<Transfer> {
        let mut records = self.records.lock().await;
        let stale: Vec<Uuid> = records
            .values()
            .filter(|t| t.created_at < cutoff)
            .map(|t| t.id)
            .collect();
        stale.iter().filter_map(|id| records.remove(id)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
    }

    async fn seeded(registry: &TransferRegistry) -> Uuid {
        registry
            .insert(Uuid::new_v4(), "report.pdf", 1024, "recipient@example.com", start())
            .await
    }

    #[tokio::test]
    async fn insert_then_get_returns_created_record() {
        let registry = TransferRegistry::new();
        let id = seeded(&registry).await;
        let summary = registry.get(id).await.expect("record should exist");
        assert_eq!(summary.status, TransferStatus::Created);
        assert_eq!(summary.file_name, "report.pdf");
        // No code issued yet, so any submission reads as a mismatch.
        let err = registry.verify_code(id, "123456", start()).await.unwrap_err();
        assert!(matches!(err, TransferError::InvalidCode));
    }

    #[tokio::test]
    async fn get_unknown_id_is_none() {
        let registry = TransferRegistry::new();
        assert!(registry.get(Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn arm_code_rejects_unknown_and_consumed() {
        let registry = TransferRegistry::new();
        let expires = start() + Duration::minutes(5);
        let err = registry
            .arm_code(Uuid::new_v4(), "111111", expires)
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::NotFound));

        let id = seeded(&registry).await;
        registry.arm_code(id, "111111", expires).await.unwrap();
        registry.verify_code(id, "111111", start()).await.unwrap();
        registry.consume(id).await.unwrap();
        let err = registry.arm_code(id, "222222", expires).await.unwrap_err();
        assert!(matches!(err, TransferError::AlreadyConsumed));
    }

    #[tokio::test]
    async fn reissue_invalidates_previous_code() {
        let registry = TransferRegistry::new();
        let id = seeded(&registry).await;
        let expires = start() + Duration::minutes(5);
        registry.arm_code(id, "111111", expires).await.unwrap();
        registry.arm_code(id, "222222", expires).await.unwrap();
        let err = registry.verify_code(id, "111111", start()).await.unwrap_err();
        assert!(matches!(err, TransferError::InvalidCode));
        assert!(registry.verify_code(id, "222222", start()).await.is_ok());
    }

    #[tokio::test]
    async fn mismatch_does_not_clear_code() {
        let registry = TransferRegistry::new();
        let id = seeded(&registry).await;
        let expires = start() + Duration::minutes(5);
        registry.arm_code(id, "654321", expires).await.unwrap();
        for _ in 0..3 {
            let err = registry.verify_code(id, "000000", start()).await.unwrap_err();
            assert!(matches!(err, TransferError::InvalidCode));
        }
        assert!(registry.verify_code(id, "654321", start()).await.is_ok());
    }

    #[tokio::test]
    async fn code_valid_exactly_at_expiry() {
        let registry = TransferRegistry::new();
        let id = seeded(&registry).await;
        let expires = start() + Duration::minutes(5);
        registry.arm_code(id, "654321", expires).await.unwrap();
        assert!(registry.verify_code(id, "654321", expires).await.is_ok());
    }

    #[tokio::test]
    async fn code_expired_one_instant_after_boundary() {
        let registry = TransferRegistry::new();
        let id = seeded(&registry).await;
        let expires = start() + Duration::minutes(5);
        registry.arm_code(id, "654321", expires).await.unwrap();
        let late = expires + Duration::seconds(1);
        let err = registry.verify_code(id, "654321", late).await.unwrap_err();
        assert!(matches!(err, TransferError::Expired));
        // The code was cleared, so retrying it is now a plain mismatch.
        let err = registry.verify_code(id, "654321", late).await.unwrap_err();
        assert!(matches!(err, TransferError::InvalidCode));
    }

    #[tokio::test]
    async fn consume_requires_verification() {
        let registry = TransferRegistry::new();
        let err = registry.consume(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, TransferError::NotFound));

        let id = seeded(&registry).await;
        let err = registry.consume(id).await.unwrap_err();
        assert!(matches!(err, TransferError::Forbidden));

        registry
            .arm_code(id, "654321", start() + Duration::minutes(5))
            .await
            .unwrap();
        let err = registry.consume(id).await.unwrap_err();
        assert!(matches!(err, TransferError::Forbidden));
    }

    #[tokio::test]
    async fn consume_is_single_use() {
        let registry = TransferRegistry::new();
        let id = seeded(&registry).await;
        registry
            .arm_code(id, "654321", start() + Duration::minutes(5))
            .await
            .unwrap();
        registry.verify_code(id, "654321", start()).await.unwrap();

        let claim = registry.consume(id).await.unwrap();
        assert_eq!(claim.file_name, "report.pdf");

        let err = registry.consume(id).await.unwrap_err();
        assert!(matches!(err, TransferError::Forbidden));
        let err = registry.verify_code(id, "654321", start()).await.unwrap_err();
        assert!(matches!(err, TransferError::AlreadyConsumed));
    }

    #[tokio::test]
    async fn concurrent_consume_yields_exactly_one_claim() {
        let registry = Arc::new(TransferRegistry::new());
        let id = seeded(&registry).await;
        registry
            .arm_code(id, "654321", start() + Duration::minutes(5))
            .await
            .unwrap();
        registry.verify_code(id, "654321", start()).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move { registry.consume(id).await }));
        }

        let mut claims = 0;
        let mut refusals = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => claims += 1,
                Err(TransferError::Forbidden) => refusals += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(claims, 1);
        assert_eq!(refusals, 7);
    }

    #[tokio::test]
    async fn disarm_keeps_record_and_status() {
        let registry = TransferRegistry::new();
        let id = seeded(&registry).await;
        registry
            .arm_code(id, "654321", start() + Duration::minutes(5))
            .await
            .unwrap();
        registry.disarm_code(id).await;
        let summary = registry.get(id).await.unwrap();
        assert_eq!(summary.status, TransferStatus::OtpPending);
        let err = registry.verify_code(id, "654321", start()).await.unwrap_err();
        assert!(matches!(err, TransferError::InvalidCode));
    }

    #[tokio::test]
    async fn purge_removes_only_older_records() {
        let registry = TransferRegistry::new();
        let old = registry
            .insert(Uuid::new_v4(), "old.bin", 1, "r@example.com", start())
            .await;
        let fresh = registry
            .insert(
                Uuid::new_v4(),
                "fresh.bin",
                1,
                "r@example.com",
                start() + Duration::days(2),
            )
            .await;

        let removed = registry.purge_created_before(start() + Duration::days(1)).await;
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id, old);
        assert!(registry.get(old).await.is_none());
        assert!(registry.get(fresh).await.is_some());
    }
}
