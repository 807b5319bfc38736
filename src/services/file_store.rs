//! On-disk payload store for uploaded files.
//!
//! Payloads are written to a temp file, fsynced, and renamed into place so a
//! stored ref always points at complete bytes. Refs are opaque UUIDs; the
//! original file name lives on the transfer record, never on disk.

use bytes::Bytes;
use futures::{Stream, StreamExt, pin_mut};
use std::{
    io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("stored file `{0}` not found")]
    NotFound(Uuid),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of persisting one upload.
#[derive(Clone, Copy, Debug)]
pub struct StoredFile {
    pub file_ref: Uuid,
    pub size_bytes: u64,
}

/// Local-disk file store rooted at `base_path`.
#[derive(Clone, Debug)]
pub struct FileStore {
    base_path: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `base_path`, creating the directory if
    /// missing.
    pub async fn new(base_path: impl Into<PathBuf>) -> StoreResult<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path).await?;
        debug!(path = %base_path.display(), "file store initialized");
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn file_path(&self, file_ref: Uuid) -> PathBuf {
        self.base_path.join(file_ref.to_string())
    }

    /// Stream an upload to disk under a fresh opaque ref.
    ///
    /// Bytes are written incrementally to a temp file which is renamed into
    /// the final location only after a successful fsync. The temp file is
    /// removed on any failure.
    pub async fn store_stream<S>(&self, stream: S) -> StoreResult<StoredFile>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        let file_ref = Uuid::new_v4();
        let final_path = self.file_path(file_ref);
        let tmp_path = self.base_path.join(format!(".tmp-{}", file_ref));
        let mut file = File::create(&tmp_path).await?;

        let mut size_bytes: u64 = 0;
        pin_mut!(stream);
        while let Some(chunk_res) = stream.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(StoreError::Io(err));
                }
            };
            size_bytes += chunk.len() as u64;
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StoreError::Io(err));
            }
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }
        if let Err(err) = fs::rename(&tmp_path, &final_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }

        debug!(file_ref = %file_ref, size_bytes, "stored upload");
        Ok(StoredFile {
            file_ref,
            size_bytes,
        })
    }

    /// Open a stored payload for streaming out.
    pub async fn open(&self, file_ref: Uuid) -> StoreResult<File> {
        let path = self.file_path(file_ref);
        File::open(&path).await.map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                StoreError::NotFound(file_ref)
            } else {
                StoreError::Io(err)
            }
        })
    }

    /// Best-effort removal of a stored payload. Errors are logged, never
    /// propagated.
    pub async fn discard(&self, file_ref: Uuid) {
        let path = self.file_path(file_ref);
        match fs::remove_file(&path).await {
            Ok(()) => debug!(file_ref = %file_ref, "discarded stored file"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(file_ref = %file_ref, "stored file already missing");
            }
            Err(err) => {
                warn!(file_ref = %file_ref, error = %err, "failed to discard stored file");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    async fn store_with_payload(payload: &'static [u8]) -> (FileStore, tempfile::TempDir, StoredFile) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).await.unwrap();
        let stream = futures::stream::iter([io::Result::Ok(Bytes::from_static(payload))]);
        let stored = store.store_stream(stream).await.unwrap();
        (store, dir, stored)
    }

    #[tokio::test]
    async fn store_then_open_round_trips() {
        let (store, _dir, stored) = store_with_payload(b"chunk of bytes").await;
        assert_eq!(stored.size_bytes, 14);
        let mut file = store.open(stored.file_ref).await.unwrap();
        let mut contents = Vec::new();
        file.read_to_end(&mut contents).await.unwrap();
        assert_eq!(contents, b"chunk of bytes");
    }

    #[tokio::test]
    async fn multi_chunk_upload_concatenates() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).await.unwrap();
        let chunks = [
            io::Result::Ok(Bytes::from_static(b"abc")),
            Ok(Bytes::from_static(b"def")),
        ];
        let stored = store.store_stream(futures::stream::iter(chunks)).await.unwrap();
        assert_eq!(stored.size_bytes, 6);
        let mut file = store.open(stored.file_ref).await.unwrap();
        let mut contents = Vec::new();
        file.read_to_end(&mut contents).await.unwrap();
        assert_eq!(contents, b"abcdef");
    }

    #[tokio::test]
    async fn failed_stream_leaves_no_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).await.unwrap();
        let chunks = [
            io::Result::Ok(Bytes::from_static(b"abc")),
            Err(io::Error::other("upload aborted")),
        ];
        assert!(store.store_stream(futures::stream::iter(chunks)).await.is_err());
        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn open_unknown_ref_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).await.unwrap();
        assert!(matches!(
            store.open(Uuid::new_v4()).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn discard_removes_payload_and_is_idempotent() {
        let (store, _dir, stored) = store_with_payload(b"x").await;
        store.discard(stored.file_ref).await;
        assert!(matches!(
            store.open(stored.file_ref).await,
            Err(StoreError::NotFound(_))
        ));
        store.discard(stored.file_ref).await;
    }
}
