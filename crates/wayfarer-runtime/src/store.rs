//! Durable storage for review requests.
//!
//! A paused run is nothing but its `ReviewRequest`; storing it outside the
//! process is what lets a reviewer resume it later, from anywhere.
//!
//! Resolving is a compare-and-swap on the stored record: the store checks
//! that its copy is still pending and writes the resolved copy in one step.
//! Of two concurrent resolutions, in one process or in two, at most one
//! is committed.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;
use wayfarer_core::{ReviewRequest, ReviewStatus};

/// Errors from a review store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Review store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt review record: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Review {0} not found")]
    Missing(Uuid),

    #[error("Review {request_id} already resolved as {status:?}")]
    AlreadyResolved {
        request_id: Uuid,
        status: ReviewStatus,
    },

    /// Another resolver holds the record's lock
    #[error("Review {0} is being resolved elsewhere")]
    Busy(Uuid),
}

/// Where review requests live between pause and resolution.
#[async_trait]
pub trait ReviewStore: Send + Sync {
    /// Insert or replace a request.
    async fn save(&self, request: &ReviewRequest) -> Result<(), StoreError>;

    async fn load(&self, request_id: Uuid) -> Result<Option<ReviewRequest>, StoreError>;

    /// Replace a pending request with its resolved copy.
    ///
    /// Fails with `AlreadyResolved` when the stored copy is no longer
    /// pending, and with `Missing` when there is none.
    async fn commit_resolution(&self, resolved: &ReviewRequest) -> Result<(), StoreError>;

    /// Pending requests, oldest first.
    async fn list_pending(&self) -> Result<Vec<ReviewRequest>, StoreError>;
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryReviewStore {
    requests: RwLock<HashMap<Uuid, ReviewRequest>>,
}

impl MemoryReviewStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReviewStore for MemoryReviewStore {
    async fn save(&self, request: &ReviewRequest) -> Result<(), StoreError> {
        self.requests
            .write()
            .insert(request.request_id, request.clone());
        Ok(())
    }

    async fn load(&self, request_id: Uuid) -> Result<Option<ReviewRequest>, StoreError> {
        Ok(self.requests.read().get(&request_id).cloned())
    }

    async fn commit_resolution(&self, resolved: &ReviewRequest) -> Result<(), StoreError> {
        let request_id = resolved.request_id;
        let mut requests = self.requests.write();
        let current = requests
            .get(&request_id)
            .ok_or(StoreError::Missing(request_id))?;
        if !current.is_pending() {
            return Err(StoreError::AlreadyResolved {
                request_id,
                status: current.status,
            });
        }
        requests.insert(request_id, resolved.clone());
        Ok(())
    }

    async fn list_pending(&self) -> Result<Vec<ReviewRequest>, StoreError> {
        let mut pending: Vec<_> = self
            .requests
            .read()
            .values()
            .filter(|request| request.is_pending())
            .cloned()
            .collect();
        pending.sort_by_key(|request| request.created_at);
        Ok(pending)
    }
}

/// One pretty-printed JSON file per request in a directory.
///
/// Writes go to a temporary file unique to the writer and are renamed into
/// place, so a reader never sees half a record. Resolutions additionally
/// hold `<id>.lock`, created exclusively, while they check and write. A
/// lock left behind by a crashed resolver has to be removed by hand.
#[derive(Debug, Clone)]
pub struct FileReviewStore {
    dir: PathBuf,
}

impl FileReviewStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, request_id: Uuid) -> PathBuf {
        self.dir.join(format!("{request_id}.json"))
    }

    fn lock_path_for(&self, request_id: Uuid) -> PathBuf {
        self.dir.join(format!("{request_id}.lock"))
    }

    async fn write(&self, request: &ReviewRequest) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.path_for(request.request_id);
        let tmp = self
            .dir
            .join(format!(".{}.{}.tmp", request.request_id, Uuid::new_v4()));
        let json = serde_json::to_vec_pretty(request)?;
        tokio::fs::write(&tmp, json).await?;
        if let Err(err) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(err.into());
        }

        tracing::debug!(
            request_id = %request.request_id,
            status = ?request.status,
            path = %path.display(),
            "Review saved"
        );
        Ok(())
    }
}

/// Exclusive claim on one record, released on drop.
struct ResolutionLock {
    path: PathBuf,
}

impl ResolutionLock {
    async fn acquire(path: PathBuf, request_id: Uuid) -> Result<Self, StoreError> {
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(_) => Ok(Self { path }),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                tracing::warn!(request_id = %request_id, "Review is locked by another resolver");
                Err(StoreError::Busy(request_id))
            }
            Err(err) => Err(err.into()),
        }
    }
}

impl Drop for ResolutionLock {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %err, "Failed to release review lock");
        }
    }
}

#[async_trait]
impl ReviewStore for FileReviewStore {
    async fn save(&self, request: &ReviewRequest) -> Result<(), StoreError> {
        self.write(request).await
    }

    async fn commit_resolution(&self, resolved: &ReviewRequest) -> Result<(), StoreError> {
        let request_id = resolved.request_id;
        tokio::fs::create_dir_all(&self.dir).await?;
        let _lock = ResolutionLock::acquire(self.lock_path_for(request_id), request_id).await?;

        let current = self
            .load(request_id)
            .await?
            .ok_or(StoreError::Missing(request_id))?;
        if !current.is_pending() {
            return Err(StoreError::AlreadyResolved {
                request_id,
                status: current.status,
            });
        }

        self.write(resolved).await
    }

    async fn load(&self, request_id: Uuid) -> Result<Option<ReviewRequest>, StoreError> {
        match tokio::fs::read(self.path_for(request_id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn list_pending(&self) -> Result<Vec<ReviewRequest>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut pending = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let bytes = tokio::fs::read(&path).await?;
            let request: ReviewRequest = serde_json::from_slice(&bytes)?;
            if request.is_pending() {
                pending.push(request);
            }
        }

        pending.sort_by_key(|request| request.created_at);
        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wayfarer_core::{
        Catalog, Draft, FixedRates, GateDecision, ReviewDecision, ReviewGate, ReviewStatus,
        TravelRequest,
    };

    fn pending_request() -> ReviewRequest {
        let request = TravelRequest::new("Dubai", 3, 50.0, "AED");
        let draft = Draft {
            run_id: Uuid::new_v4(),
            candidate: Catalog::dubai().plan_for(&request, &FixedRates::default()),
            budget_amount: 50.0,
            budget_currency: "AED".to_string(),
            degraded: false,
            notes: vec![],
        };
        match ReviewGate::default().check(draft) {
            GateDecision::ReviewRequired(request) => request,
            other => panic!("expected review, got {other:?}"),
        }
    }

    fn resolved(request: &ReviewRequest, decision: ReviewDecision) -> ReviewRequest {
        ReviewGate::default()
            .resolve(request, decision)
            .unwrap()
            .request()
            .clone()
    }

    #[tokio::test]
    async fn test_memory_store_lists_only_pending() {
        let store = MemoryReviewStore::new();
        let request = pending_request();
        store.save(&request).await.unwrap();
        assert_eq!(store.list_pending().await.unwrap().len(), 1);

        store
            .commit_resolution(&resolved(&request, ReviewDecision::Approve))
            .await
            .unwrap();

        assert!(store.list_pending().await.unwrap().is_empty());
        let loaded = store.load(request.request_id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ReviewStatus::Approved);
    }

    #[tokio::test]
    async fn test_memory_store_commits_one_resolution() {
        let store = MemoryReviewStore::new();
        let request = pending_request();
        store.save(&request).await.unwrap();

        store
            .commit_resolution(&resolved(&request, ReviewDecision::AutoReduce))
            .await
            .unwrap();
        let err = store
            .commit_resolution(&resolved(&request, ReviewDecision::Approve))
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::AlreadyResolved { .. }));
        let loaded = store.load(request.request_id).await.unwrap().unwrap();
        assert_ne!(loaded.status, ReviewStatus::Approved);
    }

    #[tokio::test]
    async fn test_commit_without_record_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let request = pending_request();
        let resolved = resolved(&request, ReviewDecision::Approve);

        let err = FileReviewStore::new(dir.path())
            .commit_resolution(&resolved)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Missing(id) if id == request.request_id));

        let err = MemoryReviewStore::new()
            .commit_resolution(&resolved)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Missing(_)));
    }

    #[tokio::test]
    async fn test_file_store_survives_new_instance() {
        let dir = tempfile::tempdir().unwrap();
        let request = pending_request();

        FileReviewStore::new(dir.path()).save(&request).await.unwrap();

        let reopened = FileReviewStore::new(dir.path());
        let loaded = reopened.load(request.request_id).await.unwrap().unwrap();
        assert_eq!(loaded, request);
        assert_eq!(reopened.list_pending().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_file_store_missing_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileReviewStore::new(dir.path().join("reviews"));
        assert!(store.load(Uuid::new_v4()).await.unwrap().is_none());
        assert!(store.list_pending().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_file_resolutions_commit_once() {
        let dir = tempfile::tempdir().unwrap();

        for _ in 0..20 {
            let request = pending_request();
            FileReviewStore::new(dir.path()).save(&request).await.unwrap();

            let approve = resolved(&request, ReviewDecision::Approve);
            let reduce = resolved(&request, ReviewDecision::AutoReduce);
            let first = FileReviewStore::new(dir.path());
            let second = FileReviewStore::new(dir.path());

            let (a, b) = tokio::join!(
                tokio::spawn(async move { first.commit_resolution(&approve).await }),
                tokio::spawn(async move { second.commit_resolution(&reduce).await }),
            );
            let results = [a.unwrap(), b.unwrap()];

            let committed = results.iter().filter(|result| result.is_ok()).count();
            assert_eq!(committed, 1, "{results:?}");
            for err in results.iter().filter_map(|result| result.as_ref().err()) {
                assert!(matches!(
                    err,
                    StoreError::AlreadyResolved { .. } | StoreError::Busy(_)
                ));
            }

            let stored = FileReviewStore::new(dir.path())
                .load(request.request_id)
                .await
                .unwrap()
                .unwrap();
            let winner = if results[0].is_ok() {
                ReviewStatus::Approved
            } else {
                ReviewStatus::AutoReduced
            };
            assert_eq!(stored.status, winner);
        }

        // only records remain: no locks, no temporary files
        let leftovers = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|entry| entry.path().extension().and_then(|ext| ext.to_str()) != Some("json"))
            .count();
        assert_eq!(leftovers, 0);
    }
}
