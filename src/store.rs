//! Record store boundary: the async interface to the external persistence
//! collaborators, plus an in-memory reference implementation

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::record::SubjectRecord;

/// Errors surfaced by a record store
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("no record found for subject {subject_id}")]
    NotFound { subject_id: String },

    #[error("network failure talking to the record store: {message}")]
    Network { message: String },

    #[error("the store rejected the submission: {message}")]
    Rejected { message: String },
}

impl StoreError {
    pub fn not_found(subject_id: impl Into<String>) -> Self {
        StoreError::NotFound {
            subject_id: subject_id.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        StoreError::Network {
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        StoreError::Rejected {
            message: message.into(),
        }
    }

    /// Whether retrying the same call may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Network { .. })
    }
}

/// Boundary contract to the external persistence collaborators.
///
/// The engine never retries these calls itself and prescribes no wire
/// format; it operates on already-decoded records. The persisted current
/// step is view-state owned by the store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch the current record for a subject
    async fn fetch_record(&self, subject_id: &str) -> Result<SubjectRecord, StoreError>;

    /// Submit a step payload and return the updated record. The merge is
    /// all-or-nothing: on error the stored record is unchanged.
    async fn submit_step(
        &self,
        subject_id: &str,
        step_id: u32,
        payload: SubjectRecord,
    ) -> Result<SubjectRecord, StoreError>;

    /// Read the persisted current step, if any
    async fn current_step(&self, subject_id: &str) -> Result<Option<u32>, StoreError>;

    /// Persist the current step
    async fn set_current_step(&self, subject_id: &str, step_id: u32) -> Result<(), StoreError>;
}

/// In-memory store used by the integration tests and as a reference for
/// implementing the boundary against a real backend
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    records: HashMap<String, SubjectRecord>,
    steps: HashMap<String, u32>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a subject record (creating the subject if needed)
    pub async fn put_record(&self, subject_id: impl Into<String>, record: SubjectRecord) {
        self.inner.lock().await.records.insert(subject_id.into(), record);
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn fetch_record(&self, subject_id: &str) -> Result<SubjectRecord, StoreError> {
        self.inner
            .lock()
            .await
            .records
            .get(subject_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(subject_id))
    }

    async fn submit_step(
        &self,
        subject_id: &str,
        _step_id: u32,
        payload: SubjectRecord,
    ) -> Result<SubjectRecord, StoreError> {
        let mut inner = self.inner.lock().await;
        let record = inner
            .records
            .get_mut(subject_id)
            .ok_or_else(|| StoreError::not_found(subject_id))?;
        record.merge(payload);
        Ok(record.clone())
    }

    async fn current_step(&self, subject_id: &str) -> Result<Option<u32>, StoreError> {
        Ok(self.inner.lock().await.steps.get(subject_id).copied())
    }

    async fn set_current_step(&self, subject_id: &str, step_id: u32) -> Result<(), StoreError> {
        self.inner
            .lock()
            .await
            .steps
            .insert(subject_id.to_string(), step_id);
        Ok(())
    }
}
