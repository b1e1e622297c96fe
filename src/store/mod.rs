//! Persistence ports for jobs and CMS entities

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::errors::Result;
use crate::core::models::{EntityContent, EntityMeta, JobId, JobStatus, JobUpdate, TranslationJob};

pub mod file;
pub mod memory;

pub use file::{FileJobStore, FsEntityStore};
pub use memory::{MemoryEntityStore, MemoryJobStore};

/// Durable job records. The queue reads and writes jobs only through this.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job
    async fn create(&self, job: &TranslationJob) -> Result<()>;

    /// Find job by ID
    async fn get(&self, id: JobId) -> Result<Option<TranslationJob>>;

    /// Apply a partial update. Fails with `JobNotFound` when the record is gone.
    async fn update(&self, id: JobId, update: JobUpdate) -> Result<TranslationJob>;

    /// Jobs in any of `statuses`, oldest first. An empty slice lists everything.
    async fn list(&self, statuses: &[JobStatus]) -> Result<Vec<TranslationJob>>;

    /// Remove a job record; returns whether it existed
    async fn delete(&self, id: JobId) -> Result<bool>;
}

/// The CMS side: source entities and translated copies
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn fetch(&self, entity_id: &str) -> Result<Option<EntityContent>>;

    /// Store a translated copy and return its identifier
    async fn publish(
        &self,
        entity_id: &str,
        language: &str,
        title: &str,
        content: &str,
        meta: &EntityMeta,
    ) -> Result<String>;
}

/// A translated entity as handed to the CMS
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedEntity {
    pub published_id: String,
    pub source_entity_id: String,
    pub language: String,
    pub title: String,
    pub content: String,
    pub meta: EntityMeta,
}

impl PublishedEntity {
    pub fn new(
        entity_id: &str,
        language: &str,
        title: &str,
        content: &str,
        meta: &EntityMeta,
    ) -> Self {
        Self {
            published_id: format!("{}-{}", entity_id, language),
            source_entity_id: entity_id.to_string(),
            language: language.to_string(),
            title: title.to_string(),
            content: content.to_string(),
            meta: meta.clone(),
        }
    }
}

fn matches_status(job: &TranslationJob, statuses: &[JobStatus]) -> bool {
    statuses.is_empty() || statuses.contains(&job.status)
}

/// Filter and order jobs the way every `JobStore::list` does
pub(crate) fn select_jobs<'a>(
    jobs: impl Iterator<Item = &'a TranslationJob>,
    statuses: &[JobStatus],
) -> Vec<TranslationJob> {
    let mut selected: Vec<TranslationJob> = jobs
        .filter(|job| matches_status(job, statuses))
        .cloned()
        .collect();
    selected.sort_by_key(|job| job.created_at);
    selected
}
