//! In-memory stores for tests and single-process runs

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::core::errors::{Result, TranslationError};
use crate::core::models::{EntityContent, EntityMeta, JobId, JobStatus, JobUpdate, TranslationJob};
use crate::store::{select_jobs, EntityStore, JobStore, PublishedEntity};

/// Job store backed by a map
#[derive(Debug, Clone, Default)]
pub struct MemoryJobStore {
    jobs: Arc<RwLock<HashMap<JobId, TranslationJob>>>,
    peak_processing: Arc<AtomicUsize>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest number of PROCESSING jobs seen after any write
    pub fn peak_processing(&self) -> usize {
        self.peak_processing.load(Ordering::SeqCst)
    }

    fn observe(&self, jobs: &HashMap<JobId, TranslationJob>) {
        let processing = jobs
            .values()
            .filter(|job| job.status == JobStatus::Processing)
            .count();
        self.peak_processing.fetch_max(processing, Ordering::SeqCst);
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, job: &TranslationJob) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        jobs.insert(job.id, job.clone());
        self.observe(&jobs);
        Ok(())
    }

    async fn get(&self, id: JobId) -> Result<Option<TranslationJob>> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn update(&self, id: JobId, update: JobUpdate) -> Result<TranslationJob> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(&id)
            .ok_or(TranslationError::JobNotFound { job_id: id })?;
        update.apply(job);
        let updated = job.clone();
        self.observe(&jobs);
        Ok(updated)
    }

    async fn list(&self, statuses: &[JobStatus]) -> Result<Vec<TranslationJob>> {
        let jobs = self.jobs.read().await;
        Ok(select_jobs(jobs.values(), statuses))
    }

    async fn delete(&self, id: JobId) -> Result<bool> {
        Ok(self.jobs.write().await.remove(&id).is_some())
    }
}

/// Entity store backed by a map; keeps every published copy
#[derive(Debug, Clone, Default)]
pub struct MemoryEntityStore {
    entities: Arc<RwLock<HashMap<String, EntityContent>>>,
    published: Arc<RwLock<Vec<PublishedEntity>>>,
}

impl MemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, entity_id: impl Into<String>, content: EntityContent) {
        self.entities.write().await.insert(entity_id.into(), content);
    }

    pub async fn published(&self) -> Vec<PublishedEntity> {
        self.published.read().await.clone()
    }
}

#[async_trait]
impl EntityStore for MemoryEntityStore {
    async fn fetch(&self, entity_id: &str) -> Result<Option<EntityContent>> {
        Ok(self.entities.read().await.get(entity_id).cloned())
    }

    async fn publish(
        &self,
        entity_id: &str,
        language: &str,
        title: &str,
        content: &str,
        meta: &EntityMeta,
    ) -> Result<String> {
        let entity = PublishedEntity::new(entity_id, language, title, content, meta);
        let id = entity.published_id.clone();
        let mut published = self.published.write().await;
        published.retain(|p| p.published_id != id);
        published.push(entity);
        debug!("Published {} in memory", id);
        Ok(id)
    }
}
