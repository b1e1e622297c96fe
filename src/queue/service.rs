//! Translation service: the entry point wiring stores, provider and queue

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::core::config::AppConfig;
use crate::core::errors::{Result, TranslationError};
use crate::core::models::{EntityMeta, JobId, JobStatus, JobUpdate, TranslationJob};
use crate::core::provider::TranslationProvider;
use crate::processors::blocks::BlockMetadata;
use crate::processors::extractor::{ContentExtractor, Extraction};
use crate::processors::restorer::restore;
use crate::queue::scheduler::TranslationQueue;
use crate::queue::worker::JobRunner;
use crate::store::{EntityStore, JobStore};

/// Result of publishing a completed job
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PublishReceipt {
    pub job_id: JobId,
    pub published_id: String,
    /// Set when the structured restore fell back to flat text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
}

pub struct TranslationService {
    jobs: Arc<dyn JobStore>,
    entities: Arc<dyn EntityStore>,
    provider: Arc<dyn TranslationProvider>,
    queue: TranslationQueue,
    extractor: ContentExtractor,
    source_language: String,
    enqueue_lock: Mutex<()>,
}

impl TranslationService {
    /// Wire the service and start its queue. Must be called inside a tokio runtime.
    pub fn new(
        jobs: Arc<dyn JobStore>,
        entities: Arc<dyn EntityStore>,
        provider: Arc<dyn TranslationProvider>,
        config: &AppConfig,
    ) -> Self {
        let runner = Arc::new(JobRunner::new(
            jobs.clone(),
            entities.clone(),
            provider.clone(),
            config.queue.max_retries,
        ));
        let queue = TranslationQueue::start(runner, config.queue.clone());

        Self {
            jobs,
            entities,
            provider,
            queue,
            extractor: ContentExtractor::default(),
            source_language: config.source_language.clone(),
            enqueue_lock: Mutex::new(()),
        }
    }

    /// Create (or reuse) a job translating `entity_id` into `target_language`.
    ///
    /// An unconfigured provider or an unknown entity is reported here, before
    /// anything is queued.
    pub async fn enqueue_translation(&self, entity_id: &str, target_language: &str) -> Result<JobId> {
        if !self.provider.is_configured() {
            return Err(TranslationError::ConfigError {
                message: format!("translation provider {} has no API key", self.provider.name()),
            });
        }
        if target_language.trim().is_empty() {
            return Err(TranslationError::ConfigError {
                message: "target language is required".to_string(),
            });
        }
        if self.entities.fetch(entity_id).await?.is_none() {
            return Err(TranslationError::MissingEntity {
                entity_id: entity_id.to_string(),
            });
        }

        let _guard = self.enqueue_lock.lock().await;
        let active = self
            .jobs
            .list(&[JobStatus::Pending, JobStatus::Processing])
            .await?;
        if let Some(existing) = active
            .iter()
            .find(|job| job.entity_id == entity_id && job.target_language == target_language)
        {
            info!(
                "Reusing job {} for entity {} ({})",
                existing.id, entity_id, target_language
            );
            return Ok(existing.id);
        }

        let job = TranslationJob::new(entity_id, self.source_language.as_str(), target_language);
        self.jobs.create(&job).await?;
        self.queue.add_job(job.queue_item())?;
        info!("Queued job {} for entity {} ({})", job.id, entity_id, target_language);
        Ok(job.id)
    }

    pub async fn job(&self, id: JobId) -> Result<Option<TranslationJob>> {
        self.jobs.get(id).await
    }

    /// Re-submit every persisted job that never reached a terminal state
    pub async fn recover(&self) -> Result<usize> {
        let unfinished = self
            .jobs
            .list(&[JobStatus::Pending, JobStatus::Processing])
            .await?;
        for job in &unfinished {
            self.queue.add_job(job.queue_item())?;
        }
        info!("Recovered {} unfinished jobs", unfinished.len());
        Ok(unfinished.len())
    }

    pub async fn wait_idle(&self) {
        self.queue.wait_idle().await
    }

    pub fn queue(&self) -> &TranslationQueue {
        &self.queue
    }

    /// Dry-run extraction of a stored entity
    pub async fn preview(&self, entity_id: &str) -> Result<Extraction> {
        let entity = self
            .entities
            .fetch(entity_id)
            .await?
            .ok_or_else(|| TranslationError::MissingEntity {
                entity_id: entity_id.to_string(),
            })?;
        Ok(self.preview_content(&entity.raw_content, &entity.meta))
    }

    /// Dry-run extraction of arbitrary content
    pub fn preview_content(&self, raw_content: &str, meta: &EntityMeta) -> Extraction {
        self.extractor.extract(raw_content, meta)
    }

    /// Restore a completed job into the entity's structure and publish it
    pub async fn publish(&self, job_id: JobId) -> Result<PublishReceipt> {
        let job = self
            .jobs
            .get(job_id)
            .await?
            .ok_or(TranslationError::JobNotFound { job_id })?;
        if job.status != JobStatus::Completed {
            return Err(TranslationError::InvalidJobState {
                job_id,
                status: job.status.to_string(),
                expected: JobStatus::Completed.to_string(),
            });
        }

        let entity = self
            .entities
            .fetch(&job.entity_id)
            .await?
            .ok_or_else(|| TranslationError::MissingEntity {
                entity_id: job.entity_id.clone(),
            })?;

        let metadata = job.block_metadata.clone().unwrap_or_else(BlockMetadata::empty);
        let translated = job.translated_content.as_deref().unwrap_or_default();
        let restored = restore(&entity.raw_content, &entity.meta, translated, &metadata)?;
        if let Some(reason) = &restored.fallback {
            warn!("Job {} published as flat text: {}", job_id, reason);
        }

        let title = job
            .translated_title
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(&entity.title);
        let published_id = self
            .entities
            .publish(
                &job.entity_id,
                &job.target_language,
                title,
                &restored.content,
                &restored.meta,
            )
            .await?;

        self.jobs
            .update(job_id, JobUpdate::status(JobStatus::Published).with_progress(100))
            .await?;
        info!("Published job {} as {}", job_id, published_id);

        Ok(PublishReceipt {
            job_id,
            published_id,
            fallback: restored.fallback.map(|reason| reason.to_string()),
        })
    }
}
