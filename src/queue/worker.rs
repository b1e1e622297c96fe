//! Body of a single translation job

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::core::errors::{Result, TranslationError};
use crate::core::models::{
    JobStatus, JobUpdate, QueueItem, TranslationJob, TranslationRequest, TranslationResult,
};
use crate::core::provider::TranslationProvider;
use crate::processors::extractor::ContentExtractor;
use crate::processors::table::ensure_balanced_tables;
use crate::store::{EntityStore, JobStore};

const TITLE_INSTRUCTIONS: &str =
    "Translate the page title. Return only the translated title.";

const BODY_INSTRUCTIONS: &str = "Translate the text. Keep every HTML tag, attribute and shortcode \
     exactly as given. Paragraphs are separated by blank lines; return the same number of \
     paragraphs in the same order, separated by blank lines.";

/// How a job run ended
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed,
    /// Persisted as FAILED with this message
    Failed(String),
    /// Quota refusal; the job is PENDING again and should be re-queued
    Requeue,
    /// Job was already settled when dequeued
    Skipped,
    /// Job record disappeared mid-run
    Abandoned,
}

/// Runs jobs against the stores and the provider
pub struct JobRunner {
    jobs: Arc<dyn JobStore>,
    entities: Arc<dyn EntityStore>,
    provider: Arc<dyn TranslationProvider>,
    extractor: ContentExtractor,
    max_retries: u32,
}

impl JobRunner {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        entities: Arc<dyn EntityStore>,
        provider: Arc<dyn TranslationProvider>,
        max_retries: u32,
    ) -> Self {
        Self {
            jobs,
            entities,
            provider,
            extractor: ContentExtractor::default(),
            max_retries,
        }
    }

    /// Run one queue item to an outcome. Errors never escape; they are
    /// persisted on the job.
    pub async fn run(&self, item: &QueueItem) -> JobOutcome {
        match self.execute(item).await {
            Ok(outcome) => outcome,
            Err(TranslationError::JobNotFound { job_id }) => {
                warn!("Job {} was deleted while running, abandoning", job_id);
                JobOutcome::Abandoned
            }
            Err(e) if e.is_quota() && item.attempt < self.max_retries => {
                info!(
                    "Job {} hit provider quota (attempt {}/{}), will retry",
                    item.job_id,
                    item.attempt + 1,
                    self.max_retries
                );
                let update = JobUpdate::status(JobStatus::Pending).with_error(e.to_string());
                match self.jobs.update(item.job_id, update).await {
                    Ok(_) => JobOutcome::Requeue,
                    Err(TranslationError::JobNotFound { .. }) => JobOutcome::Abandoned,
                    Err(store_err) => self.fail(item, store_err.to_string()).await,
                }
            }
            Err(e) => {
                error!("Job {} failed: {}", item.job_id, e);
                self.fail(item, e.to_string()).await
            }
        }
    }

    /// Persist a permanent failure
    pub async fn fail(&self, item: &QueueItem, message: String) -> JobOutcome {
        let update = JobUpdate::status(JobStatus::Failed).with_error(message.clone());
        match self.jobs.update(item.job_id, update).await {
            Ok(_) => JobOutcome::Failed(message),
            Err(TranslationError::JobNotFound { .. }) => JobOutcome::Abandoned,
            Err(e) => {
                error!("Could not record failure of job {}: {}", item.job_id, e);
                JobOutcome::Failed(message)
            }
        }
    }

    async fn checkpoint(&self, item: &QueueItem, update: JobUpdate) -> Result<TranslationJob> {
        let job = self.jobs.update(item.job_id, update).await?;
        debug!("Job {} at {}%", item.job_id, job.progress);
        Ok(job)
    }

    async fn execute(&self, item: &QueueItem) -> Result<JobOutcome> {
        let job = match self.jobs.get(item.job_id).await? {
            Some(job) => job,
            None => return Ok(JobOutcome::Abandoned),
        };
        if job.status.is_settled() {
            debug!("Job {} already {}, skipping", job.id, job.status);
            return Ok(JobOutcome::Skipped);
        }

        self.checkpoint(
            item,
            JobUpdate::status(JobStatus::Processing)
                .with_progress(5)
                .clear_error(),
        )
        .await?;

        let entity = self
            .entities
            .fetch(&job.entity_id)
            .await?
            .ok_or_else(|| TranslationError::MissingEntity {
                entity_id: job.entity_id.clone(),
            })?;
        self.checkpoint(item, JobUpdate::progress(15)).await?;

        let extraction = self.extractor.extract(&entity.raw_content, &entity.meta);
        info!(
            "Job {}: {} blocks ({})",
            job.id,
            extraction.blocks.len(),
            extraction.primary_format
        );
        self.checkpoint(item, JobUpdate::progress(30)).await?;

        let mut tokens_used = 0;
        let translated_title = if entity.title.trim().is_empty() {
            String::new()
        } else {
            let result = self
                .translate(&job, &entity.title, TITLE_INSTRUCTIONS)
                .await?;
            tokens_used += result.tokens_used;
            result.translation.trim().to_string()
        };
        self.checkpoint(item, JobUpdate::progress(50)).await?;

        let translated_content = if extraction.is_empty() {
            String::new()
        } else {
            let result = self
                .translate(&job, &extraction.combined_text(), BODY_INSTRUCTIONS)
                .await?;
            tokens_used += result.tokens_used;
            result.translation
        };
        ensure_balanced_tables(&translated_content)?;
        self.checkpoint(item, JobUpdate::progress(80)).await?;

        let update = JobUpdate {
            translated_title: Some(translated_title),
            translated_content: Some(translated_content),
            block_metadata: Some(extraction.block_metadata),
            tokens_used: Some(tokens_used),
            ..JobUpdate::progress(90)
        };
        self.checkpoint(item, update).await?;

        self.checkpoint(
            item,
            JobUpdate::status(JobStatus::Completed).with_progress(100),
        )
        .await?;
        info!("Job {} completed ({} tokens)", job.id, tokens_used);
        Ok(JobOutcome::Completed)
    }

    async fn translate(
        &self,
        job: &TranslationJob,
        text: &str,
        instructions: &str,
    ) -> Result<TranslationResult> {
        let request = TranslationRequest::new(text, job.target_language.as_str())
            .with_source_lang(job.source_language.as_str())
            .with_instructions(instructions);
        self.provider.translate_text(&request).await
    }
}
