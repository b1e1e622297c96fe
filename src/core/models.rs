//! Core data models for entities, translation requests and jobs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::processors::blocks::BlockMetadata;

/// Job identifier
pub type JobId = Uuid;

/// Entity metadata: key to stored string value
pub type EntityMeta = BTreeMap<String, String>;

/// Content of a CMS entity as the entity store returns it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityContent {
    pub title: String,
    pub raw_content: String,
    #[serde(default)]
    pub meta: EntityMeta,
}

/// Translation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationRequest {
    pub text: String,
    pub source_lang: Option<String>,
    pub target_lang: String,
    pub instructions: Option<String>,
}

impl TranslationRequest {
    pub fn new(text: impl Into<String>, target_lang: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source_lang: None,
            target_lang: target_lang.into(),
            instructions: None,
        }
    }

    pub fn with_source_lang(mut self, source_lang: impl Into<String>) -> Self {
        let lang = source_lang.into();
        self.source_lang = if lang.is_empty() || lang == "auto" {
            None
        } else {
            Some(lang)
        };
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }
}

/// Translation result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationResult {
    pub translation: String,
    pub tokens_used: usize,
    pub model_used: String,
}

/// Token usage tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenUsage {
    pub daily_limit: usize,
    pub used_today: usize,
    pub last_reset: DateTime<Utc>,
}

impl TokenUsage {
    pub fn new(daily_limit: usize) -> Self {
        Self {
            daily_limit,
            used_today: 0,
            last_reset: Utc::now(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.daily_limit.saturating_sub(self.used_today)
    }

    pub fn reset_if_needed(&mut self) {
        let now = Utc::now();
        if now.date_naive() != self.last_reset.date_naive() {
            self.used_today = 0;
            self.last_reset = now;
        }
    }
}

/// Lifecycle of a translation job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Published,
}

impl JobStatus {
    /// States the queue never picks up again
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Published
        )
    }

    /// States re-submitted on startup
    pub fn is_recoverable(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Processing)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "PENDING"),
            JobStatus::Processing => write!(f, "PROCESSING"),
            JobStatus::Completed => write!(f, "COMPLETED"),
            JobStatus::Failed => write!(f, "FAILED"),
            JobStatus::Published => write!(f, "PUBLISHED"),
        }
    }
}

/// Durable record of one (entity, target language) translation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationJob {
    pub id: JobId,
    pub entity_id: String,
    pub source_language: String,
    pub target_language: String,
    pub status: JobStatus,
    pub progress: u8,
    pub translated_title: Option<String>,
    pub translated_content: Option<String>,
    pub block_metadata: Option<BlockMetadata>,
    pub tokens_used: usize,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TranslationJob {
    pub fn new(
        entity_id: impl Into<String>,
        source_language: impl Into<String>,
        target_language: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            entity_id: entity_id.into(),
            source_language: source_language.into(),
            target_language: target_language.into(),
            status: JobStatus::Pending,
            progress: 0,
            translated_title: None,
            translated_content: None,
            block_metadata: None,
            tokens_used: 0,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn queue_item(&self) -> QueueItem {
        QueueItem {
            job_id: self.id,
            entity_id: self.entity_id.clone(),
            target_language: self.target_language.clone(),
            attempt: 0,
        }
    }
}

/// Partial update applied by a job store. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub progress: Option<u8>,
    pub translated_title: Option<String>,
    pub translated_content: Option<String>,
    pub block_metadata: Option<BlockMetadata>,
    pub tokens_used: Option<usize>,
    /// `Some(None)` clears the message
    pub error_message: Option<Option<String>>,
}

impl JobUpdate {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn progress(progress: u8) -> Self {
        Self {
            progress: Some(progress.min(100)),
            ..Default::default()
        }
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress.min(100));
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(Some(message.into()));
        self
    }

    pub fn clear_error(mut self) -> Self {
        self.error_message = Some(None);
        self
    }

    /// Apply onto a job record
    pub fn apply(self, job: &mut TranslationJob) {
        if let Some(status) = self.status {
            job.status = status;
        }
        if let Some(progress) = self.progress {
            job.progress = progress;
        }
        if let Some(title) = self.translated_title {
            job.translated_title = Some(title);
        }
        if let Some(content) = self.translated_content {
            job.translated_content = Some(content);
        }
        if let Some(metadata) = self.block_metadata {
            job.block_metadata = Some(metadata);
        }
        if let Some(tokens) = self.tokens_used {
            job.tokens_used = tokens;
        }
        if let Some(message) = self.error_message {
            job.error_message = message;
        }
        job.updated_at = Utc::now();
    }
}

/// In-memory queue entry. The job store holds the authoritative record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueItem {
    pub job_id: JobId,
    pub entity_id: String,
    pub target_language: String,
    /// Quota retries already spent
    pub attempt: u32,
}
