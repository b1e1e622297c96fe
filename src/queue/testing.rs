//! Scripted provider and fixtures shared by queue tests

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::core::config::AppConfig;
use crate::core::errors::{Result, TranslationError};
use crate::core::models::{EntityContent, TranslationRequest, TranslationResult};
use crate::core::provider::TranslationProvider;
use crate::queue::service::TranslationService;
use crate::store::{MemoryEntityStore, MemoryJobStore};

/// Scripted reply consumed by the next provider call
#[derive(Debug, Clone)]
pub enum Reply {
    Quota,
    Fail(String),
    Panic,
}

/// Provider that replaces dictionary words, after playing any scripted replies
#[derive(Default)]
pub struct MockProvider {
    script: Mutex<VecDeque<Reply>>,
    dictionary: Vec<(String, String)>,
    delay: Duration,
    unconfigured: bool,
    calls: AtomicUsize,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dictionary(mut self, pairs: &[(&str, &str)]) -> Self {
        self.dictionary = pairs
            .iter()
            .map(|(from, to)| (from.to_string(), to.to_string()))
            .collect();
        self
    }

    pub fn with_script(self, replies: impl IntoIterator<Item = Reply>) -> Self {
        self.script.lock().unwrap().extend(replies);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn unconfigured(mut self) -> Self {
        self.unconfigured = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranslationProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn is_configured(&self) -> bool {
        !self.unconfigured
    }

    async fn translate_text(&self, request: &TranslationRequest) -> Result<TranslationResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let scripted = self.script.lock().unwrap().pop_front();
        match scripted {
            Some(Reply::Quota) => return Err(TranslationError::QuotaExceededError),
            Some(Reply::Fail(message)) => {
                return Err(TranslationError::ApiError {
                    status: 500,
                    message,
                })
            }
            Some(Reply::Panic) => panic!("provider blew up"),
            None => {}
        }

        let mut translation = request.text.clone();
        for (from, to) in &self.dictionary {
            translation = translation.replace(from.as_str(), to.as_str());
        }
        Ok(TranslationResult {
            translation,
            tokens_used: request.text.len(),
            model_used: "mock".to_string(),
        })
    }
}

/// Service wired to in-memory stores
pub struct Harness {
    pub service: TranslationService,
    pub jobs: MemoryJobStore,
    pub entities: MemoryEntityStore,
    pub provider: Arc<MockProvider>,
}

pub fn test_config(concurrency: usize, max_retries: u32, retry_base_delay_ms: u64) -> AppConfig {
    let mut config = AppConfig::default();
    config.queue.concurrency = concurrency;
    config.queue.max_retries = max_retries;
    config.queue.retry_base_delay_ms = retry_base_delay_ms;
    config.source_language = "en".to_string();
    config
}

pub fn harness(provider: MockProvider, config: &AppConfig) -> Harness {
    let jobs = MemoryJobStore::new();
    let entities = MemoryEntityStore::new();
    let provider = Arc::new(provider);
    let service = TranslationService::new(
        Arc::new(jobs.clone()),
        Arc::new(entities.clone()),
        provider.clone(),
        config,
    );
    Harness {
        service,
        jobs,
        entities,
        provider,
    }
}

pub fn article(title: &str, body: &str) -> EntityContent {
    EntityContent {
        title: title.to_string(),
        raw_content: body.to_string(),
        meta: Default::default(),
    }
}
