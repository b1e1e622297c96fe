//! CMS Translator - content block extraction, restoration and translation jobs
//!
//! This library pulls translatable text out of CMS entities (rich-text blocks,
//! shortcodes, page-builder trees stored in metadata, plain HTML), runs it
//! through a bounded translation queue and rebuilds the original structure
//! around the translated text before publishing.

#![forbid(unsafe_code)]

pub mod cli;
pub mod core;
pub mod processors;
pub mod queue;
pub mod server;
pub mod store;

// Re-export key types for convenience
pub use crate::core::{
    client::AsyncTranslator,
    config::AppConfig,
    errors::{ParseError, RestoreError, TranslationError},
    models::{EntityContent, JobStatus, TranslationJob, TranslationRequest, TranslationResult},
    provider::TranslationProvider,
};

pub use crate::processors::{
    blocks::{BlockFormat, BlockMetadata, ContentBlock},
    extractor::{extract, Extraction},
    restorer::{restore, RestoredContent},
};

pub use crate::queue::{TranslationQueue, TranslationService};
pub use crate::store::{EntityStore, JobStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
