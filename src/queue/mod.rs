//! Translation job queue and the service facade around it

pub mod scheduler;
pub mod service;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use scheduler::{QueueStats, TranslationQueue};
pub use service::{PublishReceipt, TranslationService};
pub use worker::{JobOutcome, JobRunner};
