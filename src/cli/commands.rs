//! CLI command definitions and handlers

use anyhow::Context;
use clap::Subcommand;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

use crate::core::client::AsyncTranslator;
use crate::core::config::AppConfig;
use crate::core::models::{EntityContent, JobId, JobStatus};
use crate::processors::blocks::BlockMetadata;
use crate::processors::extractor::extract;
use crate::processors::restorer::restore;
use crate::queue::service::TranslationService;
use crate::store::{FileJobStore, FsEntityStore};

/// Commands for the CMS translator
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the translatable blocks of an entity file
    Extract {
        /// Entity JSON file ({"title", "raw_content", "meta"})
        #[arg(short, long)]
        file: PathBuf,

        /// Print the full extraction (blocks and metadata) as JSON
        #[arg(long)]
        json: bool,
    },

    /// Rebuild an entity from translated flat text
    Restore {
        /// Original entity JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Translated flat text (blocks separated by blank lines)
        #[arg(short, long)]
        translated: PathBuf,

        /// Block metadata JSON saved at extraction time (re-extracted if omitted)
        #[arg(short, long)]
        metadata: Option<PathBuf>,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Queue translation jobs and wait for them to settle
    Translate {
        /// Entity ids from the entity directory
        #[arg(required = true)]
        entity_ids: Vec<String>,

        /// Target language
        #[arg(short, long)]
        target_lang: String,
    },

    /// Re-queue jobs left PENDING or PROCESSING by an earlier run
    Recover,

    /// Publish a completed job
    Publish {
        /// Job id
        job_id: Uuid,
    },

    /// Start HTTP API server
    Server {
        /// Bind address (default: 0.0.0.0)
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Listen port (default: 8000)
        #[arg(short, long, default_value_t = 8000)]
        port: u16,
    },
}

/// Service over the file-backed stores and the HTTP provider. The returned
/// translator shares its token budget and model state with the service.
pub async fn build_service(
    config: &AppConfig,
) -> anyhow::Result<(Arc<TranslationService>, AsyncTranslator)> {
    let jobs = FileJobStore::open(&config.storage.jobs_file).await?;
    let entities = FsEntityStore::new(&config.storage.entities_dir);
    let translator = AsyncTranslator::new(config.provider.clone())?;

    let service = Arc::new(TranslationService::new(
        Arc::new(jobs),
        Arc::new(entities),
        Arc::new(translator.clone()),
        config,
    ));
    Ok((service, translator))
}

fn read_entity(path: &Path) -> anyhow::Result<EntityContent> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

/// Handle extract command
pub async fn handle_extract(file: PathBuf, json: bool) -> anyhow::Result<()> {
    let entity = read_entity(&file)?;
    let extraction = extract(&entity.raw_content, &entity.meta);
    info!(
        "Extracted {} blocks ({}) from {}",
        extraction.blocks.len(),
        extraction.primary_format,
        file.display()
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&extraction)?);
    } else {
        for (index, block) in extraction.blocks.iter().enumerate() {
            println!("--- #{} {} {}", index, block.format, block.path);
            println!("{}", block.text);
        }
    }
    Ok(())
}

/// Handle restore command
pub async fn handle_restore(
    file: PathBuf,
    translated: PathBuf,
    metadata: Option<PathBuf>,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let entity = read_entity(&file)?;
    let translated_text = std::fs::read_to_string(&translated)
        .with_context(|| format!("reading {}", translated.display()))?;
    let metadata: BlockMetadata = match metadata {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(&path)?)
            .with_context(|| format!("parsing {}", path.display()))?,
        None => extract(&entity.raw_content, &entity.meta).block_metadata,
    };

    let restored = restore(&entity.raw_content, &entity.meta, &translated_text, &metadata)?;
    if let Some(reason) = &restored.fallback {
        eprintln!("⚠️  Structure could not be kept, wrote flat text: {}", reason);
    }

    let result = EntityContent {
        title: entity.title,
        raw_content: restored.content,
        meta: restored.meta,
    };
    let rendered = serde_json::to_string_pretty(&result)?;
    match output {
        Some(path) => {
            std::fs::write(&path, rendered)?;
            println!("✅ Restored entity written to {}", path.display());
        }
        None => println!("{}", rendered),
    }
    Ok(())
}

/// Follow the queue until it settles
async fn track_progress(service: &TranslationService, total: u64) {
    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("=>-"));
    }

    let mut stats = service.queue().subscribe();
    let idle = service.wait_idle();
    tokio::pin!(idle);

    loop {
        tokio::select! {
            _ = &mut idle => break,
            changed = stats.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *stats.borrow();
                let outstanding = (current.pending + current.in_flight + current.retrying) as u64;
                pb.set_position(total.saturating_sub(outstanding));
                pb.set_message(format!(
                    "{} running, {} retrying",
                    current.in_flight, current.retrying
                ));
            }
        }
    }

    pb.finish_with_message("Completed");
}

async fn print_summary(service: &TranslationService, ids: &[JobId]) -> anyhow::Result<()> {
    let mut completed = 0;
    let mut failed = 0;
    for id in ids {
        let Some(job) = service.job(*id).await? else {
            continue;
        };
        match job.status {
            JobStatus::Completed | JobStatus::Published => completed += 1,
            JobStatus::Failed => {
                failed += 1;
                eprintln!(
                    "Job {} ({}): {}",
                    job.id,
                    job.entity_id,
                    job.error_message.unwrap_or_default()
                );
            }
            _ => {}
        }
        println!("   {} {} -> {} {}", job.id, job.entity_id, job.target_language, job.status);
    }

    println!("\n✅ Translation finished!");
    println!("   Completed: {}", completed);
    println!("   Failed: {}", failed);
    Ok(())
}

async fn print_usage(translator: &AsyncTranslator) {
    let usage = translator.token_usage().await;
    println!("   Model: {}", translator.current_model().await);
    println!("   Tokens today: {}/{}", usage.used_today, usage.daily_limit);
}

/// Handle translate command
pub async fn handle_translate(
    config: &AppConfig,
    entity_ids: Vec<String>,
    target_lang: String,
) -> anyhow::Result<()> {
    let start_time = Instant::now();
    let (service, translator) = build_service(config).await?;

    let mut ids = Vec::new();
    for entity_id in &entity_ids {
        ids.push(service.enqueue_translation(entity_id, &target_lang).await?);
    }
    info!("Queued {} jobs into {}", ids.len(), target_lang);

    track_progress(&service, ids.len() as u64).await;
    service.queue().shutdown();
    print_summary(&service, &ids).await?;
    print_usage(&translator).await;
    println!("   Time: {:?}", start_time.elapsed());
    Ok(())
}

/// Handle recover command
pub async fn handle_recover(config: &AppConfig) -> anyhow::Result<()> {
    let (service, translator) = build_service(config).await?;
    let recovered = service.recover().await?;
    if recovered == 0 {
        println!("No unfinished jobs.");
        return Ok(());
    }

    track_progress(&service, recovered as u64).await;
    service.queue().shutdown();
    println!("✅ Recovered {} jobs", recovered);
    print_usage(&translator).await;
    Ok(())
}

/// Handle publish command
pub async fn handle_publish(config: &AppConfig, job_id: JobId) -> anyhow::Result<()> {
    let (service, _) = build_service(config).await?;
    let receipt = service.publish(job_id).await?;
    if let Some(reason) = &receipt.fallback {
        eprintln!("⚠️  Published as flat text: {}", reason);
    }
    println!("✅ Published job {} as {}", job_id, receipt.published_id);
    Ok(())
}

/// Handle server command
pub async fn handle_server(config: &AppConfig, host: String, port: u16) -> anyhow::Result<()> {
    info!("Starting HTTP API server");
    info!("Host: {}", host);
    info!("Port: {}", port);

    let (service, _) = build_service(config).await?;
    let recovered = service.recover().await?;
    if recovered > 0 {
        info!("Resumed {} unfinished jobs", recovered);
    }

    println!("🚀 Server starting on http://{}:{}", host, port);
    println!("   Health check: http://{}:{}/", host, port);
    println!("   Jobs:         http://{}:{}/jobs", host, port);
    println!("   Preview:      http://{}:{}/preview", host, port);

    crate::server::api::run_server(service, host, port).await
}
