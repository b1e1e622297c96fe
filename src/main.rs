//! Main entry point for the CMS translator CLI

#![forbid(unsafe_code)]

use clap::Parser;
use dotenvy::dotenv;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cms_translator::cli::commands::{self, Commands};
use cms_translator::AppConfig;

/// CMS Translator - extract, translate and restore CMS content
#[derive(Parser, Debug)]
#[command(name = "cms-translator", version, about, long_about = None)]
struct Args {
    /// Config file (defaults to ./cms-translator.{toml,json} when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// API key for the translation provider (defaults to ARK_API_KEY env var)
    #[arg(long)]
    api_key: Option<String>,

    /// Jobs translated at the same time
    #[arg(long)]
    concurrency: Option<usize>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv().ok();

    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("cms_translator={}", level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Override config with CLI args if provided
    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(api_key) = args.api_key {
        config.provider.api_key = api_key;
    }
    if let Some(concurrency) = args.concurrency {
        config.queue.concurrency = concurrency;
    }
    config.validate()?;

    // Execute command
    match args.command {
        Some(Commands::Extract { file, json }) => {
            commands::handle_extract(file, json).await?;
        }
        Some(Commands::Restore {
            file,
            translated,
            metadata,
            output,
        }) => {
            commands::handle_restore(file, translated, metadata, output).await?;
        }
        Some(Commands::Translate {
            entity_ids,
            target_lang,
        }) => {
            commands::handle_translate(&config, entity_ids, target_lang).await?;
        }
        Some(Commands::Recover) => {
            commands::handle_recover(&config).await?;
        }
        Some(Commands::Publish { job_id }) => {
            commands::handle_publish(&config, job_id).await?;
        }
        Some(Commands::Server { host, port }) => {
            commands::handle_server(&config, host, port).await?;
        }
        None => {
            println!("Please specify a command. Use --help for more information.");
        }
    }

    Ok(())
}
