use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use eddy::config::Config;
use eddy::favicon::FaviconService;
use eddy::fetch::FeedClient;
use eddy::pull::Puller;
use eddy::storage::Database;

#[derive(Parser, Debug)]
#[command(name = "eddy", about = "Headless RSS/Atom aggregation daemon")]
struct Args {
    /// Path to the TOML config file
    #[arg(long, value_name = "FILE", default_value = "eddy.toml")]
    config: PathBuf,

    /// Database path (overrides the config file)
    #[arg(long, value_name = "FILE")]
    db: Option<String>,

    /// Register a feed URL before starting (repeatable)
    #[arg(long = "add", value_name = "URL")]
    add: Vec<String>,

    /// Run one pull cycle and exit instead of looping
    #[arg(long)]
    once: bool,

    /// With --once: pull every feed regardless of timing and backoff
    #[arg(long, requires = "once")]
    force: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = Config::load(&args.config).context("failed to load configuration")?;
    let db_path = args.db.unwrap_or_else(|| config.db_path.clone());

    let db = Arc::new(
        Database::open(&db_path)
            .await
            .with_context(|| format!("failed to open database at {db_path}"))?,
    );

    for url in &args.add {
        let id = db
            .insert_feed(url, "")
            .await
            .with_context(|| format!("failed to register feed {url}"))?;
        println!("Registered feed #{id}: {url}");
    }

    let client = reqwest::Client::new();
    let mut puller = Puller::new(
        db.clone(),
        db.clone(),
        Arc::new(FeedClient::new(client.clone())),
        config.puller_config(),
    )
    .with_settings(db.clone());

    if let Some(dir) = &config.favicon_cache_dir {
        puller = puller.with_favicons(Arc::new(FaviconService::new(PathBuf::from(dir), client)));
    }

    if args.once {
        puller.pull_all(args.force).await?;
        puller.repair_favicons().await;
    } else {
        tracing::info!(db_path = %db_path, "starting refresh loop");
        puller.run().await;
    }

    Ok(())
}
