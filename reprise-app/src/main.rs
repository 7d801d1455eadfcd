use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reprise_cache::{CachedExecutor, ExecutorOptions, JsonFileCache};
use reprise_common::observability::init_logging;
use reprise_config::{RepriseConfig, RepriseConfigLoader};
use reprise_drivers::reprise_browser::driver::{DriverOptions, RepriseDriver};
use reprise_llm::ensure_llm_ready;
use tracing::{error, info};

mod flows;

#[derive(Debug, Parser)]
#[command(name = "reprise", about = "Cached, self-healing browser automation", version)]
struct Cli {
    /// Path to the YAML configuration file (optional; env overrides still apply)
    #[arg(short, long, default_value = "reprise.yaml", value_name = "FILE")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Walk the swap page: select a token, pick USDC, enter an amount
    Run,
    /// Run the swap flow and verify the displayed exchange rate
    SwapCheck,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let cfg: RepriseConfig = RepriseConfigLoader::new()
        .with_optional_file(&cli.config)
        .load()
        .with_context(|| format!("loading {}", cli.config.display()))?;

    let log_path = init_logging(cfg.logging.to_log_config("reprise"))?;
    info!(config = %cli.config.display(), log = %log_path.display(), "reprise.start");

    let llm = ensure_llm_ready(&cfg.llm).await?;
    let store = Arc::new(JsonFileCache::new(cfg.cache.path.clone()));
    let executor = CachedExecutor::with_options(
        store,
        ExecutorOptions {
            visibility_timeout: cfg.cache.visibility_timeout(),
            key_text_len: cfg.cache.key_text_len,
        },
    );

    let driver = RepriseDriver::new(DriverOptions {
        webdriver_url: cfg.browser.webdriver_url.clone(),
        headless: cfg.browser.headless,
        viewport: (cfg.browser.viewport.width, cfg.browser.viewport.height),
        dom_settle: cfg.browser.dom_settle(),
    })
    .await
    .context("starting browser session")?;

    let outcome = match driver
        .goto(&cfg.browser.page_url(flows::SWAP_PATH), llm)
        .await
    {
        Ok(page) => match cli.command.unwrap_or(Commands::Run) {
            Commands::Run => flows::run_demo(&executor, &page).await,
            Commands::SwapCheck => flows::swap_check(&executor, &page).await.map(|rate| {
                println!("Found exchange rate: {rate}");
            }),
        },
        Err(err) => Err(err.into()),
    };

    println!("{}", serde_json::to_string_pretty(&executor.stats())?);

    if let Err(err) = driver.close().await {
        error!(error = %err, "reprise.close_failed");
    }

    match outcome {
        Ok(()) => {
            info!("reprise.done");
            Ok(())
        }
        Err(err) => {
            error!(error = %err, "reprise.failed");
            Err(err)
        }
    }
}
