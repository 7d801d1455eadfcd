use std::time::Duration;

use anyhow::{Context, Result, bail};
use regex::Regex;
use reprise_cache::{AdvancedOptions, CachedExecutor, PageContext, Resolver};
use reprise_drivers::reprise_browser::page::BrowserPage;
use tracing::info;

pub const SWAP_PATH: &str = "swap";

const SELECT_TOKEN: &str = "Click on \"Select token\"";
const SELECT_USDC: &str = "Click on \"USDC\"";
const ENTER_AMOUNT: &str = "Enter \"0.1\" ETH";
const EXCHANGE_RATE: &str =
    "Exchange rate showing \"1 USDC = \" followed by a number and \"ETH\"";
const EXCHANGE_RATE_PATTERN: &str = r"1 USDC = \d+\.\d+ ETH";
const RATE_SETTLE: Duration = Duration::from_secs(2);

/// Select a token, pick USDC, then enter an amount under a one-off key.
///
/// The first two steps are keyed by their instruction text so later runs replay them.
pub async fn run_demo<P>(executor: &CachedExecutor, page: &P) -> Result<()>
where
    P: Resolver + PageContext + ?Sized,
{
    executor
        .act_with_cache(page, SELECT_TOKEN, SELECT_TOKEN, true)
        .await?;
    executor
        .act_with_cache(page, SELECT_USDC, SELECT_USDC, true)
        .await?;

    let custom_key = format!("swap-page-{}", chrono::Utc::now().timestamp_millis());
    info!(key = %custom_key, "demo.enter_amount");
    executor
        .act_with_advanced_cache(
            page,
            ENTER_AMOUNT,
            AdvancedOptions {
                self_heal: false,
                custom_key: Some(custom_key),
            },
        )
        .await?;
    Ok(())
}

/// Drive the swap form and return the exchange-rate text it displays.
pub async fn swap_check(executor: &CachedExecutor, page: &BrowserPage) -> Result<String> {
    swap_steps(executor, page).await?;
    page.wait(RATE_SETTLE).await;

    let elements = executor
        .observe_with_cache(page, "exchange-rate-display", EXCHANGE_RATE, true)
        .await?;
    let Some(first) = elements.first() else {
        bail!("no exchange rate element found");
    };

    let text = page
        .text_content(&first.selector)
        .await
        .with_context(|| format!("reading exchange rate from {}", first.selector))?;
    info!(selector = %first.selector, %text, "swap_check.rate");

    if !is_exchange_rate(&text)? {
        bail!("exchange rate text {text:?} does not match {EXCHANGE_RATE_PATTERN}");
    }
    Ok(text)
}

async fn swap_steps<P>(executor: &CachedExecutor, page: &P) -> Result<()>
where
    P: Resolver + PageContext + ?Sized,
{
    executor
        .act_with_cache(page, "select-token", SELECT_TOKEN, true)
        .await?;
    executor
        .act_with_cache(page, "select-usdc", SELECT_USDC, true)
        .await?;
    executor
        .act_with_cache(page, "enter-1-eth", ENTER_AMOUNT, true)
        .await?;
    Ok(())
}

fn is_exchange_rate(text: &str) -> Result<bool> {
    let pattern = Regex::new(EXCHANGE_RATE_PATTERN)?;
    Ok(pattern.is_match(text))
}
