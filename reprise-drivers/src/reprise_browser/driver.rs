use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use fantoccini::{Client, ClientBuilder};
use reprise_llm::traits::LlmClient;
use serde_json::json;
use tracing::info;
use webdriver::capabilities::Capabilities;

use crate::reprise_browser::page::BrowserPage;

/// How to reach and shape the browser session.
#[derive(Debug, Clone)]
pub struct DriverOptions {
    pub webdriver_url: String,
    pub headless: bool,
    pub viewport: (u32, u32),
    /// Pause after navigation and each action so the DOM can settle.
    pub dom_settle: Duration,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".to_string(),
            headless: false,
            viewport: (1024, 768),
            dom_settle: Duration::from_millis(500),
        }
    }
}

/// Thin wrapper around a `fantoccini` WebDriver client.
pub struct RepriseDriver {
    pub client: Client,
    options: DriverOptions,
}

impl RepriseDriver {
    /// Create a new Chrome session on a running WebDriver service
    /// (Chromedriver listens on `http://localhost:9515` by default).
    pub async fn new(options: DriverOptions) -> Result<Self> {
        let mut caps = Capabilities::new();
        caps.insert(
            "goog:chromeOptions".to_string(),
            json!({ "args": chrome_arguments(&options) }),
        );

        let client = ClientBuilder::native()
            .capabilities(caps)
            .connect(&options.webdriver_url)
            .await?;
        info!(
            target: "browser.driver",
            webdriver = %options.webdriver_url,
            headless = options.headless,
            "session started"
        );

        Ok(Self { client, options })
    }

    /// Navigate to `url` and return a page resolved through `llm`.
    pub async fn goto(
        &self,
        url: &str,
        llm: Arc<dyn LlmClient + Send + Sync>,
    ) -> reprise_common::Result<BrowserPage> {
        let page = BrowserPage::new(self.client.clone(), llm, self.options.dom_settle);
        page.goto(url).await?;
        Ok(page)
    }

    /// Close the underlying browser session.
    pub async fn close(self) -> Result<()> {
        self.client.close().await?;
        Ok(())
    }
}

fn chrome_arguments(options: &DriverOptions) -> Vec<String> {
    let mut args = vec![
        "--disable-dev-shm-usage".to_string(),
        "--disable-infobars".to_string(),
        format!("--window-size={},{}", options.viewport.0, options.viewport.1),
    ];
    if options.headless {
        args.push("--headless=new".to_string());
        args.push("--disable-gpu".to_string());
    }
    args
}
