use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fantoccini::{elements::Element, error::CmdError, key::Key, Client, Locator};
use reprise_cache::{select_candidate, ActRequest, ActionRecord, PageContext, Resolver};
use reprise_common::{RepriseError, Result};
use reprise_llm::traits::LlmClient;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use crate::reprise_browser::prompt::{build_observe_prompt, parse_observation, OBSERVE_SYSTEM_PROMPT};

const VISIBILITY_POLL: Duration = Duration::from_millis(100);
const ELEMENT_WAIT: Duration = Duration::from_secs(10);

/// A live page whose instructions are resolved by an LLM.
pub struct BrowserPage {
    pub(crate) client: Client,
    pub(crate) llm: Arc<dyn LlmClient + Send + Sync>,
    pub(crate) dom_settle: Duration,
}

impl BrowserPage {
    pub fn new(client: Client, llm: Arc<dyn LlmClient + Send + Sync>, dom_settle: Duration) -> Self {
        Self {
            client,
            llm,
            dom_settle,
        }
    }

    /// Navigate to `url` and give the DOM time to settle.
    pub async fn goto(&self, url: &str) -> Result<()> {
        info!(target: "browser.page", %url, "navigate");
        self.client.goto(url).await.map_err(anyhow::Error::from)?;
        sleep(self.dom_settle).await;
        Ok(())
    }

    /// Return the full page HTML source.
    pub async fn get_content(&self) -> Result<String> {
        Ok(self.client.source().await.map_err(anyhow::Error::from)?)
    }

    /// Visible text of the first element matching `selector`.
    pub async fn text_content(&self, selector: &str) -> Result<String> {
        let element = self.locate(selector).await?;
        Ok(element.text().await.map_err(anyhow::Error::from)?)
    }

    pub async fn wait(&self, duration: Duration) {
        sleep(duration).await;
    }

    async fn locate(&self, selector: &str) -> Result<Element> {
        self.client
            .wait()
            .at_most(ELEMENT_WAIT)
            .for_element(locator(selector))
            .await
            .map_err(|e| RepriseError::Resolve(format!("element {selector} not found: {e}")))
    }

    async fn perform(&self, record: &ActionRecord) -> Result<()> {
        let kind = ActionKind::parse(record.method.as_deref())?;
        let element = self.locate(&record.selector).await?;
        let argument = record.arguments.first().map(String::as_str).unwrap_or("");
        debug!(target: "browser.page", selector = %record.selector, ?kind, "perform");

        interact(&element, kind, argument).await.map_err(|e| {
            RepriseError::Resolve(format!("{kind:?} on {} failed: {e}", record.selector))
        })?;

        sleep(self.dom_settle).await;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActionKind {
    Click,
    Fill,
    Type,
    Press,
}

impl ActionKind {
    /// A missing method means click.
    fn parse(method: Option<&str>) -> Result<Self> {
        let Some(method) = method else {
            return Ok(Self::Click);
        };
        match method.trim().to_ascii_lowercase().as_str() {
            "click" => Ok(Self::Click),
            "fill" => Ok(Self::Fill),
            "type" => Ok(Self::Type),
            "press" => Ok(Self::Press),
            _ => Err(RepriseError::Resolve(format!("unsupported action method: {method}"))),
        }
    }
}

async fn interact(
    element: &Element,
    kind: ActionKind,
    argument: &str,
) -> std::result::Result<(), CmdError> {
    match kind {
        ActionKind::Click => element.click().await,
        ActionKind::Fill => {
            element.clear().await?;
            element.send_keys(argument).await
        }
        ActionKind::Type => element.send_keys(argument).await,
        ActionKind::Press => element.send_keys(&key_sequence(argument)).await,
    }
}

fn locator(selector: &str) -> Locator<'_> {
    match selector.strip_prefix("xpath=") {
        Some(xpath) => Locator::XPath(xpath),
        None if selector.starts_with('/') => Locator::XPath(selector),
        None => Locator::Css(selector),
    }
}

fn key_sequence(name: &str) -> String {
    let key = match name.to_ascii_lowercase().as_str() {
        "enter" => Key::Enter,
        "tab" => Key::Tab,
        "escape" | "esc" => Key::Escape,
        "backspace" => Key::Backspace,
        _ => return name.to_string(),
    };
    char::from(key).to_string()
}

#[async_trait]
impl Resolver for BrowserPage {
    async fn observe(&self, instruction: &str) -> Result<Vec<ActionRecord>> {
        let url = PageContext::url(self).await?;
        let html = self.get_content().await?;
        let prompt = build_observe_prompt(instruction, &url, &html)?;

        let reply = self
            .llm
            .generate_json(&prompt, OBSERVE_SYSTEM_PROMPT, Some(2500))
            .await?;
        let records = parse_observation(reply)?;
        info!(
            target: "browser.observe",
            %instruction,
            candidates = records.len(),
            model = self.llm.model_name(),
            "observed"
        );
        Ok(records)
    }

    async fn act(&self, request: ActRequest<'_>) -> Result<()> {
        match request {
            ActRequest::Record(record) => self.perform(record).await,
            ActRequest::Instruction(instruction) => {
                let candidates = self.observe(instruction).await?;
                let record = select_candidate(candidates)
                    .ok_or_else(|| RepriseError::NoCandidates(instruction.to_string()))?;
                self.perform(&record).await
            }
        }
    }
}

#[async_trait]
impl PageContext for BrowserPage {
    async fn url(&self) -> Result<String> {
        let url = self.client.current_url().await.map_err(anyhow::Error::from)?;
        Ok(url.to_string())
    }

    async fn title(&self) -> Result<String> {
        Ok(self.client.title().await.map_err(anyhow::Error::from)?)
    }

    async fn visible_text(&self) -> Result<String> {
        let value = self
            .client
            .execute(
                "return document.body ? document.body.innerText : '';",
                vec![],
            )
            .await
            .map_err(anyhow::Error::from)?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn wait_for_visible(&self, selector: &str, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Ok(elements) = self.client.find_all(locator(selector)).await {
                for element in elements {
                    if element.is_displayed().await.unwrap_or(false) {
                        return Ok(());
                    }
                }
            }
            if Instant::now() + VISIBILITY_POLL > deadline {
                debug!(target: "browser.page", %selector, "not visible before deadline");
                return Err(RepriseError::Timeout);
            }
            sleep(VISIBILITY_POLL).await;
        }
    }
}
