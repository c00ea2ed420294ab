use super::{DriverError, DriverResult, NodeHandle, PageDriver};
use crate::config::{Config, Selectors};
use crate::Result;
use async_trait::async_trait;
use eoka::{Browser, Page};
use tracing::{debug, info, warn};

/// Pause between filling the input and submitting it.
const SUBMIT_PAUSE_MS: u64 = 600;

/// Pause after a preflight click so the page can settle.
const PREFLIGHT_SETTLE_MS: u64 = 2000;

/// How long to wait for the submit control once the input is filled.
const SUBMIT_TIMEOUT_MS: u64 = 5000;

/// [`PageDriver`] backed by an eoka browser session.
pub struct EokaDriver {
    browser: Browser,
    page: Page,
    selectors: Selectors,
}

impl EokaDriver {
    /// Launch a browser, open the profile's chat page and run its preflight
    /// clicks.
    pub async fn launch(config: &Config) -> Result<Self> {
        let browser_config = &config.browser;
        let stealth = eoka::StealthConfig {
            headless: browser_config.headless,
            proxy: browser_config.proxy.clone(),
            user_agent: browser_config.user_agent.clone(),
            viewport_width: browser_config
                .viewport
                .as_ref()
                .map(|v| v.width)
                .unwrap_or(1920),
            viewport_height: browser_config
                .viewport
                .as_ref()
                .map(|v| v.height)
                .unwrap_or(1080),
            ..Default::default()
        };

        debug!(
            "Launching browser (headless: {}, proxy: {:?})",
            browser_config.headless, browser_config.proxy
        );
        let browser = Browser::launch_with_config(stealth).await?;
        let page = browser.new_page("about:blank").await?;

        let driver = Self {
            browser,
            page,
            selectors: config.selectors.clone(),
        };
        driver.open(config).await?;
        Ok(driver)
    }

    async fn open(&self, config: &Config) -> Result<()> {
        info!("Navigating to: {}", config.url);
        self.page.goto(&config.url).await?;
        self.page.wait(config.ready_delay_ms).await;

        for selector in &config.preflight {
            match self.page.try_click(selector).await {
                Ok(true) => {
                    debug!("preflight: clicked '{}'", selector);
                    self.page.wait(PREFLIGHT_SETTLE_MS).await;
                }
                Ok(false) => debug!("preflight: '{}' not present", selector),
                Err(e) => warn!("preflight: '{}' failed: {}", selector, e),
            }
        }
        Ok(())
    }

    /// Close the browser.
    pub async fn close(self) -> Result<()> {
        self.browser.close().await?;
        Ok(())
    }
}

#[async_trait]
impl PageDriver for EokaDriver {
    async fn submit_question(&mut self, text: &str) -> DriverResult<()> {
        let input = self.selectors.input.as_str();
        self.page
            .wait_for(input, self.selectors.input_timeout_ms)
            .await?;
        self.page.click(input).await?;
        self.page.fill(input, "").await?;
        self.page.fill(input, text).await?;
        self.page.wait(SUBMIT_PAUSE_MS).await;

        match self.selectors.submit {
            Some(ref submit) => {
                self.page.wait_for(submit, SUBMIT_TIMEOUT_MS).await?;
                self.page.click(submit).await?;
            }
            None => self.page.human().press_key("Enter").await?,
        }
        debug!("question submitted via {}", input);
        Ok(())
    }

    async fn query_latest_answer_node(&mut self) -> DriverResult<Option<NodeHandle>> {
        let js = format!(
            "document.querySelectorAll({}).length",
            js_string(&self.selectors.answer)
        );
        let count: usize = self.page.evaluate(&js).await?;
        Ok(count.checked_sub(1).map(NodeHandle::new))
    }

    async fn read_text(&mut self, node: &NodeHandle) -> DriverResult<String> {
        let js = read_text_js(
            &self.selectors.answer,
            self.selectors.answer_text.as_deref(),
            node.ordinal,
        );
        let text: Option<String> = self.page.evaluate(&js).await?;
        text.ok_or_else(|| {
            DriverError::NotFound(format!(
                "answer node {} ('{}')",
                node.ordinal, self.selectors.answer
            ))
        })
    }

    async fn get_attribute(
        &mut self,
        node: &NodeHandle,
        name: &str,
    ) -> DriverResult<Option<String>> {
        let js = get_attribute_js(&self.selectors.answer, node.ordinal, name);
        Ok(self.page.evaluate(&js).await?)
    }

    async fn query_busy_indicator(&mut self) -> DriverResult<bool> {
        let Some(ref busy) = self.selectors.busy else {
            return Ok(false);
        };
        let js = format!("!!document.querySelector({})", js_string(busy));
        Ok(self.page.evaluate(&js).await?)
    }
}

/// Quote `s` as a JavaScript string literal.
fn js_string(s: &str) -> String {
    serde_json::Value::from(s).to_string()
}

/// Script returning the text of the `ordinal`-th answer node, or of its
/// `text_selector` sub-node. `null` when the node is gone.
fn read_text_js(selector: &str, text_selector: Option<&str>, ordinal: usize) -> String {
    let sub = text_selector.map_or_else(|| "null".to_string(), js_string);
    format!(
        "(() => {{ \
            const el = document.querySelectorAll({0})[{1}]; \
            if (!el) return null; \
            const sub = {2}; \
            const target = sub ? el.querySelector(sub) : el; \
            return target ? target.innerText : \"\"; \
        }})()",
        js_string(selector),
        ordinal,
        sub
    )
}

fn get_attribute_js(selector: &str, ordinal: usize, name: &str) -> String {
    format!(
        "(() => {{ \
            const el = document.querySelectorAll({0})[{1}]; \
            return el ? el.getAttribute({2}) : null; \
        }})()",
        js_string(selector),
        ordinal,
        js_string(name)
    )
}
