use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, NavigateParams,
};
use chromiumoxide::cdp::browser_protocol::target::CreateTargetParams;
use chromiumoxide::element::Element;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{RemoteEndpoint, ScraperConfig};
use crate::error::ConfigError;

use super::driver::{ElementRef, PageDriver, SessionFactory};
use super::error::{BrowserError, BrowserResult};

const LOCATE_POLL: Duration = Duration::from_millis(250);
const LOAD_POLL: Duration = Duration::from_millis(500);
const HANDLER_DRAIN: Duration = Duration::from_secs(5);

const VALUE_FN: &str = "function() { return this.value == null ? '' : String(this.value); }";
const CLEAR_FN: &str = "function() { this.focus(); this.value = ''; this.dispatchEvent(new Event('input', { bubbles: true })); }";
const CLICK_FN: &str = "function() { this.click(); }";
const VISIBLE_FN: &str = r#"function() {
    const rect = this.getBoundingClientRect();
    const style = window.getComputedStyle(this);
    return rect.width > 0 && rect.height > 0
        && style.visibility !== 'hidden' && style.display !== 'none';
}"#;

/// Connects to the remote browser provider.
#[derive(Debug, Clone)]
pub struct BrowserLauncher {
    endpoint_url: String,
    request_timeout: Duration,
    language: Option<String>,
}

impl BrowserLauncher {
    pub fn new(endpoint: &RemoteEndpoint, config: &ScraperConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            endpoint_url: endpoint.url(&config.remote.scheme)?,
            request_timeout: Duration::from_secs(config.remote.request_timeout_seconds),
            language: config.site.language.clone(),
        })
    }

    pub async fn connect(&self) -> BrowserResult<RemoteBrowserSession> {
        let (mut browser, mut handler) =
            timeout(self.request_timeout, Browser::connect(self.endpoint_url.clone()))
                .await
                .map_err(|_| BrowserError::Timeout("remote browser handshake".to_string()))??;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(error = %err, "remote browser handler reported error");
                }
            }
        });

        let page = match self.open_page(&browser).await {
            Ok(page) => page,
            Err(err) => {
                if let Err(close_err) = browser.close().await {
                    debug!(error = %close_err, "failed to close browser after page setup error");
                }
                handler_task.abort();
                return Err(err);
            }
        };

        let id = Uuid::new_v4().to_string();
        info!(session = %id, "connected to remote browser");
        Ok(RemoteBrowserSession {
            id,
            browser,
            page,
            handler_task: Some(handler_task),
            request_timeout: self.request_timeout,
            elements: Vec::new(),
            generation: 0,
            closed: false,
        })
    }

    async fn open_page(&self, browser: &Browser) -> BrowserResult<Page> {
        let page = browser
            .new_page(CreateTargetParams::new("about:blank"))
            .await?;
        if let Some(lang) = &self.language {
            let languages_script = format!(
                "Object.defineProperty(navigator, 'language', {{ get: () => '{lang}' }});\nObject.defineProperty(navigator, 'languages', {{ get: () => ['{lang}', 'en-US'] }});"
            );
            page.evaluate_on_new_document(
                AddScriptToEvaluateOnNewDocumentParams::builder()
                    .source(languages_script)
                    .build()
                    .map_err(BrowserError::Configuration)?,
            )
            .await?;
        }
        Ok(page)
    }
}

/// One remote browser connection with a single page.
///
/// Located elements live in a registry addressed by [`ElementRef`]; the
/// registry is cleared and its generation bumped on every navigation and
/// at the start of every search.
pub struct RemoteBrowserSession {
    id: String,
    browser: Browser,
    page: Page,
    handler_task: Option<JoinHandle<()>>,
    request_timeout: Duration,
    elements: Vec<Element>,
    generation: u64,
    closed: bool,
}

impl RemoteBrowserSession {
    fn register(&mut self, element: Element) -> ElementRef {
        self.elements.push(element);
        ElementRef {
            generation: self.generation,
            index: self.elements.len() - 1,
        }
    }

    fn element(&self, handle: ElementRef) -> BrowserResult<&Element> {
        if handle.generation != self.generation {
            return Err(BrowserError::StaleElement(format!(
                "{handle} belongs to a previous page"
            )));
        }
        self.elements
            .get(handle.index)
            .ok_or_else(|| BrowserError::StaleElement(handle.to_string()))
    }

    fn invalidate(&mut self) {
        self.elements.clear();
        self.generation += 1;
    }

    async fn call_fn(&self, handle: ElementRef, function: &str) -> BrowserResult<serde_json::Value> {
        let returns = self
            .element(handle)?
            .call_js_fn(function, false)
            .await
            .map_err(|err| element_error(handle, err))?;
        Ok(returns.result.value.unwrap_or(serde_json::Value::Null))
    }
}

/// Chrome-side lookup failures mean the node is not there; transport
/// failures are kept intact for connection-loss classification.
fn lookup_error(selector: &str, err: CdpError) -> BrowserError {
    match err {
        CdpError::Chrome(_) => BrowserError::ElementNotFound(format!("{selector} ({err})")),
        other => BrowserError::Cdp(other),
    }
}

fn element_error(handle: ElementRef, err: CdpError) -> BrowserError {
    match err {
        CdpError::Chrome(_) => BrowserError::StaleElement(format!("{handle} ({err})")),
        other => BrowserError::Cdp(other),
    }
}

#[async_trait(?Send)]
impl PageDriver for RemoteBrowserSession {
    fn session_id(&self) -> &str {
        &self.id
    }

    async fn navigate(&mut self, url: &str) -> BrowserResult<()> {
        self.invalidate();
        let params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(BrowserError::Configuration)?;
        let page = &self.page;
        timeout(self.request_timeout, async move {
            page.goto(params).await?;
            page.wait_for_navigation().await?;
            Ok::<_, BrowserError>(())
        })
        .await
        .map_err(|_| BrowserError::Timeout(format!("navigation to {url}")))??;
        debug!(session = %self.id, url, "navigated");
        Ok(())
    }

    async fn wait_for_load_complete(&mut self, limit: Duration) -> BrowserResult<bool> {
        let deadline = Instant::now() + limit;
        loop {
            let state: String = self
                .page
                .evaluate("document.readyState")
                .await?
                .into_value()
                .map_err(|err| {
                    BrowserError::Unexpected(format!("failed to read document state: {err}"))
                })?;
            if state == "complete" {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                warn!(session = %self.id, state = %state, "page did not finish loading");
                return Ok(false);
            }
            sleep(LOAD_POLL).await;
        }
    }

    async fn current_url(&mut self) -> BrowserResult<String> {
        Ok(self
            .page
            .url()
            .await?
            .unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn locate(&mut self, selector: &str, limit: Duration) -> BrowserResult<ElementRef> {
        let deadline = Instant::now() + limit;
        loop {
            match self.page.find_element(selector).await {
                Ok(element) => return Ok(self.register(element)),
                Err(err) => {
                    let err = lookup_error(selector, err);
                    if !err.is_element_error() {
                        return Err(err);
                    }
                    if Instant::now() >= deadline {
                        return Err(if limit.is_zero() {
                            err
                        } else {
                            BrowserError::ElementNotFound(format!(
                                "{selector} within {}ms",
                                limit.as_millis()
                            ))
                        });
                    }
                }
            }
            sleep(LOCATE_POLL).await;
        }
    }

    async fn locate_all(&mut self, selector: &str) -> BrowserResult<Vec<ElementRef>> {
        let found = match self.page.find_elements(selector).await {
            Ok(found) => found,
            Err(err) => match lookup_error(selector, err) {
                BrowserError::ElementNotFound(_) => Vec::new(),
                other => return Err(other),
            },
        };
        Ok(found.into_iter().map(|el| self.register(el)).collect())
    }

    async fn locate_within(
        &mut self,
        parent: ElementRef,
        selector: &str,
    ) -> BrowserResult<ElementRef> {
        let found = self
            .element(parent)?
            .find_element(selector)
            .await
            .map_err(|err| lookup_error(selector, err))?;
        Ok(self.register(found))
    }

    async fn locate_all_within(
        &mut self,
        parent: ElementRef,
        selector: &str,
    ) -> BrowserResult<Vec<ElementRef>> {
        let found = self
            .element(parent)?
            .find_elements(selector)
            .await
            .map_err(|err| lookup_error(selector, err))?;
        Ok(found.into_iter().map(|el| self.register(el)).collect())
    }

    async fn read_text(&mut self, element: ElementRef) -> BrowserResult<String> {
        let text = self
            .element(element)?
            .inner_text()
            .await
            .map_err(|err| element_error(element, err))?;
        Ok(text.unwrap_or_default())
    }

    async fn read_attribute(
        &mut self,
        element: ElementRef,
        name: &str,
    ) -> BrowserResult<Option<String>> {
        self.element(element)?
            .attribute(name)
            .await
            .map_err(|err| element_error(element, err))
    }

    async fn read_value(&mut self, element: ElementRef) -> BrowserResult<String> {
        let value = self.call_fn(element, VALUE_FN).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn click(&mut self, element: ElementRef) -> BrowserResult<()> {
        let clicked = self.element(element)?.click().await.map(|_| ());
        match clicked {
            Ok(()) => Ok(()),
            // Elements outside the viewport cannot take a synthetic mouse click.
            Err(CdpError::ScrollingFailed(reason)) => {
                debug!(element = %element, reason = %reason, "falling back to script click");
                self.call_fn(element, CLICK_FN).await.map(|_| ())
            }
            Err(err) => Err(element_error(element, err)),
        }
    }

    async fn clear_and_type(&mut self, element: ElementRef, value: &str) -> BrowserResult<()> {
        self.call_fn(element, CLEAR_FN).await?;
        self.element(element)?
            .type_str(value)
            .await
            .map_err(|err| element_error(element, err))?;
        Ok(())
    }

    async fn is_visible(&mut self, element: ElementRef) -> BrowserResult<bool> {
        Ok(self
            .call_fn(element, VISIBLE_FN)
            .await?
            .as_bool()
            .unwrap_or(false))
    }

    async fn texts_containing(&mut self, needle: &str) -> BrowserResult<Vec<String>> {
        let literal = serde_json::to_string(needle)
            .map_err(|err| BrowserError::Unexpected(format!("unencodable needle: {err}")))?;
        let script = format!(
            r#"(() => {{
    const needle = {literal};
    const out = [];
    const walker = document.createTreeWalker(document.body, NodeFilter.SHOW_TEXT);
    while (walker.nextNode()) {{
        const text = walker.currentNode.textContent || '';
        if (text.includes(needle)) out.push(text.trim());
    }}
    return out;
}})()"#
        );
        self.page
            .evaluate(script.as_str())
            .await?
            .into_value()
            .map_err(|err| BrowserError::Unexpected(format!("failed to decode text scan: {err}")))
    }

    fn forget_elements(&mut self) {
        self.invalidate();
    }

    async fn close(&mut self) -> BrowserResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.invalidate();
        info!(session = %self.id, "closing remote browser session");
        let closed = self.browser.close().await.map(|_| ());
        if let Some(handle) = self.handler_task.take() {
            match timeout(HANDLER_DRAIN, handle).await {
                Ok(Err(err)) => warn!(error = %err, "browser handler join error"),
                Ok(Ok(())) => {}
                Err(_) => debug!(session = %self.id, "browser handler still draining"),
            }
        }
        closed.map_err(BrowserError::from)
    }
}

impl Drop for RemoteBrowserSession {
    fn drop(&mut self) {
        if let Some(handle) = &self.handler_task {
            if !handle.is_finished() {
                warn!(
                    session = %self.id,
                    "remote browser session dropped without explicit close"
                );
            }
        }
    }
}

/// Creates a fresh remote session per request.
#[derive(Debug, Clone)]
pub struct RemoteSessionFactory {
    launcher: BrowserLauncher,
}

impl RemoteSessionFactory {
    pub fn new(launcher: BrowserLauncher) -> Self {
        Self { launcher }
    }
}

#[async_trait(?Send)]
impl SessionFactory for RemoteSessionFactory {
    async fn create(&self) -> BrowserResult<Box<dyn PageDriver>> {
        let session = self.launcher.connect().await?;
        Ok(Box::new(session))
    }
}
