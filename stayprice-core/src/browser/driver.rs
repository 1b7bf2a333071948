use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::error::BrowserResult;

/// Handle to an element located on the current page.
///
/// Handles are only meaningful for the driver that issued them and become
/// stale once the page navigates or the driver forgets its elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementRef {
    pub generation: u64,
    pub index: usize,
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "element#{}@{}", self.index, self.generation)
    }
}

/// Page-level automation capabilities consumed by the search sequencer.
#[async_trait(?Send)]
pub trait PageDriver {
    fn session_id(&self) -> &str;
    async fn navigate(&mut self, url: &str) -> BrowserResult<()>;
    /// Polls until the document reports `complete`; `false` on timeout.
    async fn wait_for_load_complete(&mut self, timeout: Duration) -> BrowserResult<bool>;
    async fn current_url(&mut self) -> BrowserResult<String>;
    async fn locate(&mut self, selector: &str, timeout: Duration) -> BrowserResult<ElementRef>;
    async fn locate_all(&mut self, selector: &str) -> BrowserResult<Vec<ElementRef>>;
    async fn locate_within(
        &mut self,
        parent: ElementRef,
        selector: &str,
    ) -> BrowserResult<ElementRef>;
    async fn locate_all_within(
        &mut self,
        parent: ElementRef,
        selector: &str,
    ) -> BrowserResult<Vec<ElementRef>>;
    async fn read_text(&mut self, element: ElementRef) -> BrowserResult<String>;
    async fn read_attribute(
        &mut self,
        element: ElementRef,
        name: &str,
    ) -> BrowserResult<Option<String>>;
    async fn read_value(&mut self, element: ElementRef) -> BrowserResult<String>;
    async fn click(&mut self, element: ElementRef) -> BrowserResult<()>;
    async fn clear_and_type(&mut self, element: ElementRef, value: &str) -> BrowserResult<()>;
    async fn is_visible(&mut self, element: ElementRef) -> BrowserResult<bool>;
    /// Text of every text node on the page containing `needle`.
    async fn texts_containing(&mut self, needle: &str) -> BrowserResult<Vec<String>>;
    /// Invalidates every handle issued so far.
    fn forget_elements(&mut self);
    async fn close(&mut self) -> BrowserResult<()>;
}

#[async_trait(?Send)]
pub trait SessionFactory {
    async fn create(&self) -> BrowserResult<Box<dyn PageDriver>>;
}

/// Clicks away any visible blocking dialog. Never fails; returns whether
/// something was dismissed.
pub async fn dismiss_interstitial(driver: &mut dyn PageDriver, selectors: &[String]) -> bool {
    let mut dismissed = false;
    for selector in selectors {
        let candidates = match driver.locate_all(selector).await {
            Ok(candidates) => candidates,
            Err(err) => {
                debug!(selector = %selector, error = %err, "interstitial lookup failed");
                continue;
            }
        };
        for element in candidates {
            if !matches!(driver.is_visible(element).await, Ok(true)) {
                continue;
            }
            match driver.click(element).await {
                Ok(()) => {
                    debug!(selector = %selector, "dismissed interstitial");
                    dismissed = true;
                }
                Err(err) => debug!(selector = %selector, error = %err, "interstitial click failed"),
            }
        }
    }
    dismissed
}

/// Writes `value` into an input, verifying the result and retrying once on mismatch.
///
/// A value the page still rewrites after the retry is tolerated; the caller's
/// next lookup decides whether the search can go on.
pub async fn set_text(
    driver: &mut dyn PageDriver,
    element: ElementRef,
    value: &str,
) -> BrowserResult<()> {
    let expected = value.trim();
    for attempt in 0..2 {
        driver.clear_and_type(element, value).await?;
        let actual = driver.read_value(element).await?;
        if actual.trim() == expected {
            return Ok(());
        }
        debug!(attempt, expected, actual = %actual, "input value mismatch after typing");
        if attempt == 1 {
            warn!(expected, actual = %actual, "input value still differs, continuing");
        }
    }
    Ok(())
}
