use thiserror::Error;

pub type BrowserResult<T> = Result<T, BrowserError>;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("session creation failed after {attempts} attempts: {message}")]
    SessionCreation { attempts: usize, message: String },
    #[error("remote connection lost: {0}")]
    ConnectionLost(String),
    #[error("element not found: {0}")]
    ElementNotFound(String),
    #[error("stale element: {0}")]
    StaleElement(String),
    #[error("timeout waiting for {0}")]
    Timeout(String),
    #[error("cdp error: {0}")]
    Cdp(#[from] chromiumoxide::error::CdpError),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl BrowserError {
    /// Missing or detached elements; the page itself is still usable.
    pub fn is_element_error(&self) -> bool {
        matches!(
            self,
            BrowserError::ElementNotFound(_) | BrowserError::StaleElement(_)
        )
    }
}
