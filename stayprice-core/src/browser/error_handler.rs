use chromiumoxide::error::CdpError;
use serde::Serialize;

use crate::config::SessionSection;

use super::error::BrowserError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BrowserErrorCategory {
    ConnectionLost,
    ElementMissing,
    Timeout,
    SessionCreation,
    Unexpected,
}

/// Sorts automation failures into the buckets the batch loop reacts to.
///
/// Connection loss is recognised either structurally (websocket and channel
/// failures reported by the CDP client) or by matching the error text against
/// the configured signatures, case-insensitively.
#[derive(Debug, Clone)]
pub struct ErrorCategorizer {
    signatures: Vec<String>,
}

impl Default for ErrorCategorizer {
    fn default() -> Self {
        Self::from_config(&SessionSection::default())
    }
}

impl ErrorCategorizer {
    pub fn new<I, S>(signatures: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let signatures = signatures
            .into_iter()
            .map(|sig| sig.as_ref().trim().to_lowercase())
            .filter(|sig| !sig.is_empty())
            .collect();
        Self { signatures }
    }

    pub fn from_config(config: &SessionSection) -> Self {
        Self::new(&config.connection_loss_signatures)
    }

    pub fn matches_signature(&self, message: &str) -> bool {
        let message = message.to_lowercase();
        self.signatures.iter().any(|sig| message.contains(sig))
    }

    pub fn categorize(&self, error: &BrowserError) -> BrowserErrorCategory {
        match error {
            BrowserError::ConnectionLost(_) => BrowserErrorCategory::ConnectionLost,
            BrowserError::SessionCreation { .. } => BrowserErrorCategory::SessionCreation,
            BrowserError::ElementNotFound(_) | BrowserError::StaleElement(_) => {
                BrowserErrorCategory::ElementMissing
            }
            BrowserError::Cdp(CdpError::Ws(_)) | BrowserError::Cdp(CdpError::ChannelSendError(_)) => {
                BrowserErrorCategory::ConnectionLost
            }
            BrowserError::Cdp(err) => {
                let text = err.to_string();
                if self.matches_signature(&text) {
                    BrowserErrorCategory::ConnectionLost
                } else if text.to_lowercase().contains("timeout") {
                    BrowserErrorCategory::Timeout
                } else {
                    BrowserErrorCategory::Unexpected
                }
            }
            BrowserError::Timeout(message) => {
                if self.matches_signature(message) {
                    BrowserErrorCategory::ConnectionLost
                } else {
                    BrowserErrorCategory::Timeout
                }
            }
            BrowserError::Configuration(message) | BrowserError::Unexpected(message) => {
                if self.matches_signature(message) {
                    BrowserErrorCategory::ConnectionLost
                } else {
                    BrowserErrorCategory::Unexpected
                }
            }
        }
    }

    pub fn is_connection_loss(&self, error: &BrowserError) -> bool {
        self.categorize(error) == BrowserErrorCategory::ConnectionLost
    }
}
