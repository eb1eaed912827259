//! Error types for the seller-platform scraper.

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    /// The WebDriver endpoint refused the request or the session died.
    #[error("WebDriver request failed: {0}")]
    Driver(String),
    /// An element the flow depends on never showed up.
    #[error("timed out after {waited:.0?} waiting for {what}")]
    WaitTimeout { what: String, waited: Duration },
    /// The page content contradicts what the flow expects.
    #[error("unexpected page state: {0}")]
    UnexpectedPage(String),
    /// Login is required but could not be completed.
    #[error("authorization failed: {0}")]
    AuthFailed(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ScrapeError {
    /// Whether retrying the whole report from scratch could plausibly succeed.
    ///
    /// Timeouts and dead driver sessions are transient; a page that
    /// actively contradicts the flow (wrong article in the card list,
    /// missing buttons) will contradict it again.
    pub fn is_recoverable(&self) -> bool {
        match self {
            ScrapeError::Driver(_) | ScrapeError::WaitTimeout { .. } => true,
            ScrapeError::UnexpectedPage(_) | ScrapeError::AuthFailed(_) => false,
            ScrapeError::Other(_) => true,
        }
    }
}

pub type ScrapeResult<T> = Result<T, ScrapeError>;
