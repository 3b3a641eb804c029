//! Per-platform sponsor fetchers.
//!
//! Each fetcher speaks one funding platform's wire protocol and returns
//! already-normalized [`Sponsor`] records: inactive pledges are filtered out
//! and amounts are converted to a monthly figure before the aggregator sees
//! them. None of the fetchers retry; a failed call surfaces one
//! [`FetchError`] for the aggregator to account.

mod afdian;
mod github;
mod opencollective;
mod patreon;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use afdian::AfdianSource;
pub use github::GithubSource;
pub use opencollective::OpenCollectiveSource;
pub use patreon::PatreonSource;

use crate::domain::sponsor::{Platform, Sponsor};

/// Shared request timeout for platform calls; Afdian raises its own.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("request failed with status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("platform api error: {0}")]
    Api(String),
}

/// A single funding platform's sponsor listing.
#[async_trait]
pub trait SponsorSource: Send + Sync {
    /// Platform this source reports for.
    fn platform(&self) -> Platform;

    /// Fetch the full, normalized sponsor list.
    async fn fetch(&self) -> Result<Vec<Sponsor>, FetchError>;
}

/// Turn a non-2xx response into a [`FetchError::Status`] carrying the body.
pub(crate) async fn error_for_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(FetchError::Status { status, body })
}
