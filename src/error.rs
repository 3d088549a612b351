/// Failure of a whole discovery attempt. The caller skips the sync step
/// of the current cycle and tries again on the next one.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("browser session error: {0}")]
    Browser(#[source] anyhow::Error),
    #[error("failed to load search page: {0}")]
    Navigation(#[source] anyhow::Error),
    #[error("failed to drive the sort control: {0}")]
    Interaction(#[source] anyhow::Error),
    #[error("JSON endpoint not found in network requests")]
    EndpointNotObserved,
}

/// Failure that aborts a whole sync call. Listings already upserted from
/// earlier pages stay committed, but no new-item count is reported.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("request for page {page} failed: {source}")]
    Fetch {
        page: u32,
        #[source]
        source: reqwest::Error,
    },
    #[error("page {page} returned status {status}")]
    Status {
        page: u32,
        status: reqwest::StatusCode,
    },
    #[error("failed to decode page {page}: {source}")]
    Decode {
        page: u32,
        #[source]
        source: reqwest::Error,
    },
}
