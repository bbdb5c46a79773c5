use thiserror::Error;
use tokio::sync::AcquireError;

#[derive(Debug, Clone, Error)]
pub enum PoolError {
    #[error("Browser launch failed: {0}")]
    LaunchFailed(String),

    #[error("Pool is closed")]
    Closed,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Browser error: {0}")]
    Browser(String),
}

impl PoolError {
    /// Whether the caller may reasonably retry the operation.
    ///
    /// Launch failures are often transient (a Chromium process died during
    /// startup, the host was briefly out of memory); configuration errors
    /// and a closed pool are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PoolError::LaunchFailed(_) | PoolError::Browser(_))
    }
}

// The semaphore only errors once it has been closed, which the pool does
// during shutdown.
impl From<AcquireError> for PoolError {
    fn from(_: AcquireError) -> Self {
        PoolError::Closed
    }
}

impl From<chromiumoxide::error::CdpError> for PoolError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        PoolError::Browser(err.to_string())
    }
}
