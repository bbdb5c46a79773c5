//! # headless-pool
//!
//! A bounded pool of headless Chromium instances for web-scraping
//! services. Launching a browser costs seconds of latency and hundreds of
//! megabytes, so a service cannot start one per request; the pool
//! multiplexes many concurrent requests over a small set of instances:
//!
//! - **Admission control**: a counting semaphore caps simultaneous
//!   checkouts at `max_browsers`, with FIFO waiting.
//! - **Lazy provisioning**: browsers are launched on demand, never ahead
//!   of it, and handed out least-recently-used.
//! - **Idle reclamation**: a background reaper closes browsers unused for
//!   longer than the idle timeout.
//! - **Leak-proof checkouts**: a checkout is an RAII lease; dropping it
//!   (including on panic or request cancellation) returns the browser and
//!   its permit to the pool.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use headless_pool::{BrowserPool, ChromiumDriver, PoolConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PoolConfig::from_env()?;
//!     let driver = ChromiumDriver::start(&config)?;
//!     let pool = BrowserPool::new(config, driver)?;
//!
//!     let lease = pool.acquire().await?;
//!     let page = lease.new_page("https://example.com").await?;
//!     let html = page.content().await?;
//!     println!("fetched {} bytes", html.len());
//!     drop(page);
//!     drop(lease);
//!
//!     pool.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! The pool is process-local state: construct it once at startup, pass it
//! by reference to request handlers, and call
//! [`shutdown`](BrowserPool::shutdown) once at process shutdown.

/// Configuration and Chrome launch arguments
pub mod config;

/// Error types
pub mod error;

/// Driver trait and the chromiumoxide implementation
pub mod driver;

/// The browser pool core: admission, LRU selection, idle reaping
pub mod browser_pool;


pub use browser_pool::*;
pub use config::*;
pub use driver::*;
pub use error::*;

/// Initialize tracing output for the embedding binary or for tests.
///
/// Errors if a global subscriber is already installed, so callers that may
/// run more than once (tests) can ignore the result.
pub fn setup_logging(verbose: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init()?;

    Ok(())
}
