//! Driver seam between the pool and the browser engine.
//!
//! The pool only needs two things from an engine: launch a browser and
//! close it again. Putting that behind a trait keeps the pool logic
//! testable without a Chromium binary; `ChromiumDriver` is the production
//! implementation on top of `chromiumoxide`.

use crate::config::{create_browser_config, PoolConfig};
use crate::error::PoolError;
use async_trait::async_trait;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// One launched browser process owned by the pool.
#[async_trait]
pub trait PoolBrowser: Send + Sync + 'static {
    /// Terminate the underlying process. The pool calls this exactly once,
    /// either during idle reclamation or at shutdown.
    async fn close(&self) -> Result<(), PoolError>;
}

/// A browser engine that can launch pool browsers on demand.
#[async_trait]
pub trait Driver: Send + Sync + 'static {
    type Browser: PoolBrowser;

    async fn launch(&self) -> Result<Self::Browser, PoolError>;

    /// Stop the engine itself. Called once, after every browser has been
    /// closed.
    async fn stop(&self) -> Result<(), PoolError>;
}

/// Production driver launching headless Chromium via `chromiumoxide`.
pub struct ChromiumDriver {
    config: PoolConfig,
}

impl ChromiumDriver {
    /// Start the driver. Validates the configuration and builds a launch
    /// config once so a bad Chrome path surfaces here rather than on the
    /// first acquire.
    pub fn start(config: &PoolConfig) -> Result<Self, PoolError> {
        config.validate()?;
        create_browser_config(config)?;
        info!("Chromium driver ready");
        Ok(Self {
            config: config.clone(),
        })
    }
}

#[async_trait]
impl Driver for ChromiumDriver {
    type Browser = ChromiumBrowser;

    async fn launch(&self) -> Result<ChromiumBrowser, PoolError> {
        let browser_config = create_browser_config(&self.config)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| PoolError::LaunchFailed(e.to_string()))?;

        // The CDP event loop must be polled for the browser to respond to
        // any command. It runs until the browser closes.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("CDP handler error: {e}");
                    break;
                }
            }
        });

        Ok(ChromiumBrowser {
            browser: Mutex::new(browser),
            handler: std::sync::Mutex::new(Some(handler_task)),
        })
    }

    async fn stop(&self) -> Result<(), PoolError> {
        // chromiumoxide speaks CDP to each browser directly; there is no
        // separate driver process to stop.
        debug!("Chromium driver stopped");
        Ok(())
    }
}

/// A Chromium instance plus its CDP event-loop task.
pub struct ChromiumBrowser {
    browser: Mutex<Browser>,
    handler: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ChromiumBrowser {
    /// Open a fresh page for one scrape operation.
    ///
    /// Each checkout should create exactly one page and close it before
    /// the lease is dropped; pages must never be shared across checkouts.
    pub async fn new_page(&self, url: &str) -> Result<Page, PoolError> {
        let browser = self.browser.lock().await;
        browser.new_page(url).await.map_err(PoolError::from)
    }
}

#[async_trait]
impl PoolBrowser for ChromiumBrowser {
    async fn close(&self) -> Result<(), PoolError> {
        let result = self.browser.lock().await.close().await;

        if let Some(handle) = self.handler.lock().unwrap().take() {
            handle.abort();
        }

        result.map(|_| ()).map_err(PoolError::from)
    }
}
