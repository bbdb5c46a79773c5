//! Bounded pool of headless browser instances.
//!
//! Browsers are expensive to launch (seconds, hundreds of MB), so the pool
//! multiplexes many concurrent scrape requests over a small set of
//! instances. A counting semaphore bounds simultaneous checkouts, browsers
//! are launched lazily and handed out least-recently-used, and a background
//! reaper closes instances that sit idle past a configured timeout.

use crate::config::PoolConfig;
use crate::driver::{Driver, PoolBrowser};
use crate::error::PoolError;
use serde::Serialize;
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::{Arc, Mutex};
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Bookkeeping for one tracked browser.
///
/// A browser is either checked out by exactly one consumer or idle; only
/// idle browsers are eligible for selection and reclamation.
struct TrackedBrowser<D: Driver> {
    browser: Arc<D::Browser>,
    last_used: Instant,
    checked_out: bool,
}

struct Registry<D: Driver> {
    browsers: HashMap<u64, TrackedBrowser<D>>,
    next_id: u64,
    launched_total: u64,
    reaped_total: u64,
    closed: bool,
}

/// State shared between the pool, its leases, and the reaper task.
struct PoolShared<D: Driver> {
    // Never held across an await; selection and checkout marking happen in
    // one critical section so the reaper cannot reclaim a browser that is
    // being handed out.
    registry: Mutex<Registry<D>>,
    driver: D,
    config: PoolConfig,
}

impl<D: Driver> PoolShared<D> {
    /// Remove idle browsers past the timeout from the registry.
    ///
    /// Checked-out browsers are never inspected; recency is defined by the
    /// last release, not by activity during a checkout in progress.
    fn take_expired(&self) -> Vec<(u64, Arc<D::Browser>)> {
        let now = Instant::now();
        let mut registry = self.registry.lock().unwrap();

        let expired: Vec<u64> = registry
            .browsers
            .iter()
            .filter(|(_, b)| {
                !b.checked_out && now.duration_since(b.last_used) > self.config.idle_timeout
            })
            .map(|(id, _)| *id)
            .collect();

        let mut taken = Vec::with_capacity(expired.len());
        for id in expired {
            if let Some(tracked) = registry.browsers.remove(&id) {
                registry.reaped_total += 1;
                taken.push((id, tracked.browser));
            }
        }
        taken
    }

    /// One reclamation sweep: close everything past the idle timeout.
    /// Close failures are logged and never propagate; the browser is
    /// already untracked at that point.
    async fn reap_idle(&self) {
        for (id, browser) in self.take_expired() {
            match browser.close().await {
                Ok(()) => debug!("Reaped idle browser {id}"),
                Err(e) => error!("Failed to close idle browser {id}: {e}"),
            }
        }
    }

    /// Return a browser to the idle set.
    ///
    /// `last_used` is refreshed here, at release time, because this is the
    /// moment the browser actually becomes idle. Releasing a browser the
    /// pool no longer tracks (or one that is not checked out) is a
    /// programming error and logged, never fatal.
    fn mark_idle(&self, id: u64) {
        let mut registry = self.registry.lock().unwrap();

        if registry.closed {
            debug!("Browser {id} released after pool shutdown");
            return;
        }

        match registry.browsers.get_mut(&id) {
            Some(tracked) if tracked.checked_out => {
                tracked.checked_out = false;
                tracked.last_used = Instant::now();
            }
            _ => warn!("Release of browser {id} which is not checked out"),
        }
    }
}

/// A checked-out browser.
///
/// Holds the admission permit for the duration of the checkout; dropping
/// the lease releases the browser back to the idle set and returns the
/// permit, so a panicking or cancelled consumer cannot leak capacity.
pub struct BrowserLease<D: Driver> {
    browser: Arc<D::Browser>,
    id: u64,
    shared: Arc<PoolShared<D>>,
    _permit: OwnedSemaphorePermit,
}

impl<D: Driver> BrowserLease<D> {
    /// Pool-internal id of the leased browser.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn browser(&self) -> &D::Browser {
        &self.browser
    }
}

impl<D: Driver> std::fmt::Debug for BrowserLease<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserLease").field("id", &self.id).finish()
    }
}

impl<D: Driver> Deref for BrowserLease<D> {
    type Target = D::Browser;

    fn deref(&self) -> &D::Browser {
        &self.browser
    }
}

impl<D: Driver> Drop for BrowserLease<D> {
    fn drop(&mut self) {
        // The permit field drops after this, waking the next waiter once
        // the browser is back in the idle set.
        self.shared.mark_idle(self.id);
    }
}

/// Snapshot of pool state, for health reporting.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PoolStats {
    pub tracked: usize,
    pub idle: usize,
    pub checked_out: usize,
    pub launched_total: u64,
    pub reaped_total: u64,
}

pub struct BrowserPool<D: Driver> {
    shared: Arc<PoolShared<D>>,
    semaphore: Arc<Semaphore>,
    reaper: Mutex<Option<JoinHandle<()>>>,
    shutdown_tx: watch::Sender<bool>,
}

impl<D: Driver> BrowserPool<D> {
    /// Create the pool and start its idle reaper.
    ///
    /// No browsers are launched here; they are provisioned lazily by
    /// [`acquire`](Self::acquire). The driver must already be started.
    pub fn new(config: PoolConfig, driver: D) -> Result<Self, PoolError> {
        config.validate()?;

        let shared = Arc::new(PoolShared {
            registry: Mutex::new(Registry {
                browsers: HashMap::new(),
                next_id: 0,
                launched_total: 0,
                reaped_total: 0,
                closed: false,
            }),
            driver,
            config: config.clone(),
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let reaper = spawn_reaper(shared.clone(), shutdown_rx);

        info!(
            "Browser pool created: max {} browsers, idle timeout {:?}",
            config.max_browsers, config.idle_timeout
        );

        Ok(Self {
            shared,
            semaphore: Arc::new(Semaphore::new(config.max_browsers)),
            reaper: Mutex::new(Some(reaper)),
            shutdown_tx,
        })
    }

    /// Check out a browser, waiting until the pool has capacity.
    ///
    /// Waiters are served in FIFO order. Once admitted, expired idle
    /// browsers are reclaimed, then the least-recently-used idle browser is
    /// handed out; if none is idle a new one is launched. A launch failure
    /// surfaces as [`PoolError::LaunchFailed`] and returns the permit, so
    /// gate capacity is never lost.
    pub async fn acquire(&self) -> Result<BrowserLease<D>, PoolError> {
        let permit = self.semaphore.clone().acquire_owned().await?;

        // Reclaim before selecting, so a long-expired browser is never
        // handed out.
        self.shared.reap_idle().await;

        let existing = {
            let mut registry = self.shared.registry.lock().unwrap();
            if registry.closed {
                return Err(PoolError::Closed);
            }

            let lru = registry
                .browsers
                .iter()
                .filter(|(_, b)| !b.checked_out)
                .min_by_key(|(_, b)| b.last_used)
                .map(|(id, _)| *id);

            lru.and_then(|id| {
                registry.browsers.get_mut(&id).map(|tracked| {
                    tracked.checked_out = true;
                    (id, tracked.browser.clone())
                })
            })
        };

        let (id, browser) = match existing {
            Some(found) => {
                debug!("Reusing idle browser {}", found.0);
                found
            }
            None => {
                // Launched outside the registry lock; the permit we hold
                // keeps the tracked set within max_browsers.
                let browser = Arc::new(self.shared.driver.launch().await?);

                // The guard must not be in scope across an await, or the
                // acquire future stops being Send.
                let inserted = {
                    let mut registry = self.shared.registry.lock().unwrap();
                    if registry.closed {
                        None
                    } else {
                        let id = registry.next_id;
                        registry.next_id += 1;
                        registry.launched_total += 1;
                        registry.browsers.insert(
                            id,
                            TrackedBrowser {
                                browser: browser.clone(),
                                last_used: Instant::now(),
                                checked_out: true,
                            },
                        );
                        Some(id)
                    }
                };

                match inserted {
                    Some(id) => {
                        info!("Launched browser {id}");
                        (id, browser)
                    }
                    None => {
                        warn!("Pool shut down during browser launch, closing orphan");
                        if let Err(e) = browser.close().await {
                            error!("Failed to close orphaned browser: {e}");
                        }
                        return Err(PoolError::Closed);
                    }
                }
            }
        };

        Ok(BrowserLease {
            browser,
            id,
            shared: self.shared.clone(),
            _permit: permit,
        })
    }

    /// Shut the pool down: stop the reaper, close every tracked browser
    /// (checked out or idle), then stop the driver.
    ///
    /// Close failures are logged and do not stop the remaining closes.
    /// Calling shutdown a second time is a logged no-op.
    pub async fn shutdown(&self) {
        let Some(reaper) = self.reaper.lock().unwrap().take() else {
            warn!("Browser pool shutdown called more than once");
            return;
        };

        info!("Shutting down browser pool");

        let _ = self.shutdown_tx.send(true);
        if let Err(e) = reaper.await {
            error!("Reaper task failed to join: {e}");
        }

        // Fail pending and future acquires.
        self.semaphore.close();

        let browsers: Vec<(u64, Arc<D::Browser>)> = {
            let mut registry = self.shared.registry.lock().unwrap();
            registry.closed = true;
            registry
                .browsers
                .drain()
                .map(|(id, tracked)| (id, tracked.browser))
                .collect()
        };

        for (id, browser) in browsers {
            if let Err(e) = browser.close().await {
                error!("Failed to close browser {id} during shutdown: {e}");
            }
        }

        if let Err(e) = self.shared.driver.stop().await {
            error!("Failed to stop browser driver: {e}");
        }

        info!("Browser pool shutdown complete");
    }

    pub fn stats(&self) -> PoolStats {
        let registry = self.shared.registry.lock().unwrap();
        let checked_out = registry.browsers.values().filter(|b| b.checked_out).count();
        PoolStats {
            tracked: registry.browsers.len(),
            idle: registry.browsers.len() - checked_out,
            checked_out,
            launched_total: registry.launched_total,
            reaped_total: registry.reaped_total,
        }
    }
}

/// Periodic idle reclamation, independent of request traffic.
///
/// A failed sweep is logged inside [`PoolShared::reap_idle`] and the loop
/// continues on its normal schedule. The task exits on the shutdown signal
/// and is joined by [`BrowserPool::shutdown`].
fn spawn_reaper<D: Driver>(
    shared: Arc<PoolShared<D>>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(shared.config.reap_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        // First tick fires immediately; harmless, nothing is tracked yet.
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    shared.reap_idle().await;
                }
                _ = shutdown_rx.changed() => {
                    debug!("Reaper stopping");
                    break;
                }
            }
        }
    })
}
