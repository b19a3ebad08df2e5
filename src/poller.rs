//! Periodic pick-up of newly scraped listings for a mounted table.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::client::ListingApi;
use crate::error::{ApiError, ErrorDisposition};
use crate::store::ListingStore;

/// Default time between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Background timer calling [`ListingStore::fetch_new_data`].
///
/// One poller runs per mounted table. Dropping it stops the timer, so
/// navigating away never leaks a task.
#[derive(Debug)]
pub struct Poller {
    shutdown_tx: tokio::sync::watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl Poller {
    /// Start polling `store` every `interval`. The first poll happens one
    /// interval after spawning, not immediately.
    ///
    /// Failures go to `on_error`. The timer keeps running after a failure
    /// unless it answers [`ErrorDisposition::RedirectToLogin`], in which case
    /// the poller stops itself.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<F>(
        store: ListingStore,
        api: Arc<dyn ListingApi>,
        interval: Duration,
        on_error: F,
    ) -> Self
    where
        F: Fn(&ApiError) -> ErrorDisposition + Send + Sync + 'static,
    {
        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
        let task = tokio::spawn(run_poll_loop(store, api, interval, on_error, shutdown_rx));
        Self {
            shutdown_tx,
            task: Some(task),
        }
    }

    /// Whether the poll loop is still running.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the timer and wait for an in-flight poll to finish.
    pub async fn stop(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            tracing::error!(error = %e, "poll task panicked");
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run_poll_loop<F>(
    store: ListingStore,
    api: Arc<dyn ListingApi>,
    interval: Duration,
    on_error: F,
    mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
) where
    F: Fn(&ApiError) -> ErrorDisposition,
{
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let kind = store.kind();
    tracing::debug!(%kind, ?interval, "poller started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown_rx.changed() => break,
        }

        match store.fetch_new_data(api.as_ref()).await {
            Ok(added) => tracing::trace!(%kind, added, "poll complete"),
            Err(e) => {
                if on_error(&e) == ErrorDisposition::RedirectToLogin {
                    tracing::warn!(%kind, "poller stopping: signed out");
                    return;
                }
            }
        }
    }
    tracing::debug!(%kind, "poller stopped");
}
