//! Live push channel transport.
//!
//! This module provides [`ChannelConfig`] for tuning reconnection behaviour,
//! [`PushChannel::connect`] to open the WebSocket feeding a channel, and
//! [`ConnectionHandle`] for controlling the running connection loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use reqwest::Url;
use tokio_stream::StreamExt;
use tokio_tungstenite::tungstenite::{self, Message};

use crate::auth::BearerAuth;
use crate::channel::PushChannel;
use crate::error::ChannelError;
use crate::event::decode_push_frame;

/// Configuration for the push connection loop.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use realty_desk::ChannelConfig;
///
/// let config = ChannelConfig {
///     reconnect_max_delay: Duration::from_secs(10),
///     ..ChannelConfig::default()
/// };
/// assert_eq!(config.reconnect_base_delay, Duration::from_secs(1));
/// ```
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Base delay for exponential backoff on reconnection.
    ///
    /// After a failure the loop waits `reconnect_base_delay`, then twice
    /// that, and so on up to [`reconnect_max_delay`](ChannelConfig::reconnect_max_delay).
    /// A successful connection resets the backoff.
    ///
    /// Default: 1 second.
    pub reconnect_base_delay: Duration,

    /// Maximum delay between reconnection attempts.
    ///
    /// Default: 30 seconds.
    pub reconnect_max_delay: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            reconnect_base_delay: Duration::from_secs(1),
            reconnect_max_delay: Duration::from_secs(30),
        }
    }
}

/// Next backoff delay: double the current one, capped at `max`.
pub(crate) fn next_backoff(current: Duration, max: Duration) -> Duration {
    (current * 2).min(max)
}

/// Handle for controlling the connection loop.
///
/// The loop runs until [`shutdown`](ConnectionHandle::shutdown) is called
/// or every clone of the handle is dropped.
///
/// `Clone` is cheap: all fields are `Arc`-wrapped.
#[derive(Clone)]
pub struct ConnectionHandle {
    /// Sends `true` to signal the loop to stop.
    pub(crate) shutdown_tx: tokio::sync::watch::Sender<bool>,
    /// `true` while a WebSocket is open.
    pub(crate) connected: Arc<AtomicBool>,
    /// The spawned loop. Taken and awaited exactly once by `shutdown`.
    pub(crate) task: Arc<tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>>,
}

impl ConnectionHandle {
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Ask the loop to stop without waiting for it.
    pub(crate) fn signal_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Signal the loop to stop and wait for it to exit.
    ///
    /// Calling `shutdown` more than once is safe; later calls return
    /// `Ok(())` immediately.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::TaskFailed`] if the loop task panicked.
    pub async fn shutdown(&self) -> Result<(), ChannelError> {
        // The receiver may already be gone if the task exited.
        self.signal_shutdown();

        let task = self.task.lock().await.take();
        if let Some(join_handle) = task {
            join_handle
                .await
                .map_err(|e| ChannelError::TaskFailed(e.to_string()))?;
        }
        self.connected.store(false, Ordering::Release);
        Ok(())
    }
}

/// Build the WebSocket URL: `base` plus `token` and `connectionId` query
/// parameters.
///
/// # Errors
///
/// Returns [`ChannelError::InvalidUrl`] unless `base` parses as a `ws://` or
/// `wss://` URL.
pub(crate) fn channel_url(base: &str, token: &str, session_id: &str) -> Result<Url, ChannelError> {
    let mut url = Url::parse(base).map_err(|e| ChannelError::InvalidUrl(format!("{base}: {e}")))?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(ChannelError::InvalidUrl(format!(
            "{base}: scheme must be ws or wss"
        )));
    }
    {
        let mut query = url.query_pairs_mut();
        if !token.is_empty() {
            query.append_pair("token", token);
        }
        query.append_pair("connectionId", session_id);
    }
    Ok(url)
}

impl PushChannel {
    /// Open the live connection that feeds this channel.
    ///
    /// Spawns a background task that keeps a WebSocket open to `url`,
    /// decodes each text frame, and dispatches it to the registered
    /// handlers. On error or close the task reconnects with exponential
    /// backoff. Events are dispatched in delivery order; nothing is buffered
    /// or replayed across reconnects.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Arguments
    ///
    /// * `url` - `ws://` or `wss://` endpoint of the push server.
    /// * `auth` - Shared bearer token, sent as the `token` query parameter.
    ///   It is read again before every connection attempt, so a refreshed
    ///   token is picked up on the next reconnect. Empty connects
    ///   anonymously.
    /// * `config` - Reconnection tuning.
    ///
    /// # Returns
    ///
    /// A [`ConnectionHandle`] for checking status and shutting down.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::InvalidUrl`] if `url` is not a WebSocket URL.
    pub fn connect(
        &self,
        url: &str,
        auth: &BearerAuth,
        config: ChannelConfig,
    ) -> Result<ConnectionHandle, ChannelError> {
        channel_url(url, &auth.current(), &self.session_id().to_string())?;
        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
        let connected = Arc::new(AtomicBool::new(false));

        let task = tokio::spawn(run_connection_loop(
            self.clone(),
            url.to_string(),
            auth.clone(),
            config,
            Arc::clone(&connected),
            shutdown_rx,
        ));

        Ok(ConnectionHandle {
            shutdown_tx,
            connected,
            task: Arc::new(tokio::sync::Mutex::new(Some(task))),
        })
    }
}

/// How a single WebSocket session ended.
#[derive(Debug)]
enum FrameOutcome {
    /// The server closed the socket or the stream ended.
    Closed,
    /// A transport error occurred and should trigger a backoff.
    Error(tungstenite::Error),
}

/// Decode and dispatch frames until the stream closes or errors.
///
/// Text frames that do not decode are skipped. Ping, pong and binary frames
/// are ignored; tungstenite answers pings itself.
///
/// Factored out of the connection loop so tests can feed a mock stream.
async fn process_frames(
    channel: &PushChannel,
    mut stream: impl tokio_stream::Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
) -> FrameOutcome {
    while let Some(item) = stream.next().await {
        match item {
            Ok(Message::Text(text)) => {
                if let Some(event) = decode_push_frame(&text) {
                    let handlers = channel.dispatch(&event);
                    tracing::debug!(event = %event.kind(), handlers, "push event dispatched");
                }
            }
            Ok(Message::Close(frame)) => {
                tracing::debug!(?frame, "push channel closed by server");
                return FrameOutcome::Closed;
            }
            Ok(_) => {}
            Err(e) => return FrameOutcome::Error(e),
        }
    }
    FrameOutcome::Closed
}

/// Run the connection loop until shutdown is signaled.
///
/// Connects, processes frames, and reconnects on failure with exponential
/// backoff. A clean close reconnects after the base delay.
async fn run_connection_loop(
    channel: PushChannel,
    base_url: String,
    auth: BearerAuth,
    config: ChannelConfig,
    connected: Arc<AtomicBool>,
    mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
) {
    let mut backoff_delay = config.reconnect_base_delay;
    let session_id = channel.session_id().to_string();

    loop {
        if *shutdown_rx.borrow() {
            return;
        }

        let url = match channel_url(&base_url, &auth.current(), &session_id) {
            Ok(url) => url,
            Err(e) => {
                tracing::error!(error = %e, "push channel: giving up");
                return;
            }
        };
        let host = url.host_str().unwrap_or_default().to_string();

        tracing::info!(%host, "push channel: connecting");
        let connect = tokio::select! {
            result = tokio_tungstenite::connect_async(url.as_str()) => result,
            _ = shutdown_rx.changed() => return,
        };

        let outcome = match connect {
            Ok((ws, _response)) => {
                tracing::info!(%host, "push channel: connected");
                connected.store(true, Ordering::Release);
                backoff_delay = config.reconnect_base_delay;

                let outcome = tokio::select! {
                    outcome = process_frames(&channel, ws) => outcome,
                    _ = shutdown_rx.changed() => {
                        connected.store(false, Ordering::Release);
                        return;
                    }
                };
                connected.store(false, Ordering::Release);
                outcome
            }
            Err(e) => FrameOutcome::Error(e),
        };

        let delay = match outcome {
            FrameOutcome::Closed => {
                tracing::warn!(%host, "push channel: connection closed, reconnecting");
                config.reconnect_base_delay
            }
            FrameOutcome::Error(e) => {
                tracing::error!(%host, error = %e, "push channel: connection failed, will retry");
                let delay = backoff_delay;
                backoff_delay = next_backoff(backoff_delay, config.reconnect_max_delay);
                delay
            }
        };

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown_rx.changed() => return,
        }
    }
}
