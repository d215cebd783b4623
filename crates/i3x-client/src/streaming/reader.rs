//! Per-subscription stream reader
//!
//! Each reader owns one background task that opens the subscription's push
//! endpoint, decodes frames and hands value-change batches to the event sink.
//! Failures are reported once through the error sink and end the task; the
//! reader never reconnects on its own.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;
use reqwest::Response;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info_span, trace, warn, Instrument};

use super::parser::FrameDecoder;
use super::types::{ErrorSink, EventSink, FrameResult, ReaderState, StreamPayload};
use crate::connection::{encode_path_segment, Connection};
use crate::error::{I3xError, Result};

/// Default time `stop()` waits for the background task to exit
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);

/// Streams value changes for a single subscription
///
/// Bound to one subscription ID for its whole life. Once [`stop`](Self::stop)
/// has been called the reader is retired and `start()` does nothing.
pub struct StreamReader {
    subscription_id: String,
    connection: Arc<Connection>,
    on_event: EventSink,
    on_error: ErrorSink,
    grace_period: Duration,
    state: Arc<Mutex<ReaderState>>,
    stop_tx: watch::Sender<bool>,
    retired: AtomicBool,
    runtime: Option<Handle>,
    alive: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl StreamReader {
    pub fn new(
        connection: Arc<Connection>,
        subscription_id: impl Into<String>,
        on_event: EventSink,
        on_error: ErrorSink,
    ) -> Self {
        let (stop_tx, _) = watch::channel(false);

        Self {
            subscription_id: subscription_id.into(),
            connection,
            on_event,
            on_error,
            grace_period: DEFAULT_STOP_GRACE,
            state: Arc::new(Mutex::new(ReaderState::Idle)),
            stop_tx,
            retired: AtomicBool::new(false),
            runtime: None,
            alive: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }
    }

    /// Override how long `stop()` waits for the task to exit
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Spawn the task on this runtime instead of the caller's
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    pub fn state(&self) -> ReaderState {
        *self.state.lock()
    }

    /// Whether the background task has been spawned and has not exited.
    ///
    /// Stays true while `stop()` is waiting on a task that has not wound
    /// down yet. Advisory only: the task may be exiting concurrently.
    pub fn is_running(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Spawn the background task. No-op while it is still running.
    ///
    /// May be called again after the task ended on an error to reconnect.
    /// Spawns on the runtime given to [`with_runtime`](Self::with_runtime),
    /// else on the caller's; fails when there is neither.
    pub fn start(&self) -> Result<()> {
        if self.retired.load(Ordering::SeqCst) {
            debug!(subscription_id = %self.subscription_id, "Reader was stopped, not restarting");
            return Ok(());
        }

        let runtime = match self.runtime.clone().or_else(|| Handle::try_current().ok()) {
            Some(runtime) => runtime,
            None => {
                return Err(I3xError::stream(
                    "No Tokio runtime available to run the event stream",
                ))
            }
        };

        let mut handle = self.handle.lock();
        if self.is_running() {
            return Ok(());
        }

        *self.state.lock() = ReaderState::Starting;
        self.stop_tx.send_replace(false);

        let task = ReaderTask {
            subscription_id: self.subscription_id.clone(),
            connection: self.connection.clone(),
            on_event: self.on_event.clone(),
            on_error: self.on_error.clone(),
            state: self.state.clone(),
            stop_rx: self.stop_tx.subscribe(),
        };

        self.alive.store(true, Ordering::SeqCst);
        let alive = AliveGuard(self.alive.clone());

        let span = info_span!("event_stream", subscription_id = %self.subscription_id);
        *handle = Some(runtime.spawn(
            async move {
                let _alive = alive;
                task.run().await;
            }
            .instrument(span),
        ));
        Ok(())
    }

    /// Signal the task to stop and wait up to the grace period for it to exit.
    ///
    /// Returns after the grace period even if the task is still running.
    /// Idempotent.
    pub async fn stop(&self) {
        self.retired.store(true, Ordering::SeqCst);
        self.stop_tx.send_replace(true);

        let Some(mut handle) = self.handle.lock().take() else {
            return;
        };

        {
            let mut state = self.state.lock();
            if *state != ReaderState::Idle {
                *state = ReaderState::Stopping;
            }
        }

        match tokio::time::timeout(self.grace_period, &mut handle).await {
            Ok(Ok(())) => {
                debug!(subscription_id = %self.subscription_id, "Reader stopped");
            }
            Ok(Err(e)) => {
                warn!(subscription_id = %self.subscription_id, error = %e, "Reader task ended abnormally");
            }
            Err(_) => {
                warn!(
                    subscription_id = %self.subscription_id,
                    grace_ms = self.grace_period.as_millis() as u64,
                    "Reader did not exit within grace period"
                );
                // The task still owns its liveness flag; keep the handle too
                *self.handle.lock() = Some(handle);
                return;
            }
        }

        *self.state.lock() = ReaderState::Idle;
    }
}

impl Drop for StreamReader {
    fn drop(&mut self) {
        // Let a detached task wind down at its next suspension point
        self.stop_tx.send_replace(true);
    }
}

impl std::fmt::Debug for StreamReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamReader")
            .field("subscription_id", &self.subscription_id)
            .field("state", &self.state())
            .field("grace_period", &self.grace_period)
            .finish()
    }
}

/// Clears the liveness flag when the task ends, however it ends
struct AliveGuard(Arc<AtomicBool>);

impl Drop for AliveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// State moved into the background task
struct ReaderTask {
    subscription_id: String,
    connection: Arc<Connection>,
    on_event: EventSink,
    on_error: ErrorSink,
    state: Arc<Mutex<ReaderState>>,
    stop_rx: watch::Receiver<bool>,
}

impl ReaderTask {
    async fn run(mut self) {
        let path = format!(
            "/subscriptions/{}/stream",
            encode_path_segment(&self.subscription_id)
        );

        let opened = tokio::select! {
            biased;
            _ = stop_signalled(&mut self.stop_rx) => None,
            result = self.connection.open_stream(&path) => Some(result),
        };

        let response = match opened {
            Some(Ok(response)) => response,
            Some(Err(e)) => {
                self.report(I3xError::stream(format!("Failed to open event stream: {}", e)));
                self.finish();
                return;
            }
            None => {
                self.finish();
                return;
            }
        };

        *self.state.lock() = ReaderState::Running;
        debug!("Event stream connected");

        // The response is consumed here and dropped on every exit path,
        // which closes the underlying connection.
        if let Err(e) = self.read_frames(response).await {
            self.report(e);
        }

        self.finish();
    }

    async fn read_frames(&mut self, response: Response) -> Result<()> {
        let mut body = Box::pin(response.bytes_stream());
        let mut decoder = FrameDecoder::new();

        loop {
            if self.stop_requested() {
                return Ok(());
            }

            let chunk = tokio::select! {
                biased;
                _ = stop_signalled(&mut self.stop_rx) => return Ok(()),
                chunk = body.next() => chunk,
            };

            let bytes = match chunk {
                Some(Ok(bytes)) => bytes,
                Some(Err(e)) => return Err(I3xError::stream(format!("Event stream error: {}", e))),
                None => return Err(I3xError::stream("Event stream closed by server")),
            };

            for frame in decoder.feed(&bytes) {
                if self.stop_requested() {
                    return Ok(());
                }
                self.dispatch(frame);
            }
        }
    }

    fn dispatch(&self, frame: FrameResult<StreamPayload>) {
        let payload = match frame {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Skipping malformed frame");
                return;
            }
        };

        for batch in payload.into_batches() {
            match batch {
                Ok(changes) => {
                    if self.stop_requested() {
                        return;
                    }
                    trace!(changes = changes.len(), "Delivering value changes");
                    (self.on_event)(changes);
                }
                Err(e) => {
                    warn!(error = %e, "Skipping malformed update");
                }
            }
        }
    }

    fn stop_requested(&self) -> bool {
        *self.stop_rx.borrow()
    }

    /// Hand an error to the sink unless it was caused by a requested stop
    fn report(&self, error: I3xError) {
        if self.stop_requested() {
            debug!(error = %error, "Ignoring stream error after stop");
            return;
        }
        warn!(error = %error, "Event stream failed");
        (self.on_error)(error);
    }

    fn finish(&self) {
        *self.state.lock() = ReaderState::Idle;
        debug!("Event stream reader exited");
    }
}

/// Resolves once a stop is requested or the reader has been dropped
async fn stop_signalled(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}
