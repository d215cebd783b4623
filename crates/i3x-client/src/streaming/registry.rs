//! Registry of subscriptions that are currently streaming

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, info};

use super::reader::{StreamReader, DEFAULT_STOP_GRACE};
use super::types::{ErrorSink, EventSink};
use crate::connection::Connection;
use crate::error::Result;

/// Tracks at most one [`StreamReader`] per subscription ID
///
/// All map mutations go through a single mutex. Readers are stopped outside
/// the lock so a slow shutdown never blocks other registry calls.
pub struct SubscriptionRegistry {
    connection: Arc<Connection>,
    on_event: EventSink,
    on_error: ErrorSink,
    grace_period: Duration,
    runtime: Option<Handle>,
    readers: Mutex<HashMap<String, Arc<StreamReader>>>,
}

impl SubscriptionRegistry {
    /// Create a registry. Readers run on the runtime current at this call,
    /// if any, so `add` also works from synchronous code.
    pub fn new(connection: Arc<Connection>, on_event: EventSink, on_error: ErrorSink) -> Self {
        Self {
            connection,
            on_event,
            on_error,
            grace_period: DEFAULT_STOP_GRACE,
            runtime: Handle::try_current().ok(),
            readers: Mutex::new(HashMap::new()),
        }
    }

    /// Grace period handed to every reader created from now on
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Run readers on this runtime
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Start streaming a subscription.
    ///
    /// No-op while its reader is running. A reader whose task has ended,
    /// e.g. after a stream failure, is started again.
    pub fn add(&self, subscription_id: &str) -> Result<()> {
        let mut readers = self.readers.lock();
        if let Some(reader) = readers.get(subscription_id) {
            if reader.is_running() {
                debug!(subscription_id, "Already streaming");
                return Ok(());
            }
            reader.start()?;
            info!(subscription_id, "Subscription stream restarted");
            return Ok(());
        }

        let mut reader = StreamReader::new(
            self.connection.clone(),
            subscription_id,
            self.on_event.clone(),
            self.on_error.clone(),
        )
        .with_grace_period(self.grace_period);
        if let Some(runtime) = &self.runtime {
            reader = reader.with_runtime(runtime.clone());
        }

        let reader = Arc::new(reader);
        reader.start()?;
        readers.insert(subscription_id.to_string(), reader);

        info!(subscription_id, "Subscription stream started");
        Ok(())
    }

    /// Stop and forget the reader for a subscription, if any
    pub async fn remove(&self, subscription_id: &str) {
        let reader = self.readers.lock().remove(subscription_id);

        if let Some(reader) = reader {
            reader.stop().await;
            info!(subscription_id, "Subscription stream stopped");
        }
    }

    /// Stop every reader and clear the registry.
    ///
    /// Readers are stopped concurrently, so this takes at most about one
    /// grace period.
    pub async fn stop_all(&self) {
        let readers: Vec<_> = self.readers.lock().drain().map(|(_, r)| r).collect();
        if readers.is_empty() {
            return;
        }

        let count = readers.len();
        join_all(readers.iter().map(|reader| reader.stop())).await;
        info!(count, "All subscription streams stopped");
    }

    /// Whether the subscription has a reader whose task is still running
    pub fn is_streaming(&self, subscription_id: &str) -> bool {
        self.readers
            .lock()
            .get(subscription_id)
            .is_some_and(|reader| reader.is_running())
    }

    /// Reader tracked for a subscription
    pub fn get(&self, subscription_id: &str) -> Option<Arc<StreamReader>> {
        self.readers.lock().get(subscription_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.readers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.readers.lock().is_empty()
    }

    /// IDs of all tracked subscriptions, sorted
    pub fn subscription_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.readers.lock().keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("subscriptions", &self.subscription_ids())
            .field("grace_period", &self.grace_period)
            .finish()
    }
}
