//! Client lifecycle and value-change callbacks
//!
//! - [`on_connect`](EventHandlers::on_connect): after `connect()` succeeds
//! - [`on_disconnect`](EventHandlers::on_disconnect): after `disconnect()`
//! - [`on_value_change`](EventHandlers::on_value_change): once per streamed value change
//! - [`on_subscribe`](EventHandlers::on_subscribe): after `subscribe()` completes
//! - [`on_error`](EventHandlers::on_error): stream failures from background readers
//!
//! Callbacks run on the task that produced the event (value changes and
//! stream errors run on the subscription's reader task). A panicking
//! callback is caught and logged; it never takes down a reader.
//!
//! # Example
//!
//! ```rust
//! use i3x_client::EventHandlers;
//!
//! let handlers = EventHandlers::new()
//!     .on_value_change(|change| {
//!         println!("{}: {:?}", change.element_id, change.latest());
//!     })
//!     .on_error(|error| eprintln!("Stream error: {}", error));
//! ```

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::error;

use crate::error::I3xError;
use crate::types::{Subscription, ValueChange};

/// Type alias for the on_connect / on_disconnect callbacks.
pub type OnLifecycleCallback = Arc<dyn Fn() + Send + Sync>;

/// Type alias for the on_value_change callback.
pub type OnValueChangeCallback = Arc<dyn Fn(&ValueChange) + Send + Sync>;

/// Type alias for the on_subscribe callback.
pub type OnSubscribeCallback = Arc<dyn Fn(&Subscription) + Send + Sync>;

/// Type alias for the on_error callback.
pub type OnErrorCallback = Arc<dyn Fn(&I3xError) + Send + Sync>;

/// User-supplied callbacks. All are optional.
#[derive(Clone, Default)]
pub struct EventHandlers {
    pub(crate) on_connect: Option<OnLifecycleCallback>,
    pub(crate) on_disconnect: Option<OnLifecycleCallback>,
    pub(crate) on_value_change: Option<OnValueChangeCallback>,
    pub(crate) on_subscribe: Option<OnSubscribeCallback>,
    pub(crate) on_error: Option<OnErrorCallback>,
}

impl fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandlers")
            .field("on_connect", &self.on_connect.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .field("on_value_change", &self.on_value_change.is_some())
            .field("on_subscribe", &self.on_subscribe.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

impl EventHandlers {
    /// Create a new empty `EventHandlers` (no callbacks registered).
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_connect(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_connect = Some(Arc::new(f));
        self
    }

    pub fn on_disconnect(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_disconnect = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked once per value change, in arrival order.
    pub fn on_value_change(mut self, f: impl Fn(&ValueChange) + Send + Sync + 'static) -> Self {
        self.on_value_change = Some(Arc::new(f));
        self
    }

    pub fn on_subscribe(mut self, f: impl Fn(&Subscription) + Send + Sync + 'static) -> Self {
        self.on_subscribe = Some(Arc::new(f));
        self
    }

    /// Register a callback for background stream errors.
    ///
    /// Without one, errors are logged at error level.
    pub fn on_error(mut self, f: impl Fn(&I3xError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub(crate) fn emit_connect(&self) {
        if let Some(cb) = &self.on_connect {
            guarded("on_connect", || cb());
        }
    }

    pub(crate) fn emit_disconnect(&self) {
        if let Some(cb) = &self.on_disconnect {
            guarded("on_disconnect", || cb());
        }
    }

    pub(crate) fn emit_subscribe(&self, subscription: &Subscription) {
        if let Some(cb) = &self.on_subscribe {
            guarded("on_subscribe", || cb(subscription));
        }
    }

    /// Fan a batch out to `on_value_change`, one call per change
    pub(crate) fn emit_value_changes(&self, changes: &[ValueChange]) {
        if let Some(cb) = &self.on_value_change {
            for change in changes {
                guarded("on_value_change", || cb(change));
            }
        }
    }

    pub(crate) fn emit_error(&self, err: &I3xError) {
        match &self.on_error {
            Some(cb) => guarded("on_error", || cb(err)),
            None => error!(error = %err, "Unhandled i3x error"),
        }
    }
}

/// Run a user callback, logging instead of propagating a panic
fn guarded(name: &str, f: impl FnOnce()) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(f)) {
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        error!(callback = name, panic = %message, "Error in {} callback", name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn change(id: &str) -> ValueChange {
        ValueChange {
            element_id: id.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_value_changes_delivered_in_order() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let handlers = EventHandlers::new()
            .on_value_change(move |c| seen_clone.lock().push(c.element_id.clone()));

        handlers.emit_value_changes(&[change("a"), change("b"), change("c")]);
        assert_eq!(*seen.lock(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_panicking_callback_is_isolated() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let handlers = EventHandlers::new().on_value_change(move |c| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            if c.element_id == "bad" {
                panic!("callback blew up");
            }
        });

        handlers.emit_value_changes(&[change("ok-1"), change("bad"), change("ok-2")]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_error_without_handler_is_logged() {
        // Must not panic
        EventHandlers::new().emit_error(&I3xError::stream("lost"));
    }

    #[test]
    fn test_error_handler_receives_error() {
        let got = Arc::new(parking_lot::Mutex::new(None));
        let got_clone = got.clone();
        let handlers =
            EventHandlers::new().on_error(move |e| *got_clone.lock() = Some(e.to_string()));

        handlers.emit_error(&I3xError::stream("lost"));
        assert_eq!(got.lock().as_deref(), Some("Stream error: lost"));
    }

    #[test]
    fn test_debug_shows_registered() {
        let handlers = EventHandlers::new().on_connect(|| {});
        let debug = format!("{:?}", handlers);
        assert!(debug.contains("on_connect: true"));
        assert!(debug.contains("on_error: false"));
    }
}
