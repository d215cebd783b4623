//! Streaming support for I3X subscriptions
//!
//! Live value updates arrive over SSE (Server-Sent Events). Each streaming
//! subscription gets a [`StreamReader`] running in its own Tokio task; the
//! [`SubscriptionRegistry`] keeps at most one reader per subscription.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use i3x_client::{ClientConfig, Connection};
//! use i3x_client::streaming::SubscriptionRegistry;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let connection = Arc::new(Connection::new(&ClientConfig::new("http://localhost:8080"))?);
//! connection.open().await?;
//!
//! let registry = SubscriptionRegistry::new(
//!     connection,
//!     Arc::new(|changes| {
//!         for change in changes {
//!             println!("{} -> {:?}", change.element_id, change.latest());
//!         }
//!     }),
//!     Arc::new(|error| eprintln!("Stream error: {}", error)),
//! );
//!
//! registry.add("sub-1")?;
//! // ...
//! registry.stop_all().await;
//! # Ok(())
//! # }
//! ```

mod parser;
mod reader;
mod registry;
mod types;

pub use parser::FrameDecoder;
pub use reader::{StreamReader, DEFAULT_STOP_GRACE};
pub use registry::SubscriptionRegistry;
pub use types::{
    ErrorSink, EventSink, FrameError, FrameResult, ReaderState, StreamPayload, UpdateMap,
};
