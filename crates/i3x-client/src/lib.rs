//! I3X Client Library
//!
//! Provides a typed HTTP client for I3X servers, with live value streaming
//! for subscriptions.
//!
//! # Example
//!
//! ```rust,no_run
//! use i3x_client::{ClientConfig, EventHandlers, I3xClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::builder("http://localhost:8080")
//!         .credentials("my-key", Some("my-secret".to_string()))
//!         .build();
//!
//!     let client = I3xClient::with_config(config)?.with_handlers(
//!         EventHandlers::new()
//!             .on_value_change(|change| println!("{}: {:?}", change.element_id, change.latest()))
//!             .on_error(|error| eprintln!("Stream error: {}", error)),
//!     );
//!
//!     client.connect().await?;
//!
//!     // Browse the address space
//!     let namespaces = client.get_namespaces().await?;
//!     let objects = client.get_objects(None, false).await?;
//!
//!     // Read the last known value of an element
//!     let value = client.get_value("pump-1.speed", 0).await?;
//!
//!     // Stream changes
//!     let sub = client.subscribe(&["pump-1.speed"], 0).await?;
//!     tokio::time::sleep(std::time::Duration::from_secs(10)).await;
//!     client.unsubscribe(&sub.subscription_id).await?;
//!
//!     client.disconnect().await;
//!     Ok(())
//! }
//! ```
//!
//! # Testing
//!
//! The `testing` module provides utilities for integration testing:
//!
//! ```rust,ignore
//! use i3x_client::testing::TestServer;
//!
//! let server = TestServer::start(mock_router()).await?;
//! server.client.connect().await?;
//! let namespaces = server.client.get_namespaces().await?;
//! ```

mod client;
mod config;
mod connection;
mod error;
mod handlers;
pub mod streaming;
pub mod testing;
mod types;

pub use client::I3xClient;
pub use config::{ClientConfig, ClientConfigBuilder, Credentials, TimeoutsConfig};
pub use connection::{encode_path_segment, Connection};
pub use error::{ErrorKind, I3xError, Result};
pub use handlers::EventHandlers;
pub use types::*;
