//! Command implementations for i3x-cli

pub mod catalog;
pub mod monitor;
pub mod subscriptions;
pub mod value;
pub mod write;

pub use catalog::{namespaces, objects, relationships, types};
pub use monitor::monitor;
pub use subscriptions::subscriptions;
pub use value::{history, value};
pub use write::write;
