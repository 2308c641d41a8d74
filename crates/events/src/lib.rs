//! Watch delivery for the operator.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`Informer`]: polls the resource store and publishes typed
//!   [`WatchEvent`](autopsy_core::WatchEvent)s onto a bus.

pub mod bus;
pub mod informer;

pub use bus::EventBus;
pub use informer::{Informer, Watched};
