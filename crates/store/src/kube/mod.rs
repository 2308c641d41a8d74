//! Kubernetes API server implementation of the store traits.
//!
//! Talks plain REST over [`reqwest`]: JSON for reads and creates,
//! `application/merge-patch+json` for status writes, and a streamed
//! body for pod logs.

pub mod client;
pub mod config;
pub mod paths;

pub use client::KubeClient;
pub use config::KubeConfig;
