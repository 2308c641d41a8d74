//! Client for the external reasoning service that explains pod failures.
//!
//! The operator depends on the [`Reasoner`] trait; [`ReasoningClient`] is
//! the HTTP implementation speaking a chat-completions style API.

pub mod client;
pub mod config;
pub mod error;
pub mod prompt;

pub use client::{Diagnosis, Reasoner, ReasoningClient};
pub use config::ReasoningConfig;
pub use error::ReasoningError;
