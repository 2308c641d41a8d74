//! Pod failure diagnosis operator.
//!
//! Two controllers share one resource store:
//!
//! - [`FailureDetector`] watches pods and opens a `PodDiagnosis` when a
//!   pod enters a failed state.
//! - [`DiagnosisController`] drives each pending diagnosis to `Completed`
//!   or `Failed` using the pod's logs and the reasoning service.
//!
//! [`Operator`] wires both onto polling informers and keyed work queues.

pub mod config;
pub mod detector;
pub mod error;
pub mod lifecycle;
pub mod queue;
pub mod runtime;

pub use config::{LogFormat, OperatorConfig};
pub use detector::{DetectOutcome, FailureDetector};
pub use error::{ConfigError, ControllerError};
pub use lifecycle::{DiagnosisController, LifecycleSettings, PassOutcome};
pub use queue::{BackoffConfig, WorkQueue};
pub use runtime::{Collaborators, Operator, Reconciler};
