//! Domain model and pure decision logic for automated pod diagnosis.
//!
//! Nothing in this crate performs I/O. The store, reasoning and
//! operator crates build on these types:
//!
//! - [`pod`]: the subset of the core/v1 Pod resource the detector reads.
//! - [`diagnosis`]: the `PodDiagnosis` custom resource and its phase
//!   state machine.
//! - [`failure`]: failure classification and trigger-reason text.
//! - [`watch`]: typed watch events and the detector trigger policy.
//! - [`event`]: cluster events emitted on diagnosed pods.
//! - [`merge_patch`]: RFC 7386 merge-patch computation.

pub mod diagnosis;
pub mod error;
pub mod event;
pub mod failure;
pub mod merge_patch;
pub mod pod;
pub mod types;
pub mod watch;

pub use diagnosis::{DiagnosisPhase, PodDiagnosis, PodDiagnosisSpec, PodDiagnosisStatus};
pub use error::CoreError;
pub use pod::Pod;
pub use types::{ObjectKey, ObjectMeta, OwnerReference, Timestamp};
pub use watch::WatchEvent;
