use autopsy_core::CoreError;
use autopsy_store::StoreError;

/// Errors that abort a reconciliation pass.
///
/// Every variant leaves the object as it was; the work queue re-delivers
/// the key after a backoff. Outcomes that are recorded on the object
/// (log or reasoning failures) are not errors, see
/// [`PassOutcome`](crate::lifecycle::PassOutcome).
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Core(#[from] CoreError),

    /// The enclosing pass was cancelled (shutdown).
    #[error("reconciliation cancelled")]
    Cancelled,
}

impl ControllerError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ControllerError::Cancelled)
    }
}

/// Invalid operator configuration.
#[derive(Debug, thiserror::Error)]
#[error("{name} must be {expected}, got {value:?}")]
pub struct ConfigError {
    pub name: &'static str,
    pub expected: &'static str,
    pub value: String,
}
