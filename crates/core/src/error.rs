use crate::diagnosis::DiagnosisPhase;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid phase transition from {from} to {to}")]
    InvalidTransition {
        from: DiagnosisPhase,
        to: DiagnosisPhase,
    },

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
