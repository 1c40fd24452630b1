use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuditError {
    /// Échec réseau pour toute la cible (résolution, liveness)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Une tâche du pool bloquant a paniqué ou a été annulée
    #[error("Blocking task failed: {0}")]
    Join(String),

    #[error("Invalid audit configuration: {0}")]
    InvalidConfig(String),
}

impl From<tokio::task::JoinError> for AuditError {
    fn from(e: tokio::task::JoinError) -> Self {
        AuditError::Join(e.to_string())
    }
}
