use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("scan target must not be empty")]
    EmptyTarget,
    #[error("job creation failed: {0}")]
    JobCreation(String),
    #[error("scan superseded by a newer start")]
    Superseded,
}
