use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("not found")]
    NotFound,
    #[error("forbidden")]
    Forbidden,
    #[error("a connection request already exists for this pair")]
    DuplicateRequest,
    #[error("request is already resolved")]
    AlreadyResolved,
    #[error("storage failed: {0}")]
    Store(String),
}
