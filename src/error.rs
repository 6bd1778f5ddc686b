use crate::store::StoreError;

/// Expected, recoverable failure modes of the core. Everything here is a
/// structured result for the caller to present; only `Store` wraps genuinely
/// unexpected backend failures.
#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    #[error("not found")]
    NotFound,
    #[error("permission denied")]
    PermissionDenied,
    #[error("rate limited, retry in {retry_in}s")]
    RateLimited { retry_in: i64 },
    #[error("{0}")]
    Validation(String),
    #[error("store error: {0}")]
    Store(StoreError),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl From<StoreError> for CoreError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => CoreError::NotFound,
            other => CoreError::Store(other),
        }
    }
}

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        CoreError::Validation(msg.into())
    }
}
