use thiserror::Error;

/// Error taxonomy shared by the index engine, the pipeline, and the adapters.
///
/// The split matters for propagation policy: `Validation` and `NotFound`
/// always surface to the caller, `TransientStore`/`TransientBroker` are
/// retryable and swallowed on per-item index writes, and `Handler` marks a
/// background job Failed without tearing the worker down.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("transient store error: {0}")]
    TransientStore(String),

    #[error("transient broker error: {0}")]
    TransientBroker(String),

    #[error("handler failure: {0}")]
    Handler(String),

    #[error("index inconsistency: {0}")]
    Inconsistency(String),

    #[error("operation cancelled: {0}")]
    Cancelled(String),

    #[error("external tool error: {0}")]
    ExternalTool(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Retryable errors get a hint in API responses and back off in workers.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientStore(_) | Self::TransientBroker(_))
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
