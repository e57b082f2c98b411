use grcmon_common::error::ConfigError;

/// Errors that can occur within the storage layer.
///
/// Every variant is a persistence failure from the worker's point of view:
/// inside a run it aborts the run, inside the reconciler it is logged and
/// retried on the next tick.
///
/// # Examples
///
/// ```rust
/// use grcmon_storage::error::StorageError;
///
/// let err = StorageError::NotFound {
///     entity: "alert",
///     id: "alert-99".to_string(),
/// };
/// assert!(err.to_string().contains("alert"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A required record was not found in the database.
    #[error("Storage: {entity} not found (id={id})")]
    NotFound { entity: &'static str, id: String },

    #[error("Storage: database error: {0}")]
    Db(#[from] sea_orm::DbErr),

    /// JSON serialization or deserialization failure (`*_json` and list columns).
    #[error("Storage: JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A write was rejected because the definition does not validate.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A stored value cannot be mapped back to its domain type.
    #[error("Storage: corrupt value in {entity}.{column}: {reason}")]
    Corrupt {
        entity: &'static str,
        column: &'static str,
        reason: String,
    },
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
