/// Errors that can occur while delivering an alert.
///
/// # Examples
///
/// ```rust
/// use grcmon_notify::error::NotifyError;
///
/// let err = NotifyError::InvalidConfig("webhook url is empty".to_string());
/// assert!(err.to_string().contains("webhook url"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// Dispatcher configuration is missing a required field or contains an invalid value.
    #[error("Notify: invalid dispatcher configuration: {0}")]
    InvalidConfig(String),

    /// An HTTP request to an external endpoint failed.
    #[error("Notify: HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The external endpoint returned a non-success response.
    #[error("Notify: API error from {service}: status={status}, body={body}")]
    ApiError {
        service: String,
        status: u16,
        body: String,
    },
}

/// Convenience `Result` alias for notification operations.
pub type Result<T> = std::result::Result<T, NotifyError>;
