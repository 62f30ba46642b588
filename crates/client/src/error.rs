use spdrive_auth::AuthError;
use spdrive_transfer::{TransferError, UploadError};

/// Errors returned by [`crate::Client`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// A required argument was missing or empty.
    #[error("{0}")]
    MissingParameter(&'static str),

    #[error("Access token not available - please authenticate() prior to calling this function")]
    NotAuthenticated,

    #[error("web endpoint not loaded - please load_web_endpoint() prior to calling this function")]
    WebEndpointNotLoaded,

    /// The server answered with a non-success status.
    #[error("{context} (status {status}): {body}")]
    Api {
        context: &'static str,
        status: u16,
        body: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("source stream error: {0}")]
    Stream(#[source] std::io::Error),

    #[error("upload error: {0}")]
    Upload(String),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("{0}")]
    Config(String),
}

impl From<UploadError<ClientError>> for ClientError {
    fn from(err: UploadError<ClientError>) -> Self {
        match err {
            UploadError::Transport(e) => e,
            UploadError::Stream(e) => ClientError::Stream(e),
            other @ (UploadError::MissingOffset { .. } | UploadError::Truncated { .. }) => {
                ClientError::Upload(other.to_string())
            }
        }
    }
}
