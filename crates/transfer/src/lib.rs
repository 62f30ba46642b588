//! Chunked upload sessions for the SharePoint file API.
//!
//! A large file is sent as a sequence of phase calls against one remote
//! upload session: `START` with the first chunk, `CONTINUE` for every
//! chunk in the middle, `FINISH` with the last one. Any failure issues a
//! best-effort `CANCEL` so the server discards the partial file.
//!
//! This crate holds the protocol logic only. The HTTP side lives behind
//! [`PhaseTransport`], implemented by `spdrive-client`.

mod driver;
mod machine;
mod source;
mod types;
mod validation;

#[cfg(test)]
pub(crate) mod testing;

pub use driver::{UploadDriver, drive_upload};
pub use machine::{PhaseFuture, PhaseTransport, UploadMachine};
pub use source::file_source;
pub use types::{Phase, PhaseAction, PhaseCall, SessionId, UploadSession, UploadTarget, UploadedFile};
pub use validation::validate_target_name;

/// Default chunk size hint: 64 KiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 64 * 1024;

/// Errors produced while describing an upload.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("invalid file name: {0}")]
    InvalidName(String),
}

/// Terminal failure of a chunked upload.
///
/// `E` is the transport's own error type, handed back untouched so the
/// caller sees the error that actually broke the session.
#[derive(Debug, thiserror::Error)]
pub enum UploadError<E: std::error::Error + 'static> {
    #[error("phase call failed: {0}")]
    Transport(#[source] E),

    #[error("server returned no upload offset for {action}")]
    MissingOffset { action: PhaseAction },

    #[error("source stream failed: {0}")]
    Stream(#[source] std::io::Error),

    #[error("source stream ended after {acknowledged} of {total} bytes")]
    Truncated { acknowledged: u64, total: u64 },
}
