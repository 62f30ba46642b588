use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{DEFAULT_CHUNK_SIZE, TransferError};

/// Identifies one upload attempt; sent with every phase call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generates a fresh random (v4) identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.hyphenated().fmt(f)
    }
}

/// Lifecycle of an upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    NotStarted,
    InProgress,
    Finished,
    Cancelled,
    Failed,
}

impl Phase {
    /// Returns `true` once no further phase calls may be issued.
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Finished | Phase::Cancelled | Phase::Failed)
    }
}

/// One of the four remote upload operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseAction {
    Start,
    Continue,
    Finish,
    Cancel,
}

impl fmt::Display for PhaseAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PhaseAction::Start => "START",
            PhaseAction::Continue => "CONTINUE",
            PhaseAction::Finish => "FINISH",
            PhaseAction::Cancel => "CANCEL",
        };
        f.write_str(s)
    }
}

/// A single request handed to a [`crate::PhaseTransport`].
#[derive(Debug, Clone)]
pub struct PhaseCall<'a> {
    pub action: PhaseAction,
    pub session_id: SessionId,
    /// Full remote path of the target file (`/folder/name`).
    pub path: &'a str,
    /// Offset acknowledged by the server before this call.
    pub offset: u64,
    /// Chunk body. `None` for CANCEL and for a body-less FINISH.
    pub payload: Option<Bytes>,
}

/// Where an upload lands on the site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    base_url: String,
    folder: String,
    name: String,
}

impl UploadTarget {
    /// Creates a target for `name` inside `folder`.
    ///
    /// `base_url` is the site's server-relative URL (for example
    /// `/sites/Team`), `folder` is relative to it.
    pub fn new(
        base_url: impl Into<String>,
        folder: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<Self, TransferError> {
        let name = name.into();
        crate::validate_target_name(&name)?;
        Ok(Self {
            base_url: base_url.into(),
            folder: folder.into(),
            name,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn folder(&self) -> &str {
        &self.folder
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Site-relative path of the file, always with one leading slash.
    pub fn path(&self) -> String {
        let folder = self.folder.trim_matches('/');
        if folder.is_empty() {
            format!("/{}", self.name)
        } else {
            format!("/{folder}/{}", self.name)
        }
    }

    /// Server-relative URL of the file.
    pub fn url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.path())
    }
}

/// Descriptor of a file whose upload finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub name: String,
    pub path: String,
    pub url: String,
}

/// State of one chunked upload.
#[derive(Debug, Clone)]
pub struct UploadSession {
    id: SessionId,
    target: UploadTarget,
    path: String,
    total_size: u64,
    chunk_size: u64,
    acknowledged: u64,
    phase: Phase,
}

impl UploadSession {
    /// Creates a session with a freshly generated identifier.
    ///
    /// A `chunk_size` of 0 falls back to [`DEFAULT_CHUNK_SIZE`].
    pub fn new(target: UploadTarget, total_size: u64, chunk_size: u64) -> Self {
        Self::with_id(SessionId::generate(), target, total_size, chunk_size)
    }

    /// Creates a session with a caller-chosen identifier.
    pub fn with_id(id: SessionId, target: UploadTarget, total_size: u64, chunk_size: u64) -> Self {
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        let path = target.path();
        Self {
            id,
            target,
            path,
            total_size,
            chunk_size,
            acknowledged: 0,
            phase: Phase::NotStarted,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn target(&self) -> &UploadTarget {
        &self.target
    }

    /// Full remote path of the target file.
    pub fn target_path(&self) -> &str {
        &self.path
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Byte offset last confirmed by the server.
    pub fn acknowledged(&self) -> u64 {
        self.acknowledged
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Whether a chunk arriving now would be sent with FINISH.
    ///
    /// Looks ahead by the chunk size hint, not by the real chunk length.
    pub fn next_chunk_is_last(&self) -> bool {
        self.acknowledged.saturating_add(self.chunk_size) >= self.total_size
    }

    /// Describes the uploaded file.
    pub fn uploaded_file(&self) -> UploadedFile {
        UploadedFile {
            name: self.target.name.clone(),
            path: self.path.clone(),
            url: self.target.url(),
        }
    }

    pub(crate) fn set_acknowledged(&mut self, offset: u64) {
        self.acknowledged = offset;
    }

    pub(crate) fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }
}
