use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Envelope of `application/json;odata=verbose` responses.
#[derive(Debug, Deserialize)]
pub(crate) struct Verbose<T> {
    pub d: T,
}

/// Collection payload inside a verbose envelope.
#[derive(Debug, Deserialize)]
pub(crate) struct Results<T> {
    pub results: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct ContextInfo {
    pub get_context_web_information: ContextWebInformation,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct ContextWebInformation {
    pub form_digest_value: String,
}

/// Body of a START / CONTINUE response.
#[derive(Debug, Deserialize)]
pub(crate) struct OffsetValue {
    #[serde(default)]
    pub value: Option<NumberOrString>,
}

/// SharePoint serializes 64-bit integers as JSON strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum NumberOrString {
    Number(u64),
    String(String),
}

impl NumberOrString {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            NumberOrString::Number(n) => Some(*n),
            NumberOrString::String(s) => s.trim().parse().ok(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct Metadata {
    #[serde(rename = "type")]
    pub kind: String,
}

/// Folder or file entry as returned by `/Folders` and `/Files`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct RawItem {
    #[serde(rename = "__metadata")]
    pub metadata: Metadata,
    pub name: String,
    pub server_relative_url: String,
    #[serde(default)]
    pub length: Option<NumberOrString>,
    #[serde(default)]
    pub time_last_modified: Option<String>,
}

/// Properties of the site's web, from `GET /_api/web`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WebInfo {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub created: String,
    #[serde(default)]
    pub last_item_user_modified_date: String,
    /// Server-relative path of the site, e.g. `/sites/Team`.
    pub server_relative_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Folder,
    File,
    Other,
}

impl ItemKind {
    pub(crate) fn from_metadata(kind: &str) -> Self {
        match kind {
            "SP.Folder" => ItemKind::Folder,
            "SP.File" => ItemKind::File,
            _ => ItemKind::Other,
        }
    }
}

/// One entry of a folder listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderItem {
    pub name: String,
    pub server_relative_url: String,
    pub kind: ItemKind,
    /// File size in bytes; `None` for folders.
    pub length: Option<u64>,
    pub time_last_modified: Option<String>,
}

impl From<RawItem> for FolderItem {
    fn from(raw: RawItem) -> Self {
        Self {
            kind: ItemKind::from_metadata(&raw.metadata.kind),
            length: raw.length.as_ref().and_then(NumberOrString::as_u64),
            name: raw.name,
            server_relative_url: raw.server_relative_url,
            time_last_modified: raw.time_last_modified,
        }
    }
}

/// Arguments of [`crate::Client::create_file`].
#[derive(Debug, Clone)]
pub struct CreateFile {
    /// Folder relative to the site, e.g. `/Shared Documents`.
    pub path: String,
    pub file_name: String,
    pub data: Bytes,
}

/// Arguments of [`crate::Client::create_file_chunked`].
#[derive(Debug)]
pub struct ChunkedUpload<S> {
    pub path: String,
    pub file_name: String,
    pub stream: Option<S>,
    /// Total length of the stream in bytes.
    pub file_size: u64,
    /// Chunk size hint; the client default applies when `None`.
    pub chunk_size: Option<u64>,
}

impl<S> ChunkedUpload<S> {
    pub fn new(path: impl Into<String>, file_name: impl Into<String>, stream: S, file_size: u64) -> Self {
        Self {
            path: path.into(),
            file_name: file_name.into(),
            stream: Some(stream),
            file_size,
            chunk_size: None,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = Some(chunk_size);
        self
    }
}

/// A file inside a folder, for [`crate::Client::delete_file`].
#[derive(Debug, Clone)]
pub struct FileRef {
    pub path: String,
    pub file_name: String,
}

/// Arguments of [`crate::Client::move_file`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveFile {
    pub source_path: String,
    pub target_path: String,
    pub file_name: String,
}

/// Arguments of [`crate::Client::move_folder`].
#[derive(Debug, Clone)]
pub struct MoveFolder {
    pub source_path: String,
    pub target_path: String,
}
