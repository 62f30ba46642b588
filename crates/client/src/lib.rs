//! Client for SharePoint document libraries.
//!
//! Lists, creates, moves and deletes files and folders through the site's
//! REST API, and uploads large files in chunks on top of
//! `spdrive-transfer`.

mod client;
mod config;
mod error;
pub mod odata;
mod sort;
mod types;
mod upload;

#[cfg(test)]
pub(crate) mod testing;

pub use client::Client;
pub use config::{ClientConfig, DEFAULT_TIMEOUT, is_truthy};
pub use error::ClientError;
pub use sort::natural_cmp;
pub use types::{ChunkedUpload, CreateFile, FileRef, FolderItem, ItemKind, MoveFile, MoveFolder, WebInfo};

pub use spdrive_transfer::{UploadedFile, file_source};
