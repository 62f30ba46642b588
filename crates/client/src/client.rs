//! SharePoint REST client.
//!
//! Async HTTP client using `reqwest` with Bearer token authentication
//! against a single site's `/_api` endpoints.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::Stream;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use spdrive_auth::{AccessToken, Authenticator};
use spdrive_transfer::{UploadSession, UploadTarget, UploadedFile, drive_upload};
use tracing::{debug, info, warn};

use crate::ClientError;
use crate::config::ClientConfig;
use crate::odata::string_literal;
use crate::sort::natural_cmp;
use crate::types::{
    ChunkedUpload, ContextInfo, CreateFile, FileRef, FolderItem, ItemKind, MoveFile, MoveFolder,
    RawItem, Results, Verbose, WebInfo,
};
use crate::upload::HttpPhaseTransport;

pub(crate) const REQUEST_DIGEST: &str = "X-RequestDigest";
const HTTP_METHOD: &str = "X-HTTP-Method";
const VERBOSE: &str = "application/json;odata=verbose";

/// Content written by [`Client::create_file_chunked`] before the upload starts.
const PLACEHOLDER: &[u8] = b" ";

const NO_PATH: &str = "You must provide a path.";
const NO_FILE_NAME: &str = "You must provide a file name.";
const NO_DATA: &str = "You must provide data.";
const NO_STREAM: &str = "You must provide a stream.";
const NO_FILE_SIZE: &str = "You must provide a file size.";
const NO_SOURCE_PATH: &str = "You must provide a source path.";
const NO_TARGET_PATH: &str = "You must provide a target path.";

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ClientError>> + Send + 'a>>;

/// Turns a non-success response into [`ClientError::Api`].
///
/// With `debug` set the status and body are logged first.
pub(crate) async fn ensure_success(
    resp: reqwest::Response,
    context: &'static str,
    debug: bool,
) -> Result<reqwest::Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    if debug {
        warn!(status = status.as_u16(), %body, "{context}");
    }
    Err(ClientError::Api {
        context,
        status: status.as_u16(),
        body,
    })
}

async fn json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ClientError> {
    Ok(serde_json::from_slice(&resp.bytes().await?)?)
}

fn require(value: &str, message: &'static str) -> Result<(), ClientError> {
    if value.is_empty() {
        return Err(ClientError::MissingParameter(message));
    }
    Ok(())
}

/// Client for one SharePoint site's document libraries.
///
/// Call [`Client::authenticate`] and then [`Client::load_web_endpoint`]
/// before any file or folder operation. Paths are relative to the site,
/// e.g. `/Shared Documents/Reports`.
pub struct Client {
    http: reqwest::Client,
    site_url: String,
    debug: bool,
    chunk_size: u64,
    authenticator: Arc<dyn Authenticator>,
    token: Option<AccessToken>,
    base_url: Option<String>,
}

impl Client {
    /// Creates a client with default settings.
    pub fn new(site_url: impl Into<String>, authenticator: Arc<dyn Authenticator>) -> Result<Self, ClientError> {
        Self::from_config(ClientConfig::new(site_url), authenticator)
    }

    pub fn from_config(config: ClientConfig, authenticator: Arc<dyn Authenticator>) -> Result<Self, ClientError> {
        if config.site_url.trim().is_empty() {
            return Err(ClientError::Config("siteUrl has not been specified".into()));
        }
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            http,
            site_url: config.site_url.trim_end_matches('/').to_string(),
            debug: config.debug,
            chunk_size: config.chunk_size,
            authenticator,
            token: None,
            base_url: None,
        })
    }

    pub fn site_url(&self) -> &str {
        &self.site_url
    }

    /// Server-relative path of the site, known after [`Client::load_web_endpoint`].
    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    /// Obtains an access token and keeps it for subsequent calls.
    pub async fn authenticate(&mut self) -> Result<(), ClientError> {
        let token = self.authenticator.acquire_token().await?;
        info!(site = %self.site_url, "authenticated");
        self.token = Some(token);
        Ok(())
    }

    /// Reads the site's web properties and remembers its server-relative URL.
    pub async fn load_web_endpoint(&mut self) -> Result<WebInfo, ClientError> {
        let resp = self
            .http
            .get(self.api_url("web"))
            .bearer_auth(self.token()?)
            .header(ACCEPT, VERBOSE)
            .send()
            .await?;
        let resp = ensure_success(resp, "Unable to get web endpoint", self.debug).await?;
        let web: Verbose<WebInfo> = json(resp).await?;

        let base = web.d.server_relative_url.trim_end_matches('/').to_string();
        debug!(base_url = %base, "web endpoint loaded");
        self.base_url = Some(base);
        Ok(web.d)
    }

    /// Fetches a fresh request digest for a mutating call.
    pub async fn form_digest_value(&self) -> Result<String, ClientError> {
        let resp = self
            .http
            .post(self.api_url("contextinfo"))
            .bearer_auth(self.token()?)
            .header(ACCEPT, VERBOSE)
            .json(&serde_json::json!({}))
            .send()
            .await?;
        let resp = ensure_success(resp, "Unable to get form digest value", self.debug).await?;
        let info: Verbose<ContextInfo> = json(resp).await?;
        Ok(info.d.get_context_web_information.form_digest_value)
    }

    /// Lists a folder: subfolders first, then files, each in natural name order.
    pub async fn get_contents(&self, path: &str) -> Result<Vec<FolderItem>, ClientError> {
        let token = self.token()?;
        let folder = self.folder_url(path)?;

        let mut items = Vec::new();
        for kind in ["Folders", "Files"] {
            let resp = self
                .http
                .get(format!("{folder}/{kind}"))
                .bearer_auth(token)
                .header(ACCEPT, VERBOSE)
                .send()
                .await?;
            let resp = ensure_success(resp, "Failed to get folder contents", self.debug).await?;
            let listing: Verbose<Results<RawItem>> = json(resp).await?;

            let mut entries: Vec<FolderItem> = listing.d.results.into_iter().map(FolderItem::from).collect();
            entries.sort_by(|a, b| natural_cmp(&a.name, &b.name));
            items.extend(entries);
        }
        Ok(items)
    }

    pub async fn create_folder(&self, path: &str) -> Result<(), ClientError> {
        require(path, NO_PATH)?;
        let token = self.token()?;
        let server_relative_url = self.server_path(path)?;
        let digest = self.form_digest_value().await?;

        let body = serde_json::json!({
            "__metadata": { "type": "SP.Folder" },
            "ServerRelativeUrl": server_relative_url,
        });
        let resp = self
            .http
            .post(self.api_url("web/folders"))
            .bearer_auth(token)
            .header(ACCEPT, VERBOSE)
            .header(CONTENT_TYPE, VERBOSE)
            .header(REQUEST_DIGEST, digest)
            .body(serde_json::to_vec(&body)?)
            .send()
            .await?;
        ensure_success(resp, "Failed to create specified folder", self.debug).await?;
        debug!(path, "folder created");
        Ok(())
    }

    pub async fn delete_folder(&self, path: &str) -> Result<(), ClientError> {
        require(path, NO_PATH)?;
        let token = self.token()?;
        let url = self.folder_url(path)?;
        let digest = self.form_digest_value().await?;

        let resp = self
            .http
            .post(url)
            .bearer_auth(token)
            .header(REQUEST_DIGEST, digest)
            .header(HTTP_METHOD, "DELETE")
            .body(Bytes::new())
            .send()
            .await?;
        ensure_success(resp, "Unable to delete folder", self.debug).await?;
        debug!(path, "folder deleted");
        Ok(())
    }

    /// Writes a whole file in one request, replacing any existing file.
    pub async fn create_file(&self, file: CreateFile) -> Result<(), ClientError> {
        require(&file.file_name, NO_FILE_NAME)?;
        if file.data.is_empty() {
            return Err(ClientError::MissingParameter(NO_DATA));
        }
        let token = self.token()?;
        let url = format!(
            "{}/Files/add(url='{}',overwrite=true)",
            self.folder_url(&file.path)?,
            string_literal(&file.file_name)
        );
        let digest = self.form_digest_value().await?;

        let resp = self
            .http
            .post(url)
            .bearer_auth(token)
            .header(ACCEPT, VERBOSE)
            .header(REQUEST_DIGEST, digest)
            .body(file.data)
            .send()
            .await?;
        ensure_success(resp, "Unable to create file", self.debug).await?;
        debug!(path = %file.path, file_name = %file.file_name, "file created");
        Ok(())
    }

    /// Uploads a file from a byte stream in chunks.
    ///
    /// Creates a one-byte placeholder first, then streams the content
    /// through a START / CONTINUE / FINISH upload session. Failures cancel
    /// the session before the error is returned.
    pub async fn create_file_chunked<S>(&self, upload: ChunkedUpload<S>) -> Result<UploadedFile, ClientError>
    where
        S: Stream<Item = io::Result<Bytes>> + Unpin,
    {
        require(&upload.path, NO_PATH)?;
        require(&upload.file_name, NO_FILE_NAME)?;
        let Some(stream) = upload.stream else {
            return Err(ClientError::MissingParameter(NO_STREAM));
        };
        if upload.file_size == 0 {
            return Err(ClientError::MissingParameter(NO_FILE_SIZE));
        }
        let token = self.token()?;
        let base_url = self.base()?;
        let target = UploadTarget::new(base_url, &upload.path, &upload.file_name)?;

        self.create_file(CreateFile {
            path: upload.path.clone(),
            file_name: upload.file_name.clone(),
            data: Bytes::from_static(PLACEHOLDER),
        })
        .await?;

        let transport = HttpPhaseTransport {
            http: &self.http,
            site_url: &self.site_url,
            base_url,
            token,
            digest: self.form_digest_value().await?,
            debug: self.debug,
        };
        let session = UploadSession::new(target, upload.file_size, upload.chunk_size.unwrap_or(self.chunk_size));
        Ok(drive_upload(&transport, session, stream).await?)
    }

    pub async fn delete_file(&self, file: FileRef) -> Result<(), ClientError> {
        require(&file.file_name, NO_FILE_NAME)?;
        let token = self.token()?;
        let url = self.file_url(&file.path, &file.file_name)?;
        let digest = self.form_digest_value().await?;

        let resp = self
            .http
            .post(url)
            .bearer_auth(token)
            .header(REQUEST_DIGEST, digest)
            .header(HTTP_METHOD, "DELETE")
            .body(Bytes::new())
            .send()
            .await?;
        ensure_success(resp, "Unable to delete file", self.debug).await?;
        debug!(path = %file.path, file_name = %file.file_name, "file deleted");
        Ok(())
    }

    /// Moves a file between folders, overwriting the target.
    pub async fn move_file(&self, file: MoveFile) -> Result<(), ClientError> {
        require(&file.file_name, NO_FILE_NAME)?;
        let token = self.token()?;
        let new_url = string_literal(&format!(
            "{}/{}",
            self.server_path(&file.target_path)?,
            file.file_name
        ));
        let url = format!(
            "{}/moveto(newurl='{new_url}',flags=1)",
            self.file_url(&file.source_path, &file.file_name)?
        );
        let digest = self.form_digest_value().await?;

        let resp = self
            .http
            .post(url)
            .bearer_auth(token)
            .header(REQUEST_DIGEST, digest)
            .body(Bytes::new())
            .send()
            .await?;
        ensure_success(resp, "Unable to move file", self.debug).await?;
        debug!(
            source = %file.source_path,
            target = %file.target_path,
            file_name = %file.file_name,
            "file moved"
        );
        Ok(())
    }

    /// Moves every file below `source_path` to the same relative place
    /// under `target_path`, then deletes the source folder.
    ///
    /// Empty subfolders are not recreated.
    pub async fn move_folder(&self, folder: MoveFolder) -> Result<(), ClientError> {
        require(&folder.source_path, NO_SOURCE_PATH)?;
        require(&folder.target_path, NO_TARGET_PATH)?;
        self.token()?;

        let mut files = Vec::new();
        self.collect_files(folder.source_path.clone(), folder.target_path.clone(), &mut files)
            .await?;
        info!(
            source = %folder.source_path,
            target = %folder.target_path,
            files = files.len(),
            "moving folder"
        );

        for file in files {
            self.create_folder(&file.target_path).await?;
            self.move_file(file).await?;
        }
        self.delete_folder(&folder.source_path).await
    }

    /// Depth-first walk; files of a subfolder come before the files of its parent.
    fn collect_files<'a>(&'a self, source: String, target: String, out: &'a mut Vec<MoveFile>) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            for item in self.get_contents(&source).await? {
                match item.kind {
                    ItemKind::File => out.push(MoveFile {
                        source_path: source.clone(),
                        target_path: target.clone(),
                        file_name: item.name,
                    }),
                    ItemKind::Folder => {
                        self.collect_files(
                            format!("{source}/{}", item.name),
                            format!("{target}/{}", item.name),
                            out,
                        )
                        .await?;
                    }
                    ItemKind::Other => {}
                }
            }
            Ok(())
        })
    }

    fn token(&self) -> Result<&str, ClientError> {
        self.token
            .as_ref()
            .map(AccessToken::secret)
            .ok_or(ClientError::NotAuthenticated)
    }

    fn base(&self) -> Result<&str, ClientError> {
        self.base_url.as_deref().ok_or(ClientError::WebEndpointNotLoaded)
    }

    fn api_url(&self, endpoint: &str) -> String {
        format!("{}/_api/{endpoint}", self.site_url)
    }

    /// Server-relative form of a site-relative path.
    fn server_path(&self, path: &str) -> Result<String, ClientError> {
        Ok(format!("{}{}", self.base()?, path))
    }

    fn folder_url(&self, path: &str) -> Result<String, ClientError> {
        Ok(format!(
            "{}/_api/web/GetFolderByServerRelativeUrl('{}')",
            self.site_url,
            string_literal(&self.server_path(path)?)
        ))
    }

    fn file_url(&self, path: &str, file_name: &str) -> Result<String, ClientError> {
        Ok(format!(
            "{}/_api/web/GetFileByServerRelativeUrl('{}')",
            self.site_url,
            string_literal(&format!("{}/{file_name}", self.server_path(path)?))
        ))
    }
}
