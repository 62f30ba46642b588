//! Command-line smoke test for a SharePoint site.
//!
//! Usage:
//!   site-info                         print web details
//!   site-info list <folder>           list a folder
//!   site-info upload <file> <folder>  chunked upload of a local file

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use spdrive_auth::{CertificateAuthenticator, CredentialConfig};
use spdrive_client::{ChunkedUpload, Client, ClientConfig, ItemKind, file_source};
use tracing_subscriber::EnvFilter;

enum Command {
    Info,
    List(String),
    Upload { file: PathBuf, folder: String },
}

fn parse_args(mut args: impl Iterator<Item = String>) -> anyhow::Result<Command> {
    match args.next().as_deref() {
        None => Ok(Command::Info),
        Some("list") => Ok(Command::List(args.next().unwrap_or_default())),
        Some("upload") => {
            let file = args.next().context("upload needs a local file")?;
            let folder = args.next().context("upload needs a target folder")?;
            Ok(Command::Upload {
                file: PathBuf::from(file),
                folder,
            })
        }
        Some(other) => bail!("unknown command '{other}' (expected list or upload)"),
    }
}

fn read_capacity(chunk_size: u64) -> anyhow::Result<usize> {
    usize::try_from(chunk_size)
        .context("SHAREPOINT_CHUNK_SIZE does not fit in memory on this platform")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; variables may come from the environment.
    let _ = dotenvy::dotenv();

    let config = ClientConfig::from_env()?;
    let default_level = if config.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let command = parse_args(std::env::args().skip(1))?;

    let credentials = CredentialConfig::from_env()?;
    let authenticator = CertificateAuthenticator::new(credentials)?;
    let mut client = Client::from_config(config.clone(), Arc::new(authenticator))?;

    client.authenticate().await?;
    let web = client.load_web_endpoint().await?;

    match command {
        Command::Info => {
            println!("Title:        {}", web.title);
            println!("Description:  {}", web.description);
            println!("Id:           {}", web.id);
            println!("Created:      {}", web.created);
            println!("Last changed: {}", web.last_item_user_modified_date);
            println!("Base path:    {}", web.server_relative_url);
        }
        Command::List(folder) => {
            for item in client.get_contents(&folder).await? {
                let marker = match item.kind {
                    ItemKind::Folder => "d",
                    ItemKind::File => "-",
                    ItemKind::Other => "?",
                };
                let size = item.length.map(|n| n.to_string()).unwrap_or_default();
                println!("{marker} {size:>12}  {}", item.name);
            }
        }
        Command::Upload { file, folder } => {
            let name = file
                .file_name()
                .and_then(|n| n.to_str())
                .context("local file has no usable name")?
                .to_string();
            let (stream, size) = file_source(&file, read_capacity(config.chunk_size)?)
                .await
                .with_context(|| format!("failed to open {}", file.display()))?;

            let uploaded = client
                .create_file_chunked(ChunkedUpload::new(folder, name, stream, size).with_chunk_size(config.chunk_size))
                .await?;
            tracing::info!(url = %uploaded.url, bytes = size, "upload complete");
            println!("{}", uploaded.url);
        }
    }

    Ok(())
}
