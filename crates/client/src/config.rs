//! Client settings.

use std::time::Duration;

use spdrive_transfer::DEFAULT_CHUNK_SIZE;

use crate::ClientError;

/// Default timeout applied to every HTTP request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Settings for [`crate::Client`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Absolute site URL, e.g. `https://contoso.sharepoint.com/sites/Team`.
    pub site_url: String,
    /// Log status and body of failed responses.
    pub debug: bool,
    pub timeout: Duration,
    /// Default chunk size hint for chunked uploads.
    pub chunk_size: u64,
}

impl ClientConfig {
    pub fn new(site_url: impl Into<String>) -> Self {
        Self {
            site_url: site_url.into(),
            debug: false,
            timeout: DEFAULT_TIMEOUT,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Reads `SHAREPOINT_URL`, `SHAREPOINT_DEBUG` and `SHAREPOINT_CHUNK_SIZE`.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ClientError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let site_url = get("SHAREPOINT_URL").ok_or_else(|| {
            ClientError::Config("SHAREPOINT_URL environment variable has not been set".into())
        })?;

        let mut config = Self::new(site_url);
        config.debug = get("SHAREPOINT_DEBUG").is_some_and(|v| is_truthy(&v));

        if let Some(raw) = get("SHAREPOINT_CHUNK_SIZE") {
            config.chunk_size = match raw.trim().parse::<u64>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ClientError::Config(format!(
                        "SHAREPOINT_CHUNK_SIZE environment variable value is not valid - \
                         expected a positive number of bytes, got '{raw}'"
                    )));
                }
            };
        }

        Ok(config)
    }
}

/// `Y`, `YES` and `TRUE` in any case.
pub fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_uppercase().as_str(), "Y" | "YES" | "TRUE")
}
