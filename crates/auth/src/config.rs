//! Credential settings read from the environment.

use std::path::PathBuf;

use crate::AuthError;

/// Default Azure AD authority host.
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Settings for [`crate::CertificateAuthenticator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialConfig {
    /// Token scope, e.g. `https://tenant.sharepoint.com/.default`.
    pub auth_scope: String,
    pub client_id: String,
    pub tenant_id: String,
    /// SHA-1 thumbprint of the certificate, 40 hex characters.
    pub cert_fingerprint: String,
    pub private_key_file: PathBuf,
    pub cert_passphrase: Option<String>,
    pub authority_host: String,
}

impl CredentialConfig {
    /// Reads and validates the `SHAREPOINT_*` variables of the process environment.
    pub fn from_env() -> Result<Self, AuthError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads and validates settings through `lookup`.
    ///
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AuthError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let require = |key: &str| {
            get(key).ok_or_else(|| {
                AuthError::Config(format!("{key} environment variable has not been set"))
            })
        };

        let auth_scope = require("SHAREPOINT_AUTH_SCOPE")?;
        let scope = auth_scope.to_lowercase();
        if !(scope.starts_with("https://") && scope.ends_with(".sharepoint.com/.default")) {
            return Err(AuthError::Config(
                "SHAREPOINT_AUTH_SCOPE environment variable value is not valid - it must begin \
                 with \"https://\" and end with \".sharepoint.com/.default\""
                    .into(),
            ));
        }

        let client_id = require("SHAREPOINT_CLIENT_ID")?;
        let tenant_id = require("SHAREPOINT_TENANT_ID")?;
        let cert_passphrase = get("SHAREPOINT_CERT_PASSPHRASE");

        let cert_fingerprint = require("SHAREPOINT_CERT_FINGERPRINT")?;
        if cert_fingerprint.len() != 40 {
            return Err(AuthError::Config(
                "SHAREPOINT_CERT_FINGERPRINT environment variable value is not valid - it must \
                 be exactly 40 characters in length"
                    .into(),
            ));
        }

        let private_key_file = PathBuf::from(require("SHAREPOINT_CERT_PRIVATE_KEY_FILE")?);
        if !private_key_file.is_file() {
            return Err(AuthError::Config(format!(
                "specified sharepoint certificate private key file ('{}') does not exist",
                private_key_file.display()
            )));
        }

        let authority_host =
            get("SHAREPOINT_AUTHORITY_HOST").unwrap_or_else(|| DEFAULT_AUTHORITY_HOST.into());

        Ok(Self {
            auth_scope,
            client_id,
            tenant_id,
            cert_fingerprint,
            private_key_file,
            cert_passphrase,
            authority_host,
        })
    }

    /// OAuth2 v2 token endpoint of the tenant.
    pub fn token_endpoint(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_host.trim_end_matches('/'),
            self.tenant_id
        )
    }
}
