//! Client-credentials flow with a certificate-signed assertion.
//!
//! Azure AD accepts a JWT signed with the app's certificate key in place
//! of a client secret. The certificate is identified by its SHA-1
//! thumbprint in the `x5t` header.

use std::sync::Mutex;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use pkcs8::{EncryptedPrivateKeyInfo, LineEnding};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{AccessToken, AuthError, Authenticator, CredentialConfig, TokenFuture};

const ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Assertion lifetime in seconds.
const ASSERTION_LIFETIME: i64 = 600;

#[derive(Debug, Serialize, Deserialize)]
struct AssertionClaims {
    aud: String,
    iss: String,
    sub: String,
    jti: String,
    nbf: i64,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Obtains app-only tokens for a certificate-registered Azure AD app.
pub struct CertificateAuthenticator {
    http: reqwest::Client,
    config: CredentialConfig,
    key: EncodingKey,
    thumbprint: String,
    cached: Mutex<Option<AccessToken>>,
}

impl CertificateAuthenticator {
    /// Loads the private key named in `config`.
    pub fn new(config: CredentialConfig) -> Result<Self, AuthError> {
        let pem = std::fs::read(&config.private_key_file)?;
        Self::from_pem(config, &pem)
    }

    /// Builds an authenticator from an in-memory PEM key.
    ///
    /// Accepts PKCS#1 or PKCS#8 RSA keys. An encrypted PKCS#8 key is
    /// decrypted with `cert_passphrase`.
    pub fn from_pem(config: CredentialConfig, pem: &[u8]) -> Result<Self, AuthError> {
        let key = if pem.windows(9).any(|w| w == b"ENCRYPTED") {
            let passphrase = config.cert_passphrase.as_deref().ok_or_else(|| {
                AuthError::Config(
                    "SHAREPOINT_CERT_PASSPHRASE environment variable has not been set".into(),
                )
            })?;
            let decrypted = decrypt_pem(pem, passphrase)?;
            EncodingKey::from_rsa_pem(decrypted.as_bytes())?
        } else {
            if config.cert_passphrase.is_some() {
                debug!("private key is unencrypted, ignoring SHAREPOINT_CERT_PASSPHRASE");
            }
            EncodingKey::from_rsa_pem(pem)?
        };
        let thumbprint = hex::decode(&config.cert_fingerprint).map_err(|e| {
            AuthError::Config(format!(
                "SHAREPOINT_CERT_FINGERPRINT environment variable value is not valid - {e}"
            ))
        })?;

        Ok(Self {
            http: reqwest::Client::new(),
            config,
            key,
            thumbprint: URL_SAFE_NO_PAD.encode(thumbprint),
            cached: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &CredentialConfig {
        &self.config
    }

    /// Signs a client assertion valid from `now` (unix seconds).
    fn build_assertion(&self, now: i64) -> Result<String, AuthError> {
        let mut header = Header::new(Algorithm::RS256);
        header.x5t = Some(self.thumbprint.clone());

        let claims = AssertionClaims {
            aud: self.config.token_endpoint(),
            iss: self.config.client_id.clone(),
            sub: self.config.client_id.clone(),
            jti: uuid::Uuid::new_v4().to_string(),
            nbf: now,
            iat: now,
            exp: now + ASSERTION_LIFETIME,
        };
        Ok(jsonwebtoken::encode(&header, &claims, &self.key)?)
    }

    fn cached_token(&self) -> Option<AccessToken> {
        let cached = self.cached.lock().ok()?;
        cached.as_ref().filter(|t| t.is_fresh(Utc::now())).cloned()
    }

    async fn request_token(&self) -> Result<AccessToken, AuthError> {
        let now = Utc::now();
        let assertion = self.build_assertion(now.timestamp())?;
        let endpoint = self.config.token_endpoint();

        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("scope", self.config.auth_scope.as_str()),
            ("client_assertion_type", ASSERTION_TYPE),
            ("client_assertion", assertion.as_str()),
            ("grant_type", "client_credentials"),
        ];
        let resp = self.http.post(&endpoint).form(&params).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AuthError::TokenEndpoint {
                status: status.as_u16(),
                body,
            });
        }

        let body: TokenResponse = serde_json::from_slice(&resp.bytes().await?)?;
        let token = match body.expires_in {
            Some(secs) => AccessToken::with_expiry(body.access_token, now + Duration::seconds(secs)),
            None => AccessToken::new(body.access_token),
        };
        info!(client_id = %self.config.client_id, expires_at = ?token.expires_at(), "access token acquired");
        Ok(token)
    }
}

/// Decrypts an `ENCRYPTED PRIVATE KEY` PEM into a plain PKCS#8 PEM.
fn decrypt_pem(pem: &[u8], passphrase: &str) -> Result<String, AuthError> {
    let (label, der) = pkcs8::der::pem::decode_vec(pem)
        .map_err(|e| AuthError::PrivateKey(format!("invalid PEM: {e}")))?;
    if label != "ENCRYPTED PRIVATE KEY" {
        return Err(AuthError::PrivateKey(format!(
            "unsupported encrypted key format '{label}', convert it with openssl pkcs8 -topk8"
        )));
    }
    let info = EncryptedPrivateKeyInfo::try_from(der.as_slice())
        .map_err(|e| AuthError::PrivateKey(e.to_string()))?;
    let document = info
        .decrypt(passphrase)
        .map_err(|e| AuthError::PrivateKey(format!("decryption failed: {e}")))?;
    let plain = document
        .to_pem("PRIVATE KEY", LineEnding::LF)
        .map_err(|e| AuthError::PrivateKey(e.to_string()))?;
    Ok(plain.to_string())
}

impl Authenticator for CertificateAuthenticator {
    fn acquire_token(&self) -> TokenFuture<'_> {
        Box::pin(async move {
            if let Some(token) = self.cached_token() {
                debug!("using cached access token");
                return Ok(token);
            }
            let token = self.request_token().await?;
            if let Ok(mut cached) = self.cached.lock() {
                *cached = Some(token.clone());
            }
            Ok(token)
        })
    }
}
