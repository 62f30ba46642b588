//! Bearer token acquisition for the SharePoint REST API.
//!
//! The client only needs something implementing [`Authenticator`]. Two
//! implementations ship here: [`StaticToken`] for pre-issued tokens and
//! [`CertificateAuthenticator`], the Azure AD client-credentials flow
//! with a certificate-signed assertion.

mod certificate;
mod config;

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Duration, Utc};

pub use certificate::CertificateAuthenticator;
pub use config::CredentialConfig;

/// Tokens are refreshed this many seconds before they expire.
pub const EXPIRY_MARGIN_SECS: i64 = 300;

/// Errors produced while obtaining a token.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("signing key error: {0}")]
    Key(#[from] jsonwebtoken::errors::Error),

    /// An encrypted private key could not be decoded or decrypted.
    #[error("private key error: {0}")]
    PrivateKey(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("token endpoint error {status}: {body}")]
    TokenEndpoint { status: u16, body: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A bearer token and its expiry.
#[derive(Clone)]
pub struct AccessToken {
    secret: String,
    expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    /// A token that never expires locally.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            expires_at: None,
        }
    }

    pub fn with_expiry(secret: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            secret: secret.into(),
            expires_at: Some(expires_at),
        }
    }

    /// The raw token, as sent in `Authorization: Bearer ...`.
    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Whether the token is still usable at `now`, keeping [`EXPIRY_MARGIN_SECS`].
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(at) => now + Duration::seconds(EXPIRY_MARGIN_SECS) < at,
            None => true,
        }
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Future returned by [`Authenticator::acquire_token`].
pub type TokenFuture<'a> = Pin<Box<dyn Future<Output = Result<AccessToken, AuthError>> + Send + 'a>>;

/// Source of bearer tokens.
///
/// Called by the client whenever it (re)authenticates; implementations
/// may cache.
pub trait Authenticator: Send + Sync {
    fn acquire_token(&self) -> TokenFuture<'_>;
}

/// Hands out a fixed token.
#[derive(Debug, Clone)]
pub struct StaticToken(AccessToken);

impl StaticToken {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(AccessToken::new(secret))
    }
}

impl Authenticator for StaticToken {
    fn acquire_token(&self) -> TokenFuture<'_> {
        let token = self.0.clone();
        Box::pin(async move { Ok(token) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_without_expiry_is_fresh() {
        assert!(AccessToken::new("t").is_fresh(Utc::now()));
    }

    #[test]
    fn token_expiring_within_margin_is_stale() {
        let now = Utc::now();
        let token = AccessToken::with_expiry("t", now + Duration::minutes(4));
        assert!(!token.is_fresh(now));
        let token = AccessToken::with_expiry("t", now + Duration::minutes(30));
        assert!(token.is_fresh(now));
    }

    #[test]
    fn debug_redacts_secret() {
        let rendered = format!("{:?}", AccessToken::new("super-secret"));
        assert!(!rendered.contains("super-secret"));
    }

    #[tokio::test]
    async fn static_token_returns_secret() {
        let token = StaticToken::new("abc").acquire_token().await.unwrap();
        assert_eq!(token.secret(), "abc");
    }
}
