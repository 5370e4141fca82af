//! Sign-in.
//!
//! Authentication is owned by the chat server; the client only needs to end
//! up with a validated [`Identity`]. [`LocalAuthenticator`] trusts the name
//! it is given, [`HttpAuthenticator`] asks the server's login endpoint first.

use async_trait::async_trait;
use chat_types::{Identity, WireError};
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use url::Url;

/// Sign-in errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The user name is not a usable identity.
    #[error(transparent)]
    InvalidIdentity(#[from] WireError),

    /// The server requires an email address.
    #[error("an email address is required")]
    MissingEmail,

    /// The configured login URL is not usable.
    #[error("invalid login url {0:?}")]
    InvalidUrl(String),

    /// The request could not be completed.
    #[error("login request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server refused the sign-in.
    #[error("login rejected with status {0}")]
    Rejected(u16),
}

/// What the user typed at sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// User name; trimmed before use.
    pub username: String,
    /// Contact address, required by some servers.
    pub email: Option<String>,
}

impl Credentials {
    /// Credentials with only a user name.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            email: None,
        }
    }

    /// Attach an email address.
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// Turns credentials into a signed-in identity.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Sign in.
    async fn authenticate(&self, credentials: &Credentials) -> Result<Identity, AuthError>;
}

/// Accepts any well-formed user name without asking a server.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalAuthenticator;

#[async_trait]
impl Authenticator for LocalAuthenticator {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Identity, AuthError> {
        Ok(Identity::parse(&credentials.username)?)
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    email: &'a str,
}

/// Signs in against `POST <url>` with `{username, email}`.
#[derive(Debug, Clone)]
pub struct HttpAuthenticator {
    client: reqwest::Client,
    url: Url,
}

impl HttpAuthenticator {
    /// Create an authenticator for the login endpoint at `url`.
    pub fn new(url: &str) -> Result<Self, AuthError> {
        let url = Url::parse(url).map_err(|_| AuthError::InvalidUrl(url.to_string()))?;
        Ok(Self {
            client: reqwest::Client::new(),
            url,
        })
    }
}

#[async_trait]
impl Authenticator for HttpAuthenticator {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Identity, AuthError> {
        let identity = Identity::parse(&credentials.username)?;
        let email = credentials
            .email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or(AuthError::MissingEmail)?;

        let response = self
            .client
            .post(self.url.clone())
            .json(&LoginRequest {
                username: identity.as_str(),
                email,
            })
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::Rejected(status.as_u16()));
        }

        info!(identity = %identity, "signed in");
        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_trims_name() {
        let identity = LocalAuthenticator
            .authenticate(&Credentials::new("  alice "))
            .await
            .unwrap();
        assert_eq!(identity.as_str(), "alice");
    }

    #[tokio::test]
    async fn local_rejects_blank_name() {
        let err = LocalAuthenticator
            .authenticate(&Credentials::new("   "))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidIdentity(_)));
    }

    #[tokio::test]
    async fn http_requires_email_before_calling_server() {
        let auth = HttpAuthenticator::new("http://127.0.0.1:1/api/users/login").unwrap();

        let err = auth
            .authenticate(&Credentials::new("alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::MissingEmail));

        let err = auth
            .authenticate(&Credentials::new("alice").with_email("  "))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::MissingEmail));
    }

    #[tokio::test]
    async fn http_unreachable_server_is_request_error() {
        let auth = HttpAuthenticator::new("http://127.0.0.1:1/api/users/login").unwrap();
        let err = auth
            .authenticate(&Credentials::new("alice").with_email("a@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Request(_)));
    }

    #[test]
    fn login_body_shape() {
        let body = serde_json::to_value(LoginRequest {
            username: "alice",
            email: "a@example.com",
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({"username": "alice", "email": "a@example.com"})
        );
    }
}
