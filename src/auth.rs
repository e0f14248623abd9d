//! ==============================================================================
//! auth.rs - credential exchange against the cognito identity provider
//! ==============================================================================
//!
//! ```text
//! purpose:
//!     trades an email + password for session tokens using cognito's
//!     `InitiateAuth` (USER_PASSWORD_AUTH flow) and maps provider failures to
//!     a small set of user-facing kinds.
//!
//!     this client owns its own reqwest::Client and never goes through the
//!     request pipeline: the identity provider is not the protected backend
//!     and must never see a (possibly stale) bearer header.
//!
//! relationships:
//!     - used by: main.rs (login / logout commands)
//!     - writes: session.rs (sign_in stores the id token)
//! ```
//!
//! ==============================================================================

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::AuthConfig;
use crate::session::TokenStore;

const AMZ_TARGET: &str = "AWSCognitoIdentityProviderService.InitiateAuth";
const AMZ_JSON: &str = "application/x-amz-json-1.1";

// ==============================================================================
// errors
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    InvalidCredentials,
    UnknownAccount,
    UnconfirmedAccount,
    AuthenticationFailed,
    Network,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Incorrect email or password.")]
    InvalidCredentials,

    #[error("No account found with this email.")]
    UnknownAccount,

    #[error("Please confirm your account before signing in.")]
    UnconfirmedAccount,

    #[error("{0}")]
    AuthenticationFailed(String),

    #[error("could not reach the identity provider: {0}")]
    Network(#[from] reqwest::Error),
}

impl AuthError {
    pub fn kind(&self) -> AuthErrorKind {
        match self {
            AuthError::InvalidCredentials => AuthErrorKind::InvalidCredentials,
            AuthError::UnknownAccount => AuthErrorKind::UnknownAccount,
            AuthError::UnconfirmedAccount => AuthErrorKind::UnconfirmedAccount,
            AuthError::AuthenticationFailed(_) => AuthErrorKind::AuthenticationFailed,
            AuthError::Network(_) => AuthErrorKind::Network,
        }
    }

    /// map a provider `__type` onto a kind. substring match, first rule wins.
    pub fn from_provider(error_type: &str, message: Option<String>) -> Self {
        if error_type.contains("NotAuthorizedException") {
            AuthError::InvalidCredentials
        } else if error_type.contains("UserNotFoundException") {
            AuthError::UnknownAccount
        } else if error_type.contains("UserNotConfirmedException") {
            AuthError::UnconfirmedAccount
        } else {
            AuthError::AuthenticationFailed(message.unwrap_or_else(|| "Login failed".to_string()))
        }
    }
}

// ==============================================================================
// wire types
// ==============================================================================

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct InitiateAuthRequest<'a> {
    auth_flow: &'static str,
    client_id: &'a str,
    auth_parameters: AuthParameters<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "UPPERCASE")]
struct AuthParameters<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InitiateAuthResponse {
    #[serde(default)]
    authentication_result: Option<AuthTokens>,
    #[serde(default)]
    challenge_name: Option<String>,
}

#[derive(Deserialize)]
struct ProviderError {
    #[serde(rename = "__type", default)]
    error_type: Option<String>,
    #[serde(default, alias = "Message")]
    message: Option<String>,
}

/// tokens issued on a successful login
#[derive(Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AuthTokens {
    pub access_token: String,
    pub id_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// seconds
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl std::fmt::Debug for AuthTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthTokens")
            .field("expires_in", &self.expires_in)
            .field("token_type", &self.token_type)
            .finish_non_exhaustive()
    }
}

// ==============================================================================
// client
// ==============================================================================

pub struct AuthClient {
    endpoint: String,
    client_id: String,
    http: reqwest::Client,
}

impl AuthClient {
    /// client for the regional cognito endpoint
    pub fn new(region: &str, client_id: impl Into<String>) -> Result<Self, AuthError> {
        Self::with_endpoint(format!("https://cognito-idp.{}.amazonaws.com/", region), client_id)
    }

    /// client for an explicit endpoint (local stacks, tests)
    pub fn with_endpoint(endpoint: impl Into<String>, client_id: impl Into<String>) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            endpoint: endpoint.into(),
            client_id: client_id.into(),
            http,
        })
    }

    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        match &config.endpoint {
            Some(endpoint) => Self::with_endpoint(endpoint.clone(), config.client_id.clone()),
            None => Self::new(&config.region, config.client_id.clone()),
        }
    }

    /// exchange credentials for tokens
    pub async fn login(&self, identifier: &str, secret: &str) -> Result<AuthTokens, AuthError> {
        let body = InitiateAuthRequest {
            auth_flow: "USER_PASSWORD_AUTH",
            client_id: &self.client_id,
            auth_parameters: AuthParameters { username: identifier, password: secret },
        };

        tracing::debug!(endpoint = %self.endpoint, "initiating auth");
        let response = self
            .http
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, AMZ_JSON)
            .header("X-Amz-Target", AMZ_TARGET)
            .body(serde_json::to_vec(&body).map_err(|e| AuthError::AuthenticationFailed(e.to_string()))?)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let err = match serde_json::from_str::<ProviderError>(&text) {
                Ok(ProviderError { error_type: Some(kind), message }) => AuthError::from_provider(&kind, message),
                Ok(ProviderError { error_type: None, message }) => AuthError::AuthenticationFailed(
                    message.unwrap_or_else(|| format!("Login failed (HTTP {})", status.as_u16())),
                ),
                Err(_) => AuthError::AuthenticationFailed(format!("Login failed (HTTP {})", status.as_u16())),
            };
            tracing::info!(kind = ?err.kind(), "login rejected");
            return Err(err);
        }

        let parsed: InitiateAuthResponse = serde_json::from_str(&text)
            .map_err(|e| AuthError::AuthenticationFailed(format!("unexpected provider response: {}", e)))?;

        match (parsed.authentication_result, parsed.challenge_name) {
            (Some(tokens), _) => Ok(tokens),
            (None, Some(challenge)) => Err(AuthError::AuthenticationFailed(format!(
                "additional challenge required: {}",
                challenge
            ))),
            (None, None) => Err(AuthError::AuthenticationFailed("Login failed".to_string())),
        }
    }

    /// login and keep the id token as the session credential
    pub async fn sign_in(&self, store: &TokenStore, identifier: &str, secret: &str) -> Result<AuthTokens, AuthError> {
        let tokens = self.login(identifier, secret).await?;
        store.set_token(tokens.id_token.clone());
        tracing::info!("signed in");
        Ok(tokens)
    }

    pub fn sign_out(store: &TokenStore) {
        store.clear_token();
        tracing::info!("signed out");
    }
}
