//! ==============================================================================
//! error.rs - library error taxonomy
//! ==============================================================================
//!
//! ```text
//! purpose:
//!     one error type for everything the api client and request pipeline can
//!     surface to a caller. login failures have their own enum (auth.rs) and
//!     are wrapped here when they travel through library apis.
//!
//! relationships:
//!     - used by: pipeline.rs, api.rs
//!     - wraps: auth::AuthError
//! ```
//!
//! ==============================================================================

use thiserror::Error;

use crate::auth::AuthError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// transport-level failure (dns, connect, reset, body read)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// the backend answered with a non-2xx status
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// the backend answered 2xx but the body did not match the expected record
    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl Error {
    /// Returns true for a 401 from the backend. The pipeline has already
    /// cleared the session by the time a caller sees this.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Error::Http { status: 401, .. })
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Http { status, .. } => Some(*status),
            Error::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_401_is_unauthorized() {
        let err = Error::Http { status: 401, body: "{}".into() };
        assert!(err.is_unauthorized());
        assert_eq!(err.status(), Some(401));

        let err = Error::Http { status: 500, body: "boom".into() };
        assert!(!err.is_unauthorized());
        assert_eq!(err.to_string(), "HTTP 500: boom");
    }

    #[test]
    fn decode_error_has_no_status() {
        let err: Error = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert_eq!(err.status(), None);
    }
}
