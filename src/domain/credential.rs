//! Short-lived bearer credential.

use std::fmt;

use serde::Deserialize;

/// Bearer token obtained from the identity endpoint.
///
/// Requested fresh for every pipeline run and never persisted. Expiry is
/// recorded as reported but not tracked.
#[derive(Clone, Deserialize)]
pub struct Credential {
    #[serde(rename = "access_token")]
    token: String,

    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// Lifetime in seconds, as reported by the vendor
    #[serde(default)]
    pub expires_in: Option<u64>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            token_type: default_token_type(),
            expires_in: None,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Value for the `Authorization` header
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}
