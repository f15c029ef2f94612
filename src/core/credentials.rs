//! Credential provider: client identity -> bearer token.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::adapters::AuthApi;
use crate::domain::Credential;
use crate::error::Result;

/// Client identity used for the token exchange
#[derive(Clone)]
pub struct ClientIdentity {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientIdentity")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Obtains a fresh credential per pipeline run. Nothing is cached and
/// failures are not retried here.
pub struct CredentialProvider {
    auth: Arc<dyn AuthApi>,
    identity: ClientIdentity,
}

impl CredentialProvider {
    pub fn new(auth: Arc<dyn AuthApi>, identity: ClientIdentity) -> Self {
        Self { auth, identity }
    }

    /// Exchange the configured identity for a token with `scopes`
    #[instrument(skip(self), fields(client_id = %self.identity.client_id))]
    pub async fn obtain_credential(&self, scopes: &[String]) -> Result<Credential> {
        let credential = self
            .auth
            .request_token(&self.identity.client_id, &self.identity.client_secret, scopes)
            .await?;

        info!(expires_in = ?credential.expires_in, "Obtained access token");
        Ok(credential)
    }
}
