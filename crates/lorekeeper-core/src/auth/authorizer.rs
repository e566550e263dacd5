//! Allow/deny decisions for inbound connection requests.

use std::sync::Arc;

use tracing::{debug, info};

use lorekeeper_types::auth::{Decision, DenyReason, Identity};

use super::key_cache::KeySetSource;
use super::verifier::TokenVerifier;

/// The parts of a connection request that can carry a credential.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConnectionRequest<'a> {
    /// `token` query-string parameter (browsers cannot set headers on a
    /// WebSocket handshake).
    pub query_token: Option<&'a str>,
    /// Raw `Authorization` header value.
    pub authorization: Option<&'a str>,
}

impl<'a> ConnectionRequest<'a> {
    /// The credential to verify: the query parameter wins, then a
    /// `Bearer` authorization header.
    pub fn credential(&self) -> Option<&'a str> {
        self.query_token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .or_else(|| {
                self.authorization
                    .and_then(|h| h.strip_prefix("Bearer "))
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
            })
    }
}

/// Decides whether a connection may be established. Has no side effects.
pub struct ConnectionAuthorizer<S: KeySetSource> {
    verifier: Arc<TokenVerifier<S>>,
}

impl<S: KeySetSource> ConnectionAuthorizer<S> {
    pub fn new(verifier: Arc<TokenVerifier<S>>) -> Self {
        Self { verifier }
    }

    pub async fn authorize(&self, request: &ConnectionRequest<'_>) -> Decision {
        let Some(token) = request.credential() else {
            info!(reason = "missing_credential", "connection denied");
            return Decision::Deny(DenyReason::MissingCredential);
        };

        match self.verifier.verify(token).await {
            Ok(verified) => {
                debug!(user_id = %verified.subject, kid = %verified.key_id, "connection allowed");
                Decision::Allow(Identity {
                    user_id: verified.subject,
                })
            }
            Err(rejection) => {
                info!(reason = rejection.code(), detail = %rejection, "connection denied");
                Decision::Deny(DenyReason::Rejected(rejection))
            }
        }
    }
}
