//! Bearer credential verification.
//!
//! Checks run in a fixed order and stop at the first failure:
//! 1. structure (header decodes, algorithm accepted, key id present)
//! 2. signature against the issuer key named by `kid`
//! 3. expiry
//! 4. issuer (only when configured)
//! 5. identity claim present and non-empty

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde_json::{Map, Value};
use tracing::warn;

use lorekeeper_types::auth::{TokenRejection, VerifiedToken};
use lorekeeper_types::config::AuthConfig;

use super::key_cache::{KeySetCache, KeySetSource};

/// What a credential must satisfy beyond a valid signature.
#[derive(Debug, Clone)]
pub struct VerifierPolicy {
    pub identity_claim: String,
    pub issuer: Option<String>,
    pub algorithms: Vec<Algorithm>,
}

impl VerifierPolicy {
    /// Build a policy from configuration. Unrecognised algorithm names are
    /// skipped with a warning.
    pub fn from_config(config: &AuthConfig) -> Self {
        let algorithms = config
            .algorithms
            .iter()
            .filter_map(|name| match Algorithm::from_str(name) {
                Ok(alg) => Some(alg),
                Err(_) => {
                    warn!(algorithm = %name, "ignoring unrecognised signing algorithm");
                    None
                }
            })
            .collect();

        Self {
            identity_claim: config.identity_claim.clone(),
            issuer: config.issuer.clone().filter(|iss| !iss.is_empty()),
            algorithms,
        }
    }
}

/// Validates bearer credentials against the issuer's published keys.
pub struct TokenVerifier<S: KeySetSource> {
    keys: Arc<KeySetCache<S>>,
    policy: VerifierPolicy,
}

impl<S: KeySetSource> TokenVerifier<S> {
    pub fn new(keys: Arc<KeySetCache<S>>, policy: VerifierPolicy) -> Self {
        Self { keys, policy }
    }

    /// Verify `token`, returning the authenticated subject or the first
    /// failed check.
    pub async fn verify(&self, token: &str) -> Result<VerifiedToken, TokenRejection> {
        let header = decode_header(token).map_err(|e| TokenRejection::Malformed(e.to_string()))?;

        if !self.policy.algorithms.contains(&header.alg) {
            return Err(TokenRejection::DisallowedAlgorithm(format!("{:?}", header.alg)));
        }

        let kid = header
            .kid
            .filter(|kid| !kid.is_empty())
            .ok_or(TokenRejection::MissingKeyId)?;

        let jwk = self
            .keys
            .key_for(&kid)
            .await
            .map_err(|e| TokenRejection::KeySetUnavailable(e.to_string()))?
            .ok_or_else(|| TokenRejection::UnknownKey(kid.clone()))?;

        let key = DecodingKey::from_jwk(&jwk)
            .map_err(|e| TokenRejection::KeySetUnavailable(format!("key '{kid}' unusable: {e}")))?;

        // Signature only; the remaining checks are ours so they can report
        // distinct reasons in a fixed order.
        let mut validation = Validation::new(header.alg);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let claims = decode::<Map<String, Value>>(token, &key, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => TokenRejection::InvalidSignature,
                ErrorKind::InvalidAlgorithm => {
                    TokenRejection::DisallowedAlgorithm(format!("{:?}", header.alg))
                }
                _ => TokenRejection::Malformed(e.to_string()),
            })?
            .claims;

        let expires_at = expiry_of(&claims)?;
        if expires_at <= Utc::now() {
            return Err(TokenRejection::Expired);
        }

        if let Some(expected) = &self.policy.issuer {
            let actual = claims.get("iss").and_then(Value::as_str);
            if actual != Some(expected.as_str()) {
                return Err(TokenRejection::IssuerMismatch);
            }
        }

        let claim = &self.policy.identity_claim;
        let subject = claims
            .get(claim)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| TokenRejection::MissingClaim(claim.clone()))?;

        Ok(VerifiedToken {
            subject: subject.to_string(),
            key_id: kid,
            expires_at,
        })
    }
}

fn expiry_of(claims: &Map<String, Value>) -> Result<DateTime<Utc>, TokenRejection> {
    let missing = || TokenRejection::MissingClaim("exp".to_string());
    let exp = claims.get("exp").ok_or_else(missing)?;
    let secs = exp
        .as_i64()
        .or_else(|| exp.as_f64().map(|f| f as i64))
        .ok_or_else(missing)?;
    DateTime::from_timestamp(secs, 0).ok_or_else(missing)
}
