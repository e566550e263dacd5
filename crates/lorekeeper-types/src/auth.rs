//! Credential verification and connection authorization types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A credential that passed every verification check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    /// Value of the configured identity claim (the user id).
    pub subject: String,
    /// Key id the signature was checked against.
    pub key_id: String,
    pub expires_at: DateTime<Utc>,
}

/// Why a credential was rejected.
///
/// Checks short-circuit in a fixed order (structure, signature, expiry,
/// identity claim), so exactly one reason is reported per rejection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenRejection {
    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("token header has no key id")]
    MissingKeyId,

    #[error("algorithm {0} is not accepted")]
    DisallowedAlgorithm(String),

    #[error("no key with id '{0}' in the issuer key set")]
    UnknownKey(String),

    #[error("signature verification failed")]
    InvalidSignature,

    #[error("issuer mismatch")]
    IssuerMismatch,

    #[error("token expired")]
    Expired,

    #[error("claim '{0}' missing or empty")]
    MissingClaim(String),

    #[error("issuer key set unavailable: {0}")]
    KeySetUnavailable(String),
}

impl TokenRejection {
    /// Short machine-readable code, used as a structured log field.
    pub fn code(&self) -> &'static str {
        match self {
            TokenRejection::Malformed(_) => "malformed",
            TokenRejection::MissingKeyId => "missing_kid",
            TokenRejection::DisallowedAlgorithm(_) => "disallowed_alg",
            TokenRejection::UnknownKey(_) => "unknown_kid",
            TokenRejection::InvalidSignature => "bad_signature",
            TokenRejection::IssuerMismatch => "issuer_mismatch",
            TokenRejection::Expired => "expired",
            TokenRejection::MissingClaim(_) => "missing_claim",
            TokenRejection::KeySetUnavailable(_) => "keyset_unavailable",
        }
    }
}

/// Reason a connection request was denied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DenyReason {
    #[error("no credential supplied")]
    MissingCredential,

    #[error(transparent)]
    Rejected(#[from] TokenRejection),
}

/// Authenticated identity attached to an allowed connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
}

/// Allow/deny decision for an inbound connection request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow(Identity),
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deny_reason_wraps_rejection_transparently() {
        let reason = DenyReason::from(TokenRejection::Expired);
        assert_eq!(reason.to_string(), "token expired");
    }

    #[test]
    fn test_rejection_codes_are_distinct() {
        let all = [
            TokenRejection::Malformed(String::new()),
            TokenRejection::MissingKeyId,
            TokenRejection::DisallowedAlgorithm(String::new()),
            TokenRejection::UnknownKey(String::new()),
            TokenRejection::InvalidSignature,
            TokenRejection::IssuerMismatch,
            TokenRejection::Expired,
            TokenRejection::MissingClaim(String::new()),
            TokenRejection::KeySetUnavailable(String::new()),
        ];
        let mut codes: Vec<_> = all.iter().map(TokenRejection::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), all.len());
    }

    #[test]
    fn test_decision_is_allowed() {
        let allow = Decision::Allow(Identity {
            user_id: "u1".to_string(),
        });
        assert!(allow.is_allowed());
        assert!(!Decision::Deny(DenyReason::MissingCredential).is_allowed());
    }
}
