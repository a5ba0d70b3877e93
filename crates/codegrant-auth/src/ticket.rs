//! Claims, identities, and the authentication ticket.

use serde::{Deserialize, Serialize};

use crate::properties::AuthProperties;

/// Well-known claim types.
pub mod claim_types {
    /// Stable identifier of the user at the remote provider.
    pub const NAME_IDENTIFIER: &str = "sub";
    /// Display name.
    pub const NAME: &str = "name";
    /// Email address.
    pub const EMAIL: &str = "email";
}

/// A single statement about the authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    /// Claim type, e.g. `email`.
    pub claim_type: String,
    /// Claim value.
    pub value: String,
    /// Who issued the claim.
    pub issuer: String,
}

impl Claim {
    /// Creates a claim.
    #[must_use]
    pub fn new(
        claim_type: impl Into<String>,
        value: impl Into<String>,
        issuer: impl Into<String>,
    ) -> Self {
        Self {
            claim_type: claim_type.into(),
            value: value.into(),
            issuer: issuer.into(),
        }
    }
}

/// A set of claims produced by one authentication scheme.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimsIdentity {
    /// Scheme that authenticated this identity.
    pub authentication_type: Option<String>,
    /// Claims in insertion order.
    pub claims: Vec<Claim>,
}

impl ClaimsIdentity {
    /// Creates an identity without claims.
    #[must_use]
    pub fn new(authentication_type: impl Into<String>) -> Self {
        Self {
            authentication_type: Some(authentication_type.into()),
            claims: Vec::new(),
        }
    }

    /// Returns `true` when an authentication type is set.
    pub fn is_authenticated(&self) -> bool {
        self.authentication_type
            .as_deref()
            .is_some_and(|t| !t.is_empty())
    }

    /// Adds a claim.
    pub fn add_claim(&mut self, claim: Claim) {
        self.claims.push(claim);
    }

    /// First claim of the given type.
    pub fn find_first(&self, claim_type: &str) -> Option<&Claim> {
        self.claims.iter().find(|c| c.claim_type == claim_type)
    }

    /// Returns `true` if a claim with this type and value exists.
    pub fn has_claim(&self, claim_type: &str, value: &str) -> bool {
        self.claims
            .iter()
            .any(|c| c.claim_type == claim_type && c.value == value)
    }
}

/// Outcome of a successful sign-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationTicket {
    /// The authenticated identity.
    pub identity: ClaimsIdentity,
    /// Properties recovered from the state, plus saved tokens.
    pub properties: AuthProperties,
    /// Scheme that produced the ticket.
    pub scheme: String,
}

impl AuthenticationTicket {
    /// Creates a ticket.
    #[must_use]
    pub fn new(
        identity: ClaimsIdentity,
        properties: AuthProperties,
        scheme: impl Into<String>,
    ) -> Self {
        Self {
            identity,
            properties,
            scheme: scheme.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_claims() {
        let mut identity = ClaimsIdentity::new("OAuth");
        assert!(identity.is_authenticated());
        assert!(identity.find_first(claim_types::EMAIL).is_none());

        identity.add_claim(Claim::new(claim_types::EMAIL, "a@example.com", "OAuth"));
        identity.add_claim(Claim::new(claim_types::EMAIL, "b@example.com", "OAuth"));

        assert_eq!(
            identity.find_first(claim_types::EMAIL).map(|c| c.value.as_str()),
            Some("a@example.com")
        );
        assert!(identity.has_claim(claim_types::EMAIL, "b@example.com"));
        assert!(!identity.has_claim(claim_types::NAME, "b@example.com"));
    }

    #[test]
    fn test_default_identity_is_anonymous() {
        assert!(!ClaimsIdentity::default().is_authenticated());
    }
}
