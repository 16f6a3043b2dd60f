//! Token issuance and verification.
//!
//! Tokens are stateless HS256 JWTs binding a subject identity to an
//! issued-at and expiry claim. The gateway keeps no server-side token
//! store; validity is signature + expiry, nothing else. There is no
//! revocation list, so a leaked token stays valid until it expires.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Claims carried by an issued token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject identity the token was issued for.
    pub sub: String,
    /// Issued-at, seconds since the Unix epoch.
    pub iat: u64,
    /// Expiry, seconds since the Unix epoch.
    pub exp: u64,
}

/// Errors from the token service.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Signing failed (e.g., unusable secret). Only surfaced on issuance.
    #[error("token issuance failed")]
    Issuance(#[source] jsonwebtoken::errors::Error),

    /// Any structural defect, bad signature, or past expiry. Collapsed to
    /// a single variant so callers cannot distinguish why a token was
    /// rejected.
    #[error("invalid or expired token")]
    InvalidToken,
}

/// Issues and verifies bearer tokens.
///
/// The signing secret is fixed at construction and read-only afterwards.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    lifetime: Duration,
}

impl TokenService {
    pub fn new(secret: &str, lifetime: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            lifetime,
        }
    }

    /// Issue a token for `subject`, valid for the configured lifetime.
    pub fn issue(&self, subject: &str) -> Result<String, AuthError> {
        self.issue_at(subject, SystemTime::now())
    }

    /// Issue a token with an explicit issued-at instant. Exposed for
    /// expiry tests; production callers go through [`issue`](Self::issue).
    pub fn issue_at(&self, subject: &str, now: SystemTime) -> Result<String, AuthError> {
        let iat = now
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let claims = Claims {
            sub: subject.to_string(),
            iat,
            exp: iat + self.lifetime.as_secs(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(AuthError::Issuance)
    }

    /// Verify a token and return the subject it was issued for.
    pub fn verify(&self, token: &str) -> Result<String, AuthError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims.sub)
            .map_err(|err| {
                tracing::debug!(error = %err, "token verification failed");
                AuthError::InvalidToken
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    fn service() -> TokenService {
        TokenService::new("unit-test-secret", DAY)
    }

    #[test]
    fn round_trip_returns_subject() {
        let tokens = service();
        let token = tokens.issue("user-42").unwrap();
        assert_eq!(tokens.verify(&token).unwrap(), "user-42");
    }

    #[test]
    fn expired_token_is_invalid() {
        let tokens = service();
        // Issued 25h ago with a 24h lifetime: one hour past expiry.
        let issued = SystemTime::now() - Duration::from_secs(25 * 60 * 60);
        let token = tokens.issue_at("user-42", issued).unwrap();
        assert!(matches!(
            tokens.verify(&token),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn tampered_token_is_invalid() {
        let tokens = service();
        let other = TokenService::new("different-secret", DAY);
        let token = other.issue("user-42").unwrap();
        assert!(matches!(
            tokens.verify(&token),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn garbage_token_is_invalid() {
        assert!(matches!(
            service().verify("not-a-jwt"),
            Err(AuthError::InvalidToken)
        ));
    }
}
