//! Handshake token verification (HS256 JWT signed by the community app).

use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::models::NumericId;

/// Claims we read from a handshake token. The user id may appear under
/// `userId`, `id` or `sub`, checked in that order.
#[derive(Debug, Deserialize)]
struct HandshakeClaims {
    #[serde(default, rename = "userId")]
    user_id: Option<NumericId>,
    #[serde(default)]
    id: Option<NumericId>,
    #[serde(default)]
    sub: Option<NumericId>,
    #[serde(default)]
    username: Option<String>,
}

/// Identity extracted from a verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub user_id: i64,
    /// Optional `username` claim, used only when the user directory has no
    /// profile for this user.
    pub username: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    /// No secret configured; every token is refused.
    NotConfigured,
    Missing,
    /// Bad signature, expired, malformed, or no usable user id claim.
    Invalid,
}

/// Verifies handshake tokens against the server-held secret.
pub struct TokenVerifier {
    key: Option<DecodingKey>,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: Option<&str>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Tokens are issued for the whole application, not this service.
        validation.validate_aud = false;

        Self {
            key: secret
                .filter(|s| !s.is_empty())
                .map(|s| DecodingKey::from_secret(s.as_bytes())),
            validation,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.key.is_some()
    }

    pub fn verify(&self, token: Option<&str>) -> Result<VerifiedIdentity, TokenError> {
        let key = self.key.as_ref().ok_or(TokenError::NotConfigured)?;
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(TokenError::Missing)?;

        let data = jsonwebtoken::decode::<HandshakeClaims>(token, key, &self.validation)
            .map_err(|e| {
                tracing::debug!(?e, "handshake token rejected");
                TokenError::Invalid
            })?;

        let claims = data.claims;
        let user_id = [&claims.user_id, &claims.id, &claims.sub]
            .into_iter()
            .flatten()
            .find_map(NumericId::value)
            .ok_or(TokenError::Invalid)?;

        Ok(VerifiedIdentity {
            user_id,
            username: claims.username,
        })
    }
}
