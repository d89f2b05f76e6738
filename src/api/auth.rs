use axum::{extract::Request, middleware::Next, response::Response};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use super::error::ApiError;
use crate::clock::now_millis;

/// Lifetime of an issued dashboard token.
pub const TOKEN_TTL_SECS: u64 = 86_400;

/// Claims carried by a dashboard JWT.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Username the token was issued to.
    pub sub: String,
    pub role: String,
    pub iat: u64,
    pub exp: u64,
}

/// Credential verifier shared by the HTTP middleware and the realtime
/// attach path.
///
/// Owns the password check and the JWT signing/verification keys; the
/// broadcaster and the routes only ever see `issue`/`verify`.
#[derive(Clone)]
pub struct AuthVerifier {
    encoding: EncodingKey,
    decoding: DecodingKey,
    password: String,
}

impl AuthVerifier {
    pub fn new(secret: &str, password: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            password: password.to_string(),
        }
    }

    /// Constant-time comparison against the configured login password.
    pub fn check_password(&self, candidate: &str) -> bool {
        candidate
            .as_bytes()
            .ct_eq(self.password.as_bytes())
            .into()
    }

    /// Issue a signed token for the given user.
    pub fn issue(&self, user: &str) -> Result<String, jsonwebtoken::errors::Error> {
        let now = now_millis() / 1000;
        let claims = Claims {
            sub: user.to_string(),
            role: "admin".to_string(),
            iat: now,
            exp: now + TOKEN_TTL_SECS,
        };
        encode(&Header::default(), &claims, &self.encoding)
    }

    /// Verify a token's signature and expiry, returning its claims.
    pub fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        decode::<Claims>(token, &self.decoding, &Validation::default()).map(|data| data.claims)
    }
}

/// Generate a random alphanumeric secret of the given length.
pub fn generate_secret(len: usize) -> String {
    use rand::Rng;
    rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Extract a Bearer token from the Authorization header.
pub fn extract_bearer(req: &Request) -> Option<String> {
    req.headers()
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.to_string())
}

/// Auth middleware for the protected API routes.
///
/// Requires a valid Bearer token; 401 when absent, 403 when present but
/// rejected. The realtime channel authenticates separately at attach so it
/// can refuse with a WebSocket close code instead of an HTTP status.
pub async fn require_auth(
    verifier: AuthVerifier,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer(&req).ok_or(ApiError::AuthRequired)?;
    match verifier.verify(&token) {
        Ok(_claims) => Ok(next.run(req).await),
        Err(e) => {
            tracing::debug!(error = %e, "rejected API credential");
            Err(ApiError::AuthInvalid)
        }
    }
}
