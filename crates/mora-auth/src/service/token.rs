//! JWT token service

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::debug;

use crate::model::{Claims, DEFAULT_TOKEN_TTL_SECONDS, TokenError, TokenResult};

/// HMAC algorithms accepted on verification
const ACCEPTED_ALGORITHMS: [Algorithm; 3] = [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

/// Issue an HS256-signed token for `subject_id` valid for `ttl`.
///
/// No bounds are enforced on `ttl`; a zero or negative value produces a
/// token that fails verification immediately.
pub fn issue_token(
    subject_id: &str,
    display_name: Option<&str>,
    secret: &str,
    ttl: chrono::Duration,
) -> TokenResult<String> {
    let claims = Claims::new(subject_id, display_name.map(str::to_string), ttl);
    let encoding_key = EncodingKey::from_secret(secret.as_bytes());

    encode(&Header::new(Algorithm::HS256), &claims, &encoding_key).map_err(TokenError::Signing)
}

/// Verify a token against `secret` and return its claims.
pub fn verify_token(token: &str, secret: &str) -> TokenResult<Claims> {
    if token.is_empty() {
        return Err(TokenError::InvalidToken);
    }

    let alg = inspect_structure(token)?;
    if !ACCEPTED_ALGORITHMS.iter().any(|a| alg_name(*a) == alg) {
        debug!(alg = %alg, "Rejected token with unexpected signing algorithm");
        return Err(TokenError::InvalidToken);
    }

    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    let token_data = decode::<Claims>(token, &decoding_key, &validation()).map_err(|e| {
        match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::ExpiredToken,
            _ => {
                debug!(error = %e, "Token verification failed");
                TokenError::InvalidToken
            }
        }
    })?;

    let claims = token_data.claims;
    if claims.subject_id.is_empty() {
        return Err(TokenError::InvalidToken);
    }

    // The library check is strict (exp < now); an expiry at exactly now is expired too
    if claims.is_expired() {
        return Err(TokenError::ExpiredToken);
    }

    Ok(claims)
}

fn validation() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.algorithms = ACCEPTED_ALGORITHMS.to_vec();
    validation.leeway = 0;
    validation.validate_exp = true;
    validation.validate_aud = false;
    // A token without `exp` never expires
    validation.set_required_spec_claims::<&str>(&[]);
    validation
}

fn alg_name(alg: Algorithm) -> &'static str {
    match alg {
        Algorithm::HS256 => "HS256",
        Algorithm::HS384 => "HS384",
        Algorithm::HS512 => "HS512",
        _ => "",
    }
}

/// Check the three-segment layout and return the header's `alg` value.
///
/// Any segment that is not valid base64url, or a header/payload that is not a
/// JSON object, makes the token malformed.
fn inspect_structure(token: &str) -> TokenResult<String> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 || segments[0].is_empty() || segments[1].is_empty() {
        return Err(TokenError::MalformedToken);
    }

    let header = decode_json_segment(segments[0])?;
    decode_json_segment(segments[1])?;
    URL_SAFE_NO_PAD
        .decode(segments[2])
        .map_err(|_| TokenError::MalformedToken)?;

    Ok(header
        .get("alg")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string())
}

fn decode_json_segment(segment: &str) -> TokenResult<serde_json::Map<String, serde_json::Value>> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| TokenError::MalformedToken)?;

    match serde_json::from_slice::<serde_json::Value>(&bytes) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        _ => Err(TokenError::MalformedToken),
    }
}

/// Token issuer/verifier bound to one shared secret
#[derive(Clone)]
pub struct TokenAuthority {
    secret: String,
    default_ttl: chrono::Duration,
}

impl std::fmt::Debug for TokenAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenAuthority")
            .field("secret", &"***")
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

impl TokenAuthority {
    pub fn new(secret: impl Into<String>, default_ttl: chrono::Duration) -> Self {
        Self {
            secret: secret.into(),
            default_ttl,
        }
    }

    pub fn with_default_ttl(secret: impl Into<String>) -> Self {
        Self::new(secret, chrono::Duration::seconds(DEFAULT_TOKEN_TTL_SECONDS))
    }

    pub fn default_ttl(&self) -> chrono::Duration {
        self.default_ttl
    }

    /// Issue a token with the authority's default TTL
    pub fn issue(&self, subject_id: &str, display_name: Option<&str>) -> TokenResult<String> {
        self.issue_with_ttl(subject_id, display_name, self.default_ttl)
    }

    pub fn issue_with_ttl(
        &self,
        subject_id: &str,
        display_name: Option<&str>,
        ttl: chrono::Duration,
    ) -> TokenResult<String> {
        let token = issue_token(subject_id, display_name, &self.secret, ttl)?;
        debug!(subject = %subject_id, ttl_secs = ttl.num_seconds(), "Issued token");
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> TokenResult<Claims> {
        verify_token(token, &self.secret)
    }
}
