use std::collections::HashMap;

use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::Value;

use crate::config::{get_optional_variable, get_variable};
use crate::errors::BackendError;

/// The identity extracted from a verified bearer token.
#[derive(Clone, Debug)]
pub struct Claims {
    /// The identity provider's stable subject key.
    pub subject: String,

    /// The namespaced email claim, if present.
    pub email: Option<String>,

    /// The namespaced name claim, if present.
    pub name: Option<String>,
}

/// Verifies bearer tokens and extracts the caller's claims.
pub trait Verifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<Claims, BackendError>;
}

/// Parses the `Authorization` header of a request and verifies the
/// bearer token it carries.
pub fn bearer_claims(
    verifier: &dyn Verifier,
    header: Option<&str>,
) -> Result<Claims, BackendError> {
    let header = header.ok_or(BackendError::MissingAuthorization)?;

    let mut parts = header.splitn(2, ' ');
    let scheme = parts.next().unwrap_or_default();
    let token = parts.next().unwrap_or_default().trim();

    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(BackendError::MalformedAuthorization);
    }

    verifier.verify(token)
}

enum Keys {
    /// RS256 keys from the identity provider's JWKS document, by key ID.
    Rsa(HashMap<String, DecodingKey>),

    /// A single HS256 shared secret, for local development and tests.
    Secret(DecodingKey),
}

/// Checks a token's signature, audience, issuer and expiry against the
/// configured identity provider before trusting any of its claims.
pub struct JwtVerifier {
    audience: String,
    issuer: String,
    keys: Keys,
}

/// The subset of a JWKS document this service consumes.
#[derive(Debug, Deserialize)]
pub struct JwkSet {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kty: String,
    kid: String,
    #[serde(default)]
    n: Option<String>,
    #[serde(default)]
    e: Option<String>,
}

impl JwtVerifier {
    /// Creates a verifier over the RSA keys in a JWKS document.
    pub fn new(audience: String, issuer: String, jwks: JwkSet) -> Result<Self, BackendError> {
        let mut keys = HashMap::new();

        for key in jwks.keys {
            if key.kty != "RSA" {
                continue;
            }

            if let (Some(n), Some(e)) = (key.n, key.e) {
                let decoding_key = DecodingKey::from_rsa_components(&n, &e)
                    .map_err(|source| BackendError::InvalidSigningKey { source })?;
                keys.insert(key.kid, decoding_key);
            }
        }

        Ok(Self {
            audience,
            issuer,
            keys: Keys::Rsa(keys),
        })
    }

    /// Creates a verifier over a shared secret.
    pub fn new_shared_secret(audience: String, issuer: String, secret: &[u8]) -> Self {
        Self {
            audience,
            issuer,
            keys: Keys::Secret(DecodingKey::from_secret(secret)),
        }
    }

    /// Builds a verifier from the environment: a shared secret when
    /// `BACKEND_AUTH_SHARED_SECRET` is set, otherwise the JWKS document
    /// published by `BACKEND_AUTH_ISSUER`.
    pub async fn from_env() -> Result<Self, BackendError> {
        let audience = get_variable("BACKEND_AUTH_AUDIENCE");
        let issuer = get_variable("BACKEND_AUTH_ISSUER");

        match get_optional_variable("BACKEND_AUTH_SHARED_SECRET") {
            Some(secret) => Ok(Self::new_shared_secret(audience, issuer, secret.as_bytes())),
            None => {
                let url = format!(
                    "{}/.well-known/jwks.json",
                    issuer.trim_end_matches('/')
                );

                let jwks = reqwest::get(&url)
                    .await
                    .and_then(|response| response.error_for_status())
                    .map_err(|source| BackendError::JwksFetchFailed { source })?
                    .json::<JwkSet>()
                    .await
                    .map_err(|source| BackendError::JwksFetchFailed { source })?;

                Self::new(audience, issuer, jwks)
            }
        }
    }

    fn decoding_key(&self, token: &str) -> Result<(&DecodingKey, Algorithm), BackendError> {
        match &self.keys {
            Keys::Secret(key) => Ok((key, Algorithm::HS256)),
            Keys::Rsa(keys) => {
                let header = decode_header(token)
                    .map_err(|source| BackendError::InvalidToken { source })?;
                let kid = header.kid;

                let key = kid.as_ref().and_then(|k| keys.get(k));

                key.map(|key| (key, Algorithm::RS256))
                    .ok_or(BackendError::UnknownSigningKey { kid })
            }
        }
    }
}

impl Verifier for JwtVerifier {
    fn verify(&self, token: &str) -> Result<Claims, BackendError> {
        let (key, algorithm) = self.decoding_key(token)?;

        let mut validation = Validation::new(algorithm);
        validation.set_audience(&[&self.audience]);
        validation.set_issuer(&[&self.issuer]);

        let data = decode::<serde_json::Map<String, Value>>(token, key, &validation)
            .map_err(|source| BackendError::InvalidToken { source })?;

        let subject = data
            .claims
            .get("sub")
            .and_then(Value::as_str)
            .ok_or(BackendError::MissingSubjectClaim)?
            .to_owned();

        Ok(Claims {
            subject,
            email: namespaced_claim(&data.claims, &self.audience, "email"),
            name: namespaced_claim(&data.claims, &self.audience, "name"),
        })
    }
}

/// Looks up a claim the identity provider namespaces under the API
/// audience, e.g. `https://api.example.com/email`.
fn namespaced_claim(
    claims: &serde_json::Map<String, Value>,
    audience: &str,
    name: &str,
) -> Option<String> {
    claims
        .get(&format!("{}/{}", audience, name))
        .and_then(Value::as_str)
        .map(str::to_owned)
}
