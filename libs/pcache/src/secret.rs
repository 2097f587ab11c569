//! Access-key secret holder and the HS256 tokens it mints for PMS calls.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Context;
use jsonwebtoken::{EncodingKey, Header};
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Clone)]
pub struct SecretManager {
    access_key: String,
    secret_key: String,
}

#[derive(Serialize)]
struct TokenClaims<'a> {
    sub: &'a str,
    iat: u64,
    exp: u64,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl SecretManager {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }

    pub fn access_key(&self) -> &str {
        &self.access_key
    }

    /// Signs a JWT carrying `sub = access key`, `iat`, `exp = iat + validity`
    /// and any per-request claims (bucket/path/permissions for STS requests).
    pub fn token(
        &self,
        claims: Option<Map<String, Value>>,
        validity: Duration,
    ) -> anyhow::Result<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before unix epoch")
            .as_secs();
        let claims = TokenClaims {
            sub: &self.access_key,
            iat: now,
            exp: now + validity.as_secs(),
            extra: claims.unwrap_or_default(),
        };
        jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret_key.as_bytes()),
        )
        .context("failed to sign pms token")
    }
}

impl std::fmt::Debug for SecretManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never leak the secret key through logs.
        f.debug_struct("SecretManager")
            .field("access_key", &self.access_key)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{Algorithm, DecodingKey, Validation};

    #[test]
    fn token_round_trips_with_request_claims() {
        let secrets = SecretManager::new("unittest", "sk-secret");
        let mut extra = Map::new();
        extra.insert("bucket".into(), Value::String("pb-minio".into()));
        extra.insert("path".into(), Value::String("".into()));
        extra.insert(
            "permissions".into(),
            Value::Array(vec![Value::String("PutObject".into())]),
        );

        let token = secrets
            .token(Some(extra), Duration::from_secs(1800))
            .unwrap();

        let decoded = jsonwebtoken::decode::<Value>(
            &token,
            &DecodingKey::from_secret(b"sk-secret"),
            &Validation::new(Algorithm::HS256),
        )
        .expect("token must verify with the shared secret");

        assert_eq!(decoded.claims["sub"], "unittest");
        assert_eq!(decoded.claims["bucket"], "pb-minio");
        assert_eq!(decoded.claims["permissions"][0], "PutObject");
        let iat = decoded.claims["iat"].as_u64().unwrap();
        let exp = decoded.claims["exp"].as_u64().unwrap();
        assert_eq!(exp - iat, 1800);
    }

    #[test]
    fn token_rejects_wrong_secret() {
        let secrets = SecretManager::new("unittest", "right");
        let token = secrets.token(None, Duration::from_secs(60)).unwrap();
        let err = jsonwebtoken::decode::<Value>(
            &token,
            &DecodingKey::from_secret(b"wrong"),
            &Validation::new(Algorithm::HS256),
        );
        assert!(err.is_err());
    }
}
