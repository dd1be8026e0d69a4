use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use http::HeaderMap;
use http::header;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use ulid::Ulid;
use uniadmin_contracts::Role;

pub mod password;

const MIN_SECRET_BYTES: usize = 32;

/// The authenticated caller, resolved from a verified access token and the user store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: i64,
    pub username: String,
    pub role: Role,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub secret: String,
    pub issuer: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub clock_skew: Duration,
}

#[derive(Debug, Clone)]
pub struct AuthError {
    pub code: &'static str,
    pub message: String,
}

impl AuthError {
    fn invalid(message: impl Into<String>) -> Self {
        Self {
            code: "ERR_AUTH_INVALID",
            message: message.into(),
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for AuthError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub username: String,
    pub role: Role,
    pub token_type: TokenType,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
}

impl Claims {
    pub fn user_id(&self) -> Result<i64, AuthError> {
        self.sub
            .parse::<i64>()
            .map_err(|_| AuthError::invalid("token subject is not a user id"))
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
    pub refresh_jti: String,
    pub refresh_expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct TokenIssuer {
    issuer: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenIssuer {
    pub fn new(config: TokenConfig) -> Result<Self, AuthError> {
        if config.secret.len() < MIN_SECRET_BYTES {
            return Err(AuthError {
                code: "ERR_INVALID_CONFIG",
                message: format!("jwt secret must be at least {} bytes", MIN_SECRET_BYTES),
            });
        }

        if config.issuer.trim().is_empty() {
            return Err(AuthError {
                code: "ERR_INVALID_CONFIG",
                message: "jwt issuer must be non-empty".to_string(),
            });
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(std::slice::from_ref(&config.issuer));
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.leeway = config.clock_skew.as_secs();

        Ok(Self {
            issuer: config.issuer,
            access_ttl: config.access_ttl,
            refresh_ttl: config.refresh_ttl,
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
        })
    }

    pub fn issue_pair(
        &self,
        user_id: i64,
        username: &str,
        role: Role,
    ) -> Result<TokenPair, AuthError> {
        let access = self.issue(user_id, username, role, TokenType::Access)?;
        let refresh_claims = self.claims(user_id, username, role, TokenType::Refresh);
        let refresh = self.sign(&refresh_claims)?;

        Ok(TokenPair {
            access,
            refresh,
            refresh_expires_at: refresh_claims.expires_at(),
            refresh_jti: refresh_claims.jti,
        })
    }

    pub fn issue_access(&self, user_id: i64, username: &str, role: Role) -> Result<String, AuthError> {
        self.issue(user_id, username, role, TokenType::Access)
    }

    pub fn issue(
        &self,
        user_id: i64,
        username: &str,
        role: Role,
        token_type: TokenType,
    ) -> Result<String, AuthError> {
        self.sign(&self.claims(user_id, username, role, token_type))
    }

    pub fn verify(&self, token: &str, expected: TokenType) -> Result<Claims, AuthError> {
        let decoded = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|_| AuthError::invalid("JWT validation failed"))?;

        let claims = decoded.claims;
        if claims.token_type != expected {
            return Err(AuthError::invalid("unexpected token type"));
        }
        claims.user_id()?;

        Ok(claims)
    }

    fn claims(&self, user_id: i64, username: &str, role: Role, token_type: TokenType) -> Claims {
        let now = Utc::now().timestamp();
        let ttl = match token_type {
            TokenType::Access => self.access_ttl,
            TokenType::Refresh => self.refresh_ttl,
        };

        Claims {
            sub: user_id.to_string(),
            username: username.to_string(),
            role,
            token_type,
            jti: Ulid::new().to_string(),
            iat: now,
            exp: now.saturating_add(ttl.as_secs().min(i64::MAX as u64) as i64),
            iss: self.issuer.clone(),
        }
    }

    fn sign(&self, claims: &Claims) -> Result<String, AuthError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key).map_err(|_| {
            AuthError {
                code: "ERR_INTERNAL",
                message: "failed to sign JWT".to_string(),
            }
        })
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Result<String, AuthError> {
    let authz = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AuthError {
            code: "ERR_AUTH_REQUIRED",
            message: "missing Authorization header".to_string(),
        })?;

    let token = authz
        .strip_prefix("Bearer ")
        .or_else(|| authz.strip_prefix("bearer "))
        .ok_or_else(|| AuthError::invalid("Authorization must be a Bearer token"))?;

    if token.trim().is_empty() {
        return Err(AuthError::invalid("Bearer token is empty"));
    }

    Ok(token.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(TokenConfig {
            secret: "0123456789abcdef0123456789abcdef".to_string(),
            issuer: "uniadmin-test".to_string(),
            access_ttl: Duration::from_secs(300),
            refresh_ttl: Duration::from_secs(86_400),
            clock_skew: Duration::ZERO,
        })
        .expect("issuer config should be valid")
    }

    #[test]
    fn short_secret_is_rejected() {
        let err = TokenIssuer::new(TokenConfig {
            secret: "short".to_string(),
            issuer: "uniadmin".to_string(),
            access_ttl: Duration::from_secs(60),
            refresh_ttl: Duration::from_secs(60),
            clock_skew: Duration::ZERO,
        })
        .err()
        .expect("short secret must fail");
        assert_eq!(err.code, "ERR_INVALID_CONFIG");
    }

    #[test]
    fn issued_pair_verifies_by_type() {
        let issuer = issuer();
        let pair = issuer.issue_pair(7, "admin", Role::Admin).unwrap();

        let access = issuer.verify(&pair.access, TokenType::Access).unwrap();
        assert_eq!(access.user_id().unwrap(), 7);
        assert_eq!(access.role, Role::Admin);

        let refresh = issuer.verify(&pair.refresh, TokenType::Refresh).unwrap();
        assert_eq!(refresh.jti, pair.refresh_jti);
        assert_ne!(access.jti, refresh.jti);

        let err = issuer.verify(&pair.refresh, TokenType::Access).unwrap_err();
        assert_eq!(err.code, "ERR_AUTH_INVALID");
    }

    #[test]
    fn expired_token_is_invalid() {
        let issuer = issuer();
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: "1".to_string(),
            username: "teacher".to_string(),
            role: Role::Teacher,
            token_type: TokenType::Access,
            jti: Ulid::new().to_string(),
            iat: now - 600,
            exp: now - 300,
            iss: "uniadmin-test".to_string(),
        };
        let token = issuer.sign(&claims).unwrap();

        let err = issuer.verify(&token, TokenType::Access).unwrap_err();
        assert_eq!(err.code, "ERR_AUTH_INVALID");
    }

    #[test]
    fn token_from_other_secret_is_invalid() {
        let other = TokenIssuer::new(TokenConfig {
            secret: "ffffffffffffffffffffffffffffffff".to_string(),
            issuer: "uniadmin-test".to_string(),
            access_ttl: Duration::from_secs(300),
            refresh_ttl: Duration::from_secs(300),
            clock_skew: Duration::ZERO,
        })
        .unwrap();
        let token = other.issue(1, "x", Role::Admin, TokenType::Access).unwrap();

        assert!(issuer().verify(&token, TokenType::Access).is_err());
    }

    #[test]
    fn bearer_token_distinguishes_missing_from_malformed() {
        let headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers).unwrap_err().code, "ERR_AUTH_REQUIRED");

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers).unwrap_err().code, "ERR_AUTH_INVALID");

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer tok"));
        assert_eq!(bearer_token(&headers).unwrap(), "tok");
    }
}
