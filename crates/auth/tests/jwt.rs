use std::time::Duration;

use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use uniadmin_auth::{TokenConfig, TokenIssuer, TokenType};
use uniadmin_contracts::Role;

const SECRET: &str = "0123456789abcdef0123456789abcdef";

fn issuer() -> TokenIssuer {
    TokenIssuer::new(TokenConfig {
        secret: SECRET.to_string(),
        issuer: "uniadmin".to_string(),
        access_ttl: Duration::from_secs(300),
        refresh_ttl: Duration::from_secs(86_400),
        clock_skew: Duration::ZERO,
    })
    .expect("issuer config should be valid")
}

fn sign(claims: serde_json::Value, algorithm: Algorithm) -> String {
    encode(
        &Header::new(algorithm),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .expect("signing must succeed")
}

fn claims(iss: &str, token_type: &str) -> serde_json::Value {
    let now = chrono::Utc::now().timestamp();
    serde_json::json!({
        "sub": "7",
        "username": "giangvien",
        "role": "TEACHER",
        "token_type": token_type,
        "jti": "01J0000000000000000000000A",
        "iat": now,
        "exp": now + 600,
        "iss": iss,
    })
}

#[test]
fn externally_signed_token_with_matching_claims_verifies() {
    let token = sign(claims("uniadmin", "access"), Algorithm::HS256);

    let verified = issuer()
        .verify(&token, TokenType::Access)
        .expect("token should verify");

    assert_eq!(verified.user_id().unwrap(), 7);
    assert_eq!(verified.role, Role::Teacher);
    assert_eq!(verified.username, "giangvien");
}

#[test]
fn foreign_issuer_is_rejected() {
    let token = sign(claims("someone-else", "access"), Algorithm::HS256);
    let err = issuer()
        .verify(&token, TokenType::Access)
        .expect_err("issuer mismatch must fail");
    assert_eq!(err.code, "ERR_AUTH_INVALID");
}

#[test]
fn other_hmac_algorithms_are_rejected() {
    let token = sign(claims("uniadmin", "access"), Algorithm::HS512);
    assert!(issuer().verify(&token, TokenType::Access).is_err());
}

#[test]
fn refresh_token_cannot_authenticate_requests() {
    let token = sign(claims("uniadmin", "refresh"), Algorithm::HS256);
    assert!(issuer().verify(&token, TokenType::Access).is_err());
    assert!(issuer().verify(&token, TokenType::Refresh).is_ok());
}

#[test]
fn non_numeric_subject_is_rejected() {
    let mut claims = claims("uniadmin", "access");
    claims["sub"] = serde_json::json!("admin");
    let token = sign(claims, Algorithm::HS256);
    assert!(issuer().verify(&token, TokenType::Access).is_err());
}
