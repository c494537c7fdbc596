use super::*;
use jsonwebtoken::{EncodingKey, Header, encode};

const SECRET: &str = "supersecretsessionsecretforunittesting";
const USER_ID: &str = "123e4567-e89b-12d3-a456-426614174000";

fn token_for(sub: &str, exp: usize, secret: &str) -> String {
    let claims = SessionClaims {
        sub: sub.to_string(),
        name: Some("Ada".to_string()),
        email: Some("ada@example.com".to_string()),
        role: Some("founder".to_string()),
        objective: Some("improve_user_retention".to_string()),
        exp,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

#[test]
fn test_validate_session_jwt_success() {
    let token = token_for(USER_ID, 9999999999, SECRET);

    let user = validate_session_jwt(&token, SECRET).expect("Valid token should pass");
    assert_eq!(user.user_id, Uuid::parse_str(USER_ID).unwrap());
    assert_eq!(user.email.as_deref(), Some("ada@example.com"));
    assert_eq!(user.objective.as_deref(), Some("improve_user_retention"));
}

#[test]
fn test_validate_session_jwt_expired() {
    let token = token_for(USER_ID, 1, SECRET);

    assert!(validate_session_jwt(&token, SECRET).is_err());
}

#[test]
fn test_validate_session_jwt_invalid_signature() {
    let token = token_for(USER_ID, 9999999999, "wrongsecret");

    assert!(validate_session_jwt(&token, SECRET).is_err());
}

#[test]
fn test_validate_session_jwt_non_uuid_subject() {
    let token = token_for("not-a-uuid", 9999999999, SECRET);

    let err = validate_session_jwt(&token, SECRET).unwrap_err();
    assert!(err.to_string().contains("Invalid user ID"));
}
