use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

/// Bearer token claims. Tokens are issued by the HR login service and only
/// verified here, with the shared HS256 secret.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: u64,
    pub sub: String,
    pub role: u8, // role id
    pub exp: usize,
    pub jti: String,

    pub token_type: TokenType,
    /// Set when the user is linked to an employee record
    pub employee_id: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub enum TokenType {
    Access,
    Refresh,
}

/// Verifies signature and expiry, and accepts access tokens only.
pub fn verify_access_token(token: &str, secret: &str) -> Result<Claims, String> {
    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| e.to_string())?;

    if claims.token_type != TokenType::Access {
        return Err("refresh tokens cannot be used for API calls".to_string());
    }

    Ok(claims)
}

#[cfg(test)]
pub fn generate_token(
    user_id: u64,
    role: u8,
    employee_id: Option<u64>,
    token_type: TokenType,
    secret: &str,
    ttl: usize,
) -> String {
    use jsonwebtoken::{EncodingKey, Header, encode};

    let claims = Claims {
        user_id,
        sub: format!("user{}", user_id),
        role,
        exp: chrono::Utc::now().timestamp() as usize + ttl,
        jti: uuid::Uuid::new_v4().to_string(),
        token_type,
        employee_id,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn access_tokens_verify() {
        let token = generate_token(4, 2, Some(40), TokenType::Access, SECRET, 60);
        let claims = verify_access_token(&token, SECRET).unwrap();
        assert_eq!(claims.user_id, 4);
        assert_eq!(claims.employee_id, Some(40));
    }

    #[test]
    fn refresh_tokens_and_wrong_secrets_are_refused() {
        let refresh = generate_token(4, 2, None, TokenType::Refresh, SECRET, 60);
        assert!(verify_access_token(&refresh, SECRET).is_err());

        let access = generate_token(4, 2, None, TokenType::Access, SECRET, 60);
        assert!(verify_access_token(&access, "other-secret").is_err());
    }
}
