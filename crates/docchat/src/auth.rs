//! Accounts and bearer tokens.
//!
//! Passwords are hashed with Argon2id (PHC string format, random salt).
//! Access tokens are compact HS256 JWTs (`header.claims.signature`,
//! base64url without padding) whose `sub` claim is the user id and whose
//! `exp` claim bounds their lifetime.

use anyhow::anyhow;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use tracing::info;

use docchat_core::models::User;
use docchat_core::store::Store;

type HmacSha256 = Hmac<Sha256>;

const JWT_HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Username already exists")]
    UsernameTaken,
    #[error("Username and password must not be empty")]
    MissingCredentials,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Could not validate credentials")]
    InvalidToken,
    #[error("User not found")]
    UserNotFound,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Hash a password into a PHC string (`$argon2id$...`).
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("password hashing failed: {}", e))?;
    Ok(hash.to_string())
}

/// Check `password` against a stored PHC hash. Malformed hashes never verify.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and validates access tokens with one shared secret.
#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
    lifetime: Duration,
}

impl TokenSigner {
    pub fn new(secret: impl AsRef<[u8]>, expiration_minutes: i64) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            lifetime: Duration::minutes(expiration_minutes),
        }
    }

    fn mac(&self) -> HmacSha256 {
        <HmacSha256 as Mac>::new_from_slice(&self.secret).expect("HMAC can take key of any size")
    }

    pub fn issue(&self, user_id: &str) -> anyhow::Result<String> {
        self.issue_at(user_id, Utc::now())
    }

    fn issue_at(&self, user_id: &str, now: DateTime<Utc>) -> anyhow::Result<String> {
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: (now + self.lifetime).timestamp(),
        };
        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(JWT_HEADER),
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?)
        );
        let mut mac = self.mac();
        mac.update(signing_input.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        Ok(format!("{}.{}", signing_input, signature))
    }

    /// Validate signature, algorithm, and expiry; return the claims.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        self.verify_at(token, Utc::now())
    }

    fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, AuthError> {
        let mut parts = token.split('.');
        let (Some(header), Some(payload), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthError::InvalidToken);
        };

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| AuthError::InvalidToken)?;
        let mut mac = self.mac();
        mac.update(header.as_bytes());
        mac.update(b".");
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| AuthError::InvalidToken)?;

        let header: serde_json::Value = decode_segment(header)?;
        if header.get("alg").and_then(|a| a.as_str()) != Some("HS256") {
            return Err(AuthError::InvalidToken);
        }

        let claims: Claims = decode_segment(payload)?;
        if claims.exp <= now.timestamp() {
            return Err(AuthError::InvalidToken);
        }
        Ok(claims)
    }
}

fn decode_segment<T: serde::de::DeserializeOwned>(segment: &str) -> Result<T, AuthError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| AuthError::InvalidToken)?;
    serde_json::from_slice(&bytes).map_err(|_| AuthError::InvalidToken)
}

/// Create an account and return an access token for it.
pub async fn register(
    store: &dyn Store,
    signer: &TokenSigner,
    username: &str,
    password: &str,
) -> Result<String, AuthError> {
    if username.trim().is_empty() || password.is_empty() {
        return Err(AuthError::MissingCredentials);
    }

    let user = User {
        id: uuid::Uuid::new_v4().to_string(),
        username: username.to_string(),
        password_hash: hash_password(password)?,
        created_at: Utc::now(),
    };
    if !store.insert_user(&user).await? {
        return Err(AuthError::UsernameTaken);
    }

    info!(user_id = %user.id, "registered user");
    Ok(signer.issue(&user.id)?)
}

/// Check credentials and return a fresh access token.
///
/// Unknown usernames and wrong passwords fail identically.
pub async fn login(
    store: &dyn Store,
    signer: &TokenSigner,
    username: &str,
    password: &str,
) -> Result<String, AuthError> {
    let user = store
        .find_user_by_username(username)
        .await?
        .ok_or(AuthError::InvalidCredentials)?;
    if !verify_password(password, &user.password_hash) {
        return Err(AuthError::InvalidCredentials);
    }
    Ok(signer.issue(&user.id)?)
}

/// Resolve the account behind an authenticated user id.
pub async fn current_user(store: &dyn Store, user_id: &str) -> Result<User, AuthError> {
    store
        .find_user(user_id)
        .await?
        .ok_or(AuthError::UserNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use docchat_core::store::memory::InMemoryStore;

    #[test]
    fn test_password_hash_roundtrip() {
        let hash = hash_password("hunter2").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("hunter2", &hash));
        assert!(!verify_password("hunter3", &hash));
        assert!(!verify_password("hunter2", "not-a-phc-string"));
    }

    #[test]
    fn test_same_password_gets_distinct_salts() {
        assert_ne!(hash_password("pw").unwrap(), hash_password("pw").unwrap());
    }

    #[test]
    fn test_token_roundtrip() {
        let signer = TokenSigner::new("secret", 60);
        let token = signer.issue("user-1").unwrap();
        assert_eq!(token.split('.').count(), 3);
        let claims = signer.verify(&token).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_token_rejected_with_other_secret() {
        let token = TokenSigner::new("secret", 60).issue("u").unwrap();
        let other = TokenSigner::new("different", 60);
        assert!(matches!(other.verify(&token), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn test_expired_token_rejected() {
        let signer = TokenSigner::new("secret", 1);
        let issued = Utc::now() - Duration::minutes(5);
        let token = signer.issue_at("u", issued).unwrap();
        assert!(matches!(signer.verify(&token), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn test_tampered_claims_rejected() {
        let signer = TokenSigner::new("secret", 60);
        let token = signer.issue("alice").unwrap();
        let parts: Vec<&str> = token.split('.').collect();
        let forged_claims = URL_SAFE_NO_PAD.encode(r#"{"sub":"bob","iat":0,"exp":99999999999}"#);
        let forged = format!("{}.{}.{}", parts[0], forged_claims, parts[2]);
        assert!(matches!(signer.verify(&forged), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn test_garbage_tokens_rejected() {
        let signer = TokenSigner::new("secret", 60);
        for token in ["", "abc", "a.b", "a.b.c", "a.b.c.d"] {
            assert!(signer.verify(token).is_err(), "accepted {:?}", token);
        }
    }

    #[tokio::test]
    async fn test_register_login_flow() {
        let store = InMemoryStore::default();
        let signer = TokenSigner::new("secret", 60);

        let token = register(&store, &signer, "ada", "pw").await.unwrap();
        let user_id = signer.verify(&token).unwrap().sub;
        assert_eq!(current_user(&store, &user_id).await.unwrap().username, "ada");

        assert!(matches!(
            register(&store, &signer, "ada", "other").await,
            Err(AuthError::UsernameTaken)
        ));
        assert!(login(&store, &signer, "ada", "pw").await.is_ok());
        assert!(matches!(
            login(&store, &signer, "ada", "wrong").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            login(&store, &signer, "nobody", "pw").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_vanished_user_not_found() {
        let store = InMemoryStore::default();
        assert!(matches!(
            current_user(&store, "ghost").await,
            Err(AuthError::UserNotFound)
        ));
    }
}
