use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Fresh plaintext invitation token. Only its hash is ever stored.
pub fn generate_token() -> String {
    Uuid::new_v4().to_string()
}

/// Lowercase hex SHA-256 of the plaintext token.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

pub fn activation_url(frontend_url: &str, token: &str) -> String {
    format!("{}/confirm/{}", frontend_url.trim_end_matches('/'), token)
}
