use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::store::User;

/// Request body for user registration.
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterUserPayload {
    #[validate(length(min = 1, max = 100))]
    pub username: String,
    #[validate(email, length(max = 250))]
    pub email: String,
    #[validate(length(min = 6, max = 50))]
    pub password: String,
}

impl RegisterUserPayload {
    pub fn normalize(&mut self) {
        self.username = self.username.trim().to_string();
        self.email = self.email.trim().to_lowercase();
    }
}

/// The new user plus the plaintext activation token.
#[derive(Debug, Serialize)]
pub struct UserWithToken {
    #[serde(flatten)]
    pub user: User,
    pub token: String,
}

/// Request body for token issuance.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateTokenPayload {
    #[validate(email, length(max = 255))]
    pub email: String,
    #[validate(length(min = 3, max = 72))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}
