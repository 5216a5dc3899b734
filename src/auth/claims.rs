use serde::{Deserialize, Serialize};

/// JWT payload for bearer tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user ID
    pub iat: usize,  // issued at (unix timestamp)
    pub exp: usize,  // expires at (unix timestamp)
    pub iss: String, // issuer
    pub aud: String, // audience
}

impl Claims {
    pub fn user_id(&self) -> Option<i64> {
        self.sub.parse().ok()
    }
}

/// Body handed back when a token is issued.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
}
