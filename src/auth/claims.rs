use serde::{Deserialize, Serialize};

/// Session token payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,         // account ID
    pub nickname: String, // principal name
    pub ver: i64,         // account session version at sign-in
    pub iat: usize,       // issued at (unix timestamp)
    pub exp: usize,       // expires at (unix timestamp)
    pub iss: String,      // issuer
    pub aud: String,      // audience
}
