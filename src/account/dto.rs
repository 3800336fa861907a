use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::account::repo_types::Account;

/// Sign-up form fields. Missing fields deserialize as empty and fail validation.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SignUpForm {
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing)]
    pub password: String,
}

/// Form-login fields; `username` is an email or a nickname.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct EmailLoginForm {
    #[serde(default)]
    pub email: String,
}

/// `?token=..&email=..` carried by links sent by email.
#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginPageQuery {
    pub error: Option<String>,
}

/// Public part of an account shown on profile pages.
#[derive(Debug, Serialize)]
pub struct PublicProfile {
    pub nickname: String,
    pub email: Option<String>,
    pub email_verified: bool,
    pub joined_at: Option<OffsetDateTime>,
}

impl PublicProfile {
    pub fn of(account: &Account, is_owner: bool) -> Self {
        Self {
            nickname: account.nickname.clone(),
            email: is_owner.then(|| account.email.clone()),
            email_verified: account.email_verified,
            joined_at: account.joined_at,
        }
    }
}
