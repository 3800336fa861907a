use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use crate::account::{dto::SignUpForm, repo::AccountRepository, repo::RepoError};

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    static ref NICKNAME_RE: Regex = Regex::new(r"^[ㄱ-ㅎ가-힣a-z0-9_-]{3,20}$").unwrap();
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Field name to error codes, in field order.
#[derive(Debug, Default, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<&'static str, Vec<&'static str>>);

impl FieldErrors {
    pub fn reject(&mut self, field: &'static str, code: &'static str) {
        self.0.entry(field).or_default().push(code);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }
}

impl SignUpForm {
    pub fn normalize(&mut self) {
        self.email = self.email.trim().to_lowercase();
        self.nickname = self.nickname.trim().to_string();
    }

    /// Format checks that need no storage access.
    pub fn check_format(&self) -> FieldErrors {
        let mut errors = FieldErrors::default();
        if !NICKNAME_RE.is_match(&self.nickname) {
            errors.reject("nickname", "invalid.nickname");
        }
        if !is_valid_email(&self.email) {
            errors.reject("email", "invalid.email");
        }
        let len = self.password.chars().count();
        if !(8..=50).contains(&len) {
            errors.reject("password", "invalid.password");
        }
        errors
    }
}

/// Error code for a taken `email` or `nickname`.
pub fn duplicate_error(field: &str) -> &'static str {
    match field {
        "nickname" => "duplicate.nickname",
        _ => "duplicate.email",
    }
}

/// Full sign-up validation: format first, then uniqueness of email and nickname.
pub async fn validate_sign_up(
    form: &SignUpForm,
    accounts: &dyn AccountRepository,
) -> Result<FieldErrors, RepoError> {
    let mut errors = form.check_format();
    if !errors.has("email") && accounts.exists_by_email(&form.email).await? {
        errors.reject("email", duplicate_error("email"));
    }
    if !errors.has("nickname") && accounts.exists_by_nickname(&form.nickname).await? {
        errors.reject("nickname", duplicate_error("nickname"));
    }
    Ok(errors)
}
