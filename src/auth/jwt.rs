use std::time::Duration;

use axum::{extract::FromRef, http::HeaderValue};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;

use super::claims::Claims;
use crate::{account::repo_types::Account, config::SessionConfig, state::AppState};

/// Logged-in principal carried by the session cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionAccount {
    pub id: i64,
    pub nickname: String,
    pub version: i64,
}

/// Signing keys and cookie settings for session tokens.
#[derive(Clone)]
pub struct SessionKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub ttl: Duration,
    pub cookie_name: String,
    pub cookie_secure: bool,
}

impl FromRef<AppState> for SessionKeys {
    fn from_ref(state: &AppState) -> Self {
        let SessionConfig {
            secret,
            issuer,
            audience,
            ttl_minutes,
            cookie_name,
            cookie_secure,
        } = state.config.session.clone();
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer,
            audience,
            ttl: Duration::from_secs((ttl_minutes.max(1) as u64) * 60),
            cookie_name,
            cookie_secure,
        }
    }
}

impl SessionKeys {
    pub fn sign(&self, account: &Account) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let exp = now + TimeDuration::seconds(self.ttl.as_secs() as i64);
        let claims = Claims {
            sub: account.id,
            nickname: account.nickname.clone(),
            ver: account.session_version,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(account_id = account.id, "session signed");
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<SessionAccount> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        Ok(SessionAccount {
            id: data.claims.sub,
            nickname: data.claims.nickname,
            version: data.claims.ver,
        })
    }

    /// `Set-Cookie` value that logs `account` in.
    pub fn login_cookie(&self, account: &Account) -> anyhow::Result<HeaderValue> {
        let token = self.sign(account)?;
        let cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}{}",
            self.cookie_name,
            token,
            self.ttl.as_secs(),
            if self.cookie_secure { "; Secure" } else { "" }
        );
        Ok(HeaderValue::from_str(&cookie)?)
    }

    /// `Set-Cookie` value that expires the session cookie.
    pub fn logout_cookie(&self) -> anyhow::Result<HeaderValue> {
        let cookie = format!(
            "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0{}",
            self.cookie_name,
            if self.cookie_secure { "; Secure" } else { "" }
        );
        Ok(HeaderValue::from_str(&cookie)?)
    }

    /// Finds this session's cookie in a `Cookie` request header.
    pub fn token_from_cookie_header<'a>(&self, header: &'a str) -> Option<&'a str> {
        header.split(';').find_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (name == self.cookie_name && !value.is_empty()).then_some(value)
        })
    }
}
