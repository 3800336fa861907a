use anyhow::Context;
use reqwest::Url;
use time::{Duration, OffsetDateTime};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    account::{
        dto::SignUpForm,
        password::PasswordEncoder,
        repo_types::{Account, NewAccount},
    },
    error::AppError,
    mail::EmailMessage,
    state::AppState,
};

pub const SIGN_UP_CONFIRM_SUBJECT: &str = "스터디올래, 회원 가입 인증";
pub const LOGIN_LINK_SUBJECT: &str = "스터디올래, 로그인 링크";

/// Minimum gap between two token emails to the same account.
const RESEND_INTERVAL: Duration = Duration::hours(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmError {
    WrongEmail,
    WrongToken,
}

impl ConfirmError {
    pub fn code(self) -> &'static str {
        match self {
            ConfirmError::WrongEmail => "wrong.email",
            ConfirmError::WrongToken => "wrong.token",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginLinkError {
    UnknownEmail,
    TooSoon,
}

impl LoginLinkError {
    pub fn code(self) -> &'static str {
        match self {
            LoginLinkError::UnknownEmail => "wrong.email",
            LoginLinkError::TooSoon => "login.link.unavailable",
        }
    }
}

fn new_token() -> String {
    Uuid::new_v4().to_string()
}

fn token_link(base_url: &str, path: &str, token: &str, email: &str) -> anyhow::Result<String> {
    let url = Url::parse_with_params(
        &format!("{base_url}{path}"),
        &[("token", token), ("email", email)],
    )
    .with_context(|| format!("build link for {path}"))?;
    Ok(url.to_string())
}

/// Creates the account, then sends its verification email.
#[instrument(skip(state, form), fields(nickname = %form.nickname))]
pub async fn process_new_account(state: &AppState, form: SignUpForm) -> Result<Account, AppError> {
    let account = save_new_account(state, form).await?;
    send_sign_up_confirm_email(state, &account).await?;
    Ok(account)
}

async fn save_new_account(state: &AppState, form: SignUpForm) -> Result<Account, AppError> {
    let password = PasswordEncoder::default()
        .encode(&form.password)
        .map_err(|e| {
            error!(nickname = %form.nickname, email = %form.email, error = %e, "sign-up password not encoded");
            e
        })?;
    let new = NewAccount {
        email: form.email,
        nickname: form.nickname,
        password,
        email_check_token: new_token(),
        email_check_token_generated_at: OffsetDateTime::now_utc(),
        study_created_by_web: true,
        study_enrollment_result_by_web: true,
        study_updated_by_web: true,
    };
    let account = state.accounts.save(new).await?;
    info!(account_id = account.id, email = %account.email, "account created");
    Ok(account)
}

pub async fn send_sign_up_confirm_email(state: &AppState, account: &Account) -> Result<(), AppError> {
    let token = account
        .email_check_token
        .as_deref()
        .context("account has no email check token")?;
    let text = token_link(&state.config.base_url, "/check-email-token", token, &account.email)?;
    state
        .mailer
        .send(EmailMessage {
            to: account.email.clone(),
            subject: SIGN_UP_CONFIRM_SUBJECT.to_string(),
            text,
        })
        .await
        .context("send sign-up confirmation")?;
    Ok(())
}

/// Checks `token` against the account registered under `email` and completes sign-up.
#[instrument(skip(state, token))]
pub async fn confirm_email(
    state: &AppState,
    email: &str,
    token: &str,
) -> Result<Result<Account, ConfirmError>, AppError> {
    let Some(account) = state.accounts.find_by_email(email).await? else {
        warn!(%email, "confirmation for unknown email");
        return Ok(Err(ConfirmError::WrongEmail));
    };
    if !account.is_valid_token(token) {
        warn!(account_id = account.id, "confirmation with wrong token");
        return Ok(Err(ConfirmError::WrongToken));
    }
    let account = state
        .accounts
        .complete_sign_up(account.id, OffsetDateTime::now_utc())
        .await?;
    info!(account_id = account.id, "email verified");
    Ok(Ok(account))
}

pub fn can_send_confirm_email(account: &Account, now: OffsetDateTime) -> bool {
    match account.email_check_token_generated_at {
        Some(at) => at <= now - RESEND_INTERVAL,
        None => true,
    }
}

async fn regenerate_token(state: &AppState, account: &mut Account) -> Result<(), AppError> {
    let token = new_token();
    let now = OffsetDateTime::now_utc();
    state
        .accounts
        .update_email_check_token(account.id, &token, now)
        .await?;
    account.email_check_token = Some(token);
    account.email_check_token_generated_at = Some(now);
    Ok(())
}

/// Returns `false` when the previous email is less than an hour old.
#[instrument(skip(state, account), fields(account_id = account.id))]
pub async fn resend_confirm_email(state: &AppState, mut account: Account) -> Result<bool, AppError> {
    if !can_send_confirm_email(&account, OffsetDateTime::now_utc()) {
        return Ok(false);
    }
    regenerate_token(state, &mut account).await?;
    send_sign_up_confirm_email(state, &account).await?;
    Ok(true)
}

/// Form login: `username` may be an email address or a nickname.
#[instrument(skip(state, password))]
pub async fn login(
    state: &AppState,
    username: &str,
    password: &str,
) -> Result<Option<Account>, AppError> {
    let username = username.trim();
    let account = match state.accounts.find_by_email(&username.to_lowercase()).await? {
        Some(a) => Some(a),
        None => state.accounts.find_by_nickname(username).await?,
    };
    let Some(account) = account else {
        warn!("login with unknown username");
        return Ok(None);
    };
    let matches = PasswordEncoder::default()
        .matches(password, &account.password)
        .map_err(|e| {
            error!(account_id = account.id, nickname = %account.nickname, error = %e, "stored password unreadable");
            e
        })?;
    if !matches {
        warn!(account_id = account.id, "login with invalid password");
        return Ok(None);
    }
    info!(account_id = account.id, "logged in");
    Ok(Some(account))
}

/// Sends a one-time login link to `email`.
#[instrument(skip(state))]
pub async fn send_login_link(
    state: &AppState,
    email: &str,
) -> Result<Result<(), LoginLinkError>, AppError> {
    let Some(mut account) = state.accounts.find_by_email(email).await? else {
        return Ok(Err(LoginLinkError::UnknownEmail));
    };
    if !can_send_confirm_email(&account, OffsetDateTime::now_utc()) {
        return Ok(Err(LoginLinkError::TooSoon));
    }
    regenerate_token(state, &mut account).await?;
    let token = account.email_check_token.as_deref().unwrap_or_default();
    let text = token_link(&state.config.base_url, "/login-link", token, &account.email)?;
    state
        .mailer
        .send(EmailMessage {
            to: account.email.clone(),
            subject: LOGIN_LINK_SUBJECT.to_string(),
            text,
        })
        .await
        .context("send login link")?;
    Ok(Ok(()))
}

/// Consumes the token of a login link; `None` when the pair does not match.
#[instrument(skip(state, token))]
pub async fn login_by_link(
    state: &AppState,
    email: &str,
    token: &str,
) -> Result<Option<Account>, AppError> {
    let Some(account) = state.accounts.find_by_email(email).await? else {
        return Ok(None);
    };
    if !account.is_valid_token(token) {
        warn!(account_id = account.id, "login link with wrong token");
        return Ok(None);
    }
    state.accounts.clear_email_check_token(account.id).await?;
    Ok(Some(account))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::testing::RecordingMailSender;
    use crate::state::testing::{fake, fake_with_mailer};

    fn form() -> SignUpForm {
        SignUpForm {
            nickname: "mintae".into(),
            email: "email@email.com".into(),
            password: "12345678".into(),
        }
    }

    #[tokio::test]
    async fn new_account_is_hashed_tokened_and_mailed_once() {
        let f = fake();
        let account = process_new_account(&f.state, form()).await.unwrap();

        assert_ne!(account.password, "12345678");
        assert!(PasswordEncoder::default()
            .matches("12345678", &account.password)
            .unwrap());
        let token = account.email_check_token.clone().expect("token generated");
        assert!(account.email_check_token_generated_at.is_some());
        assert!(!account.email_verified);
        assert!(account.study_created_by_web);
        assert!(account.study_enrollment_result_by_web);
        assert!(account.study_updated_by_web);
        assert!(!account.study_created_by_email);

        let sent = f.mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "email@email.com");
        assert_eq!(sent[0].subject, SIGN_UP_CONFIRM_SUBJECT);
        assert!(sent[0].text.starts_with("http://localhost:8080/check-email-token?"));
        assert!(sent[0].text.contains(&format!("token={token}")));
        assert!(sent[0].text.contains("email=email%40email.com"));
    }

    #[tokio::test]
    async fn mail_failure_propagates_after_save() {
        let f = fake_with_mailer(RecordingMailSender::failing());
        let err = process_new_account(&f.state, form()).await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
        assert_eq!(f.accounts.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn confirm_email_outcomes() {
        let f = fake();
        let account = process_new_account(&f.state, form()).await.unwrap();
        let token = account.email_check_token.unwrap();

        let r = confirm_email(&f.state, "nobody@email.com", &token).await.unwrap();
        assert_eq!(r.unwrap_err(), ConfirmError::WrongEmail);

        let r = confirm_email(&f.state, "email@email.com", "wrong").await.unwrap();
        assert_eq!(r.unwrap_err(), ConfirmError::WrongToken);

        let done = confirm_email(&f.state, "email@email.com", &token)
            .await
            .unwrap()
            .unwrap();
        assert!(done.email_verified);
        assert!(done.joined_at.is_some());

        // token is single use
        let again = confirm_email(&f.state, "email@email.com", &token).await.unwrap();
        assert_eq!(again.unwrap_err(), ConfirmError::WrongToken);
    }

    #[tokio::test]
    async fn resend_is_rate_limited() {
        let f = fake();
        let account = process_new_account(&f.state, form()).await.unwrap();
        assert!(!resend_confirm_email(&f.state, account.clone()).await.unwrap());
        assert_eq!(f.mailer.sent().len(), 1);

        let mut old = account;
        old.email_check_token_generated_at = Some(OffsetDateTime::now_utc() - Duration::hours(2));
        assert!(resend_confirm_email(&f.state, old).await.unwrap());
        assert_eq!(f.mailer.sent().len(), 2);
    }

    #[test]
    fn can_send_after_an_hour() {
        let now = OffsetDateTime::now_utc();
        let mut a = Account {
            id: 1,
            email: "a@b.co".into(),
            nickname: "abc".into(),
            password: "h".into(),
            email_verified: false,
            email_check_token: None,
            email_check_token_generated_at: None,
            joined_at: None,
            study_created_by_email: false,
            study_created_by_web: true,
            study_enrollment_result_by_email: false,
            study_enrollment_result_by_web: true,
            study_updated_by_email: false,
            study_updated_by_web: true,
            session_version: 0,
        };
        assert!(can_send_confirm_email(&a, now));
        a.email_check_token_generated_at = Some(now - Duration::minutes(59));
        assert!(!can_send_confirm_email(&a, now));
        a.email_check_token_generated_at = Some(now - Duration::minutes(61));
        assert!(can_send_confirm_email(&a, now));
    }

    #[tokio::test]
    async fn login_by_email_or_nickname() {
        let f = fake();
        process_new_account(&f.state, form()).await.unwrap();

        assert!(login(&f.state, "mintae", "12345678").await.unwrap().is_some());
        assert!(login(&f.state, "Email@Email.com", "12345678").await.unwrap().is_some());
        assert!(login(&f.state, "mintae", "wrongpass").await.unwrap().is_none());
        assert!(login(&f.state, "ghost", "12345678").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn login_link_flow() {
        let f = fake();
        process_new_account(&f.state, form()).await.unwrap();

        // sign-up token was generated just now
        let r = send_login_link(&f.state, "email@email.com").await.unwrap();
        assert_eq!(r.unwrap_err(), LoginLinkError::TooSoon);
        let r = send_login_link(&f.state, "ghost@email.com").await.unwrap();
        assert_eq!(r.unwrap_err(), LoginLinkError::UnknownEmail);

        let id = f.accounts.snapshot()[0].id;
        f.state
            .accounts
            .update_email_check_token(id, "old", OffsetDateTime::now_utc() - Duration::hours(2))
            .await
            .unwrap();
        send_login_link(&f.state, "email@email.com").await.unwrap().unwrap();

        let sent = f.mailer.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].subject, LOGIN_LINK_SUBJECT);
        assert!(sent[1].text.contains("/login-link?token="));

        let token = f.accounts.snapshot()[0].email_check_token.clone().unwrap();
        assert!(login_by_link(&f.state, "email@email.com", "nope").await.unwrap().is_none());
        let account = login_by_link(&f.state, "email@email.com", &token).await.unwrap();
        assert_eq!(account.unwrap().nickname, "mintae");
        assert!(login_by_link(&f.state, "email@email.com", &token).await.unwrap().is_none());
    }
}
