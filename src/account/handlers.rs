use axum::{
    extract::{FromRef, Path, Query, State},
    http::{header::SET_COOKIE, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    account::{
        dto::{EmailLoginForm, LoginForm, LoginPageQuery, PublicProfile, SignUpForm, TokenQuery},
        repo::RepoError,
        services::{self, ConfirmError},
        validation::{duplicate_error, is_valid_email, validate_sign_up, FieldErrors},
    },
    auth::{policy::LOGOUT_SUCCESS_URL, AuthAccount, CurrentAccount, SessionKeys},
    error::AppError,
    state::AppState,
    view::View,
};

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/sign-up", get(sign_up_form).post(sign_up_submit))
        .route("/check-email-token", get(check_email_token))
        .route("/login", get(login_page).post(login_submit))
        .route("/logout", post(logout))
        .route("/email-login", get(email_login_page).post(email_login_submit))
        .route("/check-email-login", get(check_email_login))
        .route("/login-link", get(login_link))
        .route("/profile/:nickname", get(profile))
}

pub fn member_routes() -> Router<AppState> {
    Router::new()
        .route("/check-email", get(check_email))
        .route("/resend-confirm-email", get(resend_confirm_email))
}

/// Redirect that also logs `account` in.
fn login_redirect(
    state: &AppState,
    account: &crate::account::repo_types::Account,
    to: &str,
) -> Result<Response, AppError> {
    let cookie = SessionKeys::from_ref(state).login_cookie(account)?;
    Ok(([(SET_COOKIE, cookie)], Redirect::to(to)).into_response())
}

#[instrument(skip_all)]
pub async fn index(CurrentAccount(session): CurrentAccount) -> View {
    let view = View::new("index");
    match session {
        Some(s) => view.with("account", s.nickname),
        None => view,
    }
}

pub async fn sign_up_form() -> View {
    View::new("account/sign-up").with("signUpForm", SignUpForm::default())
}

#[instrument(skip(state, form))]
pub async fn sign_up_submit(
    State(state): State<AppState>,
    Form(mut form): Form<SignUpForm>,
) -> Result<Response, AppError> {
    form.normalize();
    let errors = validate_sign_up(&form, state.accounts.as_ref()).await?;
    if !errors.is_empty() {
        warn!(?errors, "sign-up rejected");
        return Ok(View::new("account/sign-up")
            .with("signUpForm", &form)
            .with("errors", &errors)
            .into_response());
    }

    let account = match services::process_new_account(&state, form.clone()).await {
        Ok(account) => account,
        Err(AppError::Repo(RepoError::Duplicate(field))) => {
            warn!(field, "sign-up lost a uniqueness race");
            let mut errors = FieldErrors::default();
            errors.reject(field, duplicate_error(field));
            return Ok(View::new("account/sign-up")
                .with("signUpForm", &form)
                .with("errors", &errors)
                .into_response());
        }
        Err(e) => return Err(e),
    };
    login_redirect(&state, &account, "/")
}

#[instrument(skip(state, query))]
pub async fn check_email_token(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> Result<Response, AppError> {
    let view = View::new("account/checked-email");
    let (Some(token), Some(email)) = (query.token, query.email) else {
        return Ok(view.with("error", ConfirmError::WrongEmail.code()).into_response());
    };
    let email = email.trim().to_lowercase();

    match services::confirm_email(&state, &email, &token).await? {
        Err(e) => Ok(view.with("error", e.code()).into_response()),
        Ok(account) => {
            let number_of_user = state.accounts.count().await?;
            let cookie = SessionKeys::from_ref(&state).login_cookie(&account)?;
            let view = view
                .with("numberOfUser", number_of_user)
                .with("nickname", &account.nickname);
            Ok(([(SET_COOKIE, cookie)], view).into_response())
        }
    }
}

#[instrument(skip(state))]
pub async fn check_email(
    State(state): State<AppState>,
    AuthAccount(session): AuthAccount,
) -> Result<View, AppError> {
    let account = state
        .accounts
        .find_by_id(session.id)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(View::new("account/check-email").with("email", &account.email))
}

#[instrument(skip(state))]
pub async fn resend_confirm_email(
    State(state): State<AppState>,
    AuthAccount(session): AuthAccount,
) -> Result<Response, AppError> {
    let account = state
        .accounts
        .find_by_id(session.id)
        .await?
        .ok_or(AppError::NotFound)?;
    let email = account.email.clone();
    if !services::resend_confirm_email(&state, account).await? {
        return Ok(View::new("account/check-email")
            .with("error", "resend.too.soon")
            .with("email", email)
            .into_response());
    }
    Ok(Redirect::to("/").into_response())
}

pub async fn login_page(Query(query): Query<LoginPageQuery>) -> View {
    let view = View::new("login");
    if query.error.is_some() {
        view.with("error", true)
    } else {
        view
    }
}

#[instrument(skip(state, form))]
pub async fn login_submit(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    match services::login(&state, &form.username, &form.password).await? {
        Some(account) => login_redirect(&state, &account, "/"),
        None => Ok(Redirect::to("/login?error").into_response()),
    }
}

#[instrument(skip_all)]
pub async fn logout(
    State(state): State<AppState>,
    CurrentAccount(session): CurrentAccount,
) -> Result<Response, AppError> {
    if let Some(s) = session {
        let version = state.accounts.bump_session_version(s.id).await?;
        info!(account_id = s.id, session_version = version, "logged out");
    }
    let cookie = SessionKeys::from_ref(&state).logout_cookie()?;
    Ok(([(SET_COOKIE, cookie)], Redirect::to(LOGOUT_SUCCESS_URL)).into_response())
}

pub async fn email_login_page() -> View {
    View::new("account/email-login")
}

#[instrument(skip(state, form))]
pub async fn email_login_submit(
    State(state): State<AppState>,
    Form(form): Form<EmailLoginForm>,
) -> Result<Response, AppError> {
    let email = form.email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Ok(View::new("account/email-login")
            .with("error", "wrong.email")
            .into_response());
    }
    match services::send_login_link(&state, &email).await? {
        Err(e) => Ok(View::new("account/email-login")
            .with("error", e.code())
            .into_response()),
        Ok(()) => Ok(Redirect::to("/check-email-login").into_response()),
    }
}

pub async fn check_email_login() -> View {
    View::new("account/check-email-login")
}

#[instrument(skip(state, query))]
pub async fn login_link(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> Result<Response, AppError> {
    let view = View::new("account/logged-in-by-email");
    let (Some(token), Some(email)) = (query.token, query.email) else {
        return Ok(view.with("error", "login.failed").into_response());
    };
    let email = email.trim().to_lowercase();
    match services::login_by_link(&state, &email, &token).await? {
        None => Ok(view.with("error", "login.failed").into_response()),
        Some(account) => {
            let cookie = SessionKeys::from_ref(&state).login_cookie(&account)?;
            Ok(([(SET_COOKIE, cookie)], view.with("nickname", &account.nickname)).into_response())
        }
    }
}

#[instrument(skip(state, session))]
pub async fn profile(
    State(state): State<AppState>,
    Path(nickname): Path<String>,
    CurrentAccount(session): CurrentAccount,
) -> Result<View, AppError> {
    let Some(account) = state.accounts.find_by_nickname(&nickname).await? else {
        return Ok(View::new("error")
            .status(StatusCode::NOT_FOUND)
            .with("error", "wrong.nickname"));
    };
    let is_owner = session.is_some_and(|s| s.id == account.id);
    Ok(View::new("account/profile")
        .with("profile", PublicProfile::of(&account, is_owner))
        .with("isOwner", is_owner))
}
