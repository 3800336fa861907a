use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tracing::{debug, warn};

use super::jwt::{SessionAccount, SessionKeys};
use super::policy::{Access, LOGIN_PAGE, POLICY};
use crate::{error::AppError, state::AppState};

/// Resolves the session cookie once per request and applies the access rules.
pub async fn enforce_policy(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let access = POLICY.access_for(req.method(), req.uri().path());
    if access == Access::Ignored {
        return next.run(req).await;
    }

    let keys = SessionKeys::from_ref(&state);
    let session = req
        .headers()
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|h| keys.token_from_cookie_header(h))
        .and_then(|token| match keys.verify(token) {
            Ok(s) => Some(s),
            Err(e) => {
                warn!(error = %e, "invalid or expired session cookie");
                None
            }
        });

    let session = match session {
        Some(s) => match current_session(&state, s).await {
            Ok(s) => s,
            Err(e) => return e.into_response(),
        },
        None => None,
    };

    if access == Access::Authenticated && session.is_none() {
        debug!(path = %req.uri().path(), "anonymous request redirected to login");
        return Redirect::to(LOGIN_PAGE).into_response();
    }

    if let Some(session) = session {
        req.extensions_mut().insert(session);
    }
    next.run(req).await
}

/// Drops sessions whose account is gone or has logged out since signing in.
async fn current_session(
    state: &AppState,
    session: SessionAccount,
) -> Result<Option<SessionAccount>, AppError> {
    let account = state.accounts.find_by_id(session.id).await?;
    match account {
        Some(a) if a.session_version == session.version => Ok(Some(session)),
        Some(_) => {
            debug!(account_id = session.id, "session revoked by logout");
            Ok(None)
        }
        None => {
            warn!(account_id = session.id, "session for missing account");
            Ok(None)
        }
    }
}

/// The logged-in account, if any.
pub struct CurrentAccount(pub Option<SessionAccount>);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentAccount
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(CurrentAccount(parts.extensions.get::<SessionAccount>().cloned()))
    }
}

/// The logged-in account; anonymous requests are sent to the login page.
pub struct AuthAccount(pub SessionAccount);

#[async_trait]
impl<S> FromRequestParts<S> for AuthAccount
where
    S: Send + Sync,
{
    type Rejection = Redirect;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionAccount>()
            .cloned()
            .map(AuthAccount)
            .ok_or_else(|| Redirect::to(LOGIN_PAGE))
    }
}
