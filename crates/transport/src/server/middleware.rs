//! Request guards for the session-only and admin-only routers.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use tracing::{debug, warn};

use crate::error::Error;
use crate::identity::{Capability, User};
use crate::server::types::{cookie_value, error_to_response, ApiErrorType, SESSION_COOKIE};
use crate::server::util::{blocking, encode_query_value};
use crate::types::AppState;

/// The logged-in user, inserted as a request extension by [`require_session`].
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// Resolves the session cookie to an active user. Anything else is sent to
/// the login page with the original path in `next`.
pub async fn require_session(
    State(s): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let token = cookie_value(req.headers(), SESSION_COOKIE);
    let user_id = token.as_deref().and_then(|t| s.sessions.user_id(t));

    let user = match user_id {
        Some(id) => {
            let state = s.clone();
            match blocking(move || state.identity.get(id)).await {
                Ok(user) if user.is_active => Some(user),
                Ok(_) | Err(Error::NotFound { .. }) => None,
                Err(e) => return error_to_response(e),
            }
        }
        None => None,
    };

    let Some(user) = user else {
        let target = req
            .uri()
            .path_and_query()
            .map_or("/", |pq| pq.as_str())
            .to_string();
        debug!("No session for {target}, redirecting to login");
        return Redirect::to(&format!("/login/?next={}", encode_query_value(&target)))
            .into_response();
    };

    req.extensions_mut().insert(CurrentUser(user));
    next.run(req).await
}

/// Lets through only users with full access. Must run inside
/// [`require_session`].
pub async fn require_admin(req: Request, next: Next) -> Response {
    let allowed = req
        .extensions()
        .get::<CurrentUser>()
        .is_some_and(|CurrentUser(user)| user.has_capability(Capability::FullAccess));

    if !allowed {
        warn!("Rejected non-admin request to {}", req.uri().path());
        return ApiErrorType::from((
            StatusCode::FORBIDDEN,
            "Administrator access required",
            None,
        ))
        .into_response();
    }

    next.run(req).await
}
