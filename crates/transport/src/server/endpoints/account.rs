//! Registration, login and logout.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap},
    response::{IntoResponse, Redirect, Response},
    Form,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::error::Error;
use crate::identity::{Registration, Role};
use crate::server::types::{
    clear_cookie, cookie_value, redirect_with_flash, render_page, set_cookie, Flash, SESSION_COOKIE,
};
use crate::server::util::blocking;
use crate::types::AppState;

const REGISTERED: &str = "Registration successful! You can now log in.";
const LOGGED_IN: &str = "Login successful!";
const LOGGED_OUT: &str = "You have been logged out successfully.";

/// GET /register/
pub async fn get_register(headers: HeaderMap) -> Response {
    let roles: Vec<_> = Role::ALL
        .iter()
        .filter(|r| **r != Role::Admin)
        .map(|r| json!({ "value": r.as_str(), "label": r.label() }))
        .collect();

    render_page(
        "register",
        &headers,
        json!({
            "fields": [
                "name", "email", "role", "password", "id_number",
                "level", "term", "contact_information",
            ],
            "roles": roles,
        }),
    )
}

/// POST /register/
pub async fn post_register(
    State(s): State<Arc<AppState>>,
    Form(registration): Form<Registration>,
) -> Response {
    info!("POST /register/");

    let state = s.clone();
    match blocking(move || state.register(registration)).await {
        Ok(_) => redirect_with_flash("/login/", Flash::success(REGISTERED)),
        Err(Error::Validation(e)) => {
            info!("Rejected registration: {e}");
            redirect_with_flash("/register/", Flash::error(e.to_string()))
        }
        Err(e) => {
            warn!("Registration failed: {e}");
            redirect_with_flash(
                "/register/",
                Flash::error(format!("Error during registration: {e}")),
            )
        }
    }
}

/// GET /login/
pub async fn get_login(headers: HeaderMap) -> Response {
    render_page("login", &headers, json!({ "fields": ["email", "password"] }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
    /// Where to go after logging in; set from the `?next=` redirect.
    pub next: Option<String>,
}

/// Only same-site absolute paths are followed after login. Browsers read
/// `/\host` like `//host`.
fn safe_next(next: Option<&str>) -> Option<&str> {
    next.filter(|n| n.starts_with('/') && !n.starts_with("//") && !n.starts_with("/\\"))
}

/// POST /login/
pub async fn post_login(State(s): State<Arc<AppState>>, Form(form): Form<LoginForm>) -> Response {
    info!("POST /login/");

    let LoginForm {
        email,
        password,
        next,
    } = form;
    let state = s.clone();
    match blocking(move || state.identity.authenticate(&email, &password)).await {
        Ok(user) => {
            let token = s.sessions.start(user.id);
            info!(user_id = user.id, "Logged in {}", user.email);

            let target = safe_next(next.as_deref()).unwrap_or("/profile/");
            let mut response = redirect_with_flash(target, Flash::success(LOGGED_IN));
            response.headers_mut().append(
                header::SET_COOKIE,
                set_cookie(
                    SESSION_COOKIE,
                    &token,
                    Some(s.session_config.ttl_secs),
                    s.session_config.cookie_secure,
                ),
            );
            response
        }
        Err(Error::Authentication) => {
            redirect_with_flash("/login/", Flash::error(Error::Authentication.to_string()))
        }
        Err(e) => {
            warn!("Login failed: {e}");
            redirect_with_flash("/login/", Flash::error(Error::Authentication.to_string()))
        }
    }
}

/// POST /logout/
pub async fn post_logout(State(s): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Some(token) = cookie_value(&headers, SESSION_COOKIE) {
        if s.sessions.end(&token) {
            info!("Ended session");
        }
    }

    let mut response = redirect_with_flash("/login/", Flash::success(LOGGED_OUT));
    response
        .headers_mut()
        .append(header::SET_COOKIE, clear_cookie(SESSION_COOKIE));
    response
}

/// GET /logout/
pub async fn get_logout() -> Response {
    Redirect::to("/").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_next() {
        assert_eq!(safe_next(Some("/schedule/")), Some("/schedule/"));
        assert_eq!(safe_next(Some("//evil.example")), None);
        assert_eq!(safe_next(Some("/\\evil.example")), None);
        assert_eq!(safe_next(Some("https://evil.example")), None);
        assert_eq!(safe_next(None), None);
    }
}
