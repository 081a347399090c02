//! Read-only page documents.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::db::UserFilter;
use crate::error::ValidationError;
use crate::identity::Role;
use crate::server::middleware::CurrentUser;
use crate::server::types::{error_to_response, render_page, ApiErrorType};
use crate::server::util::blocking;
use crate::types::AppState;

/// GET /
pub async fn get_home(headers: HeaderMap) -> Response {
    render_page(
        "home",
        &headers,
        json!({
            "title": "Campus Transport",
            "links": {
                "register": "/register/",
                "login": "/login/",
                "schedule": "/schedule/",
                "staff_info": "/staff-info/",
            },
        }),
    )
}

/// GET /profile/
pub async fn get_profile(
    State(s): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    headers: HeaderMap,
) -> Response {
    info!(user_id = user.id, "GET /profile/");

    let state = s.clone();
    let lookup = user.clone();
    match blocking(move || state.cards.card_for(&lookup)).await {
        Ok(card) => {
            let qr_code_url = card.as_ref().and_then(|c| c.qr_code_url());
            render_page(
                "profile",
                &headers,
                json!({
                    "user": user,
                    "card": card,
                    "qr_code_url": qr_code_url,
                }),
            )
        }
        Err(e) => error_to_response(e),
    }
}

/// GET /staff-info/
pub async fn get_staff_info(State(s): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    info!("GET /staff-info/");

    let state = s.clone();
    match blocking(move || state.identity.list_staff()).await {
        Ok(staff) => {
            let staff_members: Vec<_> = staff
                .into_iter()
                .map(|u| {
                    json!({
                        "name": u.name,
                        "email": u.email,
                        "role": u.role.label(),
                        "contact_information": u.contact_information,
                    })
                })
                .collect();
            render_page("staff_info", &headers, json!({ "staff_members": staff_members }))
        }
        Err(e) => error_to_response(e),
    }
}

/// Query string of the user list. Blank values mean "no filter".
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UserListQuery {
    pub q: Option<String>,
    pub role: Option<String>,
    pub level: Option<String>,
    pub term: Option<String>,
    pub is_admin: Option<String>,
}

impl UserListQuery {
    fn into_filter(self) -> Result<UserFilter, ValidationError> {
        fn present(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }

        let role = present(self.role).map(|r| r.parse::<Role>()).transpose()?;
        let is_admin = match present(self.is_admin).as_deref() {
            None => None,
            Some("1" | "true" | "yes") => Some(true),
            Some(_) => Some(false),
        };

        Ok(UserFilter {
            search: present(self.q),
            role,
            level: present(self.level),
            term: present(self.term),
            is_admin,
        })
    }
}

/// GET /admin-users/
pub async fn get_admin_users(
    State(s): State<Arc<AppState>>,
    Query(query): Query<UserListQuery>,
    headers: HeaderMap,
) -> Response {
    info!("GET /admin-users/");

    let filter = match query.into_filter() {
        Ok(filter) => filter,
        Err(e) => {
            return ApiErrorType::from((
                StatusCode::BAD_REQUEST,
                "Invalid filter",
                Some(e.to_string()),
            ))
            .into_response()
        }
    };

    let state = s.clone();
    match blocking(move || state.identity.list(&filter)).await {
        Ok(users) => render_page("admin_users", &headers, json!({ "users": users })),
        Err(e) => error_to_response(e),
    }
}
