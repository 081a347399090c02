//! Account management for administrators.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Form, Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::error::ValidationError;
use crate::identity::{Role, UserUpdate};
use crate::server::types::error_to_response;
use crate::server::util::blocking;
use crate::types::AppState;

/// Submitted edit form. Absent fields are left alone.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UserEditForm {
    pub name: Option<String>,
    pub role: Option<String>,
    pub id_number: Option<String>,
    pub level: Option<String>,
    pub term: Option<String>,
    pub contact_information: Option<String>,
    pub is_active: Option<String>,
    pub is_admin: Option<String>,
    /// A new password; blank keeps the old one.
    pub password: Option<String>,
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim(), "1" | "on" | "true" | "yes")
}

impl UserEditForm {
    fn into_update(self) -> Result<(UserUpdate, Option<String>), ValidationError> {
        let role = self.role.map(|r| r.parse::<Role>()).transpose()?;
        let password = self.password.filter(|p| !p.is_empty());

        let update = UserUpdate {
            name: self.name,
            role,
            id_number: self.id_number,
            level: self.level,
            term: self.term,
            contact_information: self.contact_information,
            is_active: self.is_active.as_deref().map(parse_flag),
            is_admin: self.is_admin.as_deref().map(parse_flag),
        };
        Ok((update, password))
    }
}

/// POST /admin-users/:id
/// Applies the edit. A changed ID number re-issues an existing card so its
/// file name and payload follow.
pub async fn post_edit_user(
    State(s): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Form(form): Form<UserEditForm>,
) -> Response {
    info!("POST /admin-users/{}", id);

    let state = s.clone();
    let result = blocking(move || {
        let (update, password) = form.into_update()?;
        state.edit_user(id, update, password)
    })
    .await;

    match result {
        Ok((user, card)) => (StatusCode::OK, Json(json!({ "user": user, "card": card }))).into_response(),
        Err(e) => error_to_response(e),
    }
}

/// POST /admin-users/:id/delete
pub async fn post_delete_user(State(s): State<Arc<AppState>>, Path(id): Path<i64>) -> Response {
    info!("POST /admin-users/{}/delete", id);

    let state = s.clone();
    match blocking(move || state.delete_user(id)).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "deleted": id }))).into_response(),
        Err(e) => error_to_response(e),
    }
}
