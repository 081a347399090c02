use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Form, Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::schedule::ScheduleForm;
use crate::server::types::{error_to_response, render_page};
use crate::server::util::blocking;
use crate::types::AppState;

/// GET /schedule/
/// All schedules, most recently updated first.
pub async fn get_schedule_page(State(s): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    info!("GET /schedule/");

    let state = s.clone();
    match blocking(move || state.schedules.list_all()).await {
        Ok(schedules) => render_page("schedule", &headers, json!({ "schedules": schedules })),
        Err(e) => error_to_response(e),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SearchQuery {
    pub q: String,
}

/// GET /admin/schedules/
/// Searches title and date; an empty query lists everything.
pub async fn get_admin_schedules(
    State(s): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Response {
    info!("GET /admin/schedules/?q={}", query.q);

    let state = s.clone();
    match blocking(move || state.schedules.search(&query.q)).await {
        Ok(schedules) => (StatusCode::OK, Json(schedules)).into_response(),
        Err(e) => error_to_response(e),
    }
}

/// POST /admin/schedules/
pub async fn post_create_schedule(
    State(s): State<Arc<AppState>>,
    Form(form): Form<ScheduleForm>,
) -> Response {
    info!("POST /admin/schedules/");

    let state = s.clone();
    let result = blocking(move || {
        let draft = form.parse()?;
        state.schedules.create(draft)
    })
    .await;

    match result {
        Ok(schedule) => (StatusCode::CREATED, Json(schedule)).into_response(),
        Err(e) => error_to_response(e),
    }
}

/// POST /admin/schedules/:id
pub async fn post_update_schedule(
    State(s): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Form(form): Form<ScheduleForm>,
) -> Response {
    info!("POST /admin/schedules/{}", id);

    let state = s.clone();
    let result = blocking(move || {
        let draft = form.parse()?;
        state.schedules.update(id, draft)
    })
    .await;

    match result {
        Ok(schedule) => (StatusCode::OK, Json(schedule)).into_response(),
        Err(e) => error_to_response(e),
    }
}

/// POST /admin/schedules/:id/delete
pub async fn post_delete_schedule(State(s): State<Arc<AppState>>, Path(id): Path<i64>) -> Response {
    info!("POST /admin/schedules/{}/delete", id);

    let state = s.clone();
    match blocking(move || state.schedules.delete(id)).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "deleted": id }))).into_response(),
        Err(e) => error_to_response(e),
    }
}
