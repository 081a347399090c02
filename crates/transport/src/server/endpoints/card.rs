use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension,
};
use serde_json::json;
use tracing::info;

use crate::card::QR_CODE_DIR;
use crate::identity::Capability;
use crate::server::middleware::CurrentUser;
use crate::server::types::{error_to_response, render_page, ApiErrorType};
use crate::server::util::blocking;
use crate::types::AppState;

fn png_response(bytes: Vec<u8>, cache_control: &'static str) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/png"),
            (header::CACHE_CONTROL, cache_control),
        ],
        bytes,
    )
        .into_response()
}

/// GET /card-generation/
/// A QR of the user's ID number, drawn per request and never stored.
pub async fn get_card_preview(
    State(s): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Response {
    info!(user_id = user.id, "GET /card-generation/");

    let state = s.clone();
    match blocking(move || state.cards.render_inline(&user)).await {
        Ok(png) => png_response(png, "no-store"),
        Err(e) => error_to_response(e),
    }
}

/// GET /generate-card/
pub async fn get_generate_card(
    State(s): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    headers: HeaderMap,
) -> Response {
    info!(user_id = user.id, "GET /generate-card/");

    let state = s.clone();
    let owner = user.clone();
    match blocking(move || state.cards.get_or_issue(&owner)).await {
        Ok(card) => render_page(
            "card_generation",
            &headers,
            json!({
                "user": user,
                "qr_code_url": card.qr_code_url(),
                "card": card,
            }),
        ),
        Err(e) => error_to_response(e),
    }
}

/// GET /media/qr_codes/:file_name
/// Stored card images are visible to their owner and to admins.
pub async fn get_card_image(
    State(s): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(file_name): Path<String>,
) -> Response {
    info!(user_id = user.id, "GET /media/{QR_CODE_DIR}/{file_name}");

    let state = s.clone();
    let result = blocking(move || {
        if !user.has_capability(Capability::FullAccess) {
            let own = state.cards.card_for(&user)?;
            let expected = format!("{QR_CODE_DIR}/{file_name}");
            if own.and_then(|c| c.qr_code).as_deref() != Some(expected.as_str()) {
                return Ok(None);
            }
        }
        state.cards.read_image(&file_name)
    })
    .await;

    match result {
        Ok(Some(png)) => png_response(png, "private, max-age=300"),
        // Someone else's card looks the same as a missing one.
        Ok(None) => ApiErrorType::from((StatusCode::NOT_FOUND, "Image not found", None)).into_response(),
        Err(e) => error_to_response(e),
    }
}
