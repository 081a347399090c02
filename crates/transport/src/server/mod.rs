use std::sync::Arc;

use axum::routing::{get, post};
use axum::{middleware as mw, Router};

use crate::server::endpoints::{account, admin, card, pages, schedule};
use crate::server::middleware::*;
use crate::types::AppState;

mod endpoints;
mod middleware;
mod session;
mod types;
mod util;

pub use session::{SessionKey, SessionStore};

/// Creates a router that can be used by `axum`.
///
/// # Parameters
/// - `app_state`: The app server state.
///
/// # Returns
/// The router.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    // Router whose endpoints need full access, checked after the session.
    let admin_router = Router::new()
        .route(
            "/admin/schedules/",
            get(schedule::get_admin_schedules).post(schedule::post_create_schedule),
        )
        .route("/admin/schedules/:id", post(schedule::post_update_schedule))
        .route(
            "/admin/schedules/:id/delete",
            post(schedule::post_delete_schedule),
        )
        .route("/admin-users/:id", post(admin::post_edit_user))
        .route("/admin-users/:id/delete", post(admin::post_delete_user))
        .layer(mw::from_fn(require_admin));

    // Router whose endpoints need a logged-in user
    let session_router = Router::new()
        .route("/profile/", get(pages::get_profile))
        .route("/card-generation/", get(card::get_card_preview))
        .route("/generate-card/", get(card::get_generate_card))
        .route("/schedule/", get(schedule::get_schedule_page))
        .route("/admin-users/", get(pages::get_admin_users))
        .route("/media/qr_codes/:file_name", get(card::get_card_image))
        .merge(admin_router)
        .layer(mw::from_fn_with_state(app_state.clone(), require_session));

    Router::new()
        .route("/", get(pages::get_home))
        .route(
            "/register/",
            get(account::get_register).post(account::post_register),
        )
        .route("/login/", get(account::get_login).post(account::post_login))
        .route(
            "/logout/",
            get(account::get_logout).post(account::post_logout),
        )
        .route("/staff-info/", get(pages::get_staff_info))
        .merge(session_router)
        .with_state(app_state)
}
