pub mod auth;
pub mod blob;
pub mod error;
pub mod intake;
pub mod messages;
pub mod middleware;
pub mod password;
pub mod time;
pub mod token;
pub mod users;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, patch, post, put},
};

use crate::auth::AppState;
use crate::middleware::require_auth;

/// Builds the full API router. Registration and login are public; every
/// other route runs behind the auth layer.
pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(state.clone());

    let protected = Router::new()
        .route("/auth/logout", get(auth::logout))
        .route("/auth/me", get(auth::me))
        .route("/auth/check", get(auth::check))
        .route("/auth/update-profile", put(auth::update_profile))
        .route("/auth/update-profile-pic", put(auth::update_profile_pic))
        .route("/users", get(users::list_users))
        .route("/messages/send/{receiver_id}", post(messages::send_message))
        .route(
            "/messages/{id}",
            get(messages::get_messages).delete(messages::delete_message),
        )
        .route("/messages/{id}/read", patch(messages::mark_read))
        .layer(from_fn_with_state(state.clone(), require_auth))
        .with_state(state.clone());

    // Room for a full attachment batch plus form overhead.
    let body_limit =
        (state.uploads.max_file_bytes as usize) * state.uploads.max_files + 1024 * 1024;

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(DefaultBodyLimit::max(body_limit))
}
