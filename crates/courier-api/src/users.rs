use axum::{Extension, Json, extract::State, response::IntoResponse};

use courier_types::api::Envelope;

use crate::auth::{AppState, to_public_user};
use crate::error::{ApiError, ApiResult, blocking};
use crate::middleware::AuthUser;

/// Directory listing: everyone except the caller, ordered by full name.
pub async fn list_users(
    State(state): State<AppState>,
    Extension(AuthUser(me)): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    let db = state.clone();
    let uid = me.id.to_string();
    let rows = blocking(move || db.db.list_users_except(&uid)).await?;

    if rows.is_empty() {
        return Err(ApiError::NotFound("No users found".into()));
    }

    let users = rows
        .into_iter()
        .map(to_public_user)
        .collect::<ApiResult<Vec<_>>>()?;

    Ok(Json(Envelope::ok("Users fetched successfully", users)))
}
