use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Multipart, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::IntoResponse,
};
use tracing::warn;
use uuid::Uuid;

use courier_db::{Database, is_unique_violation, models::UserRow};
use courier_types::api::{Envelope, LoginRequest, LoginResponse, RegisterRequest, UpdateProfileRequest};
use courier_types::models::PublicUser;

use crate::blob::{BlobClient, BlobStore};
use crate::error::{ApiError, ApiResult, blocking, join_error};
use crate::intake::{self, UploadPolicy};
use crate::middleware::AuthUser;
use crate::time;
use crate::token::TokenService;
use crate::password;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub tokens: TokenService,
    pub blobs: BlobClient,
    pub uploads: UploadPolicy,
}

/// Explicit row-to-public mapping: the password hash stays behind in the
/// row type and is never serialized outward.
pub(crate) fn to_public_user(row: UserRow) -> ApiResult<PublicUser> {
    Ok(PublicUser {
        id: row
            .id
            .parse()
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("corrupt user id '{}': {e}", row.id)))?,
        username: row.username,
        email: row.email,
        full_name: row.full_name,
        profile_pic_url: row.profile_pic_url,
        created_at: time::parse_timestamp(&row.created_at),
    })
}

fn required(field: Option<String>, name: &str) -> ApiResult<String> {
    field
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::Validation(format!("{name} is required")))
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    let username = required(req.username, "username")?.to_lowercase();
    let email = required(req.email, "email")?.to_lowercase();
    let full_name = required(req.full_name, "fullName")?;
    let password = required(req.password, "password")?;
    if password.len() < 6 {
        return Err(ApiError::Validation("Password must be at least 6 characters".into()));
    }

    let password_hash = password::hash_password(&password)?;
    let user_id = Uuid::new_v4().to_string();
    let now = time::now_string();

    let db = state.clone();
    let uid = user_id.clone();
    let row = tokio::task::spawn_blocking(move || -> ApiResult<UserRow> {
        // Email first so the reported reason names it when both collide.
        if db.db.get_user_by_email(&email)?.is_some() {
            return Err(ApiError::Conflict("Email already registered".into()));
        }
        if db.db.get_user_by_username(&username)?.is_some() {
            return Err(ApiError::Conflict("Username already taken".into()));
        }

        if let Err(e) = db.db.create_user(&uid, &username, &email, &full_name, &password_hash, &now) {
            // Lost a race with a concurrent registration.
            if is_unique_violation(&e) {
                return Err(ApiError::Conflict("Username or email already taken".into()));
            }
            return Err(e.into());
        }

        db.db
            .get_user_by_id(&uid)?
            .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("user vanished after insert")))
    })
    .await
    .map_err(join_error)??;

    Ok((
        StatusCode::CREATED,
        Json(Envelope::ok("User registered successfully", to_public_user(row)?)),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let identifier = req
        .username
        .or(req.email)
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::Validation("Username or email is required".into()))?;
    let password = req
        .password
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::Validation("Password is required".into()))?;

    let db = state.clone();
    let row = blocking(move || db.db.get_user_by_identifier(&identifier))
        .await?
        .ok_or_else(|| ApiError::NotFound("User does not exist".into()))?;

    if !password::verify_password(&password, &row.password)? {
        return Err(ApiError::Unauthenticated("Invalid credentials".into()));
    }

    let user = to_public_user(row)?;
    let token = state.tokens.issue(user.id)?;

    let mut headers = HeaderMap::new();
    headers.insert(header::SET_COOKIE, session_cookie(&token, state.tokens.lifetime_secs())?);

    Ok((
        headers,
        Json(Envelope::ok("User logged in successfully", LoginResponse { user, token })),
    ))
}

/// Logout is a client-side credential discard; the server only clears the
/// cookie. The token itself stays valid until it expires.
pub async fn logout() -> ApiResult<impl IntoResponse> {
    let mut headers = HeaderMap::new();
    headers.insert(header::SET_COOKIE, session_cookie("", 0)?);
    Ok((headers, Json(Envelope::ok_empty("User logged out successfully"))))
}

pub async fn me(Extension(AuthUser(user)): Extension<AuthUser>) -> impl IntoResponse {
    Json(Envelope::ok("User profile fetched", user))
}

pub async fn check(Extension(AuthUser(user)): Extension<AuthUser>) -> impl IntoResponse {
    Json(Envelope::ok("User is authenticated", user))
}

/// Partial profile update: only the provided fields change, and the
/// password column is never written here, so the stored hash survives every
/// profile save untouched.
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    Json(req): Json<UpdateProfileRequest>,
) -> ApiResult<impl IntoResponse> {
    let db = state.clone();
    let uid = user.id.to_string();
    let row = tokio::task::spawn_blocking(move || -> ApiResult<UserRow> {
        let row = db
            .db
            .get_user_by_id(&uid)?
            .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

        let username = req
            .username
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| row.username.clone());
        let email = req
            .email
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| row.email.clone());
        let full_name = req
            .full_name
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| row.full_name.clone());

        if email != row.email && db.db.get_user_by_email(&email)?.is_some() {
            return Err(ApiError::Conflict("Email already registered".into()));
        }
        if username != row.username && db.db.get_user_by_username(&username)?.is_some() {
            return Err(ApiError::Conflict("Username already taken".into()));
        }

        let now = time::now_string();
        if let Err(e) = db.db.update_user_profile(&row.id, &username, &email, &full_name, &now) {
            if is_unique_violation(&e) {
                return Err(ApiError::Conflict("Username or email already taken".into()));
            }
            return Err(e.into());
        }

        db.db
            .get_user_by_id(&row.id)?
            .ok_or_else(|| ApiError::NotFound("User not found".into()))
    })
    .await
    .map_err(join_error)??;

    Ok(Json(Envelope::ok("Profile updated successfully", to_public_user(row)?)))
}

pub async fn update_profile_pic(
    State(state): State<AppState>,
    Extension(AuthUser(user)): Extension<AuthUser>,
    multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let (_content, staged) = intake::stage_multipart(&state.uploads, multipart).await?;

    let mut files = staged.into_iter();
    let Some(file) = files.next() else {
        return Err(ApiError::Validation("Profile picture is required".into()));
    };
    // Single-file endpoint: drop any extras before uploading.
    let extras: Vec<_> = files.collect();
    if !extras.is_empty() {
        intake::discard(&extras).await;
    }

    let mut uploaded = intake::ingest(&state.blobs, vec![file]).await?;
    let attachment = uploaded
        .pop()
        .ok_or_else(|| ApiError::Upload("no resource returned".into()))?;

    let old_pic = user.profile_pic_url.clone();
    let db = state.clone();
    let uid = user.id.to_string();
    let url = attachment.url.clone();
    let row = tokio::task::spawn_blocking(move || -> ApiResult<UserRow> {
        let now = time::now_string();
        if !db.db.set_profile_pic(&uid, &url, &now)? {
            return Err(ApiError::NotFound("User not found".into()));
        }
        db.db
            .get_user_by_id(&uid)?
            .ok_or_else(|| ApiError::NotFound("User not found".into()))
    })
    .await
    .map_err(join_error)??;

    // Best-effort removal of the replaced picture; never fails the update.
    if let Some(old) = old_pic {
        if let Err(e) = state.blobs.delete(&old).await {
            warn!("Failed to delete previous profile picture {}: {:#}", old, e);
        }
    }

    Ok(Json(Envelope::ok("Profile picture updated successfully", to_public_user(row)?)))
}

fn session_cookie(token: &str, max_age: i64) -> ApiResult<HeaderValue> {
    HeaderValue::from_str(&format!(
        "token={token}; HttpOnly; Path=/; SameSite=Lax; Max-Age={max_age}"
    ))
    .map_err(|e| ApiError::Internal(anyhow::anyhow!("building session cookie: {e}")))
}
