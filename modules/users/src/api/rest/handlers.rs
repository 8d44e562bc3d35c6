use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, FromRequestParts, Path},
    http::{request::Parts, StatusCode},
    response::Json,
    Extension,
};
use dbkit::QueryCtx;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::api::rest::dto::{UserDto, UserReq};
use crate::api::rest::error::{ApiError, INVALID_BODY_MESSAGE, INVALID_ID_MESSAGE};
use crate::domain::service::Service;

/// Deadline for all backend work done on behalf of one request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Cancellation token of the connection a request arrived on.
///
/// The server inserts it into request extensions; it is cancelled when the
/// client goes away or the server gives up draining.
#[derive(Clone, Debug)]
pub struct RequestCancellation(pub CancellationToken);

/// Per-request [`QueryCtx`]: child of the inbound request's cancellation
/// token (when present) with [`REQUEST_TIMEOUT`]. Dropped, and so cancelled,
/// when the handler returns.
#[derive(Debug)]
pub struct RequestCtx(pub QueryCtx);

impl<S> FromRequestParts<S> for RequestCtx
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ctx = match parts.extensions.get::<RequestCancellation>() {
            Some(RequestCancellation(token)) => QueryCtx::child_of(token, REQUEST_TIMEOUT),
            None => QueryCtx::new(REQUEST_TIMEOUT),
        };
        Ok(Self(ctx))
    }
}

/// Path ids are plain decimal digits that fit in an `i64`.
pub fn parse_user_id(raw: &str) -> Result<i64, ApiError> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ApiError::bad_request(INVALID_ID_MESSAGE));
    }
    raw.parse::<i64>()
        .map_err(|_| ApiError::bad_request(INVALID_ID_MESSAGE))
}

// Bodies are decoded regardless of Content-Type. A body that could not be
// buffered (too large, read timed out) is reported like a malformed one.
fn decode_body(body: Result<Bytes, BytesRejection>) -> Result<UserReq, ApiError> {
    let body = body.map_err(|rejection| {
        tracing::debug!(error = %rejection.body_text(), "failed to read request body");
        ApiError::bad_request(INVALID_BODY_MESSAGE)
    })?;
    serde_json::from_slice(&body).map_err(|_| ApiError::bad_request(INVALID_BODY_MESSAGE))
}

/// List all users ordered by id
pub async fn list_users(
    Extension(svc): Extension<Arc<Service>>,
    RequestCtx(ctx): RequestCtx,
) -> Result<Json<Vec<UserDto>>, ApiError> {
    info!("Listing users");

    let users = svc.list_users(&ctx).await?;
    Ok(Json(users.into_iter().map(UserDto::from).collect()))
}

/// Get a specific user by ID
pub async fn get_user(
    Extension(svc): Extension<Arc<Service>>,
    RequestCtx(ctx): RequestCtx,
    Path(raw_id): Path<String>,
) -> Result<Json<UserDto>, ApiError> {
    let id = parse_user_id(&raw_id)?;
    info!("Getting user with id: {}", id);

    let user = svc.get_user(&ctx, id).await?;
    Ok(Json(UserDto::from(user)))
}

/// Create a new user
pub async fn create_user(
    Extension(svc): Extension<Arc<Service>>,
    RequestCtx(ctx): RequestCtx,
    body: Result<Bytes, BytesRejection>,
) -> Result<(StatusCode, Json<UserDto>), ApiError> {
    let req = decode_body(body)?;
    info!("Creating user: {:?}", req);

    let user = svc.create_user(&ctx, req.into()).await?;
    Ok((StatusCode::CREATED, Json(UserDto::from(user))))
}

/// Replace name and email of an existing user
pub async fn update_user(
    Extension(svc): Extension<Arc<Service>>,
    RequestCtx(ctx): RequestCtx,
    Path(raw_id): Path<String>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<UserDto>, ApiError> {
    let id = parse_user_id(&raw_id)?;
    let req = decode_body(body)?;
    info!("Updating user {} with: {:?}", id, req);

    let user = svc.update_user(&ctx, id, req.into()).await?;
    Ok(Json(UserDto::from(user)))
}

/// Delete a user by ID
pub async fn delete_user(
    Extension(svc): Extension<Arc<Service>>,
    RequestCtx(ctx): RequestCtx,
    Path(raw_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_user_id(&raw_id)?;
    info!("Deleting user: {}", id);

    svc.delete_user(&ctx, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Liveness probe; never touches the database.
pub async fn health() -> &'static str {
    "ok"
}
