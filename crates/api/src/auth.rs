//! Caller identity extractor.
//!
//! Authentication happens upstream; the identity provider forwards the
//! authenticated user in request headers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::{StoreId, UserId};
use orders::{Caller, Role};
use uuid::Uuid;

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";
pub const STORE_ID_HEADER: &str = "x-store-id";

/// Extractor that requires an authenticated caller.
///
/// Rejects with 401 when `x-user-id` is absent or any identity header is
/// malformed. A missing role means `customer`.
///
/// ```rust,ignore
/// async fn handler(RequireUser(caller): RequireUser) -> impl IntoResponse {
///     caller.user_id.to_string()
/// }
/// ```
pub struct RequireUser(pub Caller);

impl<S> FromRequestParts<S> for RequireUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header(parts, USER_ID_HEADER)
            .ok_or_else(|| ApiError::Unauthorized("Authentication required".to_string()))?;
        let user_id = parse_uuid(user_id, USER_ID_HEADER)?;

        let role = match header(parts, USER_ROLE_HEADER) {
            Some(value) => Role::parse(value).ok_or_else(|| {
                ApiError::Unauthorized(format!("Invalid {USER_ROLE_HEADER} header"))
            })?,
            None => Role::Customer,
        };

        let store_id = header(parts, STORE_ID_HEADER)
            .map(|value| parse_uuid(value, STORE_ID_HEADER))
            .transpose()?
            .map(StoreId::from_uuid);

        Ok(Self(Caller {
            user_id: UserId::from_uuid(user_id),
            role,
            store_id,
        }))
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn parse_uuid(value: &str, name: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(value).map_err(|_| ApiError::Unauthorized(format!("Invalid {name} header")))
}
