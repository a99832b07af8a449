//! Principal extraction from the headers set by the upstream auth layer.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use records_core::schema::Principal;
use serde_json::json;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const ROLE_ID_HEADER: &str = "x-role-id";
pub const PERMISSIONS_HEADER: &str = "x-permissions";

/// A request carrying a non-blank `x-user-id`.
#[derive(Debug, Clone)]
pub struct Authenticated(pub Principal);

#[derive(Debug)]
pub struct Unauthenticated;

impl IntoResponse for Unauthenticated {
    fn into_response(self) -> Response {
        (StatusCode::UNAUTHORIZED, Json(json!({ "error": "unauthenticated" }))).into_response()
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = Unauthenticated;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        principal_from_headers(&parts.headers)
            .map(Self)
            .ok_or(Unauthenticated)
    }
}

pub fn principal_from_headers(headers: &HeaderMap) -> Option<Principal> {
    let user_id = header(headers, USER_ID_HEADER).filter(|v| !v.is_empty())?;
    let role_id = header(headers, ROLE_ID_HEADER).unwrap_or_default();
    let permissions = header(headers, PERMISSIONS_HEADER)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Some(Principal {
        user_id,
        role_id,
        permissions,
    })
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
}
