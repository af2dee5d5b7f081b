//! Per-request identity.
//!
//! The session layer in front of this service resolves login cookies and
//! forwards the staff user id in an `X-Staff-User` header. The extractor
//! turns that id into an [`AccessContext`] through the store, so every
//! handler receives a fully resolved caller and never touches headers
//! itself.

use crate::AppState;
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use clinica_core::{AccessContext, ClinicError};
use serde_json::json;

pub const STAFF_HEADER: &str = "x-staff-user";

/// The authenticated caller.
#[derive(Debug, Clone, Copy)]
pub struct Identity(pub AccessContext);

pub struct Unauthorized(&'static str);

impl IntoResponse for Unauthorized {
    fn into_response(self) -> Response {
        (StatusCode::UNAUTHORIZED, Json(json!({ "error": self.0 }))).into_response()
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Identity {
    type Rejection = Unauthorized;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user_id: i64 = parts
            .headers
            .get(STAFF_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .ok_or(Unauthorized("missing or malformed X-Staff-User header"))?;

        match state.store.access_context(user_id) {
            Ok(ctx) => Ok(Identity(ctx)),
            Err(ClinicError::NotFound { .. }) => Err(Unauthorized("unknown staff user")),
            Err(e) => {
                tracing::error!(error = %e, "identity resolution failed");
                Err(Unauthorized("identity resolution failed"))
            }
        }
    }
}
