//! Authentication middleware for protected routes.

use axum::{
    Json,
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::AppState;
use agora_shared::types::UserId;
use agora_shared::{Claims, JwtError, JwtService};

/// Extracts the bearer token from the Authorization header.
fn extract_bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
}

fn unauthorized(error: &str, message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": error, "message": message })),
    )
        .into_response()
}

/// Validates the bearer token in `headers`, if there is one.
///
/// `Ok(None)` means the request carries no Authorization header. A header
/// that is present but malformed, expired or forged is rejected.
fn authenticate(jwt: &JwtService, headers: &HeaderMap) -> Result<Option<Claims>, Response> {
    let Some(header) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };

    let Some(token) = header.to_str().ok().and_then(extract_bearer_token) else {
        return Err(unauthorized(
            "invalid_token",
            "Authorization header must be a Bearer token",
        ));
    };

    match jwt.validate_token(token) {
        Ok(claims) => Ok(Some(claims)),
        Err(JwtError::Expired) => Err(unauthorized("token_expired", "Token has expired")),
        Err(_) => Err(unauthorized("invalid_token", "Invalid or malformed token")),
    }
}

/// Authentication middleware that validates JWT tokens.
///
/// This middleware:
/// 1. Extracts the Bearer token from the Authorization header
/// 2. Validates the token using the JWT service
/// 3. Stores the claims in request extensions for handlers to access
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    match authenticate(&state.jwt_service, request.headers()) {
        Ok(Some(claims)) => {
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Ok(None) => unauthorized(
            "missing_token",
            "Authorization header with Bearer token is required",
        ),
        Err(response) => response,
    }
}

/// Extractor for authenticated user claims.
///
/// Use this in handlers behind [`auth_middleware`]:
///
/// ```ignore
/// async fn handler(user: AuthUser) -> impl IntoResponse {
///     let user_id = user.user_id();
///     // ...
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthUser(pub Claims);

impl AuthUser {
    /// Returns the user ID from the claims.
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        self.0.user_id()
    }

    /// Returns the username from the claims.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.0.username
    }
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<serde_json::Value>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Claims>()
            .cloned()
            .map(AuthUser)
            .ok_or_else(|| {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({
                        "error": "unauthorized",
                        "message": "Authentication required"
                    })),
                )
            })
    }
}

/// Viewer identity on public routes.
///
/// Anonymous when the request has no Authorization header; an invalid token
/// is still rejected rather than silently treated as anonymous.
#[derive(Debug, Clone)]
pub struct OptionalAuthUser(pub Option<Claims>);

impl OptionalAuthUser {
    /// The viewer's user ID, if authenticated.
    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        self.0.as_ref().map(Claims::user_id)
    }
}

impl FromRequestParts<AppState> for OptionalAuthUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        authenticate(&state.jwt_service, &parts.headers).map(OptionalAuthUser)
    }
}
