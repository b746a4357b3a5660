//! HTTP API layer with Axum routes and middleware.
//!
//! This crate provides:
//! - REST API routes for reading posts and replies and voting on them
//! - Authentication middleware
//! - Request extractors
//! - Error responses

pub mod error;
pub mod middleware;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use sea_orm::DatabaseConnection;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use agora_core::voting::VoteLedger;
use agora_db::VoteRepository;
use agora_shared::JwtService;

pub use error::ApiError;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: Arc<DatabaseConnection>,
    /// JWT service for token operations.
    pub jwt_service: Arc<JwtService>,
    /// Vote ledger backed by the database.
    pub ledger: Arc<VoteLedger<VoteRepository>>,
}

impl AppState {
    /// Builds the state once at startup.
    #[must_use]
    pub fn new(db: DatabaseConnection, jwt_service: JwtService, storage_timeout: Duration) -> Self {
        let ledger = VoteLedger::new(Arc::new(VoteRepository::new(db.clone())), storage_timeout);
        Self {
            db: Arc::new(db),
            jwt_service: Arc::new(jwt_service),
            ledger: Arc::new(ledger),
        }
    }
}

/// Creates the main application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes_with_state(state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::time::Duration;

    use axum::{
        body::Body,
        http::{Request, Response, header::AUTHORIZATION},
    };
    use chrono::Utc;
    use http_body_util::BodyExt;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use sea_orm::DatabaseConnection;
    use tower::ServiceExt;

    use agora_shared::config::JwtConfig;
    use agora_shared::types::UserId;
    use agora_shared::{Claims, JwtService};

    use crate::{AppState, create_router};

    const SECRET: &str = "test-secret";

    /// State over `db` with a short storage timeout.
    pub fn state_with(db: DatabaseConnection) -> AppState {
        let jwt = JwtService::new(&JwtConfig {
            secret: SECRET.to_string(),
            access_token_expiry_secs: 900,
        });
        AppState::new(db, jwt, Duration::from_secs(1))
    }

    /// State whose database is unreachable.
    pub fn offline_state() -> AppState {
        state_with(DatabaseConnection::Disconnected)
    }

    pub fn token(state: &AppState) -> String {
        state
            .jwt_service
            .generate_access_token(UserId::new(), "tester")
            .expect("should generate token")
    }

    /// A correctly signed token that expired well past the validation leeway.
    pub fn expired_token() -> String {
        let claims = Claims::new(
            UserId::new(),
            "tester",
            Utc::now() - chrono::Duration::minutes(5),
        );
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .expect("should encode token")
    }

    pub async fn send(
        state: AppState,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<&str>,
    ) -> (Response<Body>, serde_json::Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => request
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = create_router(state).oneshot(request).await.unwrap();
        let (parts, body) = response.into_parts();
        let bytes = body.collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (Response::from_parts(parts, Body::empty()), json)
    }
}
