//! Request middleware and extractors.

pub mod auth;

pub use auth::{AuthUser, OptionalAuthUser, auth_middleware};
