//! Shared types, errors, and configuration for Agora.
//!
//! This crate provides common types used across all other crates:
//! - Typed IDs for users, categories, posts and replies
//! - Application-wide error types
//! - Configuration management
//! - JWT claims and token validation

pub mod auth;
pub mod config;
pub mod error;
pub mod jwt;
pub mod types;


pub use auth::Claims;
pub use config::AppConfig;
pub use error::AppError;
pub use jwt::{JwtError, JwtService};
