//! Core business logic for Agora.
//!
//! This crate contains pure business logic with ZERO web or database dependencies.
//! Storage is reached through the traits in [`voting`], implemented by the db crate.
//!
//! # Modules
//!
//! - `voting` - One-vote-per-user ledger for posts and replies

pub mod voting;
