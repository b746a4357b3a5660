//! Repository abstractions for data access.
//!
//! Repositories provide a clean interface for database operations,
//! hiding the `SeaORM` implementation details from the rest of the application.

pub mod forum;
pub mod vote;

pub use forum::ForumRepository;
pub use vote::VoteRepository;
