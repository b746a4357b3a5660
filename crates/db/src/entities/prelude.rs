//! Entity re-exports.

pub use super::categories::Entity as Categories;
pub use super::posts::Entity as Posts;
pub use super::replies::Entity as Replies;
pub use super::users::Entity as Users;
pub use super::votes::Entity as Votes;
