//! `SeaORM` entity definitions.

pub mod prelude;

pub mod categories;
pub mod posts;
pub mod replies;
pub mod sea_orm_active_enums;
pub mod users;
pub mod votes;
