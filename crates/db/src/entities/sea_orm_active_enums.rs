//! `SeaORM` active enums mapped to PostgreSQL enum types.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use agora_core::voting::TargetKind;

/// `vote_target_kind` enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "vote_target_kind")]
pub enum VoteTargetKind {
    /// Post.
    #[sea_orm(string_value = "post")]
    Post,
    /// Reply.
    #[sea_orm(string_value = "reply")]
    Reply,
}

impl From<TargetKind> for VoteTargetKind {
    fn from(kind: TargetKind) -> Self {
        match kind {
            TargetKind::Post => Self::Post,
            TargetKind::Reply => Self::Reply,
        }
    }
}

impl From<VoteTargetKind> for TargetKind {
    fn from(kind: VoteTargetKind) -> Self {
        match kind {
            VoteTargetKind::Post => Self::Post,
            VoteTargetKind::Reply => Self::Reply,
        }
    }
}
