//! Vote ledger repository for database operations.
//!
//! Implements the core voting traits over `SeaORM`. The repository is generic
//! over the connection: on a pool it serves reads and opens transactions, on
//! a transaction it is the ledger's unit of work.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sea_orm::prelude::Uuid;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait,
    QueryFilter, QuerySelect, RuntimeErr, Set, SqlErr, TransactionTrait, sqlx,
};
use tracing::warn;

use agora_core::voting::{
    TargetKind, VoteError, VoteRecord, VoteRepository as VoteRepoTrait, VoteStore, VoteTarget,
    VoteUnitOfWork, VoteValue,
};
use agora_shared::types::UserId;

use crate::entities::{posts, replies, sea_orm_active_enums::VoteTargetKind, votes};

/// `PostgreSQL` error codes that mean "try again later" rather than "wrong request":
/// query canceled (statement timeout), lock not available, serialization
/// failure, deadlock, admin shutdown.
const TRANSIENT_SQLSTATES: [&str; 5] = ["57014", "55P03", "40001", "40P01", "57P01"];

/// Vote repository implementation.
#[derive(Debug, Clone)]
pub struct VoteRepository<C = DatabaseConnection> {
    conn: C,
    // Row locks only make sense inside a transaction.
    for_update: bool,
}

impl VoteRepository {
    /// Create a new vote repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self {
            conn: db,
            for_update: false,
        }
    }
}

/// Whether `err` says the database could not be reached or did not answer
/// in time.
fn is_unavailable(err: &DbErr) -> bool {
    match err {
        DbErr::Conn(_) | DbErr::ConnectionAcquire(_) => true,
        DbErr::Exec(RuntimeErr::SqlxError(inner)) | DbErr::Query(RuntimeErr::SqlxError(inner)) => {
            match inner {
                sqlx::Error::Io(_)
                | sqlx::Error::Tls(_)
                | sqlx::Error::PoolTimedOut
                | sqlx::Error::PoolClosed
                | sqlx::Error::WorkerCrashed => true,
                other => other
                    .as_database_error()
                    .and_then(|db| db.code())
                    .is_some_and(|code| TRANSIENT_SQLSTATES.iter().any(|c| *c == code)),
            }
        }
        _ => false,
    }
}

fn storage_err(err: DbErr) -> VoteError {
    warn!(error = %err, "Vote storage error");
    if is_unavailable(&err) {
        VoteError::storage(err.to_string())
    } else {
        VoteError::internal(err.to_string())
    }
}

/// Error mapping for a write keyed by `(voter_id, target)`.
fn write_err(voter_id: UserId, target: VoteTarget) -> impl FnOnce(DbErr) -> VoteError {
    move |err| match err.sql_err() {
        // The only foreign key on `votes` is the voter.
        Some(SqlErr::ForeignKeyConstraintViolation(_)) => VoteError::UnknownVoter(voter_id),
        Some(SqlErr::UniqueConstraintViolation(_)) => VoteError::DuplicateVote { voter_id, target },
        _ => storage_err(err),
    }
}

fn key_filter(voter_id: UserId, target: VoteTarget) -> sea_orm::Condition {
    sea_orm::Condition::all()
        .add(votes::Column::VoterId.eq(voter_id.into_inner()))
        .add(votes::Column::TargetKind.eq(VoteTargetKind::from(target.kind)))
        .add(votes::Column::TargetId.eq(target.id))
}

fn to_domain(model: votes::Model) -> Result<VoteRecord, VoteError> {
    let value = VoteValue::try_from(model.value).map_err(|_| {
        VoteError::internal(format!("stored vote has invalid value {}", model.value))
    })?;

    Ok(VoteRecord {
        voter_id: UserId::from_uuid(model.voter_id),
        target: VoteTarget::new(model.target_kind.into(), model.target_id),
        value,
        cast_at: model.cast_at.with_timezone(&Utc),
    })
}

impl<C> VoteRepoTrait for VoteRepository<C>
where
    C: ConnectionTrait + Send + Sync,
{
    async fn find(
        &self,
        voter_id: UserId,
        target: VoteTarget,
    ) -> Result<Option<VoteRecord>, VoteError> {
        let mut query = votes::Entity::find().filter(key_filter(voter_id, target));
        if self.for_update {
            query = query.lock_exclusive();
        }

        query
            .one(&self.conn)
            .await
            .map_err(storage_err)?
            .map(to_domain)
            .transpose()
    }

    async fn insert(
        &self,
        voter_id: UserId,
        target: VoteTarget,
        value: VoteValue,
        cast_at: DateTime<Utc>,
    ) -> Result<VoteRecord, VoteError> {
        let active_model = votes::ActiveModel {
            voter_id: Set(voter_id.into_inner()),
            target_kind: Set(target.kind.into()),
            target_id: Set(target.id),
            value: Set(value.as_i16()),
            cast_at: Set(cast_at.into()),
        };

        // DO NOTHING keeps the transaction usable when another writer holds
        // the key, unlike a unique violation which would abort it.
        let inserted = votes::Entity::insert(active_model)
            .on_conflict(
                OnConflict::columns([
                    votes::Column::VoterId,
                    votes::Column::TargetKind,
                    votes::Column::TargetId,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(&self.conn)
            .await
            .map_err(write_err(voter_id, target))?;

        if inserted == 0 {
            return Err(VoteError::DuplicateVote { voter_id, target });
        }

        Ok(VoteRecord {
            voter_id,
            target,
            value,
            cast_at,
        })
    }

    async fn update_value(
        &self,
        record: &VoteRecord,
        value: VoteValue,
        cast_at: DateTime<Utc>,
    ) -> Result<VoteRecord, VoteError> {
        let result = votes::Entity::update_many()
            .col_expr(votes::Column::Value, Expr::value(value.as_i16()))
            .col_expr(
                votes::Column::CastAt,
                Expr::value(sea_orm::prelude::DateTimeWithTimeZone::from(cast_at)),
            )
            .filter(key_filter(record.voter_id, record.target))
            .exec(&self.conn)
            .await
            .map_err(storage_err)?;

        if result.rows_affected == 0 {
            return Err(VoteError::internal("vote record disappeared during update"));
        }

        Ok(VoteRecord {
            value,
            cast_at,
            ..record.clone()
        })
    }

    async fn delete(&self, record: &VoteRecord) -> Result<(), VoteError> {
        votes::Entity::delete_many()
            .filter(key_filter(record.voter_id, record.target))
            .exec(&self.conn)
            .await
            .map_err(storage_err)?;

        Ok(())
    }

    async fn sum_values(&self, target: VoteTarget) -> Result<i64, VoteError> {
        let total: Option<Option<i64>> = votes::Entity::find()
            .select_only()
            .column_as(Expr::col(votes::Column::Value).sum(), "total")
            .filter(votes::Column::TargetKind.eq(VoteTargetKind::from(target.kind)))
            .filter(votes::Column::TargetId.eq(target.id))
            .into_tuple()
            .one(&self.conn)
            .await
            .map_err(storage_err)?;

        Ok(total.flatten().unwrap_or(0))
    }

    async fn sum_values_by_target(
        &self,
        kind: TargetKind,
        ids: &[Uuid],
    ) -> Result<HashMap<Uuid, i64>, VoteError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let totals: Vec<(Uuid, Option<i64>)> = votes::Entity::find()
            .select_only()
            .column(votes::Column::TargetId)
            .column_as(Expr::col(votes::Column::Value).sum(), "total")
            .filter(votes::Column::TargetKind.eq(VoteTargetKind::from(kind)))
            .filter(votes::Column::TargetId.is_in(ids.iter().copied()))
            .group_by(votes::Column::TargetId)
            .into_tuple()
            .all(&self.conn)
            .await
            .map_err(storage_err)?;

        Ok(totals
            .into_iter()
            .map(|(id, total)| (id, total.unwrap_or(0)))
            .collect())
    }

    async fn find_by_voter(
        &self,
        voter_id: UserId,
        kind: TargetKind,
        ids: &[Uuid],
    ) -> Result<HashMap<Uuid, VoteValue>, VoteError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        votes::Entity::find()
            .filter(votes::Column::VoterId.eq(voter_id.into_inner()))
            .filter(votes::Column::TargetKind.eq(VoteTargetKind::from(kind)))
            .filter(votes::Column::TargetId.is_in(ids.iter().copied()))
            .all(&self.conn)
            .await
            .map_err(storage_err)?
            .into_iter()
            .map(|model| to_domain(model).map(|record| (record.target.id, record.value)))
            .collect()
    }

    async fn exists_target(&self, target: VoteTarget) -> Result<bool, VoteError> {
        // FOR SHARE inside a unit: a concurrent delete of the target waits
        // for our commit, so its trigger also removes the vote written here.
        let found: Option<Uuid> = match target.kind {
            TargetKind::Post => {
                let mut query = posts::Entity::find_by_id(target.id)
                    .select_only()
                    .column(posts::Column::Id);
                if self.for_update {
                    query = query.lock_shared();
                }
                query.into_tuple::<Uuid>().one(&self.conn).await
            }
            TargetKind::Reply => {
                let mut query = replies::Entity::find_by_id(target.id)
                    .select_only()
                    .column(replies::Column::Id);
                if self.for_update {
                    query = query.lock_shared();
                }
                query.into_tuple::<Uuid>().one(&self.conn).await
            }
        }
        .map_err(storage_err)?;

        Ok(found.is_some())
    }
}

impl VoteUnitOfWork for VoteRepository<DatabaseTransaction> {
    async fn commit(self) -> Result<(), VoteError> {
        self.conn.commit().await.map_err(storage_err)
    }
}

impl VoteStore for VoteRepository {
    type Unit = VoteRepository<DatabaseTransaction>;

    async fn begin(&self) -> Result<Self::Unit, VoteError> {
        let txn = self.conn.begin().await.map_err(storage_err)?;

        Ok(VoteRepository {
            conn: txn,
            for_update: true,
        })
    }
}
