use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

use crate::users::repo_types::{NewUser, UniqueField, User, UserChanges};

#[derive(Debug, Error)]
pub enum RepoError {
    /// A unique index rejected the write.
    #[error("unique constraint violated on {}", .0.column())]
    Conflict(UniqueField),
    #[error("corrupt user row: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type RepoResult<T> = Result<T, RepoError>;

/// Source of per-request transactions over the `users` table.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn begin(&self) -> RepoResult<Box<dyn UserTx>>;
}

/// One open transaction. Dropping it without `commit` rolls back.
#[async_trait]
pub trait UserTx: Send {
    async fn insert(&mut self, user: &NewUser, now: OffsetDateTime) -> RepoResult<User>;

    async fn find_by_id(&mut self, id: i64) -> RepoResult<Option<User>>;

    async fn find_by_field(&mut self, field: UniqueField, value: &str) -> RepoResult<Option<User>>;

    /// Ordered by id ascending.
    async fn list_page(&mut self, skip: i64, limit: i64) -> RepoResult<Vec<User>>;

    /// Returns `None` when no row has `id`.
    async fn update_fields(
        &mut self,
        id: i64,
        changes: &UserChanges,
        now: OffsetDateTime,
    ) -> RepoResult<Option<User>>;

    /// Returns whether a row was removed.
    async fn delete(&mut self, id: i64) -> RepoResult<bool>;

    async fn commit(self: Box<Self>) -> RepoResult<()>;
}
