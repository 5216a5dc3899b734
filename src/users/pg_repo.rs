use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use time::OffsetDateTime;
use tracing::debug;

use crate::users::{
    repo::{RepoError, RepoResult, UserStore, UserTx},
    repo_types::{NewUser, UniqueField, User, UserChanges, UserRow},
};

const USER_COLUMNS: &str =
    "id, username, email, first_name, last_name, role, active, created_at, updated_at";

fn select_sql(tail: &str) -> String {
    format!("SELECT {USER_COLUMNS} FROM users {tail}")
}

fn insert_sql() -> String {
    format!(
        "INSERT INTO users (username, email, first_name, last_name, role, active, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $7) RETURNING {USER_COLUMNS}"
    )
}

/// Postgres-backed store. Each `begin` checks a connection out of the pool.
#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn begin(&self) -> RepoResult<Box<dyn UserTx>> {
        let tx = self.db.begin().await?;
        Ok(Box::new(PgUserTx { tx }))
    }
}

pub struct PgUserTx {
    tx: Transaction<'static, Postgres>,
}

fn into_user(row: UserRow) -> RepoResult<User> {
    User::try_from(row).map_err(RepoError::Corrupt)
}

/// SQLSTATE 23505 on one of our unique indexes becomes a typed conflict.
fn map_write_err(e: sqlx::Error) -> RepoError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.code().as_deref() == Some("23505") {
            match db_err.constraint() {
                Some("users_username_key") => return RepoError::Conflict(UniqueField::Username),
                Some("users_email_key") => return RepoError::Conflict(UniqueField::Email),
                _ => {}
            }
        }
    }
    RepoError::Sqlx(e)
}

#[async_trait]
impl UserTx for PgUserTx {
    async fn insert(&mut self, user: &NewUser, now: OffsetDateTime) -> RepoResult<User> {
        let sql = insert_sql();
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(user.role.as_str())
            .bind(user.active)
            .bind(now)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(map_write_err)?;
        debug!(user_id = row.id, "user row inserted");
        into_user(row)
    }

    async fn find_by_id(&mut self, id: i64) -> RepoResult<Option<User>> {
        let sql = select_sql("WHERE id = $1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(into_user).transpose()
    }

    async fn find_by_field(&mut self, field: UniqueField, value: &str) -> RepoResult<Option<User>> {
        let sql = select_sql(&format!("WHERE {} = $1", field.column()));
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(value)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(into_user).transpose()
    }

    async fn list_page(&mut self, skip: i64, limit: i64) -> RepoResult<Vec<User>> {
        let sql = select_sql("ORDER BY id ASC LIMIT $1 OFFSET $2");
        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .bind(limit)
            .bind(skip)
            .fetch_all(&mut *self.tx)
            .await?;
        rows.into_iter().map(into_user).collect()
    }

    async fn update_fields(
        &mut self,
        id: i64,
        changes: &UserChanges,
        now: OffsetDateTime,
    ) -> RepoResult<Option<User>> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE users SET updated_at = ");
        qb.push_bind(now);
        if let Some(v) = &changes.username {
            qb.push(", username = ").push_bind(v.clone());
        }
        if let Some(v) = &changes.email {
            qb.push(", email = ").push_bind(v.clone());
        }
        if let Some(v) = &changes.first_name {
            qb.push(", first_name = ").push_bind(v.clone());
        }
        if let Some(v) = &changes.last_name {
            qb.push(", last_name = ").push_bind(v.clone());
        }
        if let Some(v) = changes.role {
            qb.push(", role = ").push_bind(v.as_str());
        }
        if let Some(v) = changes.active {
            qb.push(", active = ").push_bind(v);
        }
        qb.push(" WHERE id = ").push_bind(id);
        qb.push(" RETURNING ").push(USER_COLUMNS);

        let row = qb
            .build_query_as::<UserRow>()
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_write_err)?;
        row.map(into_user).transpose()
    }

    async fn delete(&mut self, id: i64) -> RepoResult<bool> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn commit(self: Box<Self>) -> RepoResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
