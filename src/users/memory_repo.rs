use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::users::{
    repo::{RepoError, RepoResult, UserStore, UserTx},
    repo_types::{NewUser, UniqueField, User, UserChanges},
};

#[derive(Debug, Clone, Default)]
struct Table {
    last_id: i64,
    rows: BTreeMap<i64, User>,
}

impl Table {
    /// Mirrors the unique indexes on `users`; username is checked first.
    fn check_unique(&self, username: &str, email: &str, own_id: Option<i64>) -> RepoResult<()> {
        for field in [UniqueField::Username, UniqueField::Email] {
            let wanted = match field {
                UniqueField::Username => username,
                UniqueField::Email => email,
            };
            let taken = self
                .rows
                .values()
                .any(|u| Some(u.id) != own_id && field.value_of(u) == wanted);
            if taken {
                return Err(RepoError::Conflict(field));
            }
        }
        Ok(())
    }
}

/// In-process store. Transactions are serialized by a single lock and
/// write a working copy back only on commit.
#[derive(Clone, Default)]
pub struct InMemoryUserStore {
    table: Arc<Mutex<Table>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn begin(&self) -> RepoResult<Box<dyn UserTx>> {
        let guard = self.table.clone().lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemUserTx { guard, work }))
    }
}

pub struct MemUserTx {
    guard: OwnedMutexGuard<Table>,
    work: Table,
}

#[async_trait]
impl UserTx for MemUserTx {
    async fn insert(&mut self, user: &NewUser, now: OffsetDateTime) -> RepoResult<User> {
        self.work.check_unique(&user.username, &user.email, None)?;
        self.work.last_id += 1;
        let record = User {
            id: self.work.last_id,
            username: user.username.clone(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            role: user.role,
            active: user.active,
            created_at: now,
            updated_at: now,
        };
        self.work.rows.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_by_id(&mut self, id: i64) -> RepoResult<Option<User>> {
        Ok(self.work.rows.get(&id).cloned())
    }

    async fn find_by_field(&mut self, field: UniqueField, value: &str) -> RepoResult<Option<User>> {
        Ok(self
            .work
            .rows
            .values()
            .find(|u| field.value_of(u) == value)
            .cloned())
    }

    async fn list_page(&mut self, skip: i64, limit: i64) -> RepoResult<Vec<User>> {
        let skip = usize::try_from(skip).unwrap_or(0);
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(self
            .work
            .rows
            .values()
            .skip(skip)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn update_fields(
        &mut self,
        id: i64,
        changes: &UserChanges,
        now: OffsetDateTime,
    ) -> RepoResult<Option<User>> {
        let Some(mut updated) = self.work.rows.get(&id).cloned() else {
            return Ok(None);
        };
        changes.apply_to(&mut updated);
        updated.updated_at = now;
        self.work
            .check_unique(&updated.username, &updated.email, Some(id))?;
        self.work.rows.insert(id, updated.clone());
        Ok(Some(updated))
    }

    async fn delete(&mut self, id: i64) -> RepoResult<bool> {
        Ok(self.work.rows.remove(&id).is_some())
    }

    async fn commit(self: Box<Self>) -> RepoResult<()> {
        let MemUserTx { mut guard, work } = *self;
        *guard = work;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::repo_types::Role;

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.into(),
            email: email.into(),
            first_name: None,
            last_name: None,
            role: Role::User,
            active: true,
        }
    }

    #[tokio::test]
    async fn insert_assigns_sequential_ids_and_equal_timestamps() {
        let store = InMemoryUserStore::new();
        let mut tx = store.begin().await.unwrap();
        let now = OffsetDateTime::now_utc();
        let a = tx.insert(&new_user("alice", "alice@example.com"), now).await.unwrap();
        let b = tx.insert(&new_user("bob", "bob@example.com"), now).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!((a.id, b.id), (1, 2));
        assert_eq!(a.created_at, a.updated_at);
    }

    #[tokio::test]
    async fn duplicate_insert_reports_username_before_email() {
        let store = InMemoryUserStore::new();
        let mut tx = store.begin().await.unwrap();
        let now = OffsetDateTime::now_utc();
        tx.insert(&new_user("alice", "alice@example.com"), now).await.unwrap();

        let err = tx
            .insert(&new_user("alice", "alice@example.com"), now)
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::Conflict(UniqueField::Username)));

        let err = tx
            .insert(&new_user("alice2", "alice@example.com"), now)
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::Conflict(UniqueField::Email)));
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let store = InMemoryUserStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert(&new_user("ghost", "ghost@example.com"), OffsetDateTime::now_utc())
                .await
                .unwrap();
        }
        let mut tx = store.begin().await.unwrap();
        assert!(tx.list_page(0, 100).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_may_keep_own_username_but_not_take_another() {
        let store = InMemoryUserStore::new();
        let mut tx = store.begin().await.unwrap();
        let now = OffsetDateTime::now_utc();
        tx.insert(&new_user("existing_user", "exist@example.com"), now).await.unwrap();
        let other = tx.insert(&new_user("another_user", "another@example.com"), now).await.unwrap();

        let keep = UserChanges {
            username: Some("another_user".into()),
            ..Default::default()
        };
        assert!(tx.update_fields(other.id, &keep, now).await.unwrap().is_some());

        let steal = UserChanges {
            username: Some("existing_user".into()),
            ..Default::default()
        };
        let err = tx.update_fields(other.id, &steal, now).await.unwrap_err();
        assert!(matches!(err, RepoError::Conflict(UniqueField::Username)));

        assert!(tx.update_fields(999, &keep, now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_page_respects_skip_and_limit() {
        let store = InMemoryUserStore::new();
        let mut tx = store.begin().await.unwrap();
        let now = OffsetDateTime::now_utc();
        for i in 0..5 {
            tx.insert(&new_user(&format!("user{i}"), &format!("user{i}@example.com")), now)
                .await
                .unwrap();
        }
        let page = tx.list_page(1, 2).await.unwrap();
        let names: Vec<_> = page.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, ["user1", "user2"]);
        assert!(tx.list_page(10, 2).await.unwrap().is_empty());
    }
}
