use time::OffsetDateTime;
use tracing::{info, warn};

use crate::error::AppError;
use crate::users::{
    repo::UserStore,
    repo_types::{NewUser, UniqueField, User, UserChanges},
};

/// Creates a user after checking username, then email, for collisions.
/// The unique indexes still guard the insert if a concurrent request wins.
pub async fn create_user(store: &dyn UserStore, input: NewUser) -> Result<User, AppError> {
    let mut tx = store.begin().await?;

    if tx
        .find_by_field(UniqueField::Username, &input.username)
        .await?
        .is_some()
    {
        warn!(username = %input.username, "username already taken");
        return Err(AppError::DuplicateUsername);
    }
    if tx
        .find_by_field(UniqueField::Email, &input.email)
        .await?
        .is_some()
    {
        warn!(email = %input.email, "email already taken");
        return Err(AppError::DuplicateEmail);
    }

    let user = tx.insert(&input, OffsetDateTime::now_utc()).await?;
    tx.commit().await?;
    info!(user_id = user.id, username = %user.username, "user created");
    Ok(user)
}

pub async fn list_users(store: &dyn UserStore, skip: i64, limit: i64) -> Result<Vec<User>, AppError> {
    let mut tx = store.begin().await?;
    let users = tx.list_page(skip, limit).await?;
    tx.commit().await?;
    info!(skip, limit, count = users.len(), "users listed");
    Ok(users)
}

pub async fn get_user(store: &dyn UserStore, id: i64) -> Result<User, AppError> {
    let mut tx = store.begin().await?;
    let user = tx.find_by_id(id).await?;
    tx.commit().await?;
    user.ok_or_else(|| {
        warn!(user_id = id, "user not found");
        AppError::NotFound
    })
}

/// Applies only the supplied fields and refreshes `updated_at`.
pub async fn update_user(
    store: &dyn UserStore,
    id: i64,
    changes: UserChanges,
) -> Result<User, AppError> {
    let mut tx = store.begin().await?;

    let Some(current) = tx.find_by_id(id).await? else {
        warn!(user_id = id, "update of missing user");
        return Err(AppError::NotFound);
    };

    for (field, wanted) in [
        (UniqueField::Username, changes.username.as_deref()),
        (UniqueField::Email, changes.email.as_deref()),
    ] {
        let Some(wanted) = wanted else { continue };
        if wanted == field.value_of(&current) {
            continue;
        }
        if let Some(owner) = tx.find_by_field(field, wanted).await? {
            if owner.id != id {
                warn!(user_id = id, field = field.column(), value = %wanted, "value already taken");
                return Err(match field {
                    UniqueField::Username => AppError::DuplicateUsername,
                    UniqueField::Email => AppError::DuplicateEmail,
                });
            }
        }
    }

    let user = tx
        .update_fields(id, &changes, OffsetDateTime::now_utc())
        .await?
        .ok_or(AppError::NotFound)?;
    tx.commit().await?;
    info!(user_id = id, "user updated");
    Ok(user)
}

pub async fn delete_user(store: &dyn UserStore, id: i64) -> Result<(), AppError> {
    let mut tx = store.begin().await?;
    if !tx.delete(id).await? {
        warn!(user_id = id, "delete of missing user");
        return Err(AppError::NotFound);
    }
    tx.commit().await?;
    info!(user_id = id, "user deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::users::memory_repo::InMemoryUserStore;
    use crate::users::repo::{RepoResult, UserTx};
    use crate::users::repo_types::Role;

    /// Store whose lookups by unique field never match, so only the
    /// storage constraint can catch a collision.
    struct UncheckedStore(InMemoryUserStore);

    struct UncheckedTx(Box<dyn UserTx>);

    #[async_trait]
    impl UserStore for UncheckedStore {
        async fn begin(&self) -> RepoResult<Box<dyn UserTx>> {
            Ok(Box::new(UncheckedTx(self.0.begin().await?)))
        }
    }

    #[async_trait]
    impl UserTx for UncheckedTx {
        async fn insert(&mut self, user: &NewUser, now: OffsetDateTime) -> RepoResult<User> {
            self.0.insert(user, now).await
        }

        async fn find_by_id(&mut self, id: i64) -> RepoResult<Option<User>> {
            self.0.find_by_id(id).await
        }

        async fn find_by_field(&mut self, _: UniqueField, _: &str) -> RepoResult<Option<User>> {
            Ok(None)
        }

        async fn list_page(&mut self, skip: i64, limit: i64) -> RepoResult<Vec<User>> {
            self.0.list_page(skip, limit).await
        }

        async fn update_fields(
            &mut self,
            id: i64,
            changes: &UserChanges,
            now: OffsetDateTime,
        ) -> RepoResult<Option<User>> {
            self.0.update_fields(id, changes, now).await
        }

        async fn delete(&mut self, id: i64) -> RepoResult<bool> {
            self.0.delete(id).await
        }

        async fn commit(self: Box<Self>) -> RepoResult<()> {
            self.0.commit().await
        }
    }

    fn input(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.into(),
            email: email.into(),
            first_name: Some("Original".into()),
            last_name: None,
            role: Role::User,
            active: true,
        }
    }

    #[tokio::test]
    async fn create_then_get_returns_same_record() {
        let store = InMemoryUserStore::new();
        let created = create_user(&store, input("testuser", "test@example.com")).await.unwrap();
        assert_eq!(created.created_at, created.updated_at);

        let fetched = get_user(&store, created.id).await.unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn create_reports_username_conflict_before_email() {
        let store = InMemoryUserStore::new();
        create_user(&store, input("duplicate", "dup@example.com")).await.unwrap();

        let err = create_user(&store, input("duplicate", "dup@example.com")).await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateUsername));

        let err = create_user(&store, input("fresh", "dup@example.com")).await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateEmail));

        assert_eq!(list_users(&store, 0, 100).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn partial_update_preserves_other_fields() {
        let store = InMemoryUserStore::new();
        let created = create_user(&store, input("partial_update", "partial@example.com"))
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let changes = UserChanges {
            first_name: Some(Some("New Name".into())),
            ..Default::default()
        };
        let updated = update_user(&store, created.id, changes).await.unwrap();

        assert_eq!(updated.first_name.as_deref(), Some("New Name"));
        assert_eq!(updated.username, created.username);
        assert_eq!(updated.email, created.email);
        assert_eq!(updated.role, created.role);
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at > created.updated_at);
    }

    #[tokio::test]
    async fn update_checks_uniqueness_against_other_users_only() {
        let store = InMemoryUserStore::new();
        create_user(&store, input("existing_user", "exist@example.com")).await.unwrap();
        let other = create_user(&store, input("another_user", "another@example.com"))
            .await
            .unwrap();

        let same = UserChanges {
            username: Some("another_user".into()),
            email: Some("another@example.com".into()),
            ..Default::default()
        };
        assert!(update_user(&store, other.id, same).await.is_ok());

        let steal_email = UserChanges {
            email: Some("exist@example.com".into()),
            ..Default::default()
        };
        let err = update_user(&store, other.id, steal_email).await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateEmail));

        let steal_both = UserChanges {
            username: Some("existing_user".into()),
            email: Some("exist@example.com".into()),
            ..Default::default()
        };
        let err = update_user(&store, other.id, steal_both).await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateUsername));
    }

    #[tokio::test]
    async fn storage_conflicts_map_to_duplicate_errors() {
        let store = UncheckedStore(InMemoryUserStore::new());
        create_user(&store, input("taken", "taken@example.com")).await.unwrap();
        let other = create_user(&store, input("other", "other@example.com")).await.unwrap();

        let err = create_user(&store, input("taken", "fresh@example.com")).await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateUsername));
        let err = create_user(&store, input("fresh", "taken@example.com")).await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateEmail));

        let rename = UserChanges {
            username: Some("taken".into()),
            ..Default::default()
        };
        let err = update_user(&store, other.id, rename).await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateUsername));
        let steal_email = UserChanges {
            email: Some("taken@example.com".into()),
            ..Default::default()
        };
        let err = update_user(&store, other.id, steal_email).await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateEmail));

        // failed writes rolled back
        let users = list_users(&store, 0, 100).await.unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[1].username, "other");
        assert_eq!(users[1].email, "other@example.com");
    }

    #[tokio::test]
    async fn missing_ids_are_not_found() {
        let store = InMemoryUserStore::new();
        assert!(matches!(get_user(&store, 999).await, Err(AppError::NotFound)));
        assert!(matches!(
            update_user(&store, 999, UserChanges::default()).await,
            Err(AppError::NotFound)
        ));
        assert!(matches!(delete_user(&store, 999).await, Err(AppError::NotFound)));
    }

    #[tokio::test]
    async fn delete_is_permanent() {
        let store = InMemoryUserStore::new();
        let created = create_user(&store, input("delete_me", "delete@example.com")).await.unwrap();
        delete_user(&store, created.id).await.unwrap();
        assert!(matches!(get_user(&store, created.id).await, Err(AppError::NotFound)));
        assert!(matches!(delete_user(&store, created.id).await, Err(AppError::NotFound)));

        // freed values can be reused
        create_user(&store, input("delete_me", "delete@example.com")).await.unwrap();
    }
}
