use std::sync::Mutex;

use async_trait::async_trait;
use time::{Duration, OffsetDateTime};

use crate::users::repo::{RepoError, RepoResult, UserStore};
use crate::users::repo_types::{
    NewUser, User, UserPage, UserPatch, UserQuery, UserStats, UserStatus, PAID_PLANS,
    STATS_WINDOW_DAYS,
};

/// `UserStore` held in a `Vec`, same ordering and matching rules as Postgres.
#[derive(Default)]
pub struct MemoryUserStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    rows: Vec<User>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts with an explicit creation time so ordering can be controlled.
    pub fn insert_at(&self, new_user: NewUser, created_at: OffsetDateTime) -> RepoResult<User> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        if inner.rows.iter().any(|u| u.email == new_user.email) {
            return Err(RepoError::EmailTaken);
        }
        inner.next_id += 1;
        let user = User {
            id: inner.next_id,
            name: new_user.name,
            email: new_user.email,
            password_hash: new_user.password_hash,
            status: new_user.status,
            role: new_user.role,
            subscription_plan: new_user.subscription_plan,
            plan_valid_until: None,
            reference: None,
            created_at,
            updated_at: created_at,
            last_active: Some(created_at),
            phone: None,
            avatar_url: None,
            is_email_verified: new_user.is_email_verified,
        };
        inner.rows.push(user.clone());
        Ok(user)
    }
}

fn matches_term(user: &User, needle: &str) -> bool {
    user.name.to_lowercase().contains(needle)
        || user.email.to_lowercase().contains(needle)
        || user.id.to_string().contains(needle)
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, id: i64) -> RepoResult<User> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        inner
            .rows
            .iter()
            .find(|u| u.id == id)
            .cloned()
            .ok_or(RepoError::NotFound)
    }

    async fn find_by_email(&self, email: &str) -> RepoResult<User> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        inner
            .rows
            .iter()
            .find(|u| u.email == email)
            .cloned()
            .ok_or(RepoError::NotFound)
    }

    async fn search(&self, query: &UserQuery) -> RepoResult<UserPage> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        let needle = query.term.as_deref().map(str::to_lowercase);
        let mut hits: Vec<&User> = inner
            .rows
            .iter()
            .filter(|u| needle.as_deref().map_or(true, |n| matches_term(u, n)))
            .collect();
        hits.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        let total = hits.len() as i64;
        let rows = hits
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.limit as usize)
            .cloned()
            .collect();
        Ok(UserPage { rows, total })
    }

    async fn create(&self, new_user: NewUser) -> RepoResult<User> {
        self.insert_at(new_user, OffsetDateTime::now_utc())
    }

    async fn update(
        &self,
        id: i64,
        patch: &UserPatch,
        touch_last_active: bool,
    ) -> RepoResult<User> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        if let Some(email) = &patch.email {
            if inner.rows.iter().any(|u| u.id != id && &u.email == email) {
                return Err(RepoError::EmailTaken);
            }
        }
        let user = inner
            .rows
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or(RepoError::NotFound)?;

        if let Some(name) = &patch.name {
            user.name = name.clone();
        }
        if let Some(email) = &patch.email {
            user.email = email.clone();
        }
        if let Some(status) = patch.status {
            user.status = status;
        }
        if let Some(role) = patch.role {
            user.role = role;
        }
        if let Some(plan) = &patch.subscription_plan {
            user.subscription_plan = plan.clone();
        }
        if let Some(phone) = &patch.phone {
            user.phone = phone.clone();
        }
        if let Some(reference) = &patch.reference {
            user.reference = reference.clone();
        }
        if let Some(valid_until) = patch.plan_valid_until {
            user.plan_valid_until = valid_until;
        }

        let now = OffsetDateTime::now_utc().max(user.updated_at);
        user.updated_at = now;
        if touch_last_active {
            user.last_active = Some(now);
        }
        Ok(user.clone())
    }

    async fn touch_last_active(&self, id: i64) -> RepoResult<()> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        let user = inner
            .rows
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or(RepoError::NotFound)?;
        user.last_active = Some(OffsetDateTime::now_utc());
        Ok(())
    }

    async fn stats(&self) -> RepoResult<UserStats> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        let since = OffsetDateTime::now_utc() - Duration::days(STATS_WINDOW_DAYS);
        let count = |pred: &dyn Fn(&User) -> bool| {
            inner.rows.iter().filter(|u| pred(u)).count() as i64
        };
        Ok(UserStats {
            total_users: inner.rows.len() as i64,
            active_users: count(&|u| u.last_active.is_some_and(|t| t >= since)),
            active_accounts: count(&|u| u.status == UserStatus::Active),
            active_subscriptions: count(&|u| {
                PAID_PLANS.contains(&u.subscription_plan.as_str())
            }),
            new_users: count(&|u| u.created_at >= since),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::repo_types::UserRole;

    fn seed(store: &MemoryUserStore, name: &str, email: &str, minutes_ago: i64) -> User {
        store
            .insert_at(
                NewUser::new(name, email, "hash"),
                OffsetDateTime::now_utc() - Duration::minutes(minutes_ago),
            )
            .expect("insert")
    }

    #[tokio::test]
    async fn search_orders_newest_first_with_stable_ties() {
        let store = MemoryUserStore::new();
        let at = OffsetDateTime::now_utc();
        let a = store.insert_at(NewUser::new("A", "a@x.com", "h"), at).unwrap();
        let b = store.insert_at(NewUser::new("B", "b@x.com", "h"), at).unwrap();
        let c = seed(&store, "C", "c@x.com", -5);

        let page = store
            .search(&UserQuery { term: None, page: 1, limit: 10 })
            .await
            .unwrap();
        let ids: Vec<i64> = page.rows.iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![c.id, a.id, b.id]);
        assert_eq!(page.total, 3);
    }

    #[tokio::test]
    async fn search_matches_name_email_and_id_case_insensitively() {
        let store = MemoryUserStore::new();
        let alice = seed(&store, "Alice Example", "alice@x.com", 3);
        seed(&store, "Bob", "bob@y.org", 2);
        seed(&store, "Carol", "carol@ALICE.dev", 1);

        let q = |term: &str| UserQuery { term: Some(term.into()), page: 1, limit: 10 };
        let hits = store.search(&q("ALICE")).await.unwrap();
        assert_eq!(hits.total, 2);
        assert!(hits.rows.iter().any(|u| u.id == alice.id));

        let by_id = store.search(&q(&alice.id.to_string())).await.unwrap();
        assert!(by_id.rows.iter().any(|u| u.id == alice.id));

        let none = store.search(&q("zed")).await.unwrap();
        assert_eq!(none.total, 0);
        assert!(none.rows.is_empty());
    }

    #[tokio::test]
    async fn page_past_the_end_is_empty_with_total() {
        let store = MemoryUserStore::new();
        for i in 0..3 {
            seed(&store, &format!("u{i}"), &format!("u{i}@x.com"), i);
        }
        let page = store
            .search(&UserQuery { term: None, page: 5, limit: 2 })
            .await
            .unwrap();
        assert!(page.rows.is_empty());
        assert_eq!(page.total, 3);
    }

    #[tokio::test]
    async fn create_rejects_duplicate_email() {
        let store = MemoryUserStore::new();
        seed(&store, "A", "dup@x.com", 0);
        let err = store
            .create(NewUser::new("B", "dup@x.com", "h"))
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::EmailTaken));
    }

    #[tokio::test]
    async fn update_only_touches_supplied_fields() {
        let store = MemoryUserStore::new();
        let before = seed(&store, "Old", "old@x.com", 10);
        let patch = UserPatch {
            name: Some("New".into()),
            ..UserPatch::default()
        };
        let after = store.update(before.id, &patch, false).await.unwrap();
        assert_eq!(after.name, "New");
        assert_eq!(after.email, before.email);
        assert_eq!(after.status, before.status);
        assert_eq!(after.role, UserRole::User);
        assert_eq!(after.last_active, before.last_active);
        assert!(after.updated_at > before.updated_at);
        assert!(after.updated_at >= after.created_at);
    }

    #[tokio::test]
    async fn update_can_touch_last_active() {
        let store = MemoryUserStore::new();
        let before = seed(&store, "Old", "old@x.com", 10);
        let after = store
            .set_status(before.id, UserStatus::Suspended, true)
            .await
            .unwrap();
        assert_eq!(after.last_active, Some(after.updated_at));
    }

    #[tokio::test]
    async fn update_missing_user_is_not_found() {
        let store = MemoryUserStore::new();
        let err = store
            .set_status(42, UserStatus::Suspended, false)
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::NotFound));
    }

    #[tokio::test]
    async fn stats_count_activity_status_plans_and_signups() {
        let store = MemoryUserStore::new();
        let a = seed(&store, "A", "a@x.com", 0);
        let b = seed(&store, "B", "b@x.com", 0);
        seed(&store, "C", "c@x.com", 60 * 24 * 40);
        store
            .update(
                a.id,
                &UserPatch {
                    subscription_plan: Some("Premium".into()),
                    ..UserPatch::default()
                },
                false,
            )
            .await
            .unwrap();
        store.set_status(b.id, UserStatus::Suspended, false).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_users, 3);
        assert_eq!(stats.active_users, 2);
        assert_eq!(stats.active_accounts, 2);
        assert_eq!(stats.active_subscriptions, 1);
        assert_eq!(stats.new_users, 2);
    }
}
