use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::debug;

use crate::users::repo_types::{
    NewUser, User, UserPage, UserPatch, UserQuery, UserStats, UserStatus, PAID_PLANS,
    STATS_WINDOW_DAYS,
};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("user not found")]
    NotFound,
    #[error("email already registered")]
    EmailTaken,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub type RepoResult<T> = Result<T, RepoError>;

/// Persistence contract for the `users` table.
///
/// Every mutating call refreshes `updated_at`. When `touch_last_active` is set
/// the same statement also bumps `last_active`.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: i64) -> RepoResult<User>;

    /// Exact match on the stored (normalised) email.
    async fn find_by_email(&self, email: &str) -> RepoResult<User>;

    /// Case-insensitive substring search over name, email and the decimal id,
    /// newest first. `total` counts every match, not only the returned page.
    async fn search(&self, query: &UserQuery) -> RepoResult<UserPage>;

    async fn create(&self, new_user: NewUser) -> RepoResult<User>;

    /// Applies the fields present in `patch`. Admin mutations pass
    /// `AppConfig::last_active_on_update` as `touch_last_active`; it is off by
    /// default and `LAST_ACTIVE_ON_UPDATE=true` bumps `last_active` on every
    /// mutation.
    async fn update(
        &self,
        id: i64,
        patch: &UserPatch,
        touch_last_active: bool,
    ) -> RepoResult<User>;

    async fn set_status(
        &self,
        id: i64,
        status: UserStatus,
        touch_last_active: bool,
    ) -> RepoResult<User> {
        self.update(id, &UserPatch::status(status), touch_last_active)
            .await
    }

    /// Records activity by the user themselves (login).
    async fn touch_last_active(&self, id: i64) -> RepoResult<()>;

    async fn stats(&self) -> RepoResult<UserStats>;
}

const USER_COLUMNS: &str = "id, name, email, password_hash, status, role, subscription_plan, \
    plan_valid_until, reference, created_at, updated_at, last_active, phone, avatar_url, \
    is_email_verified";

/// Escapes LIKE metacharacters and wraps the term for substring matching.
pub fn like_pattern(term: &str) -> String {
    let mut out = String::with_capacity(term.len() + 2);
    out.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

fn map_unique_violation(err: sqlx::Error) -> RepoError {
    if let Some(db_err) = err.as_database_error() {
        if db_err.code().as_deref() == Some("23505") {
            return RepoError::EmailTaken;
        }
    }
    RepoError::Database(err)
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    fn push_search_filter(qb: &mut QueryBuilder<'_, Postgres>, term: Option<&str>) {
        if let Some(term) = term {
            let pattern = like_pattern(term);
            qb.push(" WHERE (name ILIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\' OR email ILIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\' OR CAST(id AS TEXT) LIKE ")
                .push_bind(pattern)
                .push(" ESCAPE '\\')");
        }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_id(&self, id: i64) -> RepoResult<User> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or(RepoError::NotFound)
    }

    async fn find_by_email(&self, email: &str) -> RepoResult<User> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.db)
            .await?
            .ok_or(RepoError::NotFound)
    }

    async fn search(&self, query: &UserQuery) -> RepoResult<UserPage> {
        let term = query.term.as_deref();

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM users");
        Self::push_search_filter(&mut count, term);
        let total = count.build_query_scalar::<i64>().fetch_one(&self.db).await?;

        let mut rows =
            QueryBuilder::<Postgres>::new(format!("SELECT {USER_COLUMNS} FROM users"));
        Self::push_search_filter(&mut rows, term);
        rows.push(" ORDER BY created_at DESC, id ASC LIMIT ")
            .push_bind(i64::from(query.limit))
            .push(" OFFSET ")
            .push_bind(query.offset());
        let rows = rows.build_query_as::<User>().fetch_all(&self.db).await?;

        debug!(total, returned = rows.len(), page = query.page, "user search");
        Ok(UserPage { rows, total })
    }

    async fn create(&self, new_user: NewUser) -> RepoResult<User> {
        let sql = format!(
            r#"
            INSERT INTO users
                (name, email, password_hash, status, role, subscription_plan, is_email_verified)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {USER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(&new_user.name)
            .bind(&new_user.email)
            .bind(&new_user.password_hash)
            .bind(new_user.status)
            .bind(new_user.role)
            .bind(&new_user.subscription_plan)
            .bind(new_user.is_email_verified)
            .fetch_one(&self.db)
            .await
            .map_err(map_unique_violation)
    }

    async fn update(
        &self,
        id: i64,
        patch: &UserPatch,
        touch_last_active: bool,
    ) -> RepoResult<User> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE users SET updated_at = now()");
        if touch_last_active {
            qb.push(", last_active = now()");
        }
        if let Some(name) = &patch.name {
            qb.push(", name = ").push_bind(name.clone());
        }
        if let Some(email) = &patch.email {
            qb.push(", email = ").push_bind(email.clone());
        }
        if let Some(status) = patch.status {
            qb.push(", status = ").push_bind(status);
        }
        if let Some(role) = patch.role {
            qb.push(", role = ").push_bind(role);
        }
        if let Some(plan) = &patch.subscription_plan {
            qb.push(", subscription_plan = ").push_bind(plan.clone());
        }
        if let Some(phone) = &patch.phone {
            qb.push(", phone = ").push_bind(phone.clone());
        }
        if let Some(reference) = &patch.reference {
            qb.push(", reference = ").push_bind(reference.clone());
        }
        if let Some(valid_until) = patch.plan_valid_until {
            qb.push(", plan_valid_until = ").push_bind(valid_until);
        }
        qb.push(" WHERE id = ")
            .push_bind(id)
            .push(format!(" RETURNING {USER_COLUMNS}"));

        qb.build_query_as::<User>()
            .fetch_optional(&self.db)
            .await
            .map_err(map_unique_violation)?
            .ok_or(RepoError::NotFound)
    }

    async fn touch_last_active(&self, id: i64) -> RepoResult<()> {
        let done = sqlx::query("UPDATE users SET last_active = now() WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        if done.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn stats(&self) -> RepoResult<UserStats> {
        let since = OffsetDateTime::now_utc() - Duration::days(STATS_WINDOW_DAYS);
        let (total_users, active_users, active_accounts, active_subscriptions, new_users) =
            sqlx::query_as::<_, (i64, i64, i64, i64, i64)>(
                r#"
                SELECT
                    COUNT(*),
                    COUNT(*) FILTER (WHERE last_active >= $2),
                    COUNT(*) FILTER (WHERE status = 'active'),
                    COUNT(*) FILTER (WHERE subscription_plan = ANY($1)),
                    COUNT(*) FILTER (WHERE created_at >= $2)
                FROM users
                "#,
            )
            .bind(PAID_PLANS.iter().map(|p| p.to_string()).collect::<Vec<_>>())
            .bind(since)
            .fetch_one(&self.db)
            .await?;
        Ok(UserStats {
            total_users,
            active_users,
            active_accounts,
            active_subscriptions,
            new_users,
        })
    }
}
