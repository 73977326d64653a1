use std::time::Duration;

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    auth::{password::hash_password, services::normalize_email},
    config::{BootstrapAdmin, DatabaseConfig},
    users::{
        repo::{RepoError, UserStore},
        repo_types::{NewUser, UserRole},
    },
};

const INITIAL_RETRY_DELAY_MS: u64 = 500;
const MAX_RETRY_DELAY_MS: u64 = 8_000;

/// Opens the pool, retrying with exponential backoff while the database comes up.
pub async fn connect(cfg: &DatabaseConfig) -> anyhow::Result<PgPool> {
    let options = PgPoolOptions::new()
        .max_connections(cfg.max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .test_before_acquire(true);

    let mut delay_ms = INITIAL_RETRY_DELAY_MS;
    let mut attempt = 0;
    loop {
        match options.clone().connect(&cfg.url).await {
            Ok(pool) => {
                if attempt > 0 {
                    info!(attempt, "database connection established after retry");
                }
                return Ok(pool);
            }
            Err(e) if attempt < cfg.connect_retries => {
                attempt += 1;
                warn!(
                    error = %e,
                    attempt,
                    max = cfg.connect_retries,
                    delay_ms,
                    "database connection failed, retrying"
                );
                sleep(Duration::from_millis(delay_ms)).await;
                delay_ms = (delay_ms * 2).min(MAX_RETRY_DELAY_MS);
            }
            Err(e) => {
                return Err(e).context(format!(
                    "connect to database after {} attempts",
                    attempt + 1
                ))
            }
        }
    }
}

pub async fn migrate(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("run database migrations")?;
    Ok(())
}

/// Creates the configured super admin unless an account with that email exists.
pub async fn ensure_bootstrap_admin(
    users: &dyn UserStore,
    admin: &BootstrapAdmin,
) -> anyhow::Result<()> {
    let email = normalize_email(&admin.email);
    match users.find_by_email(&email).await {
        Ok(existing) => {
            info!(user_id = existing.id, "bootstrap admin already present");
            return Ok(());
        }
        Err(RepoError::NotFound) => {}
        Err(e) => return Err(anyhow::Error::new(e).context("look up bootstrap admin")),
    }

    let mut new_user = NewUser::new(&admin.name, email, hash_password(&admin.password)?);
    new_user.role = UserRole::SuperAdmin;
    new_user.subscription_plan = "Enterprise".into();
    new_user.is_email_verified = true;

    match users.create(new_user).await {
        Ok(user) => {
            info!(user_id = user.id, email = %user.email, "bootstrap admin created");
            Ok(())
        }
        // Another instance won the race.
        Err(RepoError::EmailTaken) => Ok(()),
        Err(e) => Err(anyhow::Error::new(e).context("create bootstrap admin")),
    }
}
