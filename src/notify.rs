use async_trait::async_trait;
use tracing::info;

use crate::users::repo_types::User;

/// Outbound user notifications. Delivery (mail, SMS) lives outside this service.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_password_reset(&self, user: &User) -> anyhow::Result<()>;
}

/// Records the request in the log instead of delivering it.
#[derive(Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_password_reset(&self, user: &User) -> anyhow::Result<()> {
        info!(
            user_id = user.id,
            email = %user.email,
            "password reset requested; no mailer configured"
        );
        Ok(())
    }
}
