use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use tracing::warn;

use crate::{
    error::AppError,
    state::AppState,
    users::{repo::RepoError, repo_types::User},
};

/// Authenticated principal holding an `admin` or `super_admin` role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

/// Token from `Authorization: Bearer <token>`; the scheme is case-insensitive.
pub(crate) fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Resolves a bearer token to its user row: missing, invalid, expired tokens and
/// tokens whose subject no longer exists are `Unauthorized`.
pub async fn authenticate(state: &AppState, token: &str) -> Result<User, AppError> {
    let claims = state.jwt.verify(token)?;
    match state.users.find_by_email(&claims.sub).await {
        Ok(user) => Ok(user),
        Err(RepoError::NotFound) => {
            warn!(subject = %claims.sub, "token subject no longer exists");
            Err(AppError::unauthorized("Could not validate credentials"))
        }
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let path = parts.uri.path().to_string();
        let token = bearer_token(parts).ok_or_else(|| {
            warn!(%path, "admin access denied: missing bearer token");
            AppError::unauthorized("Not authenticated")
        })?;

        let user = authenticate(state, token).await?;

        if !user.role.is_admin() {
            warn!(
                %path,
                user_id = user.id,
                role = user.role.as_str(),
                "admin access denied: user lacks admin/super_admin role",
            );
            return Err(AppError::forbidden("Not enough permissions"));
        }

        Ok(AdminUser(user))
    }
}
