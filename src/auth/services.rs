use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};

use crate::{
    auth::{
        dto::{LoginRequest, LoginResponse, LoginUser},
        password::verify_password,
    },
    error::{AppError, AppResult},
    state::AppState,
    users::repo::RepoError,
};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Emails are stored trimmed and lowercased.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Checks credentials and issues an access token. Unknown email and wrong
/// password are indistinguishable to the caller.
pub async fn login(state: &AppState, req: LoginRequest) -> AppResult<LoginResponse> {
    let email = normalize_email(&req.email);

    let user = match state.users.find_by_email(&email).await {
        Ok(u) => u,
        Err(RepoError::NotFound) => {
            warn!(email = %email, "login unknown email");
            return Err(AppError::unauthorized("Invalid credentials"));
        }
        Err(e) => return Err(e.into()),
    };

    if !verify_password(&req.password, &user.password_hash) {
        warn!(email = %email, user_id = user.id, "login invalid password");
        return Err(AppError::unauthorized("Invalid credentials"));
    }

    if let Err(e) = state.users.touch_last_active(user.id).await {
        warn!(error = %e, user_id = user.id, "failed to record last_active");
    }

    let access_token = state.jwt.sign(&user.email)?;

    info!(user_id = user.id, email = %user.email, "user logged in");
    Ok(LoginResponse {
        access_token,
        token_type: "bearer",
        user: LoginUser::from(&user),
    })
}
