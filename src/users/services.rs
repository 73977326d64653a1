use tracing::{info, warn};

use crate::{
    auth::services::{is_valid_email, normalize_email},
    error::{AppError, AppResult},
    state::AppState,
    users::{
        dto::{ListUsersQuery, MessageResponse, StatusChangeResponse, UserListResponse},
        repo::RepoError,
        repo_types::{User, UserPatch, UserQuery, UserStatus},
    },
};

const DEFAULT_PAGE: i64 = 1;
const DEFAULT_LIMIT: i64 = 10;
const MAX_NAME_LEN: usize = 255;
const MAX_PLAN_LEN: usize = 50;
const MAX_PHONE_LEN: usize = 20;
const MAX_REFERENCE_LEN: usize = 255;

pub fn build_query(q: ListUsersQuery) -> AppResult<UserQuery> {
    let page = q.page.unwrap_or(DEFAULT_PAGE);
    let limit = q.limit.unwrap_or(DEFAULT_LIMIT);
    if page < 1 {
        return Err(AppError::validation("page must be >= 1"));
    }
    if !(1..=i64::from(UserQuery::MAX_LIMIT)).contains(&limit) {
        return Err(AppError::validation(format!(
            "limit must be between 1 and {}",
            UserQuery::MAX_LIMIT
        )));
    }
    let page = u32::try_from(page).map_err(|_| AppError::validation("page is too large"))?;
    let term = q
        .search
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    Ok(UserQuery {
        term,
        page,
        limit: limit as u32,
    })
}

/// Trims and normalises the patch, rejecting values the table cannot hold.
pub fn validate_patch(mut patch: UserPatch) -> AppResult<UserPatch> {
    if let Some(name) = patch.name.as_mut() {
        *name = name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::validation("name must not be empty"));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(AppError::validation("name is too long"));
        }
    }
    if let Some(email) = patch.email.as_mut() {
        *email = normalize_email(email);
        if !is_valid_email(email) {
            return Err(AppError::validation("Invalid email"));
        }
    }
    if let Some(plan) = patch.subscription_plan.as_mut() {
        *plan = plan.trim().to_string();
        if plan.is_empty() || plan.chars().count() > MAX_PLAN_LEN {
            return Err(AppError::validation(format!(
                "subscription_plan must be 1-{MAX_PLAN_LEN} characters"
            )));
        }
    }
    if let Some(Some(phone)) = patch.phone.as_mut() {
        *phone = phone.trim().to_string();
        if phone.chars().count() > MAX_PHONE_LEN {
            return Err(AppError::validation("phone is too long"));
        }
    }
    if let Some(Some(reference)) = &patch.reference {
        if reference.chars().count() > MAX_REFERENCE_LEN {
            return Err(AppError::validation("reference is too long"));
        }
    }
    Ok(patch)
}

pub async fn list_users(state: &AppState, q: ListUsersQuery) -> AppResult<UserListResponse> {
    let query = build_query(q)?;
    let page = state.users.search(&query).await?;
    Ok(UserListResponse {
        users: page.rows,
        total: page.total,
        page: query.page,
        limit: query.limit,
        success: true,
    })
}

pub async fn get_user(state: &AppState, id: i64) -> AppResult<User> {
    Ok(state.users.find_by_id(id).await?)
}

/// Applies a sparse update. Concurrent writers to the same row are
/// last-writer-wins.
pub async fn update_user(state: &AppState, id: i64, patch: UserPatch) -> AppResult<User> {
    let patch = validate_patch(patch)?;
    state.users.find_by_id(id).await?;

    if let Some(email) = &patch.email {
        match state.users.find_by_email(email).await {
            Ok(owner) if owner.id != id => {
                warn!(user_id = id, owner_id = owner.id, "email already in use");
                return Err(AppError::Conflict("Email already registered".into()));
            }
            Ok(_) | Err(RepoError::NotFound) => {}
            Err(e) => return Err(e.into()),
        }
    }

    let user = state
        .users
        .update(id, &patch, state.config.last_active_on_update)
        .await?;
    info!(user_id = user.id, "user updated");
    Ok(user)
}

async fn change_status(
    state: &AppState,
    id: i64,
    status: UserStatus,
) -> AppResult<StatusChangeResponse> {
    let user = state
        .users
        .set_status(id, status, state.config.last_active_on_update)
        .await?;
    let verb = match status {
        UserStatus::Active => "activated",
        UserStatus::Suspended => "suspended",
        UserStatus::Pending => "marked pending",
    };
    info!(user_id = user.id, status = status.as_str(), "user status changed");
    Ok(StatusChangeResponse {
        success: true,
        message: format!("User {} has been {verb}", user.email),
        user,
    })
}

/// Idempotent: suspending a suspended user succeeds.
pub async fn suspend_user(state: &AppState, id: i64) -> AppResult<StatusChangeResponse> {
    change_status(state, id, UserStatus::Suspended).await
}

pub async fn activate_user(state: &AppState, id: i64) -> AppResult<StatusChangeResponse> {
    change_status(state, id, UserStatus::Active).await
}

pub async fn reset_password(state: &AppState, id: i64) -> AppResult<MessageResponse> {
    let user = state.users.find_by_id(id).await?;
    state.notifier.send_password_reset(&user).await?;
    Ok(MessageResponse {
        success: true,
        message: format!("Password reset link sent to {}", user.email),
    })
}
