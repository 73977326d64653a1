use serde::{Deserialize, Serialize};

use crate::users::repo_types::{User, UserRole};

/// Request body for `POST /admin/auth/login`.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub user: LoginUser,
}

/// Identity summary returned next to the token.
#[derive(Debug, Serialize)]
pub struct LoginUser {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub role: UserRole,
}

impl From<&User> for LoginUser {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            email: u.email.clone(),
            name: u.name.clone(),
            role: u.role,
        }
    }
}
