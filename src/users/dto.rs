use serde::{Deserialize, Serialize};

use crate::users::repo_types::User;

/// Query string of `GET /admin/users`.
#[derive(Debug, Default, Deserialize)]
pub struct ListUsersQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub users: Vec<User>,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct StatusChangeResponse {
    pub success: bool,
    pub message: String,
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}
