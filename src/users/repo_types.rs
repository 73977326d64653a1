use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use time::{macros::format_description, Date, OffsetDateTime};

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Active,
    Suspended,
    Pending,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Suspended => "suspended",
            UserStatus::Pending => "pending",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    User,
    Admin,
    SuperAdmin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Admin => "admin",
            UserRole::SuperAdmin => "super_admin",
        }
    }

    /// Roles allowed through the admin namespace.
    pub fn is_admin(&self) -> bool {
        matches!(self, UserRole::Admin | UserRole::SuperAdmin)
    }
}

/// Row of the `users` table.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // argon2 PHC string, never exposed
    pub status: UserStatus,
    pub role: UserRole,
    pub subscription_plan: String,
    #[serde(with = "iso_date::option")]
    pub plan_valid_until: Option<Date>,
    pub reference: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_active: Option<OffsetDateTime>,
    pub phone: Option<String>,
    pub avatar_url: Option<String>,
    pub is_email_verified: bool,
}

/// Insert payload; everything not listed takes the column default.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub status: UserStatus,
    pub role: UserRole,
    pub subscription_plan: String,
    pub is_email_verified: bool,
}

impl NewUser {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        password_hash: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            password_hash: password_hash.into(),
            status: UserStatus::Active,
            role: UserRole::User,
            subscription_plan: "Free".into(),
            is_email_verified: false,
        }
    }
}

/// Sparse update. `None` leaves the column untouched; for nullable columns
/// `Some(None)` clears the value.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct UserPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub status: Option<UserStatus>,
    #[serde(default)]
    pub role: Option<UserRole>,
    #[serde(default)]
    pub subscription_plan: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub phone: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub reference: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable_date")]
    pub plan_valid_until: Option<Option<Date>>,
}

impl UserPatch {
    pub fn status(status: UserStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

fn nullable<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

fn nullable_date<'de, D>(de: D) -> Result<Option<Option<Date>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(de)? {
        None => Ok(Some(None)),
        Some(raw) => Date::parse(raw.trim(), format_description!("[year]-[month]-[day]"))
            .map(|d| Some(Some(d)))
            .map_err(|e| serde::de::Error::custom(format!("plan_valid_until: {e}"))),
    }
}

/// Filter + window for the user listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserQuery {
    pub term: Option<String>,
    pub page: u32,
    pub limit: u32,
}

impl UserQuery {
    pub const MAX_LIMIT: u32 = 100;

    pub fn offset(&self) -> i64 {
        (i64::from(self.page.max(1)) - 1) * i64::from(self.limit)
    }
}

#[derive(Debug, Clone)]
pub struct UserPage {
    pub rows: Vec<User>,
    pub total: i64,
}

/// Headline counts. The 30-day windows are relative to the time of the query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub total_users: i64,
    /// `last_active` within the window.
    pub active_users: i64,
    /// `status = active`.
    pub active_accounts: i64,
    pub active_subscriptions: i64,
    /// `created_at` within the window.
    pub new_users: i64,
}

pub const STATS_WINDOW_DAYS: i64 = 30;

/// Plans counted as paid subscriptions.
pub const PAID_PLANS: [&str; 2] = ["Premium", "Enterprise"];
