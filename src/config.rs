use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_retries: u32,
}

/// Account created at startup when it does not exist yet.
#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapAdmin {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub api_prefix: String,
    pub cors_origins: Vec<String>,
    pub host: String,
    pub port: u16,
    /// Bump `last_active` on every row mutation, not only on login.
    pub last_active_on_update: bool,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let url = match get("DATABASE_URL") {
            Some(url) => url,
            None => {
                let password = get("DB_PASSWORD")
                    .context("either DATABASE_URL or DB_PASSWORD must be set")?;
                format!(
                    "postgres://{}:{}@{}:{}/{}",
                    or("DB_USER", "postgres"),
                    password,
                    or("DB_HOST", "localhost"),
                    parse_or(get("DB_PORT"), 5432u16),
                    or("DB_NAME", "jiva_admin"),
                )
            }
        };
        let database = DatabaseConfig {
            url,
            max_connections: parse_or(get("DB_MAX_CONNECTIONS"), 10),
            connect_retries: parse_or(get("DB_CONNECT_RETRIES"), 5),
        };

        let jwt = JwtConfig {
            secret: get("JWT_SECRET")
                .or_else(|| get("SECRET_KEY"))
                .context("JWT_SECRET must be set")?,
            issuer: or("JWT_ISSUER", "jiva-admin"),
            audience: or("JWT_AUDIENCE", "jiva-admin-panel"),
            ttl_minutes: parse_or(get("ACCESS_TOKEN_EXPIRE_MINUTES"), 60 * 24),
        };

        let bootstrap_admin = match (
            get("BOOTSTRAP_ADMIN_EMAIL"),
            get("BOOTSTRAP_ADMIN_PASSWORD"),
        ) {
            (Some(email), Some(password)) => Some(BootstrapAdmin {
                name: or("BOOTSTRAP_ADMIN_NAME", "Super Admin"),
                email,
                password,
            }),
            _ => None,
        };

        Ok(Self {
            database,
            jwt,
            api_prefix: normalize_prefix(&or("API_PREFIX", "/api")),
            cors_origins: parse_origins(get("CORS_ORIGINS").as_deref().unwrap_or("")),
            host: or("APP_HOST", "0.0.0.0"),
            port: parse_or(get("APP_PORT"), 3001),
            last_active_on_update: parse_or(get("LAST_ACTIVE_ON_UPDATE"), false),
            bootstrap_admin,
        })
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

/// "/api/" -> "/api", "api" -> "/api", "/" -> "".
fn normalize_prefix(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

/// Accepts `a,b` as well as the JSON array form `["a","b"]`.
fn parse_origins(raw: &str) -> Vec<String> {
    let raw = raw.trim();
    if raw.starts_with('[') {
        if let Ok(list) = serde_json::from_str::<Vec<String>>(raw) {
            return list;
        }
    }
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
