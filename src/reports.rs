use axum::{extract::State, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use time::{macros::format_description, OffsetDateTime};
use tracing::{info, instrument};

use crate::{
    auth::extractors::AdminUser,
    error::{AppError, AppResult},
    extract::ValidQuery,
    state::AppState,
    users::repo_types::UserStats,
};

#[derive(Debug, Serialize)]
pub struct AnalyticsResponse {
    pub success: bool,
    pub metrics: UserStats,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub total_users: i64,
    pub new_users: i64,
}

#[derive(Debug, Serialize)]
pub struct ReportsResponse {
    pub success: bool,
    pub reports: ReportSummary,
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    #[serde(rename = "type", default = "default_export_kind")]
    pub kind: String,
    #[serde(default = "default_export_format")]
    pub format: String,
}

fn default_export_kind() -> String {
    "all".into()
}

fn default_export_format() -> String {
    "csv".into()
}

#[derive(Debug, Serialize)]
pub struct ExportResponse {
    pub success: bool,
    pub message: String,
    pub download_url: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/reports", get(summary))
        .route("/admin/reports/analytics", get(analytics))
        .route("/admin/reports/export", get(export))
}

/// Headline counts over the `users` table.
#[instrument(skip(state, admin), fields(admin_id = admin.0.id))]
pub async fn analytics(
    State(state): State<AppState>,
    admin: AdminUser,
) -> AppResult<Json<AnalyticsResponse>> {
    let metrics = state.users.stats().await?;
    Ok(Json(AnalyticsResponse {
        success: true,
        metrics,
    }))
}

#[instrument(skip(state, admin), fields(admin_id = admin.0.id))]
pub async fn summary(
    State(state): State<AppState>,
    admin: AdminUser,
) -> AppResult<Json<ReportsResponse>> {
    let stats = state.users.stats().await?;
    Ok(Json(ReportsResponse {
        success: true,
        reports: ReportSummary {
            total_users: stats.total_users,
            new_users: stats.new_users,
        },
    }))
}

/// Acknowledges an export request. No file is produced yet.
#[instrument(skip(admin), fields(admin_id = admin.0.id))]
pub async fn export(
    admin: AdminUser,
    ValidQuery(q): ValidQuery<ExportQuery>,
) -> AppResult<Json<ExportResponse>> {
    let format = q.format.trim().to_ascii_lowercase();
    if format.is_empty() || !format.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(AppError::validation("format must be alphanumeric"));
    }
    let stamp = OffsetDateTime::now_utc()
        .format(format_description!("[year][month][day]"))
        .map_err(anyhow::Error::from)?;

    info!(kind = %q.kind, %format, "export requested");
    Ok(Json(ExportResponse {
        success: true,
        message: format!("Export {format} will be generated"),
        download_url: format!("/downloads/export-{stamp}.{format}"),
    }))
}
