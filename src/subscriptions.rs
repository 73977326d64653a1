use axum::{routing::get, Json, Router};
use serde::Serialize;
use tracing::instrument;

use crate::{auth::extractors::AdminUser, state::AppState};

#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub id: &'static str,
    pub name: &'static str,
    pub price: f64,
    pub duration: &'static str,
    pub features: &'static [&'static str],
}

// Static catalogue; plan names match `users.subscription_plan`.
pub static PLANS: [Plan; 3] = [
    Plan {
        id: "1",
        name: "Free",
        price: 0.0,
        duration: "monthly",
        features: &["Basic features", "5 projects", "Community support"],
    },
    Plan {
        id: "2",
        name: "Premium",
        price: 29.99,
        duration: "monthly",
        features: &[
            "All Free features",
            "Unlimited projects",
            "Priority support",
            "Advanced analytics",
        ],
    },
    Plan {
        id: "3",
        name: "Enterprise",
        price: 99.99,
        duration: "monthly",
        features: &[
            "All Premium features",
            "Custom integrations",
            "Dedicated support",
            "SLA guarantee",
        ],
    },
];

#[derive(Debug, Serialize)]
pub struct PlansResponse {
    pub success: bool,
    pub plans: &'static [Plan],
}

#[derive(Debug, Serialize)]
pub struct SubscriptionsResponse {
    pub success: bool,
    pub subscriptions: Vec<serde_json::Value>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/subscriptions", get(list_subscriptions))
        .route("/admin/subscriptions/plans", get(list_plans))
}

#[instrument(skip(admin), fields(admin_id = admin.0.id))]
pub async fn list_plans(admin: AdminUser) -> Json<PlansResponse> {
    Json(PlansResponse {
        success: true,
        plans: &PLANS,
    })
}

// Subscription records are not persisted yet.
#[instrument(skip(admin), fields(admin_id = admin.0.id))]
pub async fn list_subscriptions(admin: AdminUser) -> Json<SubscriptionsResponse> {
    Json(SubscriptionsResponse {
        success: true,
        subscriptions: Vec::new(),
    })
}
