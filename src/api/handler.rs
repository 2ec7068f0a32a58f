use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use super::models::*;
use crate::{
    error::AppResult,
    ledger::store::{Filter, LedgerStore},
    settlement::scheduler::SettlementScheduler,
};

#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<SettlementScheduler>,
    pub store: Arc<dyn LedgerStore>,
}

/// Redistribute a day's deficit and post the outcome to the group
/// GET /debits/adjust
pub async fn adjust_debits(
    State(state): State<AppState>,
    Query(query): Query<AdjustQuery>,
) -> AppResult<Json<AdjustResponse>> {
    let day = query
        .day
        .unwrap_or_else(|| state.scheduler.calendar().local_date(Utc::now()));
    info!("🔄 Adjusting daily debits for {}", day);

    let report = state.scheduler.adjust_and_report(day).await?;
    Ok(Json(AdjustResponse {
        message: report.to_message(),
        report,
    }))
}

/// Send next month's availability poll to the group
/// GET /playdays/estimate
pub async fn send_estimate_poll(State(state): State<AppState>) -> AppResult<Json<PollResponse>> {
    let today = state.scheduler.calendar().local_date(Utc::now());
    let poll = state.scheduler.send_availability_poll(today).await?;

    Ok(Json(PollResponse {
        chat_id: state.scheduler.group_id(),
        question: poll.question,
        options: poll.options,
    }))
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let store = match state.store.count(&Filter::new()).await {
        Ok(_) => "reachable".to_string(),
        Err(e) => {
            warn!("⚠️  Store health check failed: {}", e);
            "unreachable".to_string()
        }
    };

    Json(HealthResponse {
        status: if store == "reachable" {
            "healthy".to_string()
        } else {
            "degraded".to_string()
        },
        store,
        timestamp: Utc::now(),
    })
}
