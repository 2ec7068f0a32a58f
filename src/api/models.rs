use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::settlement::AdjustmentReport;

// ========== REQUEST MODELS ==========

/// Optional day override for the adjustment trigger, local date
#[derive(Debug, Default, Deserialize)]
pub struct AdjustQuery {
    pub day: Option<NaiveDate>,
}

// ========== RESPONSE MODELS ==========

#[derive(Debug, Serialize)]
pub struct AdjustResponse {
    #[serde(flatten)]
    pub report: AdjustmentReport,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct PollResponse {
    pub chat_id: i64,
    pub question: String,
    pub options: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub store: String,
    pub timestamp: DateTime<Utc>,
}
