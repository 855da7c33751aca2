use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ExpeditionStatus, ReconciliationSummary, ReconciliationWarning};

// ==================== Reception payload ====================

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceptionRequest {
    pub items: Vec<ReceptionItem>,
    pub received_by: Option<String>,
    /// Informational; the server stamps the authoritative time.
    pub received_at: Option<DateTime<Utc>>,
    pub general_notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ReceptionItem {
    #[serde(rename = "itemId")]
    pub item_id: i64,
    pub quantity_received: Option<u32>,
    pub quantity_defective: Option<u32>,
    pub notes: Option<String>,
}

// ==================== Reception outcome ====================

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceptionIssue {
    pub item_id: Option<i64>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceptionValidation {
    pub valid: bool,
    pub errors: Vec<ReceptionIssue>,
    pub warnings: Vec<ReconciliationWarning>,
    pub summary: ReconciliationSummary,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceptionResult {
    pub expedition_id: i64,
    pub status: ExpeditionStatus,
    pub received_at: DateTime<Utc>,
    pub received_by: String,
    pub summary: ReconciliationSummary,
    pub warnings: Vec<ReconciliationWarning>,
}

// ==================== Listing ====================

#[derive(Debug, Deserialize)]
pub struct ListExpeditionsQuery {
    pub status: Option<ExpeditionStatus>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpeditionSummary {
    pub id: i64,
    pub tracking_number: String,
    pub status: ExpeditionStatus,
    pub item_count: i64,
    pub total_sent: i64,
    pub created_at: DateTime<Utc>,
    pub received_at: Option<DateTime<Utc>>,
}
