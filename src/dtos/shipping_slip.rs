use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::SlipStatus;

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateShippingSlipRequest {
    pub zone_id: i64,
    /// Generated from the creation time when omitted.
    pub reference: Option<String>,
    pub parcel_codes: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanParcelRequest {
    pub parcel_code: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    pub parcel_code: String,
    pub scanned_at: Option<DateTime<Utc>>,
    pub already_scanned: bool,
    pub scanned_items: usize,
    pub total_items: usize,
    pub completion_rate: f64,
}

#[derive(Debug, Deserialize)]
pub struct ListShippingSlipsQuery {
    pub status: Option<SlipStatus>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingSlipSummary {
    pub id: i64,
    pub reference: String,
    pub status: SlipStatus,
    pub zone_id: i64,
    pub zone_name: Option<String>,
    pub item_count: i64,
    pub scanned_count: i64,
    pub created_at: DateTime<Utc>,
}
