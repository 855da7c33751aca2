use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::domain::{ParcelStatus, ShippingSlip, ShippingSlipItem, SlipStatus};

#[derive(Debug, FromRow)]
pub struct ShippingSlipRow {
    pub id: i64,
    pub reference: String,
    pub status: SlipStatus,
    pub zone_id: i64,
    pub zone_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub shipped_by: Option<String>,
    pub received_at: Option<DateTime<Utc>>,
    pub received_by: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<String>,
}

#[derive(Debug, FromRow)]
pub struct ShippingSlipItemRow {
    pub parcel_id: i64,
    pub parcel_code: String,
    pub price: f64,
    pub scanned: bool,
    pub scanned_at: Option<DateTime<Utc>>,
}

#[derive(Debug, FromRow)]
pub struct ShippingSlipSummaryRow {
    pub id: i64,
    pub reference: String,
    pub status: SlipStatus,
    pub zone_id: i64,
    pub zone_name: Option<String>,
    pub item_count: i64,
    pub scanned_count: i64,
    pub created_at: DateTime<Utc>,
}

/// A parcel requested for a new slip, with whether a PENDING slip holds it.
#[derive(Debug, Clone, FromRow)]
pub struct ParcelCandidateRow {
    pub id: i64,
    pub code: String,
    pub status: ParcelStatus,
    pub on_open_slip: bool,
}

impl ShippingSlipRow {
    pub fn into_slip(self, items: Vec<ShippingSlipItemRow>) -> ShippingSlip {
        ShippingSlip {
            id: self.id,
            reference: self.reference,
            status: self.status,
            zone_id: self.zone_id,
            zone_name: self.zone_name,
            created_at: self.created_at,
            created_by: self.created_by,
            shipped_at: self.shipped_at,
            shipped_by: self.shipped_by,
            received_at: self.received_at,
            received_by: self.received_by,
            cancelled_at: self.cancelled_at,
            cancelled_by: self.cancelled_by,
            items: items.into_iter().map(ShippingSlipItem::from).collect(),
        }
    }
}

impl From<ShippingSlipItemRow> for ShippingSlipItem {
    fn from(row: ShippingSlipItemRow) -> Self {
        Self {
            parcel_id: row.parcel_id,
            parcel_code: row.parcel_code,
            price: row.price,
            scanned: row.scanned,
            scanned_at: row.scanned_at,
        }
    }
}
