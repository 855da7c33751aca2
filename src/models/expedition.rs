use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::domain::{Expedition, ExpeditionItem, ExpeditionStatus};

#[derive(Debug, FromRow)]
pub struct ExpeditionRow {
    pub id: i64,
    pub tracking_number: String,
    pub status: ExpeditionStatus,
    pub created_at: DateTime<Utc>,
    pub received_at: Option<DateTime<Utc>>,
    pub received_by: Option<String>,
    pub general_notes: Option<String>,
}

#[derive(Debug, FromRow)]
pub struct ExpeditionItemRow {
    pub id: i64,
    pub product_name: String,
    pub sku: Option<String>,
    pub quantity_sent: i32,
    pub quantity_received: Option<i32>,
    pub quantity_defective: Option<i32>,
    pub notes: Option<String>,
    pub photos: Vec<String>,
}

#[derive(Debug, FromRow)]
pub struct ExpeditionSummaryRow {
    pub id: i64,
    pub tracking_number: String,
    pub status: ExpeditionStatus,
    pub item_count: i64,
    pub total_sent: i64,
    pub created_at: DateTime<Utc>,
    pub received_at: Option<DateTime<Utc>>,
}

impl ExpeditionRow {
    pub fn into_expedition(self, items: Vec<ExpeditionItemRow>) -> Expedition {
        Expedition {
            id: self.id,
            tracking_number: self.tracking_number,
            status: self.status,
            created_at: self.created_at,
            received_at: self.received_at,
            received_by: self.received_by,
            general_notes: self.general_notes,
            items: items.into_iter().map(ExpeditionItem::from).collect(),
        }
    }
}

// Columns carry CHECK (>= 0) constraints, so the conversion only clamps.
fn non_negative(v: i32) -> u32 {
    u32::try_from(v).unwrap_or(0)
}

impl From<ExpeditionItemRow> for ExpeditionItem {
    fn from(row: ExpeditionItemRow) -> Self {
        Self {
            id: row.id,
            product_name: row.product_name,
            sku: row.sku,
            quantity_sent: non_negative(row.quantity_sent),
            quantity_received: row.quantity_received.map(non_negative),
            quantity_defective: row.quantity_defective.map(non_negative),
            notes: row.notes,
            photos: row.photos,
        }
    }
}
