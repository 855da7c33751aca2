use serde::{Deserialize, Serialize};
use std::fmt;

/// Parcel statuses that the shipping-slip lifecycle moves parcels between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "parcel_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ParcelStatus {
    Collected,         // Picked up, waiting to be put on a slip
    Shipped,           // Travelling on a shipped slip
    PutInDistribution, // Arrived in the destination zone
}

impl ParcelStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ParcelStatus::Collected => "collected",
            ParcelStatus::Shipped => "shipped",
            ParcelStatus::PutInDistribution => "put_in_distribution",
        }
    }
}

impl fmt::Display for ParcelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
