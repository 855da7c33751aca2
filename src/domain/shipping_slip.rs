//! Shipping slip lifecycle.
//!
//! ```text
//! PENDING --ship--> SHIPPED --receive--> RECEIVED
//!    |                 |
//!    +----cancel-------+-----cancel----> CANCELLED
//! PENDING --delete--> (removed)
//! ```
//!
//! The same rules drive the server handlers (authoritative) and the client
//! sessions (which only use them to decide what to offer).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::parcel::ParcelStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "shipping_slip_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum SlipStatus {
    Pending,
    Shipped,
    Cancelled,
    Received,
}

impl SlipStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SlipStatus::Pending => "PENDING",
            SlipStatus::Shipped => "SHIPPED",
            SlipStatus::Cancelled => "CANCELLED",
            SlipStatus::Received => "RECEIVED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SlipStatus::Cancelled | SlipStatus::Received)
    }

    /// Whether `action` may be attempted from this status.
    pub fn permits(self, action: SlipAction) -> bool {
        use SlipAction::*;
        match self {
            SlipStatus::Pending => matches!(action, Ship | Cancel | Delete | Scan),
            SlipStatus::Shipped => matches!(action, Receive | Cancel),
            SlipStatus::Cancelled | SlipStatus::Received => false,
        }
    }

    pub fn available_actions(self) -> Vec<SlipAction> {
        SlipAction::ALL
            .into_iter()
            .filter(|a| self.permits(*a))
            .collect()
    }
}

impl fmt::Display for SlipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlipAction {
    Ship,
    Receive,
    Cancel,
    Delete,
    Scan,
}

impl SlipAction {
    pub const ALL: [SlipAction; 5] = [
        SlipAction::Ship,
        SlipAction::Receive,
        SlipAction::Cancel,
        SlipAction::Delete,
        SlipAction::Scan,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SlipAction::Ship => "ship",
            SlipAction::Receive => "receive",
            SlipAction::Cancel => "cancel",
            SlipAction::Delete => "delete",
            SlipAction::Scan => "scan",
        }
    }

    /// Status the slip ends up in. `None` for delete (the slip is gone) and
    /// scan (status unchanged).
    pub fn resulting_status(self) -> Option<SlipStatus> {
        match self {
            SlipAction::Ship => Some(SlipStatus::Shipped),
            SlipAction::Receive => Some(SlipStatus::Received),
            SlipAction::Cancel => Some(SlipStatus::Cancelled),
            SlipAction::Delete | SlipAction::Scan => None,
        }
    }

    /// Status every parcel on the slip is moved to once the action commits.
    pub fn parcel_cascade(self) -> Option<ParcelStatus> {
        match self {
            SlipAction::Ship => Some(ParcelStatus::Shipped),
            SlipAction::Receive => Some(ParcelStatus::PutInDistribution),
            SlipAction::Cancel | SlipAction::Delete => Some(ParcelStatus::Collected),
            SlipAction::Scan => None,
        }
    }
}

impl fmt::Display for SlipAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a slip may ship before every parcel has been scanned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShipPolicy {
    #[default]
    AnyProgress,
    FullScanRequired,
}

impl ShipPolicy {
    pub fn from_full_scan_flag(required: bool) -> Self {
        if required {
            ShipPolicy::FullScanRequired
        } else {
            ShipPolicy::AnyProgress
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("cannot {action} a shipping slip in status {status}")]
    NotAllowed { action: SlipAction, status: SlipStatus },
    #[error("only {scanned} of {total} parcels scanned; every parcel must be scanned before shipping")]
    IncompleteScan { scanned: usize, total: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error(transparent)]
    Closed(#[from] TransitionError),
    #[error("parcel {0} is not on this shipping slip")]
    UnknownParcel(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    Scanned(DateTime<Utc>),
    AlreadyScanned(Option<DateTime<Utc>>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingSlipItem {
    pub parcel_id: i64,
    pub parcel_code: String,
    pub price: f64,
    pub scanned: bool,
    pub scanned_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingSlip {
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
    pub items: Vec<ShippingSlipItem>,
}

impl ShippingSlip {
    pub fn total_items(&self) -> usize {
        self.items.len()
    }

    pub fn scanned_count(&self) -> usize {
        self.items.iter().filter(|i| i.scanned).count()
    }

    pub fn total_declared_value(&self) -> f64 {
        self.items.iter().map(|i| i.price).sum()
    }

    /// Scanned share of the items as a percentage; 0 for an empty slip.
    pub fn completion_rate(&self) -> f64 {
        let total = self.total_items();
        if total == 0 {
            return 0.0;
        }
        self.scanned_count() as f64 / total as f64 * 100.0
    }

    pub fn is_fully_scanned(&self) -> bool {
        !self.items.is_empty() && self.items.iter().all(|i| i.scanned)
    }

    /// Checks that `action` is valid for the current status and policy.
    pub fn check(&self, action: SlipAction, policy: ShipPolicy) -> Result<(), TransitionError> {
        if !self.status.permits(action) {
            return Err(TransitionError::NotAllowed {
                action,
                status: self.status,
            });
        }
        if action == SlipAction::Ship
            && policy == ShipPolicy::FullScanRequired
            && !self.is_fully_scanned()
        {
            return Err(TransitionError::IncompleteScan {
                scanned: self.scanned_count(),
                total: self.total_items(),
            });
        }
        Ok(())
    }

    pub fn controls(&self, policy: ShipPolicy) -> SlipControls {
        SlipControls {
            can_modify: self.status == SlipStatus::Pending,
            can_scan: self.check(SlipAction::Scan, policy).is_ok(),
            can_ship_now: self.check(SlipAction::Ship, policy).is_ok(),
            can_receive_now: self.check(SlipAction::Receive, policy).is_ok(),
            can_cancel: self.check(SlipAction::Cancel, policy).is_ok(),
            can_delete: self.check(SlipAction::Delete, policy).is_ok(),
        }
    }

    pub fn find_item(&self, parcel_code: &str) -> Option<&ShippingSlipItem> {
        let code = parcel_code.trim();
        self.items.iter().find(|i| i.parcel_code == code)
    }

    /// Marks the item carrying `parcel_code` as scanned. Scanning twice is a
    /// no-op reported as `AlreadyScanned`.
    pub fn mark_scanned(
        &mut self,
        parcel_code: &str,
        at: DateTime<Utc>,
    ) -> Result<ScanOutcome, ScanError> {
        if !self.status.permits(SlipAction::Scan) {
            return Err(TransitionError::NotAllowed {
                action: SlipAction::Scan,
                status: self.status,
            }
            .into());
        }
        let code = parcel_code.trim();
        let item = self
            .items
            .iter_mut()
            .find(|i| i.parcel_code == code)
            .ok_or_else(|| ScanError::UnknownParcel(code.to_string()))?;

        if item.scanned {
            return Ok(ScanOutcome::AlreadyScanned(item.scanned_at));
        }
        item.scanned = true;
        item.scanned_at = Some(at);
        Ok(ScanOutcome::Scanned(at))
    }
}

/// Which controls a page should render as enabled for a slip snapshot.
/// Advisory only: the server re-validates every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlipControls {
    pub can_modify: bool,
    pub can_scan: bool,
    pub can_ship_now: bool,
    pub can_receive_now: bool,
    pub can_cancel: bool,
    pub can_delete: bool,
}

impl SlipControls {
    pub fn allows(&self, action: SlipAction) -> bool {
        match action {
            SlipAction::Ship => self.can_ship_now,
            SlipAction::Receive => self.can_receive_now,
            SlipAction::Cancel => self.can_cancel,
            SlipAction::Delete => self.can_delete,
            SlipAction::Scan => self.can_scan,
        }
    }

    pub fn disable(&mut self, action: SlipAction) {
        match action {
            SlipAction::Ship => self.can_ship_now = false,
            SlipAction::Receive => self.can_receive_now = false,
            SlipAction::Cancel => self.can_cancel = false,
            SlipAction::Delete => self.can_delete = false,
            SlipAction::Scan => self.can_scan = false,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn slip_with(status: SlipStatus, scanned: &[bool]) -> ShippingSlip {
        ShippingSlip {
            id: 7,
            reference: "BE-0007".into(),
            status,
            zone_id: 1,
            zone_name: Some("Casablanca".into()),
            created_at: Utc::now(),
            created_by: Some("manager".into()),
            shipped_at: None,
            shipped_by: None,
            received_at: None,
            received_by: None,
            cancelled_at: None,
            cancelled_by: None,
            items: scanned
                .iter()
                .enumerate()
                .map(|(i, s)| ShippingSlipItem {
                    parcel_id: i as i64 + 1,
                    parcel_code: format!("PCL-{}", i + 1),
                    price: 10.0 * (i as f64 + 1.0),
                    scanned: *s,
                    scanned_at: s.then(Utc::now),
                })
                .collect(),
        }
    }

    #[test]
    fn transition_table_matches_lifecycle() {
        use SlipAction::*;
        assert_eq!(
            SlipStatus::Pending.available_actions(),
            vec![Ship, Cancel, Delete, Scan]
        );
        assert_eq!(SlipStatus::Shipped.available_actions(), vec![Receive, Cancel]);
        assert!(SlipStatus::Received.available_actions().is_empty());
        assert!(SlipStatus::Cancelled.available_actions().is_empty());
        assert!(SlipStatus::Received.is_terminal());
        assert!(!SlipStatus::Shipped.is_terminal());
    }

    #[test]
    fn ship_requires_pending() {
        for status in [SlipStatus::Shipped, SlipStatus::Received, SlipStatus::Cancelled] {
            let slip = slip_with(status, &[true]);
            assert_eq!(
                slip.check(SlipAction::Ship, ShipPolicy::AnyProgress),
                Err(TransitionError::NotAllowed {
                    action: SlipAction::Ship,
                    status
                })
            );
        }
    }

    #[test]
    fn receive_requires_shipped() {
        for status in [SlipStatus::Pending, SlipStatus::Received, SlipStatus::Cancelled] {
            let slip = slip_with(status, &[true]);
            assert!(slip.check(SlipAction::Receive, ShipPolicy::AnyProgress).is_err());
        }
        let shipped = slip_with(SlipStatus::Shipped, &[true]);
        assert!(shipped.check(SlipAction::Receive, ShipPolicy::AnyProgress).is_ok());
    }

    #[test]
    fn partially_scanned_slip_reports_progress_and_may_ship() {
        let slip = slip_with(SlipStatus::Pending, &[true, true, true, false, false]);
        assert_eq!(slip.scanned_count(), 3);
        assert_eq!(slip.completion_rate(), 60.0);
        assert!(slip.controls(ShipPolicy::AnyProgress).can_ship_now);
    }

    #[test]
    fn full_scan_policy_blocks_ship_until_complete() {
        let mut slip = slip_with(SlipStatus::Pending, &[true, false]);
        assert_eq!(
            slip.check(SlipAction::Ship, ShipPolicy::FullScanRequired),
            Err(TransitionError::IncompleteScan { scanned: 1, total: 2 })
        );
        slip.mark_scanned("PCL-2", Utc::now()).unwrap();
        assert!(slip.check(SlipAction::Ship, ShipPolicy::FullScanRequired).is_ok());
    }

    #[test]
    fn empty_slip_has_zero_completion() {
        let slip = slip_with(SlipStatus::Pending, &[]);
        assert_eq!(slip.completion_rate(), 0.0);
        assert!(!slip.is_fully_scanned());
    }

    #[test]
    fn declared_value_sums_parcel_prices() {
        let slip = slip_with(SlipStatus::Pending, &[false, false, false]);
        assert_eq!(slip.total_declared_value(), 60.0);
    }

    #[test]
    fn scanning_marks_item_once() {
        let mut slip = slip_with(SlipStatus::Pending, &[false, false]);
        let at = Utc::now();
        assert_eq!(slip.mark_scanned(" PCL-1 ", at), Ok(ScanOutcome::Scanned(at)));
        assert_eq!(
            slip.mark_scanned("PCL-1", Utc::now()),
            Ok(ScanOutcome::AlreadyScanned(Some(at)))
        );
        assert_eq!(
            slip.mark_scanned("PCL-9", at),
            Err(ScanError::UnknownParcel("PCL-9".into()))
        );
    }

    #[test]
    fn scanning_closes_once_shipped() {
        let mut slip = slip_with(SlipStatus::Shipped, &[false]);
        assert!(matches!(
            slip.mark_scanned("PCL-1", Utc::now()),
            Err(ScanError::Closed(_))
        ));
        assert!(!slip.items[0].scanned);
    }

    #[test]
    fn controls_follow_status() {
        let shipped = slip_with(SlipStatus::Shipped, &[true]).controls(ShipPolicy::AnyProgress);
        assert!(!shipped.can_modify);
        assert!(!shipped.can_ship_now);
        assert!(shipped.can_receive_now);
        assert!(shipped.can_cancel);
        assert!(!shipped.can_delete);

        let received = slip_with(SlipStatus::Received, &[true]).controls(ShipPolicy::AnyProgress);
        assert_eq!(received, SlipControls::default());
    }

    #[test]
    fn cascades_move_parcels() {
        assert_eq!(SlipAction::Ship.parcel_cascade(), Some(ParcelStatus::Shipped));
        assert_eq!(SlipAction::Receive.parcel_cascade(), Some(ParcelStatus::PutInDistribution));
        assert_eq!(SlipAction::Cancel.parcel_cascade(), Some(ParcelStatus::Collected));
        assert_eq!(SlipAction::Delete.parcel_cascade(), Some(ParcelStatus::Collected));
        assert_eq!(SlipAction::Scan.parcel_cascade(), None);
    }

    #[test]
    fn status_serializes_upper_case() {
        assert_eq!(serde_json::to_string(&SlipStatus::Shipped).unwrap(), "\"SHIPPED\"");
    }
}
