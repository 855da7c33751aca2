//! Inbound expeditions and the reception reconciler.
//!
//! The reconciler is a pure function of the current form values: it is re-run
//! on every edit by the client and once more by the server before anything is
//! written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "expedition_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ExpeditionStatus {
    Pending,
    Shipped,
    Received,
    Cancelled,
}

impl ExpeditionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ExpeditionStatus::Pending => "pending",
            ExpeditionStatus::Shipped => "shipped",
            ExpeditionStatus::Received => "received",
            ExpeditionStatus::Cancelled => "cancelled",
        }
    }

    /// Goods can be received until the expedition is closed.
    pub fn accepts_reception(self) -> bool {
        matches!(self, ExpeditionStatus::Pending | ExpeditionStatus::Shipped)
    }
}

impl fmt::Display for ExpeditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpeditionItem {
    pub id: i64,
    pub product_name: String,
    pub sku: Option<String>,
    #[serde(rename = "quantity_sent")]
    pub quantity_sent: u32,
    #[serde(rename = "quantity_received")]
    pub quantity_received: Option<u32>,
    #[serde(rename = "quantity_defective")]
    pub quantity_defective: Option<u32>,
    pub notes: Option<String>,
    #[serde(default)]
    pub photos: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expedition {
    pub id: i64,
    pub tracking_number: String,
    pub status: ExpeditionStatus,
    pub created_at: DateTime<Utc>,
    pub received_at: Option<DateTime<Utc>>,
    pub received_by: Option<String>,
    pub general_notes: Option<String>,
    pub items: Vec<ExpeditionItem>,
}

impl Expedition {
    /// Reconciler input built from the quantities already stored on the items.
    pub fn recorded_lines(&self) -> Vec<ReconciliationLine> {
        self.items
            .iter()
            .map(|item| ReconciliationLine {
                item_id: item.id,
                quantity_sent: item.quantity_sent,
                received: item.quantity_received.into(),
                defective: item.quantity_defective.into(),
            })
            .collect()
    }
}

/// A quantity as entered in a form field. Stays `Unset` until the user types
/// something; only the reconciler reads it as zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Quantity {
    #[default]
    Unset,
    Value(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    #[error("quantity cannot be negative")]
    Negative,
    #[error("`{0}` is not a whole number")]
    NotANumber(String),
    #[error("`{0}` is too large")]
    OutOfRange(String),
}

impl Quantity {
    /// Parses raw form input. Blank input is `Unset`; negative or
    /// non-numeric input is rejected here so it never reaches the reconciler.
    pub fn parse(raw: &str) -> Result<Self, QuantityError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(Quantity::Unset);
        }
        match raw.parse::<i64>() {
            Ok(n) if n < 0 => Err(QuantityError::Negative),
            Ok(n) => u32::try_from(n)
                .map(Quantity::Value)
                .map_err(|_| QuantityError::OutOfRange(raw.to_string())),
            Err(_) => Err(QuantityError::NotANumber(raw.to_string())),
        }
    }

    pub fn or_zero(self) -> u32 {
        match self {
            Quantity::Unset => 0,
            Quantity::Value(n) => n,
        }
    }

    pub fn value(self) -> Option<u32> {
        match self {
            Quantity::Unset => None,
            Quantity::Value(n) => Some(n),
        }
    }
}

impl From<Option<u32>> for Quantity {
    fn from(value: Option<u32>) -> Self {
        value.map_or(Quantity::Unset, Quantity::Value)
    }
}

impl From<u32> for Quantity {
    fn from(value: u32) -> Self {
        Quantity::Value(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconciliationLine {
    pub item_id: i64,
    pub quantity_sent: u32,
    pub received: Quantity,
    pub defective: Quantity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemReconciliation {
    pub item_id: i64,
    pub quantity_sent: u32,
    pub received: u32,
    pub defective: u32,
    pub total: u64,
    /// Positive when short, negative when more arrived than was sent.
    pub discrepancy: i64,
    pub defective_rate: f64,
    pub has_discrepancy: bool,
    pub exceeds_expected: bool,
}

impl ItemReconciliation {
    fn from_line(line: &ReconciliationLine) -> Self {
        let received = line.received.or_zero();
        let defective = line.defective.or_zero();
        let total = u64::from(received) + u64::from(defective);
        let discrepancy = i64::from(line.quantity_sent) - total as i64;
        Self {
            item_id: line.item_id,
            quantity_sent: line.quantity_sent,
            received,
            defective,
            total,
            discrepancy,
            defective_rate: ratio(u64::from(defective), total),
            has_discrepancy: discrepancy != 0,
            exceeds_expected: total > u64::from(line.quantity_sent),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationSummary {
    pub total_sent: u64,
    pub total_received: u64,
    pub total_defective: u64,
    pub total_processed: u64,
    pub overall_defective_rate: f64,
    /// Percentage of the sent quantity that has been dispositioned.
    pub completion_rate: f64,
    pub has_any_discrepancies: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReconciliationWarning {
    /// Fewer units dispositioned than were sent.
    #[serde(rename_all = "camelCase")]
    Shortfall { item_id: i64, missing: u64 },
    /// More units dispositioned than were sent.
    #[serde(rename_all = "camelCase")]
    Excess { item_id: i64, extra: u64 },
}

impl fmt::Display for ReconciliationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconciliationWarning::Shortfall { item_id, missing } => {
                write!(f, "item {item_id}: {missing} unit(s) short of the quantity sent")
            }
            ReconciliationWarning::Excess { item_id, extra } => {
                write!(f, "item {item_id}: {extra} unit(s) more than the quantity sent")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionGate {
    Open,
    /// These items have neither a received nor a defective quantity.
    MissingDisposition(Vec<i64>),
    /// Nothing was processed at all; the submit control stays disabled.
    Disabled,
}

impl SubmissionGate {
    pub fn is_open(&self) -> bool {
        matches!(self, SubmissionGate::Open)
    }

    pub fn message(&self) -> Option<String> {
        match self {
            SubmissionGate::Open => None,
            SubmissionGate::MissingDisposition(ids) => {
                let ids: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
                Some(format!(
                    "items {} need a received or defective quantity",
                    ids.join(", ")
                ))
            }
            SubmissionGate::Disabled => {
                Some("nothing has been received or marked defective".to_string())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Reconciliation {
    pub items: Vec<ItemReconciliation>,
    pub summary: ReconciliationSummary,
}

impl Reconciliation {
    pub fn compute(lines: &[ReconciliationLine]) -> Self {
        let items: Vec<ItemReconciliation> =
            lines.iter().map(ItemReconciliation::from_line).collect();

        let total_sent: u64 = items.iter().map(|i| u64::from(i.quantity_sent)).sum();
        let total_received: u64 = items.iter().map(|i| u64::from(i.received)).sum();
        let total_defective: u64 = items.iter().map(|i| u64::from(i.defective)).sum();
        let total_processed = total_received + total_defective;

        let summary = ReconciliationSummary {
            total_sent,
            total_received,
            total_defective,
            total_processed,
            overall_defective_rate: ratio(total_defective, total_processed),
            completion_rate: ratio(total_processed, total_sent) * 100.0,
            has_any_discrepancies: items.iter().any(|i| i.has_discrepancy),
        };

        Self { items, summary }
    }

    pub fn gate(&self) -> SubmissionGate {
        if self.summary.total_processed == 0 {
            return SubmissionGate::Disabled;
        }
        let missing: Vec<i64> = self
            .items
            .iter()
            .filter(|i| i.total == 0)
            .map(|i| i.item_id)
            .collect();
        if missing.is_empty() {
            SubmissionGate::Open
        } else {
            SubmissionGate::MissingDisposition(missing)
        }
    }

    /// Shortfalls and excesses on dispositioned items. Never blocking.
    pub fn warnings(&self) -> Vec<ReconciliationWarning> {
        self.items
            .iter()
            .filter(|i| i.total > 0 && i.has_discrepancy)
            .map(|i| {
                if i.discrepancy > 0 {
                    ReconciliationWarning::Shortfall {
                        item_id: i.item_id,
                        missing: i.discrepancy.unsigned_abs(),
                    }
                } else {
                    ReconciliationWarning::Excess {
                        item_id: i.item_id,
                        extra: i.discrepancy.unsigned_abs(),
                    }
                }
            })
            .collect()
    }

    pub fn any_exceeds_expected(&self) -> bool {
        self.items.iter().any(|i| i.exceeds_expected)
    }
}

// Explicit zero guard: an empty denominator is a rate of 0, never NaN.
fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(sent: &[u32], received: &[u32], defective: &[u32]) -> Vec<ReconciliationLine> {
        sent.iter()
            .zip(received)
            .zip(defective)
            .enumerate()
            .map(|(i, ((s, r), d))| ReconciliationLine {
                item_id: i as i64 + 1,
                quantity_sent: *s,
                received: Quantity::Value(*r),
                defective: Quantity::Value(*d),
            })
            .collect()
    }

    #[test]
    fn exact_reception_completes() {
        let rec = Reconciliation::compute(&lines(&[10, 5], &[10, 5], &[0, 0]));
        assert_eq!(rec.summary.completion_rate, 100.0);
        assert!(!rec.summary.has_any_discrepancies);
        assert_eq!(rec.gate(), SubmissionGate::Open);
        assert!(rec.warnings().is_empty());
    }

    #[test]
    fn shortfall_is_a_warning_not_a_block() {
        let rec = Reconciliation::compute(&lines(&[10, 5], &[8, 5], &[0, 0]));
        assert_eq!(rec.items[0].discrepancy, 2);
        assert!(rec.summary.has_any_discrepancies);
        assert!(rec.gate().is_open());
        assert_eq!(
            rec.warnings(),
            vec![ReconciliationWarning::Shortfall { item_id: 1, missing: 2 }]
        );
    }

    #[test]
    fn excess_is_a_warning_not_a_block() {
        let rec = Reconciliation::compute(&lines(&[10, 5], &[12, 5], &[0, 0]));
        assert!(rec.items[0].exceeds_expected);
        assert_eq!(rec.items[0].discrepancy, -2);
        assert!(rec.any_exceeds_expected());
        assert!(rec.gate().is_open());
        assert_eq!(
            rec.warnings(),
            vec![ReconciliationWarning::Excess { item_id: 1, extra: 2 }]
        );
    }

    #[test]
    fn nothing_processed_disables_submission() {
        let rec = Reconciliation::compute(&lines(&[10, 5], &[0, 0], &[0, 0]));
        assert_eq!(rec.summary.total_processed, 0);
        assert_eq!(rec.gate(), SubmissionGate::Disabled);
        assert_eq!(rec.summary.overall_defective_rate, 0.0);
    }

    #[test]
    fn undispositioned_item_blocks_submission() {
        let mut input = lines(&[10, 5, 3], &[10, 0, 3], &[0, 0, 0]);
        input[1].received = Quantity::Unset;
        input[1].defective = Quantity::Unset;
        let rec = Reconciliation::compute(&input);
        assert_eq!(rec.gate(), SubmissionGate::MissingDisposition(vec![2]));
        assert!(rec.gate().message().unwrap().contains('2'));
    }

    #[test]
    fn defective_only_counts_as_dispositioned() {
        let rec = Reconciliation::compute(&lines(&[4], &[0], &[4]));
        assert!(rec.gate().is_open());
        assert_eq!(rec.items[0].defective_rate, 1.0);
        assert_eq!(rec.summary.overall_defective_rate, 1.0);
    }

    #[test]
    fn defective_rate_stays_in_unit_interval() {
        for (r, d) in [(0, 0), (3, 1), (0, 7), (9, 0), (u32::MAX, u32::MAX)] {
            let rec = Reconciliation::compute(&lines(&[5], &[r], &[d]));
            let rate = rec.items[0].defective_rate;
            assert!((0.0..=1.0).contains(&rate), "rate {rate} for {r}/{d}");
            if r == 0 && d == 0 {
                assert_eq!(rate, 0.0);
            }
        }
    }

    #[test]
    fn zero_sent_gives_zero_completion() {
        let rec = Reconciliation::compute(&lines(&[0], &[3], &[0]));
        assert_eq!(rec.summary.completion_rate, 0.0);
        assert!(rec.summary.completion_rate.is_finite());
    }

    #[test]
    fn empty_expedition_is_disabled() {
        let rec = Reconciliation::compute(&[]);
        assert_eq!(rec.summary, ReconciliationSummary::default());
        assert_eq!(rec.gate(), SubmissionGate::Disabled);
    }

    #[test]
    fn mixed_items_aggregate() {
        let rec = Reconciliation::compute(&lines(&[10, 10], &[6, 9], &[2, 1]));
        let s = &rec.summary;
        assert_eq!(s.total_sent, 20);
        assert_eq!(s.total_received, 15);
        assert_eq!(s.total_defective, 3);
        assert_eq!(s.total_processed, 18);
        assert_eq!(s.completion_rate, 90.0);
        assert!((s.overall_defective_rate - 3.0 / 18.0).abs() < 1e-12);
    }

    #[test]
    fn quantity_parsing() {
        assert_eq!(Quantity::parse(""), Ok(Quantity::Unset));
        assert_eq!(Quantity::parse("  "), Ok(Quantity::Unset));
        assert_eq!(Quantity::parse(" 12 "), Ok(Quantity::Value(12)));
        assert_eq!(Quantity::parse("0"), Ok(Quantity::Value(0)));
        assert_eq!(Quantity::parse("-1"), Err(QuantityError::Negative));
        assert_eq!(Quantity::parse("1.5"), Err(QuantityError::NotANumber("1.5".into())));
        assert_eq!(Quantity::parse("abc"), Err(QuantityError::NotANumber("abc".into())));
        assert!(matches!(
            Quantity::parse("99999999999"),
            Err(QuantityError::OutOfRange(_))
        ));
        assert_eq!(Quantity::Unset.or_zero(), 0);
    }

    #[test]
    fn status_serializes_lower_case() {
        assert_eq!(
            serde_json::to_string(&ExpeditionStatus::Received).unwrap(),
            "\"received\""
        );
        assert!(ExpeditionStatus::Shipped.accepts_reception());
        assert!(!ExpeditionStatus::Cancelled.accepts_reception());
    }
}
