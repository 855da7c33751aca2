pub mod expedition;
pub mod parcel;
pub mod shipping_slip;

pub use expedition::{
    Expedition, ExpeditionItem, ExpeditionStatus, Quantity, QuantityError, Reconciliation,
    ReconciliationLine, ReconciliationSummary, ReconciliationWarning, SubmissionGate,
};
pub use parcel::ParcelStatus;
pub use shipping_slip::{
    ScanError, ScanOutcome, ShipPolicy, ShippingSlip, ShippingSlipItem, SlipAction, SlipControls,
    SlipStatus, TransitionError,
};
