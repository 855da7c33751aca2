use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tracing::{info, instrument, warn};

use super::api::BackofficeApi;
use super::error::ClientError;
use super::guard::ActionGuard;
use crate::domain::{ShipPolicy, ShippingSlip, SlipAction, SlipControls};
use crate::dtos::shipping_slip::ScanResult;

/// Page-scoped view of one shipping slip.
///
/// The snapshot is only ever replaced by an entity the server returned, so a
/// failed transition leaves what the user sees untouched. Each action has its
/// own busy flag.
pub struct SlipSession<A> {
    api: Arc<A>,
    policy: ShipPolicy,
    slip: RwLock<ShippingSlip>,
    removed: AtomicBool,
    guard: ActionGuard,
}

impl<A: BackofficeApi> SlipSession<A> {
    pub fn new(api: Arc<A>, slip: ShippingSlip, policy: ShipPolicy) -> Self {
        Self {
            api,
            policy,
            slip: RwLock::new(slip),
            removed: AtomicBool::new(false),
            guard: ActionGuard::new(),
        }
    }

    pub async fn open(api: Arc<A>, id: i64, policy: ShipPolicy) -> Result<Self, ClientError> {
        let slip = api.get_shipping_slip(id).await?;
        Ok(Self::new(api, slip, policy))
    }

    pub fn snapshot(&self) -> ShippingSlip {
        self.slip.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }

    pub fn is_busy(&self, action: SlipAction) -> bool {
        self.guard.is_busy(action.as_str())
    }

    /// Controls to render: status-derived, minus anything in flight.
    pub fn controls(&self) -> SlipControls {
        if self.is_removed() {
            return SlipControls::default();
        }
        let mut controls = self.snapshot().controls(self.policy);
        for action in SlipAction::ALL {
            if self.is_busy(action) {
                controls.disable(action);
            }
        }
        controls
    }

    /// Scanned share of the slip, for the progress display.
    pub fn completion_rate(&self) -> f64 {
        self.snapshot().completion_rate()
    }

    fn replace(&self, slip: ShippingSlip) {
        *self.slip.write().unwrap_or_else(|e| e.into_inner()) = slip;
    }

    fn precheck(&self, action: SlipAction) -> Result<ShippingSlip, ClientError> {
        let slip = self.snapshot();
        if self.is_removed() {
            return Err(ClientError::Validation(format!(
                "shipping slip {} has been deleted",
                slip.reference
            )));
        }
        slip.check(action, self.policy)?;
        Ok(slip)
    }

    pub async fn refresh(&self) -> Result<(), ClientError> {
        let id = self.snapshot().id;
        let fresh = self.api.get_shipping_slip(id).await?;
        self.replace(fresh);
        Ok(())
    }

    pub async fn ship(&self) -> Result<(), ClientError> {
        self.transition(SlipAction::Ship).await
    }

    pub async fn receive(&self) -> Result<(), ClientError> {
        self.transition(SlipAction::Receive).await
    }

    pub async fn cancel(&self) -> Result<(), ClientError> {
        self.transition(SlipAction::Cancel).await
    }

    #[instrument(skip(self))]
    async fn transition(&self, action: SlipAction) -> Result<(), ClientError> {
        let slip = self.precheck(action)?;
        let _in_flight = self.guard.begin(action.as_str())?;

        match self.api.transition_shipping_slip(slip.id, action).await {
            Ok(updated) => {
                self.replace(updated);
                // The response is already authoritative; a failed re-fetch
                // only means the view may lag behind later edits.
                if let Err(e) = self.refresh().await {
                    warn!(slip_id = slip.id, error = %e, "Re-fetch after transition failed");
                }
                info!(slip_id = slip.id, status = %self.snapshot().status, "Slip transitioned");
                Ok(())
            }
            Err(e) => {
                warn!(slip_id = slip.id, error = %e, "Slip transition failed");
                Err(e)
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn delete(&self) -> Result<(), ClientError> {
        let slip = self.precheck(SlipAction::Delete)?;
        let _in_flight = self.guard.begin(SlipAction::Delete.as_str())?;

        self.api.delete_shipping_slip(slip.id).await.map_err(|e| {
            warn!(slip_id = slip.id, error = %e, "Slip deletion failed");
            e
        })?;
        self.removed.store(true, Ordering::Release);
        info!(slip_id = slip.id, "Slip deleted");
        Ok(())
    }

    /// Confirms a parcel's physical presence. The local item is marked only
    /// once the server has recorded the scan.
    #[instrument(skip(self))]
    pub async fn scan(&self, parcel_code: &str) -> Result<ScanResult, ClientError> {
        let slip = self.precheck(SlipAction::Scan)?;
        let code = parcel_code.trim();
        if code.is_empty() {
            return Err(ClientError::Validation("parcel code is required".to_string()));
        }
        let _in_flight = self.guard.begin(SlipAction::Scan.as_str())?;

        let result = self.api.scan_parcel(slip.id, code).await?;

        {
            let mut current = self.slip.write().unwrap_or_else(|e| e.into_inner());
            if let Some(item) = current.items.iter_mut().find(|i| i.parcel_code == result.parcel_code) {
                item.scanned = true;
                if item.scanned_at.is_none() {
                    item.scanned_at = result.scanned_at;
                }
            }
        }
        Ok(result)
    }
}
