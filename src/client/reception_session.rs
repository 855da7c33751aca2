use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use super::api::BackofficeApi;
use super::error::ClientError;
use super::guard::ActionGuard;
use crate::domain::{
    Expedition, Quantity, QuantityError, Reconciliation, ReconciliationLine, SubmissionGate,
};
use crate::dtos::expedition::{ReceptionItem, ReceptionRequest, ReceptionResult, ReceptionValidation};

const SUBMIT: &str = "submit";
const VALIDATE: &str = "validate";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    Received,
    Defective,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReceptionEntry {
    pub item_id: i64,
    pub product_name: String,
    pub quantity_sent: u32,
    pub received: Quantity,
    pub defective: Quantity,
    pub notes: Option<String>,
    pub received_error: Option<QuantityError>,
    pub defective_error: Option<QuantityError>,
}

impl ReceptionEntry {
    fn has_input_error(&self) -> bool {
        self.received_error.is_some() || self.defective_error.is_some()
    }
}

/// Reception form state. Pure: every derived figure comes from
/// [`Reconciliation::compute`] over the current entries.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReceptionForm {
    pub entries: Vec<ReceptionEntry>,
    pub general_notes: Option<String>,
    pub receiver: Option<String>,
}

impl ReceptionForm {
    pub fn for_expedition(expedition: &Expedition) -> Self {
        Self {
            entries: expedition
                .items
                .iter()
                .map(|item| ReceptionEntry {
                    item_id: item.id,
                    product_name: item.product_name.clone(),
                    quantity_sent: item.quantity_sent,
                    received: Quantity::Unset,
                    defective: Quantity::Unset,
                    notes: item.notes.clone(),
                    received_error: None,
                    defective_error: None,
                })
                .collect(),
            general_notes: None,
            receiver: None,
        }
    }

    fn entry_mut(&mut self, index: usize) -> Result<&mut ReceptionEntry, ClientError> {
        self.entries
            .get_mut(index)
            .ok_or_else(|| ClientError::Validation(format!("no item at position {index}")))
    }

    /// Applies raw input to one quantity field. Rejected input leaves the
    /// field unset and records the error against it.
    pub fn set_quantity(
        &mut self,
        index: usize,
        field: FormField,
        raw: &str,
    ) -> Result<(), ClientError> {
        let entry = self.entry_mut(index)?;
        let parsed = Quantity::parse(raw);
        let (slot, error) = match field {
            FormField::Received => (&mut entry.received, &mut entry.received_error),
            FormField::Defective => (&mut entry.defective, &mut entry.defective_error),
        };
        match parsed {
            Ok(q) => {
                *slot = q;
                *error = None;
                Ok(())
            }
            Err(e) => {
                *slot = Quantity::Unset;
                *error = Some(e.clone());
                Err(ClientError::Validation(format!("item {}: {e}", entry.item_id)))
            }
        }
    }

    pub fn set_notes(&mut self, index: usize, notes: &str) -> Result<(), ClientError> {
        let entry = self.entry_mut(index)?;
        let notes = notes.trim();
        entry.notes = (!notes.is_empty()).then(|| notes.to_string());
        Ok(())
    }

    pub fn lines(&self) -> Vec<ReconciliationLine> {
        self.entries
            .iter()
            .map(|e| ReconciliationLine {
                item_id: e.item_id,
                quantity_sent: e.quantity_sent,
                received: e.received,
                defective: e.defective,
            })
            .collect()
    }

    pub fn reconciliation(&self) -> Reconciliation {
        Reconciliation::compute(&self.lines())
    }

    pub fn gate(&self) -> SubmissionGate {
        self.reconciliation().gate()
    }

    /// Local pre-submission check: no rejected inputs and an open gate.
    pub fn check(&self) -> Result<Reconciliation, ClientError> {
        let invalid: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.has_input_error())
            .map(|e| e.item_id.to_string())
            .collect();
        if !invalid.is_empty() {
            return Err(ClientError::Validation(format!(
                "items {} have invalid quantities",
                invalid.join(", ")
            )));
        }
        let reconciliation = self.reconciliation();
        match reconciliation.gate().message() {
            Some(message) => Err(ClientError::Validation(message)),
            None => Ok(reconciliation),
        }
    }

    pub fn to_request(&self, received_at: DateTime<Utc>) -> ReceptionRequest {
        ReceptionRequest {
            items: self
                .entries
                .iter()
                .map(|e| ReceptionItem {
                    item_id: e.item_id,
                    quantity_received: Some(e.received.or_zero()),
                    quantity_defective: Some(e.defective.or_zero()),
                    notes: e.notes.clone(),
                })
                .collect(),
            received_by: self.receiver.clone(),
            received_at: Some(received_at),
            general_notes: self.general_notes.clone(),
        }
    }
}

/// Page-scoped reception of one expedition.
pub struct ReceptionSession<A> {
    api: Arc<A>,
    expedition: RwLock<Expedition>,
    form: RwLock<ReceptionForm>,
    guard: ActionGuard,
}

impl<A: BackofficeApi> ReceptionSession<A> {
    pub fn new(api: Arc<A>, expedition: Expedition) -> Self {
        let form = ReceptionForm::for_expedition(&expedition);
        Self {
            api,
            expedition: RwLock::new(expedition),
            form: RwLock::new(form),
            guard: ActionGuard::new(),
        }
    }

    pub async fn open(api: Arc<A>, id: i64) -> Result<Self, ClientError> {
        let expedition = api.get_expedition(id).await?;
        Ok(Self::new(api, expedition))
    }

    pub fn expedition(&self) -> Expedition {
        self.expedition.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn form(&self) -> ReceptionForm {
        self.form.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn edit<T>(&self, f: impl FnOnce(&mut ReceptionForm) -> T) -> T {
        f(&mut self.form.write().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn set_received(&self, index: usize, raw: &str) -> Result<(), ClientError> {
        self.edit(|form| form.set_quantity(index, FormField::Received, raw))
    }

    pub fn set_defective(&self, index: usize, raw: &str) -> Result<(), ClientError> {
        self.edit(|form| form.set_quantity(index, FormField::Defective, raw))
    }

    pub fn set_notes(&self, index: usize, notes: &str) -> Result<(), ClientError> {
        self.edit(|form| form.set_notes(index, notes))
    }

    pub fn set_general_notes(&self, notes: &str) {
        let notes = notes.trim();
        self.edit(|form| form.general_notes = (!notes.is_empty()).then(|| notes.to_string()));
    }

    pub fn set_receiver(&self, receiver: &str) {
        let receiver = receiver.trim();
        self.edit(|form| form.receiver = (!receiver.is_empty()).then(|| receiver.to_string()));
    }

    pub fn reconciliation(&self) -> Reconciliation {
        self.form().reconciliation()
    }

    pub fn is_submitting(&self) -> bool {
        self.guard.is_busy(SUBMIT)
    }

    /// Whether the submit control should be enabled right now.
    pub fn can_submit(&self) -> bool {
        self.expedition().status.accepts_reception()
            && !self.is_submitting()
            && self.form().check().is_ok()
    }

    fn ensure_open(&self) -> Result<i64, ClientError> {
        let expedition = self.expedition();
        if !expedition.status.accepts_reception() {
            return Err(ClientError::Validation(format!(
                "expedition {} is {} and cannot be received",
                expedition.tracking_number, expedition.status
            )));
        }
        Ok(expedition.id)
    }

    /// Server-side dry run of the current form.
    #[instrument(skip(self))]
    pub async fn validate(&self) -> Result<ReceptionValidation, ClientError> {
        let id = self.ensure_open()?;
        let _in_flight = self.guard.begin(VALIDATE)?;
        let request = self.form().to_request(Utc::now());
        self.api.validate_reception(id, &request).await
    }

    #[instrument(skip(self))]
    pub async fn submit(&self) -> Result<ReceptionResult, ClientError> {
        let id = self.ensure_open()?;
        let form = self.form();
        let reconciliation = form.check()?;
        let _in_flight = self.guard.begin(SUBMIT)?;

        if reconciliation.any_exceeds_expected() {
            warn!(expedition_id = id, "Submitting a reception above the quantities sent");
        }

        let result = self
            .api
            .receive_expedition(id, &form.to_request(Utc::now()))
            .await
            .map_err(|e| {
                warn!(expedition_id = id, error = %e, "Reception rejected");
                e
            })?;

        match self.api.get_expedition(id).await {
            Ok(fresh) => {
                *self.expedition.write().unwrap_or_else(|e| e.into_inner()) = fresh;
            }
            Err(e) => warn!(expedition_id = id, error = %e, "Re-fetch after reception failed"),
        }

        info!(
            expedition_id = id,
            processed = result.summary.total_processed,
            warnings = result.warnings.len(),
            "Expedition received"
        );
        Ok(result)
    }
}
