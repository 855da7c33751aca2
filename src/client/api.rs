use async_trait::async_trait;

use super::error::ClientError;
use crate::domain::{Expedition, ShippingSlip, SlipAction};
use crate::dtos::expedition::{ReceptionRequest, ReceptionResult, ReceptionValidation};
use crate::dtos::shipping_slip::ScanResult;

/// The REST contract the sessions drive. `HttpApi` is the production
/// implementation; tests substitute an in-memory one.
#[async_trait]
pub trait BackofficeApi: Send + Sync {
    async fn get_shipping_slip(&self, id: i64) -> Result<ShippingSlip, ClientError>;

    /// `POST /shipping-slips/{id}/{ship|receive|cancel}`.
    async fn transition_shipping_slip(
        &self,
        id: i64,
        action: SlipAction,
    ) -> Result<ShippingSlip, ClientError>;

    async fn delete_shipping_slip(&self, id: i64) -> Result<(), ClientError>;

    async fn scan_parcel(&self, id: i64, parcel_code: &str) -> Result<ScanResult, ClientError>;

    async fn get_expedition(&self, id: i64) -> Result<Expedition, ClientError>;

    async fn validate_reception(
        &self,
        id: i64,
        request: &ReceptionRequest,
    ) -> Result<ReceptionValidation, ClientError>;

    async fn receive_expedition(
        &self,
        id: i64,
        request: &ReceptionRequest,
    ) -> Result<ReceptionResult, ClientError>;
}
