use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::api::BackofficeApi;
use super::error::ClientError;
use crate::domain::{Expedition, ShippingSlip, SlipAction};
use crate::dtos::expedition::{ReceptionRequest, ReceptionResult, ReceptionValidation};
use crate::dtos::shipping_slip::{ScanParcelRequest, ScanResult};
use crate::dtos::user::{LoginRequest, LoginResponse};

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    code: Option<String>,
}

/// reqwest-backed client for the back-office API.
#[derive(Debug, Clone)]
pub struct HttpApi {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpApi {
    /// `base_url` includes the API base path, e.g. `http://localhost:3000/api`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url, token: None }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Exchanges credentials for a bearer token used by later calls.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<(), ClientError> {
        let body = LoginRequest { username: username.to_string(), password: password.to_string() };
        let response: LoginResponse =
            send_json(self.request(Method::POST, "/auth/login").json(&body)).await?;
        self.token = Some(response.access_token);
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, self.url(path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

async fn send(builder: RequestBuilder) -> Result<Response, ClientError> {
    let response = builder.send().await?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let (code, message) = match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => (body.code.unwrap_or_else(|| "error".to_string()), body.error),
        Err(_) if !text.trim().is_empty() => ("error".to_string(), text),
        Err(_) => (
            "error".to_string(),
            status.canonical_reason().unwrap_or("request failed").to_string(),
        ),
    };
    debug!(status = status.as_u16(), %code, "API request rejected");
    Err(ClientError::Api { status: status.as_u16(), code, message })
}

async fn send_json<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T, ClientError> {
    Ok(send(builder).await?.json::<T>().await?)
}

#[async_trait]
impl BackofficeApi for HttpApi {
    async fn get_shipping_slip(&self, id: i64) -> Result<ShippingSlip, ClientError> {
        send_json(self.request(Method::GET, &format!("/shipping-slips/{id}"))).await
    }

    async fn transition_shipping_slip(
        &self,
        id: i64,
        action: SlipAction,
    ) -> Result<ShippingSlip, ClientError> {
        if action.resulting_status().is_none() {
            return Err(ClientError::Validation(format!("{action} is not a status transition")));
        }
        send_json(self.request(Method::POST, &format!("/shipping-slips/{id}/{action}"))).await
    }

    async fn delete_shipping_slip(&self, id: i64) -> Result<(), ClientError> {
        send(self.request(Method::DELETE, &format!("/shipping-slips/{id}"))).await?;
        Ok(())
    }

    async fn scan_parcel(&self, id: i64, parcel_code: &str) -> Result<ScanResult, ClientError> {
        let body = ScanParcelRequest { parcel_code: parcel_code.to_string() };
        send_json(
            self.request(Method::POST, &format!("/shipping-slips/{id}/scan-parcel"))
                .json(&body),
        )
        .await
    }

    async fn get_expedition(&self, id: i64) -> Result<Expedition, ClientError> {
        send_json(self.request(Method::GET, &format!("/expeditions/{id}"))).await
    }

    async fn validate_reception(
        &self,
        id: i64,
        request: &ReceptionRequest,
    ) -> Result<ReceptionValidation, ClientError> {
        send_json(
            self.request(Method::POST, &format!("/expeditions/{id}/receive/validate"))
                .json(request),
        )
        .await
    }

    async fn receive_expedition(
        &self,
        id: i64,
        request: &ReceptionRequest,
    ) -> Result<ReceptionResult, ClientError> {
        send_json(self.request(Method::POST, &format!("/expeditions/{id}/receive")).json(request))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalized() {
        let api = HttpApi::new("http://localhost:3000/api/");
        assert_eq!(api.url("/shipping-slips/4"), "http://localhost:3000/api/shipping-slips/4");
    }

    #[tokio::test]
    async fn scan_is_not_a_transition() {
        let api = HttpApi::new("http://127.0.0.1:9");
        let err = api.transition_shipping_slip(1, SlipAction::Scan).await.unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
    }
}
