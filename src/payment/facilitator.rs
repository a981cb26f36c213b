//! x402 facilitator client
//!
//! The facilitator checks payment signatures (`/verify`) and submits them
//! on-chain (`/settle`). Both calls post the decoded payment payload together
//! with the requirements it is supposed to satisfy.

use super::x402::{PaymentPayload, PaymentRequirements, SettleResponse, VerifyResponse, X402_VERSION};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum FacilitatorError {
    #[error("facilitator request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("facilitator returned {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FacilitatorRequest<'a> {
    x402_version: u32,
    payment_payload: &'a PaymentPayload,
    payment_requirements: &'a PaymentRequirements,
}

#[derive(Clone)]
pub struct FacilitatorClient {
    client: Client,
    base_url: String,
}

impl FacilitatorClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, FacilitatorError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub async fn verify(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<VerifyResponse, FacilitatorError> {
        self.post("/verify", payload, requirements).await
    }

    pub async fn settle(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<SettleResponse, FacilitatorError> {
        self.post("/settle", payload, requirements).await
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<T, FacilitatorError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, network = %requirements.network, "Calling facilitator");

        let response = self
            .client
            .post(&url)
            .json(&FacilitatorRequest {
                x402_version: X402_VERSION,
                payment_payload: payload,
                payment_requirements: requirements,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FacilitatorError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }
}
