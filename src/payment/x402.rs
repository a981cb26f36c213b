// x402 v1 wire types (Base/USDC, "exact" scheme)

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const X402_VERSION: u32 = 1;
pub const SCHEME_EXACT: &str = "exact";

/// Request header carrying the base64 payment payload.
pub const PAYMENT_HEADER: &str = "x-payment";
/// Response header carrying the base64 settlement result.
pub const PAYMENT_RESPONSE_HEADER: &str = "x-payment-response";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PriceError {
    #[error("price '{0}' is not a dollar amount")]
    Malformed(String),

    #[error("price '{0}' has more precision than USDC supports")]
    TooPrecise(String),
}

/// Parse a dollar price such as `$0.001` into USDC base units (6 decimals).
pub fn parse_usd_price(price: &str) -> Result<u128, PriceError> {
    let malformed = || PriceError::Malformed(price.to_string());
    let digits = price.trim().trim_start_matches('$');
    if digits.is_empty() {
        return Err(malformed());
    }

    let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
    if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit())
    {
        return Err(malformed());
    }
    if fraction.len() > 6 {
        return Err(PriceError::TooPrecise(price.to_string()));
    }

    let whole: u128 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| malformed())?
    };
    let fraction: u128 = format!("{:0<6}", fraction).parse().map_err(|_| malformed())?;

    whole
        .checked_mul(1_000_000)
        .and_then(|units| units.checked_add(fraction))
        .ok_or_else(malformed)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    pub scheme: String,
    pub network: String,
    pub max_amount_required: String,
    pub resource: String,
    pub description: String,
    pub mime_type: String,
    pub pay_to: String,
    pub max_timeout_seconds: u64,
    pub asset: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

/// Body of a `402 Payment Required` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequired {
    pub x402_version: u32,
    pub error: String,
    pub accepts: Vec<PaymentRequirements>,
}

/// Decoded `X-PAYMENT` header. The scheme payload stays opaque; only the
/// facilitator interprets it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    pub x402_version: u32,
    pub scheme: String,
    pub network: String,
    pub payload: serde_json::Value,
}

impl PaymentPayload {
    pub fn from_base64(encoded: &str) -> Option<Self> {
        let bytes = BASE64.decode(encoded.trim()).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    pub fn to_base64(&self) -> Result<String, serde_json::Error> {
        Ok(BASE64.encode(serde_json::to_vec(self)?))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
    #[serde(default)]
    pub transaction: String,
    #[serde(default)]
    pub network: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
}

impl SettleResponse {
    pub fn to_base64(&self) -> Result<String, serde_json::Error> {
        Ok(BASE64.encode(serde_json::to_vec(self)?))
    }
}
