//! x402 paywall evaluation
//!
//! Decides, for one resource path and an optional `X-PAYMENT` header, whether
//! access is free, already paid (verified and settled through the facilitator),
//! or still requires payment. Settlement happens before access is granted.

use super::facilitator::{FacilitatorClient, FacilitatorError};
use super::x402::{
    parse_usd_price, PaymentPayload, PaymentRequired, PaymentRequirements, PriceError,
    SettleResponse, SCHEME_EXACT, X402_VERSION,
};
use crate::config::Config;
use crate::wallet::{usdc_address, USDC_DECIMALS};
use tracing::{debug, info, warn};

const MAX_TIMEOUT_SECONDS: u64 = 60;

/// Price of every resource under `prefix`.
#[derive(Debug, Clone)]
pub struct RoutePrice {
    pub prefix: String,
    /// USDC base units.
    pub amount: u128,
    pub description: String,
    pub mime_type: String,
}

#[derive(Debug)]
pub enum PaywallOutcome {
    /// No price configured for the path.
    Free,
    Paid(SettleResponse),
    PaymentRequired(PaymentRequired),
}

#[derive(Clone)]
pub struct Paywall {
    network: String,
    asset: String,
    app_url: String,
    prices: Vec<RoutePrice>,
    facilitator: FacilitatorClient,
}

#[derive(Debug, thiserror::Error)]
pub enum PaywallConfigError {
    #[error(transparent)]
    Price(#[from] PriceError),

    #[error("no USDC deployment known for network '{0}'")]
    UnsupportedNetwork(String),

    #[error(transparent)]
    Facilitator(#[from] FacilitatorError),

    #[error("protected route '{0}' has no price in PAYMENT_ROUTE_PRICES")]
    MissingPrice(String),
}

impl Paywall {
    pub fn new(
        network: impl Into<String>,
        app_url: impl Into<String>,
        prices: Vec<RoutePrice>,
        facilitator: FacilitatorClient,
    ) -> Result<Self, PaywallConfigError> {
        let network = network.into();
        let asset = usdc_address(&network)
            .ok_or_else(|| PaywallConfigError::UnsupportedNetwork(network.clone()))?;
        Ok(Self {
            asset: asset.to_string(),
            network,
            app_url: app_url.into(),
            prices,
            facilitator,
        })
    }

    /// Price table from `PAYMENT_ROUTE_PRICES`. With enforcement on, every
    /// protected route must be priced; otherwise it would be served for free.
    pub fn from_config(config: &Config) -> Result<Self, PaywallConfigError> {
        let payment = &config.payment;
        let prices = payment
            .route_prices
            .iter()
            .map(|(prefix, price)| {
                let mime_type = if prefix.starts_with(&payment.api_prefix) {
                    "application/json"
                } else {
                    "text/html"
                };
                Ok(RoutePrice {
                    prefix: prefix.clone(),
                    amount: parse_usd_price(price)?,
                    description: "Access to protected content".to_string(),
                    mime_type: mime_type.to_string(),
                })
            })
            .collect::<Result<Vec<_>, PriceError>>()?;

        let facilitator =
            FacilitatorClient::new(&payment.facilitator_url, payment.validation_timeout())?;
        let paywall = Self::new(&payment.network, &config.server.app_url, prices, facilitator)?;

        if payment.x402_enabled {
            if let Some(route) = payment
                .protected_routes
                .iter()
                .find(|route| paywall.price_for(route).is_none())
            {
                return Err(PaywallConfigError::MissingPrice(route.clone()));
            }
        }
        Ok(paywall)
    }

    /// Longest configured prefix matching `path`.
    pub fn price_for(&self, path: &str) -> Option<&RoutePrice> {
        self.prices
            .iter()
            .filter(|p| path.starts_with(&p.prefix))
            .max_by_key(|p| p.prefix.len())
    }

    pub fn requirements(&self, price: &RoutePrice, path: &str, pay_to: &str) -> PaymentRequirements {
        PaymentRequirements {
            scheme: SCHEME_EXACT.to_string(),
            network: self.network.clone(),
            max_amount_required: price.amount.to_string(),
            resource: format!("{}{}", self.app_url, path),
            description: price.description.clone(),
            mime_type: price.mime_type.clone(),
            pay_to: pay_to.to_string(),
            max_timeout_seconds: MAX_TIMEOUT_SECONDS,
            asset: self.asset.clone(),
            output_schema: None,
            extra: Some(serde_json::json!({
                "name": "USDC",
                "version": "2",
                "decimals": USDC_DECIMALS,
            })),
        }
    }

    fn required(&self, requirements: PaymentRequirements, error: impl Into<String>) -> PaywallOutcome {
        PaywallOutcome::PaymentRequired(PaymentRequired {
            x402_version: X402_VERSION,
            error: error.into(),
            accepts: vec![requirements],
        })
    }

    pub async fn check(
        &self,
        price: &RoutePrice,
        path: &str,
        payment_header: Option<&str>,
        pay_to: &str,
    ) -> Result<PaywallOutcome, FacilitatorError> {
        let requirements = self.requirements(price, path, pay_to);

        let Some(header) = payment_header else {
            debug!(path, "No payment header, quoting requirements");
            return Ok(self.required(requirements, "X-PAYMENT header is required"));
        };

        let Some(payload) = PaymentPayload::from_base64(header) else {
            warn!(path, "Malformed payment header");
            return Ok(self.required(requirements, "Invalid or malformed payment header"));
        };

        if payload.scheme != requirements.scheme || payload.network != requirements.network {
            return Ok(self.required(
                requirements,
                format!(
                    "Unsupported payment: expected {} on {}",
                    SCHEME_EXACT, self.network
                ),
            ));
        }

        let verification = self.facilitator.verify(&payload, &requirements).await?;
        if !verification.is_valid {
            let reason = verification
                .invalid_reason
                .unwrap_or_else(|| "Payment verification failed".to_string());
            warn!(path, %reason, "Payment rejected by facilitator");
            return Ok(self.required(requirements, reason));
        }

        let settlement = self.facilitator.settle(&payload, &requirements).await?;
        if !settlement.success {
            let reason = settlement
                .error_reason
                .clone()
                .unwrap_or_else(|| "Payment settlement failed".to_string());
            warn!(path, %reason, "Payment settlement failed");
            return Ok(self.required(requirements, reason));
        }

        info!(
            path,
            payer = settlement.payer.as_deref().unwrap_or("unknown"),
            transaction = %settlement.transaction,
            "Payment settled"
        );
        Ok(PaywallOutcome::Paid(settlement))
    }
}
