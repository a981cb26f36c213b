// Paygate - pay-per-request access to HTTP routes with x402

pub mod cli;
pub mod config;
pub mod middleware;
pub mod models;
pub mod payment;
pub mod routes;
pub mod types;
pub mod wallet;

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

pub use config::Config;
pub use models::AppState;

use middleware::{BotClassifier, HttpValidationDelegate, PaymentGate, RoutePolicy};
use payment::{IdentityCache, Paywall, PayerIdentity};
use wallet::{CdpWalletClient, WalletService};

/// Signature file from the config if set, otherwise the built-in list.
pub fn load_classifier(config: &Config) -> anyhow::Result<BotClassifier> {
    match &config.payment.bot_signatures_file {
        Some(path) => BotClassifier::from_file(path)
            .with_context(|| format!("loading bot signatures from {}", path.display())),
        None => Ok(BotClassifier::builtin()),
    }
}

/// Shared handler state. A configured `SELLER_ADDRESS` pre-seeds the identity cache.
pub fn build_state(config: Config, wallet: Arc<dyn WalletService>) -> anyhow::Result<AppState> {
    let paywall = Paywall::from_config(&config)?;
    let account_name = config.payment.seller_account_name.clone();

    let identity = match &config.payment.seller_address {
        Some(address) => {
            info!(%address, "Using pre-provisioned seller address");
            IdentityCache::with_identity(
                wallet.clone(),
                &account_name,
                PayerIdentity { address: address.clone(), name: account_name.clone() },
            )
        }
        None => IdentityCache::new(wallet.clone(), &account_name),
    };

    Ok(AppState { config, wallet, identity, paywall })
}

pub fn build_gate(config: &Config, classifier: BotClassifier) -> anyhow::Result<PaymentGate> {
    let payment = &config.payment;
    let delegate = HttpValidationDelegate::new(
        &config.server.app_url,
        &payment.validation_path,
        payment.validation_timeout(),
    )?;
    info!(endpoint = %delegate.endpoint(), "Payment validation delegate configured");

    Ok(PaymentGate::new(
        RoutePolicy::from_config(payment),
        classifier,
        Arc::new(delegate),
        payment.fail_mode,
        payment.max_forward_body_bytes,
    ))
}

pub fn wallet_client(config: &Config) -> Arc<dyn WalletService> {
    Arc::new(CdpWalletClient::from_config(&config.wallet))
}

pub fn create_router(state: AppState, gate: PaymentGate) -> axum::Router {
    routes::create_router(state, gate)
}
