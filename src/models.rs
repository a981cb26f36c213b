use crate::config::Config;
use crate::payment::{IdentityCache, IdentityState, Paywall, PayerIdentity};
use crate::wallet::WalletService;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, LazyLock};
use validator::{Validate, ValidationError};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub wallet: Arc<dyn WalletService>,
    pub identity: IdentityCache,
    pub paywall: Paywall,
}

pub static ADDRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^0x[a-fA-F0-9]{40}$").expect("address pattern is valid")
});

fn validate_wallet_type(kind: &str) -> Result<(), ValidationError> {
    match kind {
        "purchaser" | "seller" | "custom" => Ok(()),
        _ => Err(ValidationError::new("wallet_type")
            .with_message("Type must be 'purchaser', 'seller', or 'custom'".into())),
    }
}

fn validate_fund_token(token: &str) -> Result<(), ValidationError> {
    match token {
        "usdc" | "eth" => Ok(()),
        _ => Err(ValidationError::new("token").with_message("Token must be 'usdc' or 'eth'".into())),
    }
}

fn validate_transfer_token(token: &str) -> Result<(), ValidationError> {
    if token == "usdc" {
        Ok(())
    } else {
        Err(ValidationError::new("token").with_message("Only USDC transfers supported".into()))
    }
}

// Wallet routes

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateWalletRequest {
    #[validate(length(min = 1, max = 50, message = "Wallet name must be 1 to 50 characters"))]
    pub name: String,
    #[serde(rename = "type")]
    #[validate(custom(function = validate_wallet_type))]
    pub kind: String,
}

impl CreateWalletRequest {
    /// Account name on the wallet service for this request.
    pub fn account_name(&self) -> String {
        match self.kind.as_str() {
            "purchaser" => "Purchaser".to_string(),
            "seller" => "Seller".to_string(),
            _ => self.name.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreateWalletResponse {
    pub address: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct WalletBalances {
    pub usdc: f64,
    pub eth: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletSummary {
    pub name: String,
    pub address: String,
    pub balances: WalletBalances,
    pub last_updated: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletListResponse {
    pub wallets: Vec<WalletSummary>,
    pub count: usize,
    pub last_updated: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct BalanceQuery {
    #[serde(default)]
    #[validate(regex(path = *ADDRESS_RE, message = "Invalid Ethereum address format"))]
    pub address: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub usdc: f64,
    pub eth: f64,
    pub last_updated: String,
    pub address: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct FundRequest {
    #[validate(regex(path = *ADDRESS_RE, message = "Invalid Ethereum address format"))]
    pub address: String,
    #[validate(custom(function = validate_fund_token))]
    pub token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FundResponse {
    pub transaction_hash: String,
    pub status: String,
    pub token: String,
    pub address: String,
    pub explorer_url: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TransferBody {
    #[validate(regex(path = *ADDRESS_RE, message = "Invalid from address format"))]
    pub from_address: String,
    #[validate(regex(path = *ADDRESS_RE, message = "Invalid to address format"))]
    pub to_address: String,
    #[validate(range(exclusive_min = 0.0, message = "Amount must be positive"))]
    pub amount: f64,
    #[validate(custom(function = validate_transfer_token))]
    pub token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferResponse {
    pub transaction_hash: String,
    pub status: String,
    pub from_address: String,
    pub to_address: String,
    pub amount: f64,
    pub token: String,
    pub explorer_url: String,
    pub timestamp: String,
}

// Demo API

/// `GET /api/bot` flags. Each flag is on only when its value is exactly `true`.
#[derive(Debug, Default, Deserialize)]
pub struct BotQuery {
    pub job: Option<String>,
    #[serde(rename = "act-as-scraper")]
    pub act_as_scraper: Option<String>,
    #[serde(rename = "enable-payment")]
    pub enable_payment: Option<String>,
}

impl BotQuery {
    pub fn acts_as_scraper(&self) -> bool {
        self.act_as_scraper.as_deref() == Some("true")
    }

    pub fn payment_requested(&self) -> bool {
        self.enable_payment.as_deref() == Some("true")
    }
}

#[derive(Debug, Deserialize)]
pub struct AddRequest {
    pub a: f64,
    pub b: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddResponse {
    pub result: f64,
}

// Health

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SellerIdentityStatus {
    pub state: IdentityState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<PayerIdentity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub network: String,
    pub x402_enabled: bool,
    pub seller_identity: SellerIdentityStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR: &str = "0x1111111111111111111111111111111111111111";

    #[test]
    fn test_create_request_validation() {
        let ok = CreateWalletRequest { name: "Alice".into(), kind: "custom".into() };
        assert!(ok.validate().is_ok());
        assert_eq!(ok.account_name(), "Alice");

        let seller = CreateWalletRequest { name: "ignored".into(), kind: "seller".into() };
        assert_eq!(seller.account_name(), "Seller");

        let empty = CreateWalletRequest { name: "".into(), kind: "custom".into() };
        assert!(empty.validate().is_err());

        let long = CreateWalletRequest { name: "x".repeat(51), kind: "custom".into() };
        assert!(long.validate().is_err());

        let bad_type = CreateWalletRequest { name: "Alice".into(), kind: "admin".into() };
        assert!(bad_type.validate().is_err());
    }

    #[test]
    fn test_address_format() {
        assert!(BalanceQuery { address: ADDR.into() }.validate().is_ok());
        assert!(BalanceQuery { address: "0x123".into() }.validate().is_err());
        assert!(BalanceQuery { address: String::new() }.validate().is_err());
        assert!(BalanceQuery { address: format!("{}0", ADDR) }.validate().is_err());
    }

    #[test]
    fn test_transfer_validation() {
        let body = |amount: f64, token: &str| TransferBody {
            from_address: ADDR.into(),
            to_address: ADDR.into(),
            amount,
            token: token.into(),
        };
        assert!(body(1.5, "usdc").validate().is_ok());
        assert!(body(0.0, "usdc").validate().is_err());
        assert!(body(-1.0, "usdc").validate().is_err());
        assert!(body(1.0, "eth").validate().is_err());
    }

    #[test]
    fn test_fund_token_validation() {
        assert!(FundRequest { address: ADDR.into(), token: "eth".into() }.validate().is_ok());
        assert!(FundRequest { address: ADDR.into(), token: "dai".into() }.validate().is_err());
    }
}
