//! Wallet service
//!
//! The wallet service is a remote custodial account API. This crate only talks
//! to it over HTTP through the [`WalletService`] trait:
//! - `get_or_create_account` - named EVM account, idempotent
//! - `list_accounts` - every account owned by the API key
//! - `get_balances` - token balances for an address on a network
//! - `transfer` - ERC-20 transfer signed by a managed account
//! - `request_faucet` - testnet funds

pub mod cdp;
#[cfg(test)]
pub mod mock;

pub use cdp::CdpWalletClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// USDC contract on Base Sepolia.
pub const USDC_BASE_SEPOLIA: &str = "0x036CbD53842c5426634e7929541eC2318f3dCF7e";
/// USDC contract on Base mainnet.
pub const USDC_BASE: &str = "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913";

pub const USDC_DECIMALS: u32 = 6;
pub const ETH_DECIMALS: u32 = 18;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("wallet service rejected credentials")]
    Unauthorized,

    #[error("rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("wallet service returned {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("wallet service request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected wallet service response: {0}")]
    InvalidResponse(String),

    #[error("unsupported token '{0}' on network '{1}'")]
    UnsupportedToken(String, String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub address: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBalance {
    pub symbol: String,
    /// Amount in the token's smallest unit.
    pub amount: String,
    pub decimals: u32,
}

impl TokenBalance {
    /// Human-readable amount; malformed amounts read as zero.
    pub fn as_units(&self) -> f64 {
        self.amount
            .parse::<f64>()
            .map(|raw| raw / 10f64.powi(self.decimals as i32))
            .ok()
            .filter(|v| v.is_finite())
            .unwrap_or(0.0)
    }
}

/// Sum of all balances carrying `symbol`, in whole units.
pub fn balance_of(balances: &[TokenBalance], symbol: &str) -> f64 {
    balances
        .iter()
        .filter(|b| b.symbol.eq_ignore_ascii_case(symbol))
        .map(TokenBalance::as_units)
        .fold(0.0, |total, amount| total + amount)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Token {
    Usdc,
    Eth,
}

impl Token {
    pub fn as_str(&self) -> &'static str {
        match self {
            Token::Usdc => "usdc",
            Token::Eth => "eth",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Token::Usdc => "USDC",
            Token::Eth => "ETH",
        }
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// USDC contract address for a network, if known.
pub fn usdc_address(network: &str) -> Option<&'static str> {
    match network {
        "base-sepolia" => Some(USDC_BASE_SEPOLIA),
        "base" => Some(USDC_BASE),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub from: String,
    pub to: String,
    /// Amount in whole token units.
    pub amount: f64,
    pub token: Token,
    pub network: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: String,
}

#[async_trait]
pub trait WalletService: Send + Sync {
    async fn get_or_create_account(&self, name: &str) -> Result<Account, WalletError>;

    async fn list_accounts(&self) -> Result<Vec<Account>, WalletError>;

    async fn get_balances(&self, address: &str, network: &str)
        -> Result<Vec<TokenBalance>, WalletError>;

    async fn transfer(&self, request: &TransferRequest) -> Result<TransactionReceipt, WalletError>;

    async fn request_faucet(
        &self,
        address: &str,
        token: Token,
        network: &str,
    ) -> Result<TransactionReceipt, WalletError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn balance(symbol: &str, amount: &str, decimals: u32) -> TokenBalance {
        TokenBalance {
            symbol: symbol.to_string(),
            amount: amount.to_string(),
            decimals,
        }
    }

    #[test]
    fn test_balance_conversion() {
        let balances = vec![
            balance("USDC", "2500000", USDC_DECIMALS),
            balance("ETH", "500000000000000000", ETH_DECIMALS),
        ];
        assert_eq!(balance_of(&balances, "usdc"), 2.5);
        assert_eq!(balance_of(&balances, "ETH"), 0.5);
        assert_eq!(balance_of(&balances, "DAI"), 0.0);
    }

    #[test]
    fn test_malformed_amount_reads_as_zero() {
        assert_eq!(balance("USDC", "not-a-number", 6).as_units(), 0.0);
    }

    #[test]
    fn test_usdc_address_lookup() {
        assert_eq!(usdc_address("base-sepolia"), Some(USDC_BASE_SEPOLIA));
        assert_eq!(usdc_address("base"), Some(USDC_BASE));
        assert_eq!(usdc_address("solana"), None);
    }
}
