use anyhow::{bail, Result};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Networks where the faucet and transfers are permitted.
pub const TESTNET: &str = "base-sepolia";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub payment: PaymentConfig,
    pub wallet: WalletConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    /// Public origin of this service; the payment gate calls back into it.
    pub app_url: String,
    pub cors_allowed_origins: Vec<String>,
}

/// What the gate does when validation itself breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum FailMode {
    /// Let every request through.
    Open,
    /// Refuse API routes with 503, let pages through.
    ClosedApi,
}

impl std::str::FromStr for FailMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(FailMode::Open),
            "closed-api" | "closed_api" => Ok(FailMode::ClosedApi),
            other => bail!("unknown PAYMENT_FAIL_MODE '{}' (expected 'open' or 'closed-api')", other),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    pub x402_enabled: bool,
    pub network: String,
    pub seller_address: Option<String>,
    pub seller_account_name: String,
    pub facilitator_url: String,
    pub validation_path: String,
    pub protected_routes: Vec<String>,
    pub excluded_paths: Vec<String>,
    pub api_prefix: String,
    pub fail_mode: FailMode,
    pub validation_timeout_secs: u64,
    pub max_forward_body_bytes: usize,
    pub bot_signatures_file: Option<PathBuf>,
    /// `(prefix, price)` pairs, prices as `$`-prefixed USD strings.
    pub route_prices: Vec<(String, String)>,
}

impl PaymentConfig {
    pub fn validation_timeout(&self) -> Duration {
        Duration::from_secs(self.validation_timeout_secs)
    }

    pub fn is_testnet(&self) -> bool {
        self.network == TESTNET
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    pub api_url: String,
    pub api_key_id: Option<String>,
    pub api_key_secret: Option<String>,
    pub wallet_secret: Option<String>,
}

/// Parse `"/blog=$0.001,/api/add=$0.005"` into `(prefix, price)` pairs.
pub fn parse_route_prices(raw: &str) -> Result<Vec<(String, String)>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once('=') {
            Some((prefix, price)) if prefix.trim().starts_with('/') && !price.trim().is_empty() => {
                Ok((prefix.trim().to_string(), price.trim().to_string()))
            }
            _ => bail!("invalid PAYMENT_ROUTE_PRICES entry '{}' (expected /prefix=$price)", entry),
        })
        .collect()
}

fn list_var(name: &str, default: &str) -> Vec<String> {
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let port: u16 = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()?;

        let route_prices = env::var("PAYMENT_ROUTE_PRICES").unwrap_or_else(|_| {
            format!(
                "/blog={},/api/add={}",
                env::var("BLOG_PRICE").unwrap_or_else(|_| "$0.001".to_string()),
                env::var("ADD_PRICE").unwrap_or_else(|_| "$0.005".to_string()),
            )
        });

        Ok(Self {
            server: ServerConfig {
                port,
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                app_url: env::var("APP_URL")
                    .map(|url| url.trim_end_matches('/').to_string())
                    .unwrap_or_else(|_| format!("http://localhost:{}", port)),
                cors_allowed_origins: list_var("ALLOWED_ORIGINS", "*"),
            },
            payment: PaymentConfig {
                x402_enabled: env::var("X402_ENABLED")
                    .unwrap_or_else(|_| "false".to_string())
                    .parse()?,
                network: env::var("NETWORK").unwrap_or_else(|_| TESTNET.to_string()),
                seller_address: env::var("SELLER_ADDRESS").ok().filter(|s| !s.trim().is_empty()),
                seller_account_name: env::var("SELLER_ACCOUNT_NAME")
                    .unwrap_or_else(|_| "Seller".to_string()),
                facilitator_url: env::var("FACILITATOR_URL")
                    .unwrap_or_else(|_| "https://x402.org/facilitator".to_string()),
                validation_path: env::var("PAYMENT_VALIDATION_PATH")
                    .unwrap_or_else(|_| "/api/payment-validate".to_string()),
                protected_routes: list_var("PAYMENT_PROTECTED_ROUTES", "/blog,/api/add"),
                excluded_paths: list_var(
                    "PAYMENT_EXCLUDED_PATHS",
                    "/_next/static,/_next/image,/favicon.ico,/sitemap.xml,/robots.txt,/static",
                ),
                api_prefix: env::var("PAYMENT_API_PREFIX").unwrap_or_else(|_| "/api".to_string()),
                fail_mode: env::var("PAYMENT_FAIL_MODE")
                    .unwrap_or_else(|_| "open".to_string())
                    .parse()?,
                validation_timeout_secs: env::var("PAYMENT_VALIDATION_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()?,
                max_forward_body_bytes: env::var("PAYMENT_MAX_FORWARD_BODY_BYTES")
                    .unwrap_or_else(|_| (2 * 1024 * 1024).to_string())
                    .parse()?,
                bot_signatures_file: env::var("BOT_SIGNATURES_FILE").ok().map(PathBuf::from),
                route_prices: parse_route_prices(&route_prices)?,
            },
            wallet: WalletConfig {
                api_url: env::var("CDP_API_URL")
                    .unwrap_or_else(|_| "https://api.cdp.coinbase.com/platform/v2".to_string()),
                api_key_id: env::var("CDP_API_KEY_ID").ok(),
                api_key_secret: env::var("CDP_API_KEY_SECRET").ok(),
                wallet_secret: env::var("CDP_WALLET_SECRET").ok(),
            },
        })
    }

    /// Configuration used by tests: testnet, enforcement off, no secrets.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            server: ServerConfig {
                port: 3000,
                host: "127.0.0.1".to_string(),
                app_url: "http://localhost:3000".to_string(),
                cors_allowed_origins: vec!["*".to_string()],
            },
            payment: PaymentConfig {
                x402_enabled: false,
                network: TESTNET.to_string(),
                seller_address: None,
                seller_account_name: "Seller".to_string(),
                facilitator_url: "http://localhost:9/facilitator".to_string(),
                validation_path: "/api/payment-validate".to_string(),
                protected_routes: vec!["/blog".to_string(), "/api/add".to_string()],
                excluded_paths: vec!["/favicon.ico".to_string(), "/robots.txt".to_string()],
                api_prefix: "/api".to_string(),
                fail_mode: FailMode::Open,
                validation_timeout_secs: 5,
                max_forward_body_bytes: 64 * 1024,
                bot_signatures_file: None,
                route_prices: vec![
                    ("/blog".to_string(), "$0.001".to_string()),
                    ("/api/add".to_string(), "$0.005".to_string()),
                ],
            },
            wallet: WalletConfig {
                api_url: "http://localhost:9".to_string(),
                api_key_id: None,
                api_key_secret: None,
                wallet_secret: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fail_mode_parsing() {
        assert_eq!("open".parse::<FailMode>().unwrap(), FailMode::Open);
        assert_eq!("Closed-API".parse::<FailMode>().unwrap(), FailMode::ClosedApi);
        assert!("closed".parse::<FailMode>().is_err());
    }

    #[test]
    fn test_route_prices_parsing() {
        let prices = parse_route_prices(" /premium=$0.01, /api/report=$0.25 ,").unwrap();
        assert_eq!(
            prices,
            vec![
                ("/premium".to_string(), "$0.01".to_string()),
                ("/api/report".to_string(), "$0.25".to_string()),
            ]
        );
        assert!(parse_route_prices("/premium").is_err());
        assert!(parse_route_prices("premium=$1").is_err());
        assert!(parse_route_prices("/premium=").is_err());
    }

    #[test]
    fn test_testnet_detection() {
        let mut config = Config::for_tests();
        assert!(config.payment.is_testnet());
        config.payment.network = "base".to_string();
        assert!(!config.payment.is_testnet());
    }
}
