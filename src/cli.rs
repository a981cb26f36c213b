//! Command-line interface definition.

use clap::{Parser, Subcommand};

/// Pay-per-request gate for HTTP routes using x402.
#[derive(Parser, Debug)]
#[command(name = "paygate")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Run the HTTP server (default).
    Serve,
    /// Check that required environment variables are set.
    CheckEnv,
    /// Get or create the seller account and print its address.
    GenerateSeller,
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.unwrap_or(Command::Serve)
    }
}

/// Variables the wallet service cannot work without.
pub const REQUIRED_VARS: &[&str] = &["CDP_API_KEY_ID", "CDP_API_KEY_SECRET", "CDP_WALLET_SECRET"];

/// Variables with a fallback, and what the fallback is.
pub const OPTIONAL_VARS: &[(&str, &str)] = &[
    ("NETWORK", "base-sepolia"),
    ("APP_URL", "http://localhost:{PORT}"),
    ("X402_ENABLED", "false"),
    ("SELLER_ADDRESS", "resolved from SELLER_ACCOUNT_NAME at runtime"),
    ("BOT_SIGNATURES_FILE", "built-in signature list"),
    ("PAYMENT_ROUTE_PRICES", "/blog=BLOG_PRICE,/api/add=ADD_PRICE"),
];

/// Show enough of a secret to recognise it, never the whole value.
pub fn mask(value: &str) -> String {
    if value.chars().count() > 8 {
        format!("{}...", value.chars().take(4).collect::<String>())
    } else {
        "***".to_string()
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct EnvReport {
    pub present: Vec<(String, String)>,
    pub missing: Vec<String>,
    pub defaulted: Vec<(String, String)>,
}

impl EnvReport {
    pub fn is_ok(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Inspect the environment through `lookup` (blank values count as unset).
pub fn check_env(lookup: impl Fn(&str) -> Option<String>) -> EnvReport {
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
    let mut report = EnvReport::default();

    for name in REQUIRED_VARS {
        match get(name) {
            Some(value) => report.present.push((name.to_string(), mask(&value))),
            None => report.missing.push(name.to_string()),
        }
    }
    for (name, default) in OPTIONAL_VARS {
        match get(name) {
            Some(value) => report.present.push((name.to_string(), value)),
            None => report.defaulted.push((name.to_string(), default.to_string())),
        }
    }
    report
}
