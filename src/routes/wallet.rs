//! Wallet management routes
//!
//! - `POST /api/wallet/create` - get or create a named account
//! - `GET /api/wallet/list` - every account with USDC/ETH balances
//! - `GET /api/wallet/balance?address=` - balances of one address
//! - `POST /api/wallet/fund` - testnet faucet
//! - `POST /api/wallet/transfer` - USDC transfer between accounts (testnet)

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::future::join_all;
use serde_json::json;
use tracing::{error, info, warn};
use validator::Validate;

use crate::models::{
    AppState, BalanceQuery, BalanceResponse, CreateWalletRequest, CreateWalletResponse,
    FundRequest, FundResponse, TransferBody, TransferResponse, WalletBalances, WalletListResponse,
    WalletSummary,
};
use crate::types::{AppError, AppResult};
use crate::wallet::{balance_of, Token, TokenBalance, TransferRequest, WalletError};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/wallet/create", post(create_wallet))
        .route("/api/wallet/list", get(list_wallets))
        .route("/api/wallet/balance", get(wallet_balance))
        .route("/api/wallet/fund", post(fund_wallet))
        .route("/api/wallet/transfer", post(transfer))
        .with_state(state)
}

/// Unwrap and validate a JSON body; both failures are a 400.
fn validated<T: Validate>(payload: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    let Json(body) = payload.map_err(|rejection| {
        AppError::InvalidInput(json!([{ "message": rejection.body_text() }]))
    })?;
    body.validate()?;
    Ok(body)
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn explorer_url(network: &str, tx_hash: &str) -> String {
    match network {
        "base" => format!("https://basescan.org/tx/{}", tx_hash),
        _ => format!("https://sepolia.basescan.org/tx/{}", tx_hash),
    }
}

fn balances_from(tokens: &[TokenBalance]) -> WalletBalances {
    WalletBalances {
        usdc: balance_of(tokens, "USDC"),
        eth: balance_of(tokens, "ETH"),
    }
}

fn server_error(error: &str, details: impl ToString) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": error, "details": details.to_string() })),
    )
        .into_response()
}

fn require_testnet(state: &AppState, action: &str) -> AppResult<()> {
    if state.config.payment.is_testnet() {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "{} only available on testnet (base-sepolia)",
            action
        )))
    }
}

async fn create_wallet(
    State(state): State<AppState>,
    payload: Result<Json<CreateWalletRequest>, JsonRejection>,
) -> AppResult<Response> {
    let request = validated(payload)?;
    let account_name = request.account_name();

    match state.wallet.get_or_create_account(&account_name).await {
        Ok(account) => {
            info!(name = %account_name, address = %account.address, "Wallet ready");
            let response = CreateWalletResponse {
                address: account.address,
                name: account_name,
                kind: request.kind,
            };
            Ok((StatusCode::CREATED, Json(response)).into_response())
        }
        Err(e) => {
            error!(name = %account_name, error = %e, "Wallet creation failed");
            Ok(server_error("Failed to create wallet", e))
        }
    }
}

async fn list_wallets(State(state): State<AppState>) -> Response {
    let accounts = match state.wallet.list_accounts().await {
        Ok(accounts) => accounts,
        Err(e) => {
            error!(error = %e, "Listing wallets failed");
            return server_error("Failed to list wallets", e);
        }
    };

    let network = &state.config.payment.network;
    let wallets = join_all(accounts.into_iter().map(|account| {
        let wallet = state.wallet.clone();
        async move {
            let name = account.name.clone().unwrap_or_else(|| "Unnamed Wallet".to_string());
            match wallet.get_balances(&account.address, network).await {
                Ok(tokens) => WalletSummary {
                    name,
                    address: account.address,
                    balances: balances_from(&tokens),
                    last_updated: now(),
                    error: None,
                },
                Err(e) => {
                    warn!(address = %account.address, error = %e, "Could not load balances");
                    WalletSummary {
                        name,
                        address: account.address,
                        balances: WalletBalances::default(),
                        last_updated: now(),
                        error: Some("Failed to load balances".to_string()),
                    }
                }
            }
        }
    }))
    .await;

    Json(WalletListResponse {
        count: wallets.len(),
        wallets,
        last_updated: now(),
    })
    .into_response()
}

async fn wallet_balance(
    State(state): State<AppState>,
    query: Result<Query<BalanceQuery>, QueryRejection>,
) -> AppResult<Json<BalanceResponse>> {
    let Query(query) = query.map_err(|rejection| {
        AppError::InvalidInput(json!([{ "message": rejection.body_text() }]))
    })?;
    query.validate()?;
    let network = &state.config.payment.network;

    // Unknown addresses and lookup failures both read as zero.
    let tokens = match state.wallet.list_accounts().await {
        Ok(accounts) => match accounts
            .iter()
            .find(|a| a.address.eq_ignore_ascii_case(&query.address))
        {
            Some(account) => state
                .wallet
                .get_balances(&account.address, network)
                .await
                .unwrap_or_else(|e| {
                    warn!(address = %query.address, error = %e, "Balance lookup failed");
                    Vec::new()
                }),
            None => Vec::new(),
        },
        Err(e) => {
            warn!(error = %e, "Account lookup failed");
            Vec::new()
        }
    };

    let balances = balances_from(&tokens);
    Ok(Json(BalanceResponse {
        usdc: balances.usdc,
        eth: balances.eth,
        last_updated: now(),
        address: query.address,
    }))
}

async fn fund_wallet(
    State(state): State<AppState>,
    payload: Result<Json<FundRequest>, JsonRejection>,
) -> AppResult<Response> {
    let request = validated(payload)?;
    require_testnet(&state, "Funding")?;

    let token = if request.token == "eth" { Token::Eth } else { Token::Usdc };
    let network = &state.config.payment.network;

    match state.wallet.request_faucet(&request.address, token, network).await {
        Ok(receipt) => {
            info!(address = %request.address, %token, tx = %receipt.transaction_hash, "Faucet funds requested");
            Ok(Json(FundResponse {
                explorer_url: explorer_url(network, &receipt.transaction_hash),
                transaction_hash: receipt.transaction_hash,
                status: "submitted".to_string(),
                token: token.symbol().to_string(),
                address: request.address,
            })
            .into_response())
        }
        Err(WalletError::RateLimited(message)) => {
            warn!(address = %request.address, %message, "Faucet rate limited");
            Ok((
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({ "error": "Rate limit exceeded. Please wait before requesting more funds." })),
            )
                .into_response())
        }
        Err(e) => {
            error!(address = %request.address, error = %e, "Funding failed");
            Ok(server_error("Failed to fund wallet", e))
        }
    }
}

/// User-facing summary of a failed transfer.
fn friendly_transfer_error(details: &str) -> &'static str {
    let details = details.to_lowercase();
    if details.contains("insufficient funds") || details.contains("insufficient balance") {
        "Insufficient funds for transfer (including gas fees)"
    } else if details.contains("nonce") {
        "Transaction nonce error - please try again"
    } else if details.contains("gas") {
        "Gas estimation failed - please ensure wallet has ETH for gas"
    } else if details.contains("rate limit") || details.contains("429") {
        "Rate limit exceeded - please wait before trying again"
    } else {
        "Transfer failed"
    }
}

async fn transfer(
    State(state): State<AppState>,
    payload: Result<Json<TransferBody>, JsonRejection>,
) -> AppResult<Response> {
    let body = validated(payload)?;
    require_testnet(&state, "Transfers")?;
    let network = state.config.payment.network.clone();

    let accounts = state.wallet.list_accounts().await?;
    let sender = accounts
        .iter()
        .find(|a| a.address.eq_ignore_ascii_case(&body.from_address))
        .ok_or_else(|| AppError::NotFound("Sender wallet not found in your account list".to_string()))?;

    match state.wallet.get_balances(&sender.address, &network).await {
        Ok(tokens) => {
            let available = balance_of(&tokens, "USDC");
            if available < body.amount {
                return Ok((
                    StatusCode::BAD_REQUEST,
                    Json(json!({
                        "error": "Insufficient USDC balance",
                        "available": available,
                        "requested": body.amount,
                    })),
                )
                    .into_response());
            }
        }
        Err(e) => warn!(address = %sender.address, error = %e, "Could not check balance before transfer"),
    }

    let request = TransferRequest {
        from: sender.address.clone(),
        to: body.to_address.clone(),
        amount: body.amount,
        token: Token::Usdc,
        network: network.clone(),
    };

    match state.wallet.transfer(&request).await {
        Ok(receipt) => {
            info!(from = %request.from, to = %request.to, amount = request.amount, tx = %receipt.transaction_hash, "Transfer submitted");
            Ok(Json(TransferResponse {
                explorer_url: explorer_url(&network, &receipt.transaction_hash),
                transaction_hash: receipt.transaction_hash,
                status: "submitted".to_string(),
                from_address: body.from_address,
                to_address: body.to_address,
                amount: body.amount,
                token: Token::Usdc.symbol().to_string(),
                timestamp: now(),
            })
            .into_response())
        }
        Err(e) => {
            let details = e.to_string();
            error!(from = %request.from, error = %details, "Transfer failed");
            Ok((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": friendly_transfer_error(&details),
                    "details": details,
                    "suggestion": "Ensure sender wallet has sufficient USDC and ETH for gas fees",
                })),
            )
                .into_response())
        }
    }
}
