// REST client for the custodial wallet API (CDP v2 style endpoints)

use super::{
    usdc_address, Account, Token, TokenBalance, TransactionReceipt, TransferRequest, WalletError,
    WalletService, USDC_DECIMALS,
};
use crate::config::WalletConfig;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// ERC-20 `transfer(address,uint256)` selector.
const ERC20_TRANSFER_SELECTOR: &str = "a9059cbb";
const ACCOUNT_PAGE_SIZE: &str = "100";

pub struct CdpWalletClient {
    client: Client,
    base_url: String,
    api_key_id: Option<String>,
    api_key_secret: Option<String>,
    wallet_secret: Option<String>,
}

#[derive(Serialize)]
struct CreateAccountBody<'a> {
    name: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountPage {
    #[serde(default)]
    accounts: Vec<Account>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct BalancesResponse {
    #[serde(default)]
    balances: Vec<RemoteBalance>,
}

#[derive(Deserialize)]
struct RemoteBalance {
    amount: RemoteAmount,
    token: RemoteToken,
}

#[derive(Deserialize)]
struct RemoteAmount {
    amount: String,
    decimals: u32,
}

#[derive(Deserialize)]
struct RemoteToken {
    #[serde(default)]
    symbol: Option<String>,
}

#[derive(Serialize)]
struct FaucetBody<'a> {
    network: &'a str,
    address: &'a str,
    token: &'a str,
}

#[derive(Serialize)]
struct SendTransactionBody<'a> {
    network: &'a str,
    transaction: EvmCall,
}

#[derive(Serialize)]
struct EvmCall {
    to: String,
    data: String,
    value: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteError {
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl CdpWalletClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key_id: None,
            api_key_secret: None,
            wallet_secret: None,
        }
    }

    pub fn from_config(config: &WalletConfig) -> Self {
        let mut client = Self::new(&config.api_url);
        client.api_key_id = config.api_key_id.clone();
        client.api_key_secret = config.api_key_secret.clone();
        client.wallet_secret = config.wallet_secret.clone();
        client
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        let mut builder = builder;
        if let Some(id) = &self.api_key_id {
            builder = builder.header("X-Api-Key-Id", id);
        }
        if let Some(secret) = &self.api_key_secret {
            builder = builder.bearer_auth(secret);
        }
        if let Some(wallet_secret) = &self.wallet_secret {
            builder = builder.header("X-Wallet-Auth", wallet_secret);
        }
        builder
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, WalletError> {
        let response = self.authorize(builder).send().await?;
        check_status(response).await
    }

    async fn account_by_name(&self, name: &str) -> Result<Account, WalletError> {
        let response = self
            .send(self.client.get(self.url(&format!("/evm/accounts/by-name/{}", name))))
            .await?;
        Ok(response.json().await?)
    }
}

async fn check_status(response: Response) -> Result<Response, WalletError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<RemoteError>(&text)
        .ok()
        .and_then(|e| e.error_message.or(e.error))
        .unwrap_or(text);

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(WalletError::Unauthorized),
        StatusCode::TOO_MANY_REQUESTS => Err(WalletError::RateLimited(message)),
        _ if message.to_lowercase().contains("rate limit") => Err(WalletError::RateLimited(message)),
        _ => Err(WalletError::Remote {
            status: status.as_u16(),
            message,
        }),
    }
}

/// Calldata for an ERC-20 `transfer(to, amount)` with `amount` in base units.
pub fn erc20_transfer_calldata(to: &str, amount: u128) -> String {
    let to = to.trim_start_matches("0x").to_lowercase();
    format!("0x{}{:0>64}{:064x}", ERC20_TRANSFER_SELECTOR, to, amount)
}

/// Whole-unit amount to base units, truncating sub-unit dust.
pub fn to_base_units(amount: f64, decimals: u32) -> u128 {
    (amount * 10f64.powi(decimals as i32)).floor().max(0.0) as u128
}

#[async_trait]
impl WalletService for CdpWalletClient {
    async fn get_or_create_account(&self, name: &str) -> Result<Account, WalletError> {
        let request = self
            .client
            .post(self.url("/evm/accounts"))
            .json(&CreateAccountBody { name });

        match self.send(request).await {
            Ok(response) => Ok(response.json().await?),
            Err(WalletError::Remote { status: 409, .. }) => {
                debug!(name, "Account already exists, fetching by name");
                self.account_by_name(name).await
            }
            Err(e) => Err(e),
        }
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, WalletError> {
        let mut accounts = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(self.url("/evm/accounts"))
                .query(&[("pageSize", ACCOUNT_PAGE_SIZE)]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }

            let page: AccountPage = self.send(request).await?.json().await?;
            accounts.extend(page.accounts);

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(accounts)
    }

    async fn get_balances(
        &self,
        address: &str,
        network: &str,
    ) -> Result<Vec<TokenBalance>, WalletError> {
        let response = self
            .send(
                self.client
                    .get(self.url(&format!("/evm/token-balances/{}/{}", network, address))),
            )
            .await?;
        let body: BalancesResponse = response.json().await?;

        Ok(body
            .balances
            .into_iter()
            .filter_map(|b| {
                let symbol = b.token.symbol?;
                Some(TokenBalance {
                    symbol,
                    amount: b.amount.amount,
                    decimals: b.amount.decimals,
                })
            })
            .collect())
    }

    async fn transfer(&self, request: &TransferRequest) -> Result<TransactionReceipt, WalletError> {
        if request.token != Token::Usdc {
            return Err(WalletError::UnsupportedToken(
                request.token.to_string(),
                request.network.clone(),
            ));
        }
        let contract = usdc_address(&request.network).ok_or_else(|| {
            WalletError::UnsupportedToken(request.token.to_string(), request.network.clone())
        })?;

        let amount = to_base_units(request.amount, USDC_DECIMALS);
        let body = SendTransactionBody {
            network: &request.network,
            transaction: EvmCall {
                to: contract.to_string(),
                data: erc20_transfer_calldata(&request.to, amount),
                value: "0".to_string(),
            },
        };

        let response = self
            .send(
                self.client
                    .post(self.url(&format!("/evm/accounts/{}/send/transaction", request.from)))
                    .json(&body),
            )
            .await?;

        let receipt: TransactionReceipt = response.json().await?;
        if receipt.transaction_hash.is_empty() {
            warn!(from = %request.from, "Transfer accepted without a transaction hash");
            return Err(WalletError::InvalidResponse("missing transactionHash".into()));
        }
        Ok(receipt)
    }

    async fn request_faucet(
        &self,
        address: &str,
        token: Token,
        network: &str,
    ) -> Result<TransactionReceipt, WalletError> {
        let response = self
            .send(self.client.post(self.url("/evm/faucet")).json(&FaucetBody {
                network,
                address,
                token: token.as_str(),
            }))
            .await?;
        Ok(response.json().await?)
    }
}
