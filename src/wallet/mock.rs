// In-memory wallet service for tests

use super::{
    Account, Token, TokenBalance, TransactionReceipt, TransferRequest, WalletError, WalletService,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
pub struct MockWallet {
    pub accounts: Mutex<Vec<Account>>,
    pub balances: Mutex<HashMap<String, Vec<TokenBalance>>>,
    pub create_calls: AtomicUsize,
    /// Number of upcoming `get_or_create_account` calls that fail.
    pub failing_creates: AtomicUsize,
    pub create_delay: Duration,
    pub fail_balances: bool,
    pub faucet_error: Option<fn() -> WalletError>,
    pub transfer_error: Option<fn() -> WalletError>,
    pub transfers: Mutex<Vec<TransferRequest>>,
}

impl MockWallet {
    pub fn with_account(self, address: &str, name: &str) -> Self {
        self.accounts
            .lock()
            .unwrap()
            .push(Account { address: address.to_string(), name: Some(name.to_string()) });
        self
    }

    pub fn with_balance(self, address: &str, symbol: &str, amount: &str, decimals: u32) -> Self {
        self.balances
            .lock()
            .unwrap()
            .entry(address.to_lowercase())
            .or_default()
            .push(TokenBalance { symbol: symbol.to_string(), amount: amount.to_string(), decimals });
        self
    }

    pub fn creates(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }
}

/// Deterministic fake address derived from an account name.
pub fn address_for(name: &str) -> String {
    let seed = name.bytes().fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
    format!("0x{:040x}", seed)
}

#[async_trait]
impl WalletService for MockWallet {
    async fn get_or_create_account(&self, name: &str) -> Result<Account, WalletError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if !self.create_delay.is_zero() {
            tokio::time::sleep(self.create_delay).await;
        }

        let should_fail = self
            .failing_creates
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(WalletError::Remote { status: 500, message: "account service down".into() });
        }

        let mut accounts = self.accounts.lock().unwrap();
        if let Some(existing) = accounts.iter().find(|a| a.name.as_deref() == Some(name)) {
            return Ok(existing.clone());
        }
        let account = Account { address: address_for(name), name: Some(name.to_string()) };
        accounts.push(account.clone());
        Ok(account)
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, WalletError> {
        Ok(self.accounts.lock().unwrap().clone())
    }

    async fn get_balances(
        &self,
        address: &str,
        _network: &str,
    ) -> Result<Vec<TokenBalance>, WalletError> {
        if self.fail_balances {
            return Err(WalletError::Remote { status: 503, message: "balances unavailable".into() });
        }
        Ok(self
            .balances
            .lock()
            .unwrap()
            .get(&address.to_lowercase())
            .cloned()
            .unwrap_or_default())
    }

    async fn transfer(&self, request: &TransferRequest) -> Result<TransactionReceipt, WalletError> {
        if let Some(make_error) = self.transfer_error {
            return Err(make_error());
        }
        self.transfers.lock().unwrap().push(request.clone());
        Ok(TransactionReceipt { transaction_hash: "0xtransfer".to_string() })
    }

    async fn request_faucet(
        &self,
        _address: &str,
        token: Token,
        _network: &str,
    ) -> Result<TransactionReceipt, WalletError> {
        if let Some(make_error) = self.faucet_error {
            return Err(make_error());
        }
        Ok(TransactionReceipt { transaction_hash: format!("0xfaucet{}", token.as_str()) })
    }
}
