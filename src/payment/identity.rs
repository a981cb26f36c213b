//! Payer identity cache
//!
//! The validation endpoint needs the seller account (the x402 `payTo`
//! address) before it can quote or verify a payment. Resolving it is a remote
//! call, so the result is kept for the lifetime of the process:
//!
//! ```text
//!   Empty ──get()──▶ Pending(flight) ──ok──▶ Ready(identity)
//!     ▲                    │
//!     └───────err──────────┘   (next get() starts a new flight)
//! ```
//!
//! Only one flight exists at a time. Concurrent callers clone and await the same
//! shared handle. The flight runs in its own task, so a caller that goes away
//! (client disconnect) does not cancel it.

use crate::wallet::WalletService;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PayerIdentity {
    pub address: String,
    pub name: String,
}

#[derive(Debug, Clone, Error)]
pub enum IdentityError {
    #[error("failed to get or create account: {0}")]
    Creation(String),

    #[error("account initialization task aborted: {0}")]
    Aborted(String),
}

/// Observable cache state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityState {
    Uninitialized,
    Initializing,
    Ready,
    /// The last attempt failed; the next `get()` retries.
    Failed,
}

type Flight = Shared<BoxFuture<'static, Result<PayerIdentity, IdentityError>>>;

enum Slot {
    Empty { last_error: Option<String> },
    Pending(Flight),
    Ready(PayerIdentity),
}

struct Inner {
    wallet: Arc<dyn WalletService>,
    account_name: String,
    slot: Mutex<Slot>,
}

#[derive(Clone)]
pub struct IdentityCache {
    inner: Arc<Inner>,
}

impl IdentityCache {
    pub fn new(wallet: Arc<dyn WalletService>, account_name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                wallet,
                account_name: account_name.into(),
                slot: Mutex::new(Slot::Empty { last_error: None }),
            }),
        }
    }

    /// Cache seeded with a pre-provisioned identity; no remote call is ever made.
    pub fn with_identity(
        wallet: Arc<dyn WalletService>,
        account_name: impl Into<String>,
        identity: PayerIdentity,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                wallet,
                account_name: account_name.into(),
                slot: Mutex::new(Slot::Ready(identity)),
            }),
        }
    }

    pub fn account_name(&self) -> &str {
        &self.inner.account_name
    }

    /// Resolve the identity, starting or joining the single in-flight attempt.
    pub async fn get(&self) -> Result<PayerIdentity, IdentityError> {
        let flight = {
            let mut slot = self.inner.slot.lock().await;
            match &*slot {
                Slot::Ready(identity) => return Ok(identity.clone()),
                Slot::Pending(flight) => flight.clone(),
                Slot::Empty { .. } => {
                    // The spawned task blocks on `slot` until this guard drops,
                    // so it can never observe the state before `Pending` is set.
                    let flight = launch(Arc::clone(&self.inner));
                    *slot = Slot::Pending(flight.clone());
                    flight
                }
            }
        };
        flight.await
    }

    pub async fn state(&self) -> IdentityState {
        match &*self.inner.slot.lock().await {
            Slot::Empty { last_error: None } => IdentityState::Uninitialized,
            Slot::Empty { last_error: Some(_) } => IdentityState::Failed,
            Slot::Pending(_) => IdentityState::Initializing,
            Slot::Ready(_) => IdentityState::Ready,
        }
    }

    /// The cached identity, without triggering initialization.
    pub async fn peek(&self) -> Option<PayerIdentity> {
        match &*self.inner.slot.lock().await {
            Slot::Ready(identity) => Some(identity.clone()),
            _ => None,
        }
    }

    pub async fn last_error(&self) -> Option<String> {
        match &*self.inner.slot.lock().await {
            Slot::Empty { last_error } => last_error.clone(),
            _ => None,
        }
    }
}

fn launch(inner: Arc<Inner>) -> Flight {
    let task_inner = Arc::clone(&inner);
    let handle = tokio::spawn(async move {
        let name = task_inner.account_name.clone();
        info!(account = %name, "Initializing payer identity");

        let result = task_inner
            .wallet
            .get_or_create_account(&name)
            .await
            .map(|account| PayerIdentity {
                address: account.address,
                name: account.name.unwrap_or_else(|| name.clone()),
            })
            .map_err(|e| IdentityError::Creation(e.to_string()));

        let mut slot = task_inner.slot.lock().await;
        *slot = match &result {
            Ok(identity) => {
                info!(account = %name, address = %identity.address, "Payer identity ready");
                Slot::Ready(identity.clone())
            }
            Err(e) => {
                warn!(account = %name, error = %e, "Payer identity initialization failed, will retry on next request");
                Slot::Empty { last_error: Some(e.to_string()) }
            }
        };
        result
    });

    async move {
        match handle.await {
            Ok(result) => result,
            Err(join_error) => {
                let error = IdentityError::Aborted(join_error.to_string());
                let mut slot = inner.slot.lock().await;
                if matches!(*slot, Slot::Pending(_)) {
                    *slot = Slot::Empty { last_error: Some(error.to_string()) };
                }
                Err(error)
            }
        }
    }
    .boxed()
    .shared()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::mock::{address_for, MockWallet};
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn slow_wallet() -> Arc<MockWallet> {
        Arc::new(MockWallet {
            create_delay: Duration::from_millis(50),
            ..Default::default()
        })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_calls_share_one_creation() {
        let wallet = slow_wallet();
        let cache = IdentityCache::new(wallet.clone(), "Seller");

        let calls = (0..16).map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get().await })
        });
        let results = futures::future::join_all(calls).await;

        for result in results {
            let identity = result.unwrap().unwrap();
            assert_eq!(identity.address, address_for("Seller"));
            assert_eq!(identity.name, "Seller");
        }
        assert_eq!(wallet.creates(), 1);
        assert_eq!(cache.state().await, IdentityState::Ready);
    }

    #[tokio::test]
    async fn test_ready_identity_is_reused() {
        let wallet = Arc::new(MockWallet::default());
        let cache = IdentityCache::new(wallet.clone(), "Seller");

        assert_eq!(cache.state().await, IdentityState::Uninitialized);
        assert!(cache.peek().await.is_none());

        let first = cache.get().await.unwrap();
        let second = cache.get().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(wallet.creates(), 1);
        assert_eq!(cache.peek().await, Some(first));
    }

    #[tokio::test]
    async fn test_failure_is_retried_on_next_call() {
        let wallet = Arc::new(MockWallet::default());
        wallet.failing_creates.store(1, Ordering::SeqCst);
        let cache = IdentityCache::new(wallet.clone(), "Seller");

        let err = cache.get().await.unwrap_err();
        assert!(matches!(err, IdentityError::Creation(_)));
        assert_eq!(cache.state().await, IdentityState::Failed);
        assert!(cache.last_error().await.unwrap().contains("account service down"));

        let identity = cache.get().await.unwrap();
        assert_eq!(identity.address, address_for("Seller"));
        assert_eq!(wallet.creates(), 2);
        assert_eq!(cache.state().await, IdentityState::Ready);
    }

    #[tokio::test]
    async fn test_concurrent_waiters_all_see_the_failure() {
        let wallet = slow_wallet();
        wallet.failing_creates.store(1, Ordering::SeqCst);
        let cache = IdentityCache::new(wallet.clone(), "Seller");

        let (a, b) = tokio::join!(cache.get(), cache.get());
        assert!(a.is_err());
        assert!(b.is_err());
        assert_eq!(wallet.creates(), 1);
    }

    #[tokio::test]
    async fn test_dropped_caller_does_not_cancel_initialization() {
        let wallet = slow_wallet();
        let cache = IdentityCache::new(wallet.clone(), "Seller");

        let abandoned = tokio::time::timeout(Duration::from_millis(5), cache.get()).await;
        assert!(abandoned.is_err());
        assert_eq!(cache.state().await, IdentityState::Initializing);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(cache.state().await, IdentityState::Ready);
        assert!(cache.get().await.is_ok());
        assert_eq!(wallet.creates(), 1);
    }

    #[tokio::test]
    async fn test_preloaded_identity_never_calls_wallet() {
        let wallet = Arc::new(MockWallet::default());
        let identity = PayerIdentity {
            address: "0x209693Bc6afc0C5328bA36FaF03C514EF312287C".to_string(),
            name: "Seller".to_string(),
        };
        let cache = IdentityCache::with_identity(wallet.clone(), "Seller", identity.clone());

        assert_eq!(cache.get().await.unwrap(), identity);
        assert_eq!(wallet.creates(), 0);
    }
}
