use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::domain::WalletId;
use crate::error::LedgerError;

/// Held for as long as a wallet's balance is being read and rewritten.
pub type WalletGuard = OwnedMutexGuard<()>;

/// Registry of per-wallet exclusive locks.
///
/// Every acquisition is bounded by `timeout`; running out of time yields the
/// retriable `LedgerError::LockTimeout`. Pairs are always taken lowest id
/// first so two opposite transfers cannot deadlock.
#[derive(Debug)]
pub struct WalletLocks {
    locks: Mutex<HashMap<WalletId, Arc<AsyncMutex<()>>>>,
    timeout: Duration,
}

impl WalletLocks {
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn slot(&self, wallet_id: WalletId) -> Arc<AsyncMutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        // Drop slots nobody is holding or waiting on.
        if locks.len() > 1024 {
            locks.retain(|_, slot| Arc::strong_count(slot) > 1);
        }

        locks
            .entry(wallet_id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Lock a single wallet.
    pub async fn acquire(&self, wallet_id: WalletId) -> Result<WalletGuard, LedgerError> {
        let slot = self.slot(wallet_id);
        tokio::time::timeout(self.timeout, slot.lock_owned())
            .await
            .map_err(|_| LedgerError::LockTimeout(wallet_id))
    }

    /// Lock two distinct wallets in id order. Guards are returned in the
    /// order the ids were given.
    pub async fn acquire_pair(
        &self,
        a: WalletId,
        b: WalletId,
    ) -> Result<(WalletGuard, WalletGuard), LedgerError> {
        if a <= b {
            let first = self.acquire(a).await?;
            let second = self.acquire(b).await?;
            Ok((first, second))
        } else {
            let second = self.acquire(b).await?;
            let first = self.acquire(a).await?;
            Ok((first, second))
        }
    }
}
