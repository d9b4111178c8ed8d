//! Local wallet provider double
//!
//! Stands in for a browser wallet in CLI runs and tests: a fixed account
//! set, a grant flag that mimics the "no accounts until approved"
//! behavior, and hooks to reject prompts or push change events.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{Error, Result};
use crate::ledger::Address;

use super::types::{ProviderEvent, WalletProvider};

pub struct SimulatedProvider {
    available: bool,
    accounts: RwLock<Vec<Address>>,
    chain_id: RwLock<String>,
    /// Accounts are only exposed passively once the user has approved
    granted: AtomicBool,
    /// When set, the next prompt is declined
    reject_next: AtomicBool,
    subscribers: Mutex<Vec<async_channel::Sender<ProviderEvent>>>,
}

impl SimulatedProvider {
    pub fn new(accounts: Vec<Address>, chain_id: impl Into<String>) -> Self {
        Self {
            available: true,
            accounts: RwLock::new(accounts),
            chain_id: RwLock::new(chain_id.into()),
            granted: AtomicBool::new(false),
            reject_next: AtomicBool::new(false),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// A provider that behaves as if no wallet is installed.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            accounts: RwLock::new(Vec::new()),
            chain_id: RwLock::new(String::new()),
            granted: AtomicBool::new(false),
            reject_next: AtomicBool::new(false),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Decline the next account prompt, as a user hitting "cancel" would.
    pub fn reject_next_prompt(&self) {
        self.reject_next.store(true, Ordering::SeqCst);
    }

    /// Treat access as already granted (a previously approved site).
    pub fn grant(&self) {
        self.granted.store(true, Ordering::SeqCst);
    }

    fn broadcast(&self, event: ProviderEvent) {
        let mut subs = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subs.retain(|tx| tx.try_send(event.clone()).is_ok());
    }

    /// Switch the selected accounts and notify subscribers.
    pub async fn switch_accounts(&self, accounts: Vec<Address>) {
        *self.accounts.write().await = accounts.clone();
        debug!("Provider accounts switched ({} available)", accounts.len());
        self.broadcast(ProviderEvent::AccountsChanged(accounts));
    }

    /// Switch the active chain and notify subscribers.
    pub async fn switch_chain(&self, chain_id: impl Into<String>) {
        let chain_id = chain_id.into();
        *self.chain_id.write().await = chain_id.clone();
        self.broadcast(ProviderEvent::ChainChanged(chain_id));
    }
}

#[async_trait]
impl WalletProvider for SimulatedProvider {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn request_accounts(&self) -> Result<Vec<Address>> {
        if !self.available {
            return Err(Error::ProviderUnavailable);
        }
        if self.reject_next.swap(false, Ordering::SeqCst) {
            return Err(Error::ConnectionRejected(
                "User rejected the request".to_string(),
            ));
        }
        self.granted.store(true, Ordering::SeqCst);
        Ok(self.accounts.read().await.clone())
    }

    async fn accounts(&self) -> Result<Vec<Address>> {
        if !self.available {
            return Err(Error::ProviderUnavailable);
        }
        if !self.granted.load(Ordering::SeqCst) {
            return Ok(Vec::new());
        }
        Ok(self.accounts.read().await.clone())
    }

    async fn chain_id(&self) -> Result<String> {
        if !self.available {
            return Err(Error::ProviderUnavailable);
        }
        Ok(self.chain_id.read().await.clone())
    }

    async fn request_permissions(&self) -> Result<()> {
        if !self.available {
            return Err(Error::ProviderUnavailable);
        }
        if self.reject_next.swap(false, Ordering::SeqCst) {
            return Err(Error::ConnectionRejected(
                "User rejected the request".to_string(),
            ));
        }
        // forcing the picker drops the previous grant
        self.granted.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn subscribe(&self) -> async_channel::Receiver<ProviderEvent> {
        let (tx, rx) = async_channel::unbounded();
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tx);
        rx
    }
}
