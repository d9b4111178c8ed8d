//! Wallet session manager
//!
//! Owns the single session holder. Every mutation path - user-driven
//! connect/disconnect/refresh and pushed provider events - writes through
//! the same `RwLock`, so there is never a divergent view of the connected
//! account. Pushed events win over an in-flight connect (last write wins,
//! no merge).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::Error;
use crate::ledger::Address;
use crate::provider::{ProviderEvent, WalletProvider};

/// Connection state for the active wallet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub wallet_address: Option<Address>,
    pub chain_id: Option<String>,
    /// True only while `connect()` is awaiting the provider prompt
    pub connecting: bool,
    /// Advisory busy flag for the one in-flight write transaction
    pub transacting: bool,
}

impl Session {
    pub fn is_empty(&self) -> bool {
        *self == Session::default()
    }
}

/// Aborts the event pump task when dropped, releasing the provider
/// subscription with the scope that acquired it.
pub struct EventPumpGuard {
    handle: JoinHandle<()>,
}

impl Drop for EventPumpGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Clears the `transacting` flag when dropped, so the busy marker cannot
/// leak past the write that set it, whichever way that write ends.
pub struct TransactionGuard<'a> {
    manager: &'a SessionManager,
}

impl Drop for TransactionGuard<'_> {
    fn drop(&mut self) {
        self.manager.transacting.store(false, Ordering::SeqCst);
    }
}

pub struct SessionManager {
    provider: Arc<dyn WalletProvider>,
    session: RwLock<Session>,
    /// Bumped by every applied provider event; lets `connect()` detect
    /// that fresher truth arrived while it was awaiting the prompt
    event_seq: AtomicU64,
    /// Set by an explicit disconnect. Providers expose no revoke, so the
    /// grant outlives the local session; this keeps a passive refresh
    /// from silently re-binding the torn-down account.
    detached: AtomicBool,
    /// Set only through `begin_transaction`; cleared by the guard's drop
    transacting: AtomicBool,
    last_error: Mutex<Option<String>>,
}

impl SessionManager {
    pub fn new(provider: Arc<dyn WalletProvider>) -> Self {
        Self {
            provider,
            session: RwLock::new(Session::default()),
            event_seq: AtomicU64::new(0),
            detached: AtomicBool::new(false),
            transacting: AtomicBool::new(false),
            last_error: Mutex::new(None),
        }
    }

    pub fn provider(&self) -> &Arc<dyn WalletProvider> {
        &self.provider
    }

    /// Snapshot of the current session.
    pub async fn session(&self) -> Session {
        let mut session = self.session.read().await.clone();
        session.transacting = self.transacting.load(Ordering::SeqCst);
        session
    }

    /// Most recent surfaced failure message, for the UI layer.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub(crate) fn surface(&self, message: String) {
        warn!("{}", message);
        *self.last_error.lock().unwrap_or_else(|e| e.into_inner()) = Some(message);
    }

    /// Request account access from the wallet provider.
    ///
    /// All failures degrade to `None` plus a surfaced message; the session
    /// is left unchanged on any failure path.
    pub async fn connect(&self) -> Option<Address> {
        if !self.provider.is_available() {
            self.surface(Error::ProviderUnavailable.user_message());
            return None;
        }

        let seq_before = self.event_seq.load(Ordering::SeqCst);
        self.detached.store(false, Ordering::SeqCst);
        self.session.write().await.connecting = true;

        let result = self.provider.request_accounts().await;
        match result {
            Ok(accounts) => {
                let address = accounts.first().cloned();
                let chain_id = self.provider.chain_id().await.ok();
                self.finish_connect(seq_before, address, chain_id).await
            }
            Err(e) => {
                self.session.write().await.connecting = false;
                self.surface(format!("Could not connect wallet: {}", e.user_message()));
                None
            }
        }
    }

    /// Commit the result of a prompt. If a provider event was applied
    /// while the prompt was pending, the event's account is the fresher
    /// truth and the prompt result is not written over it.
    async fn finish_connect(
        &self,
        seq_before: u64,
        address: Option<Address>,
        chain_id: Option<String>,
    ) -> Option<Address> {
        let mut session = self.session.write().await;
        session.connecting = false;
        if self.event_seq.load(Ordering::SeqCst) == seq_before {
            session.wallet_address = address.clone();
            session.chain_id = chain_id;
        } else {
            debug!("Provider event arrived mid-connect; keeping event state");
        }
        address
    }

    /// Clear the session. Wallet providers expose no true revoke, so this
    /// is purely local, always succeeds and is idempotent.
    pub async fn disconnect(&self) {
        self.detached.store(true, Ordering::SeqCst);
        *self.session.write().await = Session::default();
    }

    /// Passive re-sync with the provider: no prompt, no `connecting`
    /// flag, swallow-and-reset on any error.
    pub async fn refresh_session(&self) {
        if !self.provider.is_available() || self.detached.load(Ordering::SeqCst) {
            return;
        }
        let accounts = self.provider.accounts().await;
        let chain_id = self.provider.chain_id().await;
        let mut session = self.session.write().await;
        match (accounts, chain_id) {
            (Ok(accounts), Ok(chain_id)) => {
                session.wallet_address = accounts.first().cloned();
                session.chain_id = Some(chain_id);
            }
            _ => {
                session.wallet_address = None;
                session.chain_id = None;
            }
        }
    }

    /// Apply a pushed provider notification. May race user-driven calls;
    /// the last write wins for the displayed account.
    pub async fn apply_event(&self, event: ProviderEvent) {
        self.event_seq.fetch_add(1, Ordering::SeqCst);
        // an external account switch is fresh truth, even after teardown
        self.detached.store(false, Ordering::SeqCst);
        let mut session = self.session.write().await;
        match event {
            ProviderEvent::AccountsChanged(accounts) => {
                session.wallet_address = accounts.first().cloned();
            }
            ProviderEvent::ChainChanged(chain_id) => {
                session.chain_id = Some(chain_id);
            }
        }
    }

    /// Subscribe to provider notifications and apply them until the
    /// returned guard is dropped.
    pub fn spawn_event_pump(self: Arc<Self>) -> EventPumpGuard {
        let manager = self;
        let rx = manager.provider.subscribe();
        let handle = tokio::spawn(async move {
            while let Ok(event) = rx.recv().await {
                manager.apply_event(event).await;
            }
        });
        EventPumpGuard { handle }
    }

    /// Mark the one in-flight write. The flag is advisory; callers must
    /// serialize their own write attempts. The returned guard clears it.
    pub fn begin_transaction(&self) -> TransactionGuard<'_> {
        self.transacting.store(true, Ordering::SeqCst);
        TransactionGuard { manager: self }
    }

    /// Whether a connect or a transaction is currently in flight.
    pub async fn is_busy(&self) -> bool {
        self.transacting.load(Ordering::SeqCst) || self.session.read().await.connecting
    }
}
