//! Role-wallet reconciliation
//!
//! Maps the connected wallet address to a known identity and drives
//! login/navigation. The wallet decides who you are; the directory is the
//! authority on which role that wallet carries.

use std::sync::Arc;

use tracing::{debug, info};

use crate::directory::{Identity, Role, RoleDirectory};
use crate::error::{Error, Result};

use super::manager::SessionManager;

/// A successful reconciliation: the identity to log in as and the
/// deterministic navigation target for its role.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub identity: Identity,
    pub home: &'static str,
}

pub struct Reconciler {
    session: Arc<SessionManager>,
    directory: Arc<RoleDirectory>,
}

impl Reconciler {
    pub fn new(session: Arc<SessionManager>, directory: Arc<RoleDirectory>) -> Self {
        Self { session, directory }
    }

    /// Identity matching the current session address, if any.
    pub async fn match_identity(&self) -> Option<Identity> {
        let session = self.session.session().await;
        let address = session.wallet_address?;
        self.directory.by_address(&address).cloned()
    }

    /// React to the current session state: exactly one directory match
    /// logs in and navigates, zero matches does nothing. Suppressed while
    /// a connect or transaction is in flight so a fresh connection never
    /// races a stale one.
    pub async fn auto_reconcile(&self) -> Option<LoginOutcome> {
        if self.session.is_busy().await {
            debug!("Reconciliation skipped: session busy");
            return None;
        }
        let identity = self.match_identity().await?;
        info!("Wallet reconciled to {} ({})", identity.display_name, identity.role);
        Some(outcome(identity))
    }

    /// Explicit connect from the login screen.
    ///
    /// When a different account is already bound to a different role than
    /// the one being logged into, the stale session is dropped and the
    /// provider's account picker is forced rather than silently reusing
    /// the old selection.
    pub async fn login_with_wallet(&self, expected: Option<Role>) -> Result<LoginOutcome> {
        let provider = self.session.provider();
        if !provider.is_available() {
            return Err(Error::ProviderUnavailable);
        }

        if let (Some(expected), Some(bound)) = (expected, self.match_identity().await) {
            if bound.role != expected {
                info!(
                    "Switching wallets: {} is bound to {}, logging in as {}",
                    bound.wallet_address, bound.role, expected
                );
                self.session.disconnect().await;
                provider.request_permissions().await?;
            }
        }

        let address = match self.session.connect().await {
            Some(address) => address,
            None => {
                let detail = self
                    .session
                    .last_error()
                    .unwrap_or_else(|| "no account granted".to_string());
                return Err(Error::ConnectionRejected(detail));
            }
        };

        match self.directory.by_address(&address) {
            Some(identity) => {
                info!("Logged in as {} via {}", identity.display_name, address);
                Ok(outcome(identity.clone()))
            }
            None => Err(Error::UnknownWallet(address.to_string())),
        }
    }

    /// True when a logged-in identity's registered wallet differs from
    /// the currently connected address (both present, unequal). The UI
    /// shows this; nothing here silently overrides it.
    pub async fn wallet_mismatch(&self, identity: &Identity) -> bool {
        let session = self.session.session().await;
        match session.wallet_address {
            Some(connected) => connected != identity.wallet_address,
            None => false,
        }
    }

    /// React to a pushed account change while someone is logged in.
    ///
    /// An address the directory does not know displacing a bound identity
    /// tears the session down; returns true when that happened so the
    /// caller can drop the login. A known-but-different address stays, the
    /// mismatch flag reports it.
    pub async fn handle_account_change(&self, current: Option<&Identity>) -> bool {
        if current.is_none() {
            return false;
        }
        let session = self.session.session().await;
        let Some(address) = session.wallet_address else {
            return false;
        };
        if self.directory.by_address(&address).is_some() {
            return false;
        }
        info!("Unknown wallet {} displaced the bound identity, ending session", address);
        self.session.disconnect().await;
        true
    }
}

fn outcome(identity: Identity) -> LoginOutcome {
    let home = identity.role.home_path();
    LoginOutcome { identity, home }
}
