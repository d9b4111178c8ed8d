//! Wallet provider interface

use async_trait::async_trait;

use crate::error::Result;
use crate::ledger::Address;

/// Change notification pushed by the wallet provider.
///
/// These arrive at any time, including while a connect or a transaction
/// is in flight. There is no ordering guarantee beyond "last event wins"
/// for the displayed account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    /// The selected accounts changed; empty means the wallet disconnected
    AccountsChanged(Vec<Address>),
    /// The active chain changed
    ChainChanged(String),
}

/// Boundary to the user's wallet.
///
/// The core never assumes the provider is present; every call path guards
/// on [`is_available`](WalletProvider::is_available) first.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Whether a wallet is installed in this environment at all.
    fn is_available(&self) -> bool;

    /// Request account access, prompting the user.
    /// Fails with `ConnectionRejected` when the user declines.
    async fn request_accounts(&self) -> Result<Vec<Address>>;

    /// Currently exposed accounts, without prompting. Empty until the
    /// user has granted access.
    async fn accounts(&self) -> Result<Vec<Address>>;

    /// Active chain identifier, without prompting.
    async fn chain_id(&self) -> Result<String>;

    /// Re-request account permissions, forcing the provider's account
    /// picker instead of silently reusing a stale selection.
    async fn request_permissions(&self) -> Result<()>;

    /// Subscribe to pushed change notifications. The subscription lives
    /// as long as the returned receiver.
    fn subscribe(&self) -> async_channel::Receiver<ProviderEvent>;
}
