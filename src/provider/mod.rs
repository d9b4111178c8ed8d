//! Wallet provider boundary
//!
//! The user's wallet is an external collaborator: it exposes account and
//! chain requests plus pushed change notifications. [`WalletProvider`] is
//! the trait the session layer consumes; [`SimulatedProvider`] is the
//! local double used by the CLI and tests.

pub mod simulated;
pub mod types;

pub use simulated::SimulatedProvider;
pub use types::{ProviderEvent, WalletProvider};
