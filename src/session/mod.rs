//! Wallet session layer
//!
//! [`SessionManager`] owns the single source of truth for the connected
//! wallet; [`Reconciler`] maps that wallet to a directory identity and
//! drives login.

pub mod manager;
pub mod reconciler;

pub use manager::{EventPumpGuard, Session, SessionManager, TransactionGuard};
pub use reconciler::{LoginOutcome, Reconciler};
