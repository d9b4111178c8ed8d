//! Ledger contract boundary
//!
//! The deployed contract is the system of record for lot custody and
//! state. This module defines the types it returns, the remote procedure
//! boundary ([`LedgerClient`]), and a file-persisted local double
//! ([`InMemoryLedger`]) for development and tests.

pub mod client;
pub mod memory;
pub mod types;

pub use client::LedgerClient;
pub use memory::{InMemoryLedger, COLD_CHAIN_LIMIT_C, TAG_LOGISTICS, TAG_RETAIL};
pub use types::{Address, Lot, LotState, TxReceipt};
