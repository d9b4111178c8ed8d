//! CuyTrace core library
//!
//! Orchestration and state reconciliation for a ledger-recorded product
//! custody lifecycle: wallet session management, role reconciliation,
//! transaction orchestration and read-side projections.

pub mod cli;
pub mod config;
pub mod directory;
pub mod error;
pub mod ledger;
pub mod orchestrator;
pub mod pinning;
pub mod projector;
pub mod provider;
pub mod session;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
