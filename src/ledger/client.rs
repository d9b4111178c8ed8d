//! Remote procedure boundary to the custody contract
//!
//! The core knows the contract's method names, argument order and return
//! shapes, and nothing about consensus or storage layout.

use async_trait::async_trait;

use crate::error::Result;

use super::types::{Address, Lot, TxReceipt};

/// Client for the custody contract's entry points.
///
/// Writes take the signing account explicitly; reads require none. Every
/// write resolves once the ledger has confirmed the transaction, so a
/// returned receipt means the state change is visible to a follow-up read.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// crearLote - register a new lot with its origin certificate
    async fn create_lot(&self, from: &Address, product: &str, origin_ref: &str)
        -> Result<TxReceipt>;

    /// procesarLote - attach the processing certificate and advance state
    async fn process_lot(&self, from: &Address, id: u64, process_ref: &str) -> Result<TxReceipt>;

    /// transferirCustodia - hand the lot to a new custodian
    async fn transfer_custody(
        &self,
        from: &Address,
        id: u64,
        new_custodian: &Address,
        destination_tag: &str,
    ) -> Result<TxReceipt>;

    /// reporteIoT - record a telemetry reading
    async fn report_telemetry(
        &self,
        from: &Address,
        id: u64,
        temperature: i64,
        coordinates: &str,
    ) -> Result<TxReceipt>;

    /// inspeccionarLote - attach the inspection act and finalize
    async fn inspect_lot(
        &self,
        from: &Address,
        id: u64,
        act_ref: &str,
        approved: bool,
    ) -> Result<TxReceipt>;

    /// rechazarLote - reject the lot with a reason
    async fn reject_lot(&self, from: &Address, id: u64, reason: &str) -> Result<TxReceipt>;

    /// obtenerLote - full lot record by id
    async fn get_lot(&self, id: u64) -> Result<Lot>;

    /// contadorLotes - number of lots ever created
    async fn lot_count(&self) -> Result<u64>;
}
