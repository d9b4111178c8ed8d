//! File-persisted local stand-in for the deployed custody contract
//!
//! Implements the contract's observable transition rules so the rest of the
//! core can be exercised without a node: ordered states, terminal lock,
//! append-only custody history, cold-chain latch. Rejections surface as the
//! same structured revert reasons a node would relay.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{Error, Result};

use super::client::LedgerClient;
use super::types::{methods, Address, Lot, LotState, TxReceipt};

/// Telemetry above this temperature (°C) breaks the cold chain.
pub const COLD_CHAIN_LIMIT_C: i64 = 4;

/// Destination tags accepted by transferirCustodia.
pub const TAG_LOGISTICS: &str = "LOGISTICS";
pub const TAG_RETAIL: &str = "RETAIL";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LedgerState {
    lots: HashMap<u64, Lot>,
    counter: u64,
    block: u64,
}

/// Local ledger double, optionally persisted to a JSON file so CLI
/// invocations observe each other's writes.
pub struct InMemoryLedger {
    state: RwLock<LedgerState>,
    path: Option<PathBuf>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(LedgerState::default()),
            path: None,
        }
    }

    /// Open a file-backed ledger, loading prior state when the file exists.
    pub async fn open(path: PathBuf) -> Result<Self> {
        let state = match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                let loaded: LedgerState = serde_json::from_str(&content)?;
                info!(
                    "Loaded local ledger: {} lots, block {}",
                    loaded.lots.len(),
                    loaded.block
                );
                loaded
            }
            Err(_) => LedgerState::default(),
        };
        Ok(Self {
            state: RwLock::new(state),
            path: Some(path),
        })
    }

    async fn save(&self, state: &LedgerState) -> Result<()> {
        if let Some(path) = &self.path {
            let json = serde_json::to_string_pretty(state)?;
            tokio::fs::write(path, json).await?;
            debug!("Saved local ledger state");
        }
        Ok(())
    }

    /// Persist a staged state and only then make it visible to reads.
    /// A failed save leaves the in-memory state exactly as it was, so an
    /// error from a write method never exposes a half-applied change.
    async fn commit(&self, state: &mut LedgerState, staged: LedgerState) -> Result<()> {
        self.save(&staged).await?;
        *state = staged;
        Ok(())
    }

    fn revert(reason: &str) -> Error {
        Error::TransactionFailed(format!("execution reverted: {reason}"))
    }

    fn receipt(state: &mut LedgerState, method: &str, args: &str, lot_id: Option<u64>) -> TxReceipt {
        state.block += 1;
        let mut hasher = Sha256::new();
        hasher.update(method.as_bytes());
        hasher.update(args.as_bytes());
        hasher.update(state.block.to_be_bytes());
        let digest = hasher.finalize();
        TxReceipt {
            tx_hash: format!("0x{}", hex_string(&digest)),
            block_number: state.block,
            lot_id,
        }
    }

    fn lot_mut(state: &mut LedgerState, id: u64) -> Result<&mut Lot> {
        state
            .lots
            .get_mut(&id)
            .ok_or_else(|| Self::revert("Lote inexistente"))
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn create_lot(
        &self,
        from: &Address,
        product: &str,
        origin_ref: &str,
    ) -> Result<TxReceipt> {
        if product.trim().is_empty() {
            return Err(Self::revert("Producto vacio"));
        }
        let mut state = self.state.write().await;
        let mut staged = state.clone();
        staged.counter += 1;
        let id = staged.counter;
        let lot = Lot {
            id,
            product: product.to_string(),
            state: LotState::Created,
            current_custodian: from.clone(),
            registered_at: chrono::Utc::now(),
            cold_chain_ok: true,
            last_coordinates: String::new(),
            origin_certificate_ref: origin_ref.to_string(),
            process_certificate_ref: String::new(),
            inspection_act_ref: String::new(),
            custody_history: vec![from.clone()],
        };
        staged.lots.insert(id, lot);
        let receipt = Self::receipt(
            &mut staged,
            methods::CREATE_LOT,
            &format!("{product}|{origin_ref}"),
            Some(id),
        );
        self.commit(&mut state, staged).await?;
        info!("Lot {} created by {}", id, from);
        Ok(receipt)
    }

    async fn process_lot(&self, from: &Address, id: u64, process_ref: &str) -> Result<TxReceipt> {
        let mut state = self.state.write().await;
        let mut staged = state.clone();
        let lot = Self::lot_mut(&mut staged, id)?;
        if lot.state != LotState::Created {
            return Err(Self::revert("Estado invalido"));
        }
        lot.process_certificate_ref = process_ref.to_string();
        lot.state = LotState::Processed;
        let receipt = Self::receipt(
            &mut staged,
            methods::PROCESS_LOT,
            &format!("{id}|{process_ref}"),
            None,
        );
        self.commit(&mut state, staged).await?;
        info!("Lot {} processed by {}", id, from);
        Ok(receipt)
    }

    async fn transfer_custody(
        &self,
        from: &Address,
        id: u64,
        new_custodian: &Address,
        destination_tag: &str,
    ) -> Result<TxReceipt> {
        let next = match destination_tag {
            TAG_LOGISTICS => LotState::InTransit,
            TAG_RETAIL => LotState::AtRetail,
            _ => return Err(Self::revert("Tipo de destino invalido")),
        };
        let mut state = self.state.write().await;
        let mut staged = state.clone();
        let lot = Self::lot_mut(&mut staged, id)?;
        if lot.state.is_terminal() {
            return Err(Self::revert("Lote finalizado"));
        }
        // state only ever moves forward
        if next <= lot.state {
            return Err(Self::revert("Estado invalido"));
        }
        lot.state = next;
        lot.current_custodian = new_custodian.clone();
        lot.custody_history.push(new_custodian.clone());
        let receipt = Self::receipt(
            &mut staged,
            methods::TRANSFER_CUSTODY,
            &format!("{id}|{new_custodian}|{destination_tag}"),
            None,
        );
        self.commit(&mut state, staged).await?;
        info!(
            "Lot {} custody {} -> {} ({})",
            id, from, new_custodian, destination_tag
        );
        Ok(receipt)
    }

    async fn report_telemetry(
        &self,
        from: &Address,
        id: u64,
        temperature: i64,
        coordinates: &str,
    ) -> Result<TxReceipt> {
        let mut state = self.state.write().await;
        let mut staged = state.clone();
        let lot = Self::lot_mut(&mut staged, id)?;
        if lot.state.is_terminal() {
            return Err(Self::revert("Lote finalizado"));
        }
        lot.last_coordinates = coordinates.to_string();
        if temperature > COLD_CHAIN_LIMIT_C {
            // latched: a broken cold chain is not observably repaired
            lot.cold_chain_ok = false;
        }
        let receipt = Self::receipt(
            &mut staged,
            methods::REPORT_TELEMETRY,
            &format!("{id}|{temperature}|{coordinates}"),
            None,
        );
        self.commit(&mut state, staged).await?;
        debug!(
            "Lot {} telemetry {}°C at {} by {}",
            id, temperature, coordinates, from
        );
        Ok(receipt)
    }

    async fn inspect_lot(
        &self,
        from: &Address,
        id: u64,
        act_ref: &str,
        approved: bool,
    ) -> Result<TxReceipt> {
        let mut state = self.state.write().await;
        let mut staged = state.clone();
        let lot = Self::lot_mut(&mut staged, id)?;
        if lot.state.is_terminal() {
            return Err(Self::revert("Lote finalizado"));
        }
        lot.inspection_act_ref = act_ref.to_string();
        lot.state = if approved {
            LotState::Inspected
        } else {
            LotState::Rejected
        };
        let receipt = Self::receipt(
            &mut staged,
            methods::INSPECT_LOT,
            &format!("{id}|{act_ref}|{approved}"),
            None,
        );
        self.commit(&mut state, staged).await?;
        info!("Lot {} inspected by {} (approved: {})", id, from, approved);
        Ok(receipt)
    }

    async fn reject_lot(&self, from: &Address, id: u64, reason: &str) -> Result<TxReceipt> {
        let mut state = self.state.write().await;
        let mut staged = state.clone();
        let lot = Self::lot_mut(&mut staged, id)?;
        if lot.state.is_terminal() {
            return Err(Self::revert("Lote finalizado"));
        }
        lot.state = LotState::Rejected;
        let receipt = Self::receipt(
            &mut staged,
            methods::REJECT_LOT,
            &format!("{id}|{reason}"),
            None,
        );
        self.commit(&mut state, staged).await?;
        info!("Lot {} rejected by {}: {}", id, from, reason);
        Ok(receipt)
    }

    async fn get_lot(&self, id: u64) -> Result<Lot> {
        let state = self.state.read().await;
        state
            .lots
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::ReadFailed(format!("Lot {id} not found")))
    }

    async fn lot_count(&self) -> Result<u64> {
        let state = self.state.read().await;
        Ok(state.counter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Address {
        Address::parse(&format!("0x{:040x}", n)).unwrap()
    }

    #[tokio::test]
    async fn test_create_assigns_sequential_ids() {
        let ledger = InMemoryLedger::new();
        let r1 = ledger.create_lot(&addr(1), "Cuy Premium", "ipfs://abc").await.unwrap();
        let r2 = ledger.create_lot(&addr(1), "Cuy Andino", "ipfs://def").await.unwrap();
        assert_eq!(r1.lot_id, Some(1));
        assert_eq!(r2.lot_id, Some(2));
        assert_eq!(ledger.lot_count().await.unwrap(), 2);

        let lot = ledger.get_lot(1).await.unwrap();
        assert_eq!(lot.state, LotState::Created);
        assert_eq!(lot.origin_certificate_ref, "ipfs://abc");
        assert_eq!(lot.custody_history, vec![addr(1)]);
    }

    #[tokio::test]
    async fn test_full_custody_flow_appends_history() {
        let ledger = InMemoryLedger::new();
        ledger.create_lot(&addr(1), "Cuy Premium", "ipfs://abc").await.unwrap();
        ledger.process_lot(&addr(2), 1, "ipfs://proc").await.unwrap();
        ledger
            .transfer_custody(&addr(2), 1, &addr(3), TAG_LOGISTICS)
            .await
            .unwrap();
        ledger
            .transfer_custody(&addr(3), 1, &addr(4), TAG_RETAIL)
            .await
            .unwrap();

        let lot = ledger.get_lot(1).await.unwrap();
        assert_eq!(lot.state, LotState::AtRetail);
        assert_eq!(lot.current_custodian, addr(4));
        assert_eq!(lot.custody_history, vec![addr(1), addr(3), addr(4)]);
        assert_eq!(lot.custody_history.last(), Some(&lot.current_custodian));
    }

    #[tokio::test]
    async fn test_state_never_moves_backward() {
        let ledger = InMemoryLedger::new();
        ledger.create_lot(&addr(1), "Cuy", "ipfs://abc").await.unwrap();
        ledger.process_lot(&addr(2), 1, "ipfs://proc").await.unwrap();
        ledger
            .transfer_custody(&addr(2), 1, &addr(4), TAG_RETAIL)
            .await
            .unwrap();

        // retail -> logistics would move 3 -> 2
        let err = ledger
            .transfer_custody(&addr(4), 1, &addr(3), TAG_LOGISTICS)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Estado invalido"));
    }

    #[tokio::test]
    async fn test_terminal_states_are_permanent() {
        let ledger = InMemoryLedger::new();
        ledger.create_lot(&addr(1), "Cuy", "ipfs://abc").await.unwrap();
        ledger.reject_lot(&addr(1), 1, "Empaque dañado").await.unwrap();

        assert_eq!(ledger.get_lot(1).await.unwrap().state, LotState::Rejected);
        let err = ledger.reject_lot(&addr(1), 1, "otra vez").await.unwrap_err();
        assert_eq!(err.user_message(), "Lote finalizado");
        let err = ledger
            .transfer_custody(&addr(1), 1, &addr(2), TAG_RETAIL)
            .await
            .unwrap_err();
        assert_eq!(err.user_message(), "Lote finalizado");
        // still rejected, not downgraded
        assert_eq!(ledger.get_lot(1).await.unwrap().state, LotState::Rejected);
    }

    #[tokio::test]
    async fn test_cold_chain_latches_on_warm_reading() {
        let ledger = InMemoryLedger::new();
        ledger.create_lot(&addr(1), "Cuy", "ipfs://abc").await.unwrap();

        ledger
            .report_telemetry(&addr(3), 1, 3, "-12.04,-77.04")
            .await
            .unwrap();
        assert!(ledger.get_lot(1).await.unwrap().cold_chain_ok);

        ledger
            .report_telemetry(&addr(3), 1, 6, "-12.05,-77.05")
            .await
            .unwrap();
        let lot = ledger.get_lot(1).await.unwrap();
        assert!(!lot.cold_chain_ok);
        assert_eq!(lot.last_coordinates, "-12.05,-77.05");

        // a later good reading does not repair the chain
        ledger
            .report_telemetry(&addr(3), 1, 2, "-12.06,-77.06")
            .await
            .unwrap();
        assert!(!ledger.get_lot(1).await.unwrap().cold_chain_ok);
    }

    #[tokio::test]
    async fn test_inspection_finalizes_either_way() {
        let ledger = InMemoryLedger::new();
        ledger.create_lot(&addr(1), "Cuy A", "ipfs://a").await.unwrap();
        ledger.create_lot(&addr(1), "Cuy B", "ipfs://b").await.unwrap();

        ledger.inspect_lot(&addr(5), 1, "ipfs://acta1", true).await.unwrap();
        ledger.inspect_lot(&addr(5), 2, "ipfs://acta2", false).await.unwrap();

        assert_eq!(ledger.get_lot(1).await.unwrap().state, LotState::Inspected);
        assert_eq!(ledger.get_lot(2).await.unwrap().state, LotState::Rejected);
        assert_eq!(ledger.get_lot(1).await.unwrap().inspection_act_ref, "ipfs://acta1");
    }

    #[tokio::test]
    async fn test_missing_lot_reads_and_writes() {
        let ledger = InMemoryLedger::new();
        assert!(ledger.get_lot(99).await.is_err());
        let err = ledger.process_lot(&addr(2), 99, "ipfs://x").await.unwrap_err();
        assert_eq!(err.user_message(), "Lote inexistente");
    }

    #[tokio::test]
    async fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");

        {
            let ledger = InMemoryLedger::open(path.clone()).await.unwrap();
            ledger.create_lot(&addr(1), "Cuy Premium", "ipfs://abc").await.unwrap();
        }

        let reopened = InMemoryLedger::open(path).await.unwrap();
        assert_eq!(reopened.lot_count().await.unwrap(), 1);
        let lot = reopened.get_lot(1).await.unwrap();
        assert_eq!(lot.product, "Cuy Premium");
    }

    #[tokio::test]
    async fn test_failed_save_leaves_state_untouched() {
        // a directory as the state file makes every save fail
        let dir = tempfile::tempdir().unwrap();
        let ledger = InMemoryLedger::open(dir.path().to_path_buf()).await.unwrap();

        assert!(ledger.create_lot(&addr(1), "Cuy", "ipfs://abc").await.is_err());
        assert!(ledger.get_lot(1).await.is_err());
        assert_eq!(ledger.lot_count().await.unwrap(), 0);
    }
}
