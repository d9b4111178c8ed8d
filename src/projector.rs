//! Lot state reader and projections
//!
//! Read side of the core: fetch a lot by id without any wallet, then derive
//! everything the display layer needs as pure functions of the fetched
//! record. Nothing here writes; a stale view is corrected by re-reading.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::warn;

use crate::directory::RoleDirectory;
use crate::ledger::{Address, LedgerClient, Lot, LotState};

/// One fixed stage of the custody timeline.
#[derive(Debug, Clone, Serialize)]
pub struct TimelineStage {
    pub label: &'static str,
    pub reached: bool,
    /// Content reference or reading backing the stage, when present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Pure derivations over a fetched lot.
#[derive(Debug, Clone, Serialize)]
pub struct LotView {
    /// Terminal lots accept no further inspection
    pub locked_for_inspection: bool,
    /// Only a rejected lot locks the retail actions
    pub locked_for_retail_rejection: bool,
    /// True once any telemetry reading broke the cold chain
    pub cold_chain_risk: bool,
    /// Always the same four stages in the same order
    pub timeline: [TimelineStage; 4],
    pub custodian_label: String,
    pub custody_labels: Vec<String>,
}

/// A public trace: the raw record plus its projection, fetched in one call
/// so a shared link with a pre-filled id needs nothing else.
#[derive(Debug, Clone, Serialize)]
pub struct LotTrace {
    pub lot: Lot,
    pub view: LotView,
}

pub struct LotReader {
    ledger: Arc<dyn LedgerClient>,
    directory: Arc<RoleDirectory>,
    last_error: Mutex<Option<String>>,
}

impl LotReader {
    pub fn new(ledger: Arc<dyn LedgerClient>, directory: Arc<RoleDirectory>) -> Self {
        Self {
            ledger,
            directory,
            last_error: Mutex::new(None),
        }
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Read-only fetch, no signing account involved.
    pub async fn fetch(&self, id: u64) -> Option<Lot> {
        match self.ledger.get_lot(id).await {
            Ok(lot) => Some(lot),
            Err(e) => {
                let message = e.user_message();
                warn!("{}", message);
                *self.last_error.lock().unwrap_or_else(|e| e.into_inner()) = Some(message);
                None
            }
        }
    }

    /// Fetch and project in one call.
    pub async fn trace(&self, id: u64) -> Option<LotTrace> {
        let lot = self.fetch(id).await?;
        let view = self.project(&lot);
        Some(LotTrace { lot, view })
    }

    /// Directory display name when the address is known, else the fixed
    /// truncated form. Deterministic for a given directory.
    pub fn label_address(&self, address: &Address) -> String {
        match self.directory.label(address) {
            Some(name) => name.to_string(),
            None => address.truncated(),
        }
    }

    pub fn project(&self, lot: &Lot) -> LotView {
        let timeline = [
            stage("Origin", &lot.origin_certificate_ref),
            stage("Processing", &lot.process_certificate_ref),
            stage("Logistics", &lot.last_coordinates),
            stage("Inspection", &lot.inspection_act_ref),
        ];
        LotView {
            locked_for_inspection: lot.state.is_terminal(),
            locked_for_retail_rejection: lot.state == LotState::Rejected,
            cold_chain_risk: !lot.cold_chain_ok,
            timeline,
            custodian_label: self.label_address(&lot.current_custodian),
            custody_labels: lot
                .custody_history
                .iter()
                .map(|a| self.label_address(a))
                .collect(),
        }
    }
}

fn stage(label: &'static str, field: &str) -> TimelineStage {
    let reached = !field.trim().is_empty();
    TimelineStage {
        label,
        reached,
        detail: reached.then(|| field.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{Identity, Role, RoleDirectory, RoleMetadata};
    use crate::ledger::{InMemoryLedger, TAG_LOGISTICS};

    fn addr(n: u8) -> Address {
        Address::parse(&format!("0x{:040x}", n)).unwrap()
    }

    fn directory() -> Arc<RoleDirectory> {
        Arc::new(
            RoleDirectory::new(vec![Identity {
                id: 1,
                display_name: "Granja San Pedro".to_string(),
                role: Role::Producer,
                wallet_address: addr(1),
                metadata: RoleMetadata::default(),
            }])
            .unwrap(),
        )
    }

    async fn reader_with_lot() -> (LotReader, Arc<InMemoryLedger>) {
        let ledger = Arc::new(InMemoryLedger::new());
        ledger.create_lot(&addr(1), "Cuy Premium", "ipfs://abc").await.unwrap();
        let reader = LotReader::new(
            Arc::clone(&ledger) as Arc<dyn LedgerClient>,
            directory(),
        );
        (reader, ledger)
    }

    #[tokio::test]
    async fn test_fetch_needs_no_wallet_and_misses_cleanly() {
        let (reader, _) = reader_with_lot().await;

        assert!(reader.fetch(1).await.is_some());
        assert!(reader.fetch(99).await.is_none());
        assert!(reader.last_error().unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn test_lock_flags_follow_state() {
        let (reader, ledger) = reader_with_lot().await;
        ledger.create_lot(&addr(1), "Cuy B", "ipfs://b").await.unwrap();
        ledger.inspect_lot(&addr(5), 1, "ipfs://acta", true).await.unwrap();
        ledger.reject_lot(&addr(1), 2, "Empaque dañado").await.unwrap();

        let inspected = reader.trace(1).await.unwrap().view;
        assert!(inspected.locked_for_inspection);
        assert!(!inspected.locked_for_retail_rejection);

        let rejected = reader.trace(2).await.unwrap().view;
        assert!(rejected.locked_for_inspection);
        assert!(rejected.locked_for_retail_rejection);
    }

    #[tokio::test]
    async fn test_cold_chain_risk_from_telemetry() {
        let (reader, ledger) = reader_with_lot().await;

        ledger.report_telemetry(&addr(3), 1, 3, "-12.04,-77.04").await.unwrap();
        assert!(!reader.trace(1).await.unwrap().view.cold_chain_risk);

        ledger.report_telemetry(&addr(3), 1, 6, "-12.05,-77.05").await.unwrap();
        assert!(reader.trace(1).await.unwrap().view.cold_chain_risk);
    }

    #[tokio::test]
    async fn test_timeline_order_is_fixed_regardless_of_arrival() {
        let (reader, ledger) = reader_with_lot().await;

        // telemetry lands before processing
        ledger.report_telemetry(&addr(3), 1, 3, "-12.04,-77.04").await.unwrap();
        let view = reader.trace(1).await.unwrap().view;
        let labels: Vec<_> = view.timeline.iter().map(|s| s.label).collect();
        assert_eq!(labels, ["Origin", "Processing", "Logistics", "Inspection"]);
        assert_eq!(
            view.timeline.iter().map(|s| s.reached).collect::<Vec<_>>(),
            [true, false, true, false]
        );

        ledger.process_lot(&addr(2), 1, "ipfs://proc").await.unwrap();
        let view = reader.trace(1).await.unwrap().view;
        assert_eq!(
            view.timeline.iter().map(|s| s.reached).collect::<Vec<_>>(),
            [true, true, true, false]
        );
    }

    #[tokio::test]
    async fn test_address_labeling_is_deterministic() {
        let (reader, ledger) = reader_with_lot().await;
        ledger
            .transfer_custody(&addr(1), 1, &addr(9), TAG_LOGISTICS)
            .await
            .unwrap();

        let view = reader.trace(1).await.unwrap().view;
        assert_eq!(view.custody_labels[0], "Granja San Pedro");
        assert_eq!(
            view.custodian_label,
            "0x0000…0009".to_string()
        );
    }
}
