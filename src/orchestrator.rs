//! Transaction orchestrator
//!
//! One operation per lifecycle action, all sharing the same envelope:
//! ensure a wallet is connected, validate inputs locally, mark the session
//! busy for the duration of the submission, and degrade every failure to
//! `None` plus one surfaced message. Local rejections never reach the
//! ledger; the ledger stays authoritative for everything else.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::ledger::types::methods;
use crate::ledger::{Address, LedgerClient, TxReceipt, TAG_LOGISTICS, TAG_RETAIL};
use crate::session::SessionManager;

lazy_static! {
    /// "lat,lng" in decimal degrees, e.g. "-12.0464, -77.0428"
    static ref COORDINATES_RE: Regex =
        Regex::new(r"^-?\d{1,3}(\.\d+)?\s*,\s*-?\d{1,3}(\.\d+)?$").unwrap();
}

/// The one call currently being narrated through the envelope.
struct PendingAction {
    method: &'static str,
    args: String,
}

impl PendingAction {
    fn new(method: &'static str, args: String) -> Self {
        Self { method, args }
    }
}

impl fmt::Display for PendingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.method, self.args)
    }
}

pub struct TxOrchestrator {
    session: Arc<SessionManager>,
    ledger: Arc<dyn LedgerClient>,
    last_error: Mutex<Option<String>>,
}

impl TxOrchestrator {
    pub fn new(session: Arc<SessionManager>, ledger: Arc<dyn LedgerClient>) -> Self {
        Self {
            session,
            ledger,
            last_error: Mutex::new(None),
        }
    }

    /// Most recent surfaced failure message, for the UI layer.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn surface(&self, message: String) {
        warn!("{}", message);
        *self.last_error.lock().unwrap_or_else(|e| e.into_inner()) = Some(message);
    }

    fn fail(&self, err: Error) -> Option<TxReceipt> {
        self.surface(err.user_message());
        None
    }

    /// Reuse the bound account or prompt for one. A declined prompt is a
    /// surfaced no-op, not an error.
    async fn ensure_connected(&self) -> Option<Address> {
        if let Some(address) = self.session.session().await.wallet_address {
            return Some(address);
        }
        self.session.connect().await
    }

    /// Everything past this point has already passed local validation.
    /// Any failure from the call is terminal for this user action.
    async fn submit<F>(&self, action: PendingAction, call: F) -> Option<TxReceipt>
    where
        F: Future<Output = Result<TxReceipt>>,
    {
        let _busy = self.session.begin_transaction();
        debug!("Submitting {}", action);
        match call.await {
            Ok(receipt) => {
                info!(
                    "{} confirmed in block {} ({})",
                    action.method, receipt.block_number, receipt.tx_hash
                );
                Some(receipt)
            }
            Err(e) => self.fail(e),
        }
    }

    /// Client-side check that a terminal lot gets no further submissions.
    /// The ledger enforces the same rule; this just saves the round trip.
    async fn guard_not_finalized(&self, id: u64) -> Result<()> {
        let lot = self.ledger.get_lot(id).await?;
        if lot.state.is_terminal() {
            return Err(Error::ActionBlocked(format!(
                "Lot {id} is already finalized ({})",
                lot.state
            )));
        }
        Ok(())
    }

    pub async fn create_lot(&self, product: &str, origin_ref: &str) -> Option<TxReceipt> {
        let from = self.ensure_connected().await?;
        if let Err(e) = validate::create(product, origin_ref) {
            return self.fail(e);
        }
        let action = PendingAction::new(methods::CREATE_LOT, format!("{product:?}, {origin_ref}"));
        self.submit(action, self.ledger.create_lot(&from, product, origin_ref))
            .await
    }

    pub async fn process_lot(&self, id: u64, process_ref: &str) -> Option<TxReceipt> {
        let from = self.ensure_connected().await?;
        if let Err(e) = validate::process(id, process_ref) {
            return self.fail(e);
        }
        let action = PendingAction::new(methods::PROCESS_LOT, format!("{id}, {process_ref}"));
        self.submit(action, self.ledger.process_lot(&from, id, process_ref))
            .await
    }

    pub async fn transfer_custody(
        &self,
        id: u64,
        destination: &Address,
        destination_tag: &str,
    ) -> Option<TxReceipt> {
        let from = self.ensure_connected().await?;
        if let Err(e) = validate::transfer(id, destination_tag) {
            return self.fail(e);
        }
        if let Err(e) = self.guard_not_finalized(id).await {
            return self.fail(e);
        }
        let action = PendingAction::new(
            methods::TRANSFER_CUSTODY,
            format!("{id}, {destination}, {destination_tag}"),
        );
        self.submit(
            action,
            self.ledger
                .transfer_custody(&from, id, destination, destination_tag),
        )
        .await
    }

    pub async fn report_telemetry(
        &self,
        id: u64,
        temperature: i64,
        coordinates: &str,
    ) -> Option<TxReceipt> {
        let from = self.ensure_connected().await?;
        if let Err(e) = validate::telemetry(id, coordinates) {
            return self.fail(e);
        }
        let action = PendingAction::new(
            methods::REPORT_TELEMETRY,
            format!("{id}, {temperature}, {coordinates}"),
        );
        self.submit(
            action,
            self.ledger
                .report_telemetry(&from, id, temperature, coordinates),
        )
        .await
    }

    pub async fn inspect(&self, id: u64, act_ref: &str, approved: bool) -> Option<TxReceipt> {
        let from = self.ensure_connected().await?;
        if let Err(e) = validate::inspect(id, act_ref) {
            return self.fail(e);
        }
        if let Err(e) = self.guard_not_finalized(id).await {
            return self.fail(e);
        }
        let action = PendingAction::new(
            methods::INSPECT_LOT,
            format!("{id}, {act_ref}, {approved}"),
        );
        self.submit(action, self.ledger.inspect_lot(&from, id, act_ref, approved))
            .await
    }

    pub async fn reject(&self, id: u64, reason: &str) -> Option<TxReceipt> {
        let from = self.ensure_connected().await?;
        if let Err(e) = validate::reject(id, reason) {
            return self.fail(e);
        }
        if let Err(e) = self.guard_not_finalized(id).await {
            return self.fail(e);
        }
        let action = PendingAction::new(methods::REJECT_LOT, format!("{id}, {reason:?}"));
        self.submit(action, self.ledger.reject_lot(&from, id, reason))
            .await
    }
}

/// Local pre-flight checks. Failing any of these must leave the ledger
/// untouched.
mod validate {
    use super::{Error, Result, COORDINATES_RE, TAG_LOGISTICS, TAG_RETAIL};

    fn require(ok: bool, message: &str) -> Result<()> {
        if ok {
            Ok(())
        } else {
            Err(Error::ValidationFailed(message.to_string()))
        }
    }

    fn lot_id(id: u64) -> Result<()> {
        require(id > 0, "Lot id must be positive")
    }

    pub fn create(product: &str, origin_ref: &str) -> Result<()> {
        require(!product.trim().is_empty(), "Product description is required")?;
        require(
            !origin_ref.trim().is_empty(),
            "Origin certificate reference is required",
        )
    }

    pub fn process(id: u64, process_ref: &str) -> Result<()> {
        lot_id(id)?;
        require(
            !process_ref.trim().is_empty(),
            "Processing certificate reference is required",
        )
    }

    pub fn transfer(id: u64, destination_tag: &str) -> Result<()> {
        lot_id(id)?;
        require(
            destination_tag == TAG_LOGISTICS || destination_tag == TAG_RETAIL,
            "Destination must be LOGISTICS or RETAIL",
        )
    }

    pub fn telemetry(id: u64, coordinates: &str) -> Result<()> {
        lot_id(id)?;
        require(
            COORDINATES_RE.is_match(coordinates.trim()),
            "Coordinates must be decimal lat,lng",
        )
    }

    pub fn inspect(id: u64, act_ref: &str) -> Result<()> {
        lot_id(id)?;
        require(
            !act_ref.trim().is_empty(),
            "Inspection act reference is required",
        )
    }

    pub fn reject(id: u64, reason: &str) -> Result<()> {
        lot_id(id)?;
        require(!reason.trim().is_empty(), "Rejection reason is required")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::ledger::{InMemoryLedger, Lot, LotState};
    use crate::provider::{SimulatedProvider, WalletProvider};

    /// Delegates to the real double while counting calls, so tests can
    /// assert that local rejections produce zero submissions.
    struct CountingLedger {
        inner: InMemoryLedger,
        writes: AtomicUsize,
        reads: AtomicUsize,
    }

    impl CountingLedger {
        fn new() -> Self {
            Self {
                inner: InMemoryLedger::new(),
                writes: AtomicUsize::new(0),
                reads: AtomicUsize::new(0),
            }
        }

        fn writes(&self) -> usize {
            self.writes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LedgerClient for CountingLedger {
        async fn create_lot(
            &self,
            from: &Address,
            product: &str,
            origin_ref: &str,
        ) -> crate::error::Result<TxReceipt> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.create_lot(from, product, origin_ref).await
        }

        async fn process_lot(
            &self,
            from: &Address,
            id: u64,
            process_ref: &str,
        ) -> crate::error::Result<TxReceipt> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.process_lot(from, id, process_ref).await
        }

        async fn transfer_custody(
            &self,
            from: &Address,
            id: u64,
            new_custodian: &Address,
            destination_tag: &str,
        ) -> crate::error::Result<TxReceipt> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner
                .transfer_custody(from, id, new_custodian, destination_tag)
                .await
        }

        async fn report_telemetry(
            &self,
            from: &Address,
            id: u64,
            temperature: i64,
            coordinates: &str,
        ) -> crate::error::Result<TxReceipt> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner
                .report_telemetry(from, id, temperature, coordinates)
                .await
        }

        async fn inspect_lot(
            &self,
            from: &Address,
            id: u64,
            act_ref: &str,
            approved: bool,
        ) -> crate::error::Result<TxReceipt> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.inspect_lot(from, id, act_ref, approved).await
        }

        async fn reject_lot(
            &self,
            from: &Address,
            id: u64,
            reason: &str,
        ) -> crate::error::Result<TxReceipt> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.reject_lot(from, id, reason).await
        }

        async fn get_lot(&self, id: u64) -> crate::error::Result<Lot> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.get_lot(id).await
        }

        async fn lot_count(&self) -> crate::error::Result<u64> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.lot_count().await
        }
    }

    fn addr(n: u8) -> Address {
        Address::parse(&format!("0x{:040x}", n)).unwrap()
    }

    fn setup() -> (TxOrchestrator, Arc<CountingLedger>, Arc<SimulatedProvider>) {
        let provider = Arc::new(SimulatedProvider::new(vec![addr(1)], "0x539"));
        let session = Arc::new(SessionManager::new(
            Arc::clone(&provider) as Arc<dyn WalletProvider>
        ));
        let ledger = Arc::new(CountingLedger::new());
        let orchestrator =
            TxOrchestrator::new(session, Arc::clone(&ledger) as Arc<dyn LedgerClient>);
        (orchestrator, ledger, provider)
    }

    #[tokio::test]
    async fn test_create_returns_receipt_and_lot_is_readable() {
        let (orchestrator, ledger, _) = setup();

        let receipt = orchestrator.create_lot("Cuy Premium", "ipfs://abc").await.unwrap();
        assert_eq!(receipt.lot_id, Some(1));

        let lot = ledger.get_lot(1).await.unwrap();
        assert_eq!(lot.state, LotState::Created);
        assert_eq!(lot.origin_certificate_ref, "ipfs://abc");
    }

    #[tokio::test]
    async fn test_missing_field_never_reaches_ledger() {
        let (orchestrator, ledger, _) = setup();

        assert!(orchestrator.create_lot("  ", "ipfs://abc").await.is_none());
        assert!(orchestrator.create_lot("Cuy", "").await.is_none());
        assert!(orchestrator.process_lot(1, "").await.is_none());
        assert!(orchestrator.reject(1, "  ").await.is_none());

        assert_eq!(ledger.writes(), 0);
        assert!(orchestrator.last_error().is_some());
    }

    #[tokio::test]
    async fn test_declined_connect_is_a_clean_noop() {
        let (orchestrator, ledger, provider) = setup();
        provider.reject_next_prompt();

        assert!(orchestrator.create_lot("Cuy", "ipfs://abc").await.is_none());
        assert_eq!(ledger.writes(), 0);
    }

    #[tokio::test]
    async fn test_invalid_destination_tag_rejected_locally() {
        let (orchestrator, ledger, _) = setup();
        orchestrator.create_lot("Cuy", "ipfs://abc").await.unwrap();

        let result = orchestrator.transfer_custody(1, &addr(3), "PRODUCER").await;
        assert!(result.is_none());
        assert_eq!(ledger.writes(), 1); // only the create
        assert!(orchestrator.last_error().unwrap().contains("LOGISTICS or RETAIL"));
    }

    #[tokio::test]
    async fn test_finalized_lot_blocks_before_submission() {
        let (orchestrator, ledger, _) = setup();
        orchestrator.create_lot("Cuy", "ipfs://abc").await.unwrap();
        assert!(orchestrator.reject(1, "Empaque dañado").await.is_some());

        // second reject is blocked by the pre-flight read
        assert!(orchestrator.reject(1, "otra vez").await.is_none());
        assert!(orchestrator.transfer_custody(1, &addr(3), TAG_RETAIL).await.is_none());
        assert!(orchestrator.inspect(1, "ipfs://acta", true).await.is_none());

        assert_eq!(ledger.writes(), 2); // create + first reject
        assert!(orchestrator.last_error().unwrap().contains("finalized"));
    }

    #[tokio::test]
    async fn test_transfer_round_trip_updates_custody() {
        let (orchestrator, ledger, _) = setup();
        orchestrator.create_lot("Cuy", "ipfs://abc").await.unwrap();
        orchestrator.process_lot(1, "ipfs://proc").await.unwrap();
        orchestrator.transfer_custody(1, &addr(3), TAG_LOGISTICS).await.unwrap();

        let lot = ledger.get_lot(1).await.unwrap();
        assert_eq!(lot.state, LotState::InTransit);
        assert_eq!(lot.current_custodian, addr(3));
        assert_eq!(lot.custody_history.last(), Some(&addr(3)));
    }

    #[tokio::test]
    async fn test_telemetry_requires_plausible_coordinates() {
        let (orchestrator, ledger, _) = setup();
        orchestrator.create_lot("Cuy", "ipfs://abc").await.unwrap();

        assert!(orchestrator.report_telemetry(1, 3, "somewhere").await.is_none());
        assert_eq!(ledger.writes(), 1);

        assert!(orchestrator
            .report_telemetry(1, 3, "-12.0464, -77.0428")
            .await
            .is_some());
        let lot = ledger.get_lot(1).await.unwrap();
        assert_eq!(lot.last_coordinates, "-12.0464, -77.0428");
        assert!(lot.cold_chain_ok);
    }

    #[tokio::test]
    async fn test_revert_reason_is_surfaced_verbatim() {
        let (orchestrator, _, _) = setup();
        orchestrator.create_lot("Cuy", "ipfs://abc").await.unwrap();

        // processing twice reverts with the contract's structured reason
        orchestrator.process_lot(1, "ipfs://proc").await.unwrap();
        assert!(orchestrator.process_lot(1, "ipfs://again").await.is_none());
        assert_eq!(orchestrator.last_error().unwrap(), "Estado invalido");
    }

    #[tokio::test]
    async fn test_busy_flag_cleared_after_success_and_failure() {
        let (orchestrator, _, _) = setup();
        orchestrator.create_lot("Cuy", "ipfs://abc").await.unwrap();
        assert!(!orchestrator.session.is_busy().await);

        assert!(orchestrator.process_lot(99, "ipfs://proc").await.is_none());
        assert!(!orchestrator.session.is_busy().await);
    }

    #[test]
    fn test_coordinate_shapes() {
        assert!(COORDINATES_RE.is_match("-12.0464,-77.0428"));
        assert!(COORDINATES_RE.is_match("0,0"));
        assert!(COORDINATES_RE.is_match("41.40338, 2.17403"));
        assert!(!COORDINATES_RE.is_match("12.0N 77.0W"));
        assert!(!COORDINATES_RE.is_match(""));
    }
}
