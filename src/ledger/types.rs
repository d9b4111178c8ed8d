//! Domain types mirrored from the custody contract

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Wire method names of the deployed contract.
/// Order and types of the positional arguments are part of the protocol.
pub mod methods {
    /// crearLote(string producto, string ipfsOrigen)
    pub const CREATE_LOT: &str = "crearLote";
    /// procesarLote(uint256 id, string ipfsProceso)
    pub const PROCESS_LOT: &str = "procesarLote";
    /// transferirCustodia(uint256 id, address nuevoCustodio, string tipoDestino)
    pub const TRANSFER_CUSTODY: &str = "transferirCustodia";
    /// reporteIoT(uint256 id, int256 temperatura, string gps)
    pub const REPORT_TELEMETRY: &str = "reporteIoT";
    /// inspeccionarLote(uint256 id, string ipfsActa, bool aprobado)
    pub const INSPECT_LOT: &str = "inspeccionarLote";
    /// rechazarLote(uint256 id, string motivo)
    pub const REJECT_LOT: &str = "rechazarLote";
}

/// An account address, normalized to lowercase so equality is
/// case-insensitive by construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Parse and normalize a 0x-prefixed 40-hex-digit address.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let hex = raw
            .strip_prefix("0x")
            .or_else(|| raw.strip_prefix("0X"))
            .ok_or_else(|| Error::ValidationFailed(format!("Address must start with 0x: {raw}")))?;
        if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::ValidationFailed(format!(
                "Address must be 40 hex digits: {raw}"
            )));
        }
        Ok(Self(format!("0x{}", hex.to_ascii_lowercase())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Truncated display form: fixed 6-char prefix and 4-char suffix.
    pub fn truncated(&self) -> String {
        format!("{}…{}", &self.0[..6], &self.0[self.0.len() - 4..])
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of a lot, as stored by the contract.
///
/// The ordering is meaningful: the contract only ever moves a lot forward,
/// and `Inspected`/`Rejected` are terminal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LotState {
    Created = 0,
    Processed = 1,
    InTransit = 2,
    AtRetail = 3,
    Inspected = 4,
    Rejected = 5,
}

impl LotState {
    /// Terminal states permit no further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(self, LotState::Inspected | LotState::Rejected)
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(LotState::Created),
            1 => Ok(LotState::Processed),
            2 => Ok(LotState::InTransit),
            3 => Ok(LotState::AtRetail),
            4 => Ok(LotState::Inspected),
            5 => Ok(LotState::Rejected),
            other => Err(Error::ReadFailed(format!("Unknown lot state: {other}"))),
        }
    }
}

impl fmt::Display for LotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LotState::Created => "CREATED",
            LotState::Processed => "PROCESSED",
            LotState::InTransit => "IN_TRANSIT",
            LotState::AtRetail => "AT_RETAIL",
            LotState::Inspected => "INSPECTED",
            LotState::Rejected => "REJECTED",
        };
        f.write_str(label)
    }
}

/// The full lot record as returned by the contract's by-id lookup.
///
/// Never mutated locally. Any accepted write is followed by a fresh read
/// that replaces the whole record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lot {
    /// Ledger-assigned id, positive and unique
    pub id: u64,
    /// Product description
    pub product: String,
    /// Current lifecycle state
    pub state: LotState,
    /// Address currently responsible for the lot
    pub current_custodian: Address,
    /// Registration timestamp
    pub registered_at: chrono::DateTime<chrono::Utc>,
    /// False once any telemetry reading broke the cold chain
    pub cold_chain_ok: bool,
    /// Last reported GPS coordinates, empty until telemetry arrives
    pub last_coordinates: String,
    /// Origin certificate content reference, empty means not attached
    pub origin_certificate_ref: String,
    /// Processing certificate content reference
    pub process_certificate_ref: String,
    /// Inspection act content reference
    pub inspection_act_ref: String,
    /// Append-only custody chain, oldest first; last element is always
    /// the current custodian
    pub custody_history: Vec<Address>,
}

/// Confirmation receipt for an accepted write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxReceipt {
    /// Transaction hash
    pub tx_hash: String,
    /// Block the transaction was confirmed in
    pub block_number: u64,
    /// For lot creation, the id the ledger assigned
    pub lot_id: Option<u64>,
}
