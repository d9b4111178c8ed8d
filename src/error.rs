//! Error types for the custody-lifecycle core

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the custody-lifecycle core
#[derive(Error, Debug)]
pub enum Error {
    // Wallet provider errors
    #[error("Wallet provider unavailable")]
    ProviderUnavailable,

    #[error("Wallet connection rejected: {0}")]
    ConnectionRejected(String),

    #[error("Wallet {0} is not registered to any role")]
    UnknownWallet(String),

    // Local pre-flight errors (never reach the network)
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Action blocked: {0}")]
    ActionBlocked(String),

    // Ledger errors
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Ledger read failed: {0}")]
    ReadFailed(String),

    // Pinning service errors
    #[error("Upload failed: {0}")]
    Upload(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is raised locally, before any network call.
    /// Local errors must have zero side effects on session or lot state.
    pub fn is_local(&self) -> bool {
        matches!(self, Error::ValidationFailed(_) | Error::ActionBlocked(_))
    }

    /// Extract the most specific message available for display.
    /// Priority: short structured revert reason > the error's own message.
    pub fn user_message(&self) -> String {
        match self {
            Error::TransactionFailed(msg) | Error::ReadFailed(msg) => {
                extract_revert_reason(msg).unwrap_or(msg).to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Pull the short structured reason out of a node error message, if present.
/// Example: "execution reverted: Lote finalizado" -> "Lote finalizado".
pub fn extract_revert_reason(message: &str) -> Option<&str> {
    for marker in ["execution reverted: ", "reverted: ", "reason: "] {
        if let Some(idx) = message.find(marker) {
            let reason = message[idx + marker.len()..].trim();
            if !reason.is_empty() {
                return Some(reason);
            }
        }
    }
    None
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

// Conversion from reqwest errors
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Upload(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_errors_never_reach_network() {
        assert!(Error::ValidationFailed("missing product".into()).is_local());
        assert!(Error::ActionBlocked("already finalized".into()).is_local());
        assert!(!Error::TransactionFailed("revert".into()).is_local());
        assert!(!Error::ProviderUnavailable.is_local());
    }

    #[test]
    fn test_extract_revert_reason() {
        assert_eq!(
            extract_revert_reason("execution reverted: Lote finalizado"),
            Some("Lote finalizado")
        );
        assert_eq!(
            extract_revert_reason("rpc error, reason: Custodio invalido"),
            Some("Custodio invalido")
        );
        assert_eq!(extract_revert_reason("connection reset by peer"), None);
        assert_eq!(extract_revert_reason("execution reverted: "), None);
    }

    #[test]
    fn test_user_message_prefers_structured_reason() {
        let err = Error::TransactionFailed("execution reverted: Estado invalido".into());
        assert_eq!(err.user_message(), "Estado invalido");

        let err = Error::TransactionFailed("nonce too low".into());
        assert_eq!(err.user_message(), "nonce too low");

        let err = Error::ProviderUnavailable;
        assert_eq!(err.user_message(), "Wallet provider unavailable");
    }
}
