//! Error types for the HomeKit bridge.

use thiserror::Error;

/// Primary error type for all HAP operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed codec input, disallowed service/characteristic combination
    /// or an accessory id collision.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Undecodable header, missing catalog entry or inconsistent state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// DNS record type outside the supported set. Decoders treat this as a skip.
    #[error("Unsupported type: {0}")]
    UnsupportedType(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cryptography: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Pairing: {0}")]
    Pairing(#[from] PairingError),

    #[error("Discovery: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Timed out")]
    Timeout,
}

/// Errors raised while driving the pairing state machines.
#[derive(Error, Debug)]
pub enum PairingError {
    #[error("Unexpected pairing step: {0}")]
    InvalidState(String),

    #[error("Expected state M{expected}, received M{actual}")]
    StateMismatch { expected: u8, actual: u8 },

    #[error("TLV item 0x{0:02x} is missing")]
    MissingTlv(u8),

    #[error("Protocol violation: {0}")]
    Protocol(String),
}

/// Errors from the mDNS responder.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("mDNS socket error: {0}")]
    Socket(String),

    #[error("Unable to encode mDNS message: {0}")]
    Encode(String),
}

/// Failures of the primitives in `hap-crypto`.
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Cannot seal: {0}")]
    Encryption(String),

    #[error("Cannot open: {0}")]
    Decryption(String),

    #[error("Key agreement or derivation: {0}")]
    KeyDerivation(String),

    #[error("Key must be {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("Poly1305 tag does not match")]
    AuthTagMismatch,
}

impl Error {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }

    /// True for errors a decoder may skip over instead of aborting.
    pub fn is_unsupported_type(&self) -> bool {
        matches!(self, Error::UnsupportedType(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
