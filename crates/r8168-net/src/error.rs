use thiserror::Error;

/// Errors surfaced to the networking stack and administrative callers.
///
/// Hardware anomalies are recovered locally and never show up here; only caller-input
/// validation, allocation failure and calls made in the wrong lifecycle state do.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("DMA buffer allocation failed")]
    AllocationFailure,

    #[error("MTU {mtu} out of range ({min}..={max})")]
    InvalidMtu { mtu: usize, min: usize, max: usize },

    #[error("invalid unicast MAC address {0:02x?}")]
    InvalidAddress([u8; 6]),

    #[error("interface is not running")]
    NotRunning,

    #[error("interface is already open")]
    AlreadyOpen,

    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("operation not supported: {0}")]
    Unsupported(&'static str),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failure of one register-access handshake.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AccessError {
    #[error("{what} access timed out")]
    Timeout { what: &'static str },

    #[error("invalid indirect access length {0} (expected 1..=4)")]
    InvalidLength(usize),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{which} ring size {size} must be a power of two >= 2")]
    RingSize { which: &'static str, size: usize },

    #[error("max_tx_fragments {margin} must be non-zero and at most half the Tx ring size {ring}")]
    TxMargin { margin: usize, ring: usize },

    #[error("max_interrupt_work must be non-zero")]
    InterruptWork,

    #[error("poll_weight must be non-zero")]
    PollWeight,

    #[error("timer interval {0} must be non-zero")]
    Interval(&'static str),
}
