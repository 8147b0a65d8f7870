//! Error types of the DAP and JTAG engines.

use crate::adapter::AdapterError;

/// Errors produced by the DAP engine and memory AP transfers.
#[derive(Debug, thiserror::Error)]
pub enum AdiError {
    /// The address is not aligned to the transfer width.
    #[error("address {address:#x} is not aligned to {alignment} bytes")]
    MemoryNotAligned {
        /// The requested address.
        address: u64,
        /// The required alignment in bytes.
        alignment: usize,
    },
    /// The operation needs a memory AP, but the handle refers to a
    /// different AP class.
    #[error("access port is not a memory access port")]
    NotAMemoryAp,
    /// A component base address was not 4 KiB aligned.
    #[error("component base address {0:#x} is not 4 KiB aligned")]
    ComponentBaseNotAligned(u64),
    /// The AP does not implement the requested transfer width.
    #[error("transfer width is not supported by this access port")]
    UnsupportedTransferWidth,
    /// No access port matching the request exists on this DAP.
    #[error("no matching access port was found")]
    ApNotFound,
    /// The access port exists but CSW.DeviceEn is clear.
    #[error("access port is present but not enabled")]
    ApNotEnabled,
    /// The target never acknowledged the power-up request.
    #[error("target power-up request was not acknowledged")]
    PowerUpTimeout,
    /// The adapter returned a different number of read results than the
    /// engine queued.
    #[error("command queue returned {actual} read results, expected {expected}")]
    ResultCount {
        /// Reads the engine queued.
        expected: usize,
        /// Results the adapter returned.
        actual: usize,
    },
    /// The adapter failed to commit a command batch. The pending queue
    /// has been discarded and no register shadows were updated.
    #[error("adapter failed to commit the command batch")]
    Adapter(#[from] AdapterError),
}

/// Errors produced by the JTAG scan chain engine.
///
/// On any failure the pending instruction queue is left intact so the
/// caller can inspect it, retry, or discard it with
/// [`clear_pending`](crate::jtag::ScanChain::clear_pending).
#[derive(Debug, thiserror::Error)]
pub enum JtagError {
    /// The TAP index is outside the configured chain.
    #[error("TAP index {index} is outside the chain of {count} TAPs")]
    TapIndexOutOfRange {
        /// The requested TAP index.
        index: usize,
        /// The number of TAPs in the chain.
        count: usize,
    },
    /// A DR exchange of zero bits was requested.
    #[error("cannot exchange zero DR bits")]
    EmptyExchange,
    /// A DR exchange longer than 64 bits was requested.
    #[error("DR exchange of {0} bits exceeds the 64 bit limit")]
    ExchangeTooLong(usize),
    /// A DR exchange targets a TAP whose IR was not written last.
    #[error("DR exchange targets TAP {requested}, but the active TAP is {selected:?}")]
    TapNotActive {
        /// The TAP the exchange targets.
        requested: usize,
        /// The TAP selected by the most recent IR write, if any.
        selected: Option<usize>,
    },
    /// The adapter returned a different number of TDO bytes than the
    /// encoded records capture.
    #[error("adapter returned {actual} capture bytes, expected {expected}")]
    CaptureLength {
        /// Bytes the records capture.
        expected: usize,
        /// Bytes the adapter returned.
        actual: usize,
    },
    /// The adapter failed to transmit the sequence.
    #[error("adapter failed to transmit the JTAG sequence")]
    Adapter(#[from] AdapterError),
}
