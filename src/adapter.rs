//! Contract between the protocol engines and the debug adapter.
//!
//! The engines in this crate never talk to USB or any other transport
//! themselves. The [`CommandQueue`] trait is the batched DP/AP register
//! access primitive an adapter driver has to provide, and [`JtagAdapter`]
//! is the raw JTAG sequence primitive (the `DAP_JTAG_Sequence` /
//! `DAP_SWJ_Pins` shapes of a CMSIS-DAP style probe). Tests implement
//! both with mocks.

/// The two register spaces a debug port command can address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortType {
    /// Debug Port (DP) registers.
    DebugPort,
    /// Access Port (AP) registers, as selected by DP SELECT.
    AccessPort,
}

/// Errors reported by the adapter when a batch is committed or a raw
/// sequence is transmitted.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// The target answered a transfer with a FAULT acknowledge.
    #[error("target answered with a FAULT acknowledge")]
    Fault,
    /// The target kept answering WAIT until the adapter gave up.
    #[error("target kept answering WAIT")]
    WaitTimeout,
    /// The probe transport failed (USB stall, device gone, ...).
    #[error("probe transport error")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Batched access to DP and AP registers.
///
/// Commands are queued without touching the wire and sent as one batch by
/// [`commit`](CommandQueue::commit). `commit` returns the values of all
/// queued reads, in queue order, exactly one `u32` per queued read (a
/// block read of `count` contributes `count` results).
///
/// When `commit` fails the adapter may have partially executed the batch;
/// callers decide whether to discard what is still pending with
/// [`clean_pending`](CommandQueue::clean_pending).
pub trait CommandQueue {
    /// Queue a single register read.
    fn queue_read(&mut self, port: PortType, address: u8);

    /// Queue a single register write.
    fn queue_write(&mut self, port: PortType, address: u8, value: u32);

    /// Queue `count` consecutive reads of the same register.
    fn queue_read_block(&mut self, port: PortType, address: u8, count: usize);

    /// Queue one write of the same register per element of `values`.
    fn queue_write_block(&mut self, port: PortType, address: u8, values: &[u32]);

    /// Send the queued batch and return the read results in queue order.
    fn commit(&mut self) -> Result<Vec<u32>, AdapterError>;

    /// Discard all commands still pending in the queue.
    fn clean_pending(&mut self);
}

/// Raw JTAG access for the scan chain engine.
pub trait JtagAdapter {
    /// Transmit `records` pre-encoded JTAG sequence records from
    /// `commands` and return the captured TDO bytes.
    ///
    /// Each record is a control byte (bit 7: capture TDO, bit 6: TMS
    /// level, bits 5:0: clock count with 64 encoded as 0) followed by
    /// `ceil(count / 8)` payload bytes. `capture_len` is the exact number
    /// of TDO bytes the records capture.
    fn sequence(
        &mut self,
        records: usize,
        commands: &[u8],
        capture_len: usize,
    ) -> Result<Vec<u8>, AdapterError>;

    /// Drive the JTAG pins selected by `select` to `output`, wait
    /// `wait_us` microseconds and return the sampled pin state.
    fn set_pins(&mut self, select: u8, output: u8, wait_us: u32) -> Result<u8, AdapterError>;
}
