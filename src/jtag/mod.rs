//! The JTAG scan chain engine.
//!
//! [`ScanChain`] queues IR writes and DR exchanges against a chain of
//! TAPs and turns the whole queue into a single pre-encoded sequence
//! batch for the adapter: a size pass over the queue, an encode pass
//! that walks the TAP state machine, one transmit, and a decode pass
//! that stitches the captured TDO bits back into per-exchange results.

mod encoder;
pub mod state;

use bitfield::bitfield;

use crate::adapter::{AdapterError, JtagAdapter};
use crate::error::JtagError;

use encoder::SequenceBuilder;
use state::{level_runs, tms_walk, TapState};

/// Hard TAP reset dwell cap, in microseconds.
const RESET_DWELL_CAP_US: u32 = 3_000_000;

/// The nTRST pin in the adapter's pin bitmap.
const PIN_NTRST: u8 = 1 << 5;

bitfield! {
    /// A JTAG IDCODE, identifying one TAP on the scan chain.
    #[derive(Copy, Clone, Eq, PartialEq)]
    pub struct IdCode(u32);
    impl Debug;
    u8;
    /// The IDCODE version.
    pub version, set_version: 31, 28;
    u16;
    /// The part number.
    pub part_number, set_part_number: 27, 12;
    /// The JEDEC JEP-106 manufacturer id.
    pub manufacturer, set_manufacturer: 11, 1;
    u8;
    /// The continuation code of the manufacturer id.
    pub manufacturer_continuation, set_manufacturer_continuation: 11, 8;
    /// The identity code of the manufacturer id.
    pub manufacturer_identity, set_manufacturer_identity: 7, 1;
    bool;
    /// The least significant bit. Always set in a valid IDCODE.
    pub lsbit, set_lsbit: 0;
}

impl IdCode {
    /// Whether this looks like a real IDCODE: the marker bit is set and
    /// the manufacturer id is not a reserved value.
    pub fn valid(&self) -> bool {
        self.lsbit() && (self.manufacturer() != 0) && (self.manufacturer() != 127)
    }

    /// The manufacturer name, if the JEP106 id is known.
    pub fn manufacturer_name(&self) -> Option<&'static str> {
        let cc = self.manufacturer_continuation();
        let id = self.manufacturer_identity();
        jep106::JEP106Code::new(cc, id).get()
    }
}

impl std::fmt::Display for IdCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(name) = self.manufacturer_name() {
            write!(f, "0x{:08X} ({name})", self.0)
        } else {
            write!(f, "0x{:08X}", self.0)
        }
    }
}

/// One TAP's position in the serial IR chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TapInfo {
    /// The length of this TAP's instruction register.
    pub ir_len: usize,
    /// IR bits of the TAPs between TDI and this one.
    pub ir_before: usize,
    /// IR bits of the TAPs between this one and TDO.
    pub ir_after: usize,
}

#[derive(Debug, Clone, Copy)]
enum Instruction {
    WriteIr {
        tap: usize,
        value: u32,
    },
    ExchangeDr {
        tap: usize,
        bits: usize,
        data: [u8; 8],
    },
}

/// Captured TDO data of one DR exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrCapture {
    /// The TAP the exchange went through.
    pub tap: usize,
    /// The number of exchanged bits.
    pub bits: usize,
    /// The captured bits, LSB first. Bits beyond `bits` keep the value
    /// they had in the outgoing data.
    pub data: [u8; 8],
}

/// A JTAG scan chain driven through a raw sequence adapter.
#[derive(Debug)]
pub struct ScanChain<A: JtagAdapter> {
    adapter: A,
    taps: Vec<TapInfo>,
    total_ir_bits: usize,
    state: TapState,
    /// The TAP selected by the most recent committed or queued IR write.
    active_tap: Option<usize>,
    /// Idle clocks appended after every DR exchange.
    dr_delay: usize,
    queue: Vec<Instruction>,
}

impl<A: JtagAdapter> ScanChain<A> {
    /// Create a scan chain engine over `adapter`. The logical state
    /// starts at Test-Logic-Reset; the chain topology is empty until
    /// [`set_tap_info`](Self::set_tap_info) is called.
    pub fn new(adapter: A) -> Self {
        ScanChain {
            adapter,
            taps: Vec::new(),
            total_ir_bits: 0,
            state: TapState::Reset,
            active_tap: None,
            dr_delay: 0,
            queue: Vec::new(),
        }
    }

    /// Set the chain topology from the IR length of each TAP, ordered
    /// from TDI to TDO. Resets the active TAP selection and discards
    /// any queued instructions, since their TAP indices no longer mean
    /// anything.
    pub fn set_tap_info(&mut self, ir_lengths: &[usize]) {
        let total: usize = ir_lengths.iter().sum();
        self.taps.clear();
        let mut before = 0;
        for &ir_len in ir_lengths {
            self.taps.push(TapInfo {
                ir_len,
                ir_before: before,
                ir_after: total - before - ir_len,
            });
            before += ir_len;
        }
        self.total_ir_bits = total;
        self.active_tap = None;
        self.queue.clear();
        tracing::debug!("scan chain: {} TAPs, {total} IR bits", self.taps.len());
    }

    /// The number of TAPs on the chain.
    pub fn tap_count(&self) -> usize {
        self.taps.len()
    }

    /// The current logical TAP controller state.
    pub fn state(&self) -> TapState {
        self.state
    }

    /// Idle clocks to append after every DR exchange. With a non-zero
    /// delay each exchange ends in Run-Test/Idle instead of Exit1-DR.
    pub fn set_dr_delay(&mut self, cycles: usize) {
        self.dr_delay = cycles;
    }

    /// The number of queued instructions.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Discard all queued instructions.
    pub fn clear_pending(&mut self) {
        self.queue.clear();
    }

    fn check_tap(&self, tap: usize) -> Result<(), JtagError> {
        if tap >= self.taps.len() {
            return Err(JtagError::TapIndexOutOfRange {
                index: tap,
                count: self.taps.len(),
            });
        }
        Ok(())
    }

    /// Queue an IR write selecting `value` on TAP `tap` and BYPASS on
    /// every other TAP.
    pub fn write_ir(&mut self, tap: usize, value: u32) -> Result<(), JtagError> {
        self.check_tap(tap)?;
        self.queue.push(Instruction::WriteIr { tap, value });
        Ok(())
    }

    /// Queue a DR exchange of `bits` bits (1 to 64) with TAP `tap`. The
    /// outgoing bits are taken LSB first from `data`.
    ///
    /// The exchange is only valid while `tap` is the active TAP, i.e.
    /// the most recent IR write went to it; [`execute`](Self::execute)
    /// enforces this before anything is transmitted.
    pub fn exchange_dr(&mut self, tap: usize, bits: usize, data: [u8; 8]) -> Result<(), JtagError> {
        self.check_tap(tap)?;
        if bits == 0 {
            return Err(JtagError::EmptyExchange);
        }
        if bits > 64 {
            return Err(JtagError::ExchangeTooLong(bits));
        }
        self.queue.push(Instruction::ExchangeDr { tap, bits, data });
        Ok(())
    }

    /// The serialized size of the queue, walking the same hypothetical
    /// state sequence the encode pass will take.
    fn queue_size(&self) -> usize {
        let mut bytes = 0;
        let mut state = self.state;
        for instruction in &self.queue {
            // The Select -> Capture -> Shift record.
            bytes += 2;
            match *instruction {
                Instruction::WriteIr { .. } => {
                    bytes += level_runs(tms_walk(state, TapState::IrSelect)) * 2;
                    bytes += encoder::run_length(self.total_ir_bits) + 2;
                    state = TapState::IrExit1;
                }
                Instruction::ExchangeDr { tap, bits, .. } => {
                    bytes += level_runs(tms_walk(state, TapState::DrSelect)) * 2;
                    bytes += encoder::run_length(tap);
                    bytes += encoder::run_length(bits) + 2;
                    bytes += encoder::run_length(self.taps.len() - tap - 1);
                    if self.dr_delay > 0 {
                        bytes += level_runs(tms_walk(TapState::DrExit1, TapState::Idle)) * 2;
                        bytes += encoder::run_length(self.dr_delay);
                        state = TapState::Idle;
                    } else {
                        state = TapState::DrExit1;
                    }
                }
            }
        }
        bytes
    }

    /// Execute all queued instructions in one adapter transaction and
    /// return the DR captures in queue order.
    ///
    /// On success the queue is drained and the logical state advanced.
    /// On any failure the queue, the state and the active TAP selection
    /// are left untouched, so the caller can retry or
    /// [`clear_pending`](Self::clear_pending).
    pub fn execute(&mut self) -> Result<Vec<DrCapture>, JtagError> {
        if self.queue.is_empty() {
            return Ok(Vec::new());
        }

        let capacity = self.queue_size();
        tracing::trace!(
            "executing {} instructions, about {capacity} sequence bytes",
            self.queue.len()
        );
        let mut seq = SequenceBuilder::with_capacity(capacity);
        let mut state = self.state;
        let mut active = self.active_tap;
        let mut splits = Vec::with_capacity(self.queue.len());

        for instruction in &self.queue {
            match *instruction {
                Instruction::WriteIr { tap, value } => {
                    seq.parse_tms(tms_walk(state, TapState::IrSelect));
                    // Select-IR -> Capture-IR -> Shift-IR.
                    seq.push_record(0x02, &[0]);
                    let info = self.taps[tap];
                    seq.shift_ir(self.total_ir_bits, info.ir_before, info.ir_len, value);
                    state = TapState::IrExit1;
                    active = Some(tap);
                    splits.push(None);
                }
                Instruction::ExchangeDr { tap, bits, data } => {
                    if active != Some(tap) {
                        tracing::warn!(
                            "DR exchange for TAP {tap}, but the active TAP is {active:?}"
                        );
                        return Err(JtagError::TapNotActive {
                            requested: tap,
                            selected: active,
                        });
                    }
                    seq.parse_tms(tms_walk(state, TapState::DrSelect));
                    // Select-DR -> Capture-DR -> Shift-DR.
                    seq.push_record(0x02, &[0]);
                    splits.push(seq.shift_dr(tap, self.taps.len(), bits, &data));
                    if self.dr_delay > 0 {
                        seq.parse_tms(tms_walk(TapState::DrExit1, TapState::Idle));
                        seq.shift_zeros(self.dr_delay);
                        state = TapState::Idle;
                    } else {
                        state = TapState::DrExit1;
                    }
                }
            }
        }

        let captured = self
            .adapter
            .sequence(seq.records, &seq.buf, seq.capture_len)?;
        if captured.len() != seq.capture_len {
            return Err(JtagError::CaptureLength {
                expected: seq.capture_len,
                actual: captured.len(),
            });
        }

        let mut captures = Vec::new();
        let mut pos = 0;
        for (instruction, split) in self.queue.iter().zip(&splits) {
            let Instruction::ExchangeDr { tap, bits, data } = *instruction else {
                continue;
            };
            let byte_count = bits.div_ceil(8);
            let mut out = data;
            out[..byte_count].copy_from_slice(&captured[pos..pos + byte_count]);
            if let Some(split) = split {
                // The final bit arrived in its own record; merge it back
                // unless it already fell into the last payload byte.
                if bits % 8 != 1 {
                    out[byte_count - 1] |= captured[pos + byte_count] << (split % 8);
                    pos += 1;
                }
            }
            pos += byte_count;
            captures.push(DrCapture { tap, bits, data: out });
        }

        self.state = state;
        self.active_tap = active;
        self.queue.clear();
        Ok(captures)
    }

    /// Reset the TAP controllers.
    ///
    /// A hard reset pulses the nTRST pin and dwells for `wait_us`
    /// microseconds (capped at three seconds); a soft reset clocks five
    /// TMS=1 cycles, which reaches Test-Logic-Reset from any state.
    pub fn reset(&mut self, hard: bool, wait_us: u32) -> Result<(), JtagError> {
        if hard {
            let wait_us = wait_us.min(RESET_DWELL_CAP_US);
            self.adapter.set_pins(PIN_NTRST, PIN_NTRST, wait_us)?;
        } else {
            self.adapter
                .sequence(1, &[encoder::TMS_HIGH | 5, 0x00], 0)?;
        }
        self.state = TapState::Reset;
        Ok(())
    }

    /// Read the IDCODE of every TAP on the chain.
    ///
    /// Forces Test-Logic-Reset so each TAP preloads its IDCODE register,
    /// shifts 32 bits per TAP out of the DR chain and returns to reset.
    pub fn read_idcodes(&mut self) -> Result<Vec<IdCode>, JtagError> {
        let tap_count = self.taps.len();
        let mut seq = SequenceBuilder::with_capacity(4 + tap_count * 5 + 2);
        seq.parse_tms(tms_walk(self.state, TapState::Reset));
        seq.parse_tms(tms_walk(TapState::Reset, TapState::DrShift));
        for _ in 0..tap_count {
            seq.push_record(encoder::CAPTURE_TDO | 32, &[0; 4]);
        }
        seq.push_record(encoder::TMS_HIGH | 5, &[0]);

        let captured = self
            .adapter
            .sequence(seq.records, &seq.buf, seq.capture_len)?;
        if captured.len() != 4 * tap_count {
            return Err(JtagError::CaptureLength {
                expected: 4 * tap_count,
                actual: captured.len(),
            });
        }
        self.state = TapState::Reset;

        let idcodes: Vec<IdCode> = captured
            .chunks_exact(4)
            .map(|bytes| IdCode(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])))
            .collect();
        for (tap, idcode) in idcodes.iter().enumerate() {
            tracing::debug!("TAP {tap} IDCODE: {idcode}");
        }
        Ok(idcodes)
    }
}
