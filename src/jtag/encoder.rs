//! Serialization of JTAG sequence records.
//!
//! A record is one control byte followed by `ceil(count / 8)` payload
//! bytes. Control byte layout: bit 7 captures TDO, bit 6 is the TMS
//! level during the record, bits 5:0 are the clock count with 64
//! encoded as 0. Payload bits are shifted out LSB first.

use bitvec::prelude::*;

use super::state::TmsWalk;

/// Control byte flag: capture TDO during this record.
pub(crate) const CAPTURE_TDO: u8 = 0x80;
/// Control byte flag: drive TMS high during this record.
pub(crate) const TMS_HIGH: u8 = 0x40;

/// The serialized length of an `bits`-long TDI run, split into 64-clock
/// records plus a remainder record.
pub(crate) fn run_length(bits: usize) -> usize {
    let full = (bits / 64) * 9;
    let rest = bits % 64;
    if rest > 0 {
        full + 1 + rest.div_ceil(8)
    } else {
        full
    }
}

fn get_bit(bytes: &[u8], index: usize) -> bool {
    (bytes[index / 8] >> (index % 8)) & 1 != 0
}

/// Accumulates sequence records and tracks how many TDO bytes they
/// capture.
#[derive(Debug)]
pub(crate) struct SequenceBuilder {
    pub(crate) buf: Vec<u8>,
    pub(crate) records: usize,
    pub(crate) capture_len: usize,
    /// Offset of the control byte of the most recent record.
    last_ctrl: usize,
}

impl SequenceBuilder {
    pub(crate) fn with_capacity(bytes: usize) -> Self {
        SequenceBuilder {
            buf: Vec::with_capacity(bytes),
            records: 0,
            capture_len: 0,
            last_ctrl: 0,
        }
    }

    pub(crate) fn push_record(&mut self, ctrl: u8, payload: &[u8]) {
        self.last_ctrl = self.buf.len();
        self.buf.push(ctrl);
        self.buf.extend_from_slice(payload);
        self.records += 1;
        if ctrl & CAPTURE_TDO != 0 {
            self.capture_len += payload.len();
        }
    }

    /// Serialize a TMS walk, one record per constant-TMS run. TDI is
    /// held low throughout.
    pub(crate) fn parse_tms(&mut self, walk: TmsWalk) {
        let mut bits = walk.bits;
        let mut remaining = walk.count;
        while remaining > 0 {
            let level = bits & 1;
            let mut run = 0u8;
            while remaining > 0 && bits & 1 == level {
                run += 1;
                bits >>= 1;
                remaining -= 1;
            }
            let ctrl = if level != 0 { TMS_HIGH | run } else { run };
            self.push_record(ctrl, &[0]);
        }
    }

    /// Clock out `count` zero bits with TMS low and no capture. Used for
    /// bypass padding and extra idle cycles.
    pub(crate) fn shift_zeros(&mut self, mut count: usize) {
        const ZEROS: [u8; 8] = [0; 8];
        while count >= 64 {
            self.push_record(0x00, &ZEROS);
            count -= 64;
        }
        if count > 0 {
            self.push_record(count as u8, &ZEROS[..count.div_ceil(8)]);
        }
    }

    /// Shift a full IR chain of `total_bits` bits, with `value` placed
    /// at `before..before + ir_len` and every other TAP's IR filled with
    /// ones (BYPASS). The final bit goes out in its own TMS=1 record, so
    /// the controller leaves Shift-IR through Exit1-IR.
    pub(crate) fn shift_ir(
        &mut self,
        total_bits: usize,
        before: usize,
        ir_len: usize,
        value: u32,
    ) {
        let mut chain: BitVec<u8, Lsb0> = BitVec::repeat(true, total_bits);
        for i in 0..ir_len {
            let bit = i < 32 && (value >> i) & 1 == 1;
            chain.set(before + i, bit);
        }
        let data = chain.as_raw_slice();

        let mut remaining = total_bits - 1;
        let mut offset = 0;
        while remaining >= 64 {
            self.push_record(0x00, &data[offset..offset + 8]);
            remaining -= 64;
            offset += 8;
        }
        if remaining > 0 {
            self.push_record(remaining as u8, &data[offset..offset + remaining.div_ceil(8)]);
        }
        self.push_record(TMS_HIGH | 1, &[u8::from(chain[total_bits - 1])]);
    }

    /// Shift a DR exchange through a chain of `tap_count` TAPs with all
    /// but TAP `tap` in BYPASS: `tap` leading zero bits, the captured
    /// `bits`-bit payload, trailing bypass zeros, and the Shift-DR exit
    /// fixup. Returns the capture split position if the final bit had to
    /// be carved out of a captured record.
    pub(crate) fn shift_dr(
        &mut self,
        tap: usize,
        tap_count: usize,
        bits: usize,
        data: &[u8; 8],
    ) -> Option<u8> {
        self.shift_zeros(tap);

        let mut remaining = bits;
        let mut offset = 0;
        while remaining >= 64 {
            self.push_record(CAPTURE_TDO, &data[offset..offset + 8]);
            remaining -= 64;
            offset += 8;
        }
        if remaining > 0 {
            self.push_record(
                CAPTURE_TDO | remaining as u8,
                &data[offset..offset + remaining.div_ceil(8)],
            );
        }

        self.shift_zeros(tap_count - tap - 1);
        self.exit_shift()
    }

    /// Rewrite the most recent record so its final clock carries TMS=1,
    /// leaving the shift state through Exit1.
    ///
    /// A one-clock record just gets its TMS flag set. Longer records are
    /// shortened by one clock and the final bit is resent as its own
    /// record; if the shortened record was captured, the capture arrives
    /// split in two and the caller gets the split position to stitch it
    /// back together.
    fn exit_shift(&mut self) -> Option<u8> {
        let ctrl_pos = self.last_ctrl;
        let ctrl = self.buf[ctrl_pos];
        let count = match ctrl & 0x3F {
            0 => 64,
            n => n as usize,
        };
        let capture = ctrl & CAPTURE_TDO != 0;

        if count == 1 {
            self.buf[ctrl_pos] |= TMS_HIGH;
            return None;
        }

        let last_bit = get_bit(&self.buf[ctrl_pos + 1..], count - 1);
        self.buf[ctrl_pos] = (ctrl & 0xC0) | (count as u8 - 1);
        if count % 8 == 1 {
            // The final bit had a payload byte to itself.
            self.buf.pop();
            if capture {
                self.capture_len -= 1;
            }
        }

        if capture {
            self.push_record(CAPTURE_TDO | TMS_HIGH | 1, &[u8::from(last_bit)]);
            Some((count - 1) as u8)
        } else {
            self.push_record(TMS_HIGH | 1, &[u8::from(last_bit)]);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jtag::state::{tms_walk, TapState};
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    /// Decode records back into (capture, tms, bits) runs.
    fn decode(mut buf: &[u8]) -> Vec<(bool, bool, Vec<bool>)> {
        let mut runs = Vec::new();
        while !buf.is_empty() {
            let ctrl = buf[0];
            let count = match ctrl & 0x3F {
                0 => 64,
                n => n as usize,
            };
            let payload = &buf[1..1 + count.div_ceil(8)];
            let bits = (0..count).map(|i| super::get_bit(payload, i)).collect();
            runs.push((ctrl & CAPTURE_TDO != 0, ctrl & TMS_HIGH != 0, bits));
            buf = &buf[1 + count.div_ceil(8)..];
        }
        runs
    }

    /// Flatten the TDI bits of every record.
    fn tdi_bits(buf: &[u8]) -> Vec<bool> {
        decode(buf).into_iter().flat_map(|(_, _, bits)| bits).collect()
    }

    #[test]
    fn tms_records_split_at_level_changes() {
        let mut seq = SequenceBuilder::with_capacity(16);
        // Idle -> Shift-IR: 1, 1, 0, 0.
        seq.parse_tms(tms_walk(TapState::Idle, TapState::IrShift));
        assert_eq!(seq.buf, vec![TMS_HIGH | 2, 0x00, 0x02, 0x00]);
        assert_eq!(seq.records, 2);
        assert_eq!(seq.capture_len, 0);
    }

    #[test]
    fn ir_chain_layout() {
        // Four TAPs with IR lengths [9, 9, 4, 9], writing 0b0000 to TAP 2.
        let mut seq = SequenceBuilder::with_capacity(16);
        seq.shift_ir(31, 18, 4, 0x0);

        assert_eq!(seq.buf, vec![30, 0xFF, 0xFF, 0xC3, 0x7F, TMS_HIGH | 1, 0x01]);
        assert_eq!(seq.records, 2);

        let bits = tdi_bits(&seq.buf);
        assert_eq!(bits.len(), 31);
        for (i, bit) in bits.iter().enumerate() {
            let expected = !(18..22).contains(&i);
            assert_eq!(*bit, expected, "chain bit {i}");
        }
    }

    #[test_case(1 ; "one bit ir")]
    #[test_case(5 ; "five bit ir")]
    #[test_case(32 ; "full width ir")]
    fn ir_value_is_framed_by_bypass_ones(ir_len: usize) {
        let before = 7;
        let after = 11;
        let total = before + ir_len + after;
        let value = 0xA5A5_A5A5u32;

        let mut seq = SequenceBuilder::with_capacity(32);
        seq.shift_ir(total, before, ir_len, value);

        let bits = tdi_bits(&seq.buf);
        assert_eq!(bits.len(), total);
        for (i, bit) in bits.iter().enumerate() {
            let expected = if (before..before + ir_len).contains(&i) {
                (value >> (i - before)) & 1 == 1
            } else {
                true
            };
            assert_eq!(*bit, expected, "chain bit {i}");
        }

        // Only the final record carries TMS, nothing captures.
        let runs = decode(&seq.buf);
        assert!(runs.iter().all(|(capture, _, _)| !capture));
        assert!(runs.last().is_some_and(|(_, tms, bits)| *tms && bits.len() == 1));
    }

    #[test]
    fn dr_exchange_on_last_tap_is_segmented() {
        // Two TAPs, exchanging 12 bits with TAP 1: one leading bypass
        // zero, then the captured payload ends the shift.
        let mut seq = SequenceBuilder::with_capacity(16);
        let split = seq.shift_dr(1, 2, 12, &[0xAB, 0x0F, 0, 0, 0, 0, 0, 0]);

        assert_eq!(split, Some(11));
        assert_eq!(
            seq.buf,
            vec![
                0x01,
                0x00, // bypass zero for TAP 0
                CAPTURE_TDO | 11,
                0xAB,
                0x0F, // payload shortened to 11 bits
                CAPTURE_TDO | TMS_HIGH | 1,
                0x01, // final payload bit (bit 11 of 0x0FAB)
            ]
        );
        assert_eq!(seq.capture_len, 3);
    }

    #[test]
    fn dr_exchange_with_trailing_bypass_is_not_segmented() {
        // Four TAPs, exchanging 9 bits with TAP 2: the trailing bypass
        // zero for TAP 3 absorbs the exit fixup.
        let mut seq = SequenceBuilder::with_capacity(16);
        let split = seq.shift_dr(2, 4, 9, &[0xFF, 0x01, 0, 0, 0, 0, 0, 0]);

        assert_eq!(split, None);
        assert_eq!(
            seq.buf,
            vec![
                0x02,
                0x00, // bypass zeros for TAPs 0 and 1
                CAPTURE_TDO | 9,
                0xFF,
                0x01,
                TMS_HIGH | 1,
                0x00, // trailing bypass, TMS raised in place
            ]
        );
        assert_eq!(seq.capture_len, 2);
    }

    #[test]
    fn dr_payload_of_8n_plus_1_bits_drops_a_byte() {
        // 9-bit exchange on the last TAP: the final bit's payload byte
        // disappears and comes back as the exit record.
        let mut seq = SequenceBuilder::with_capacity(16);
        let split = seq.shift_dr(0, 1, 9, &[0x55, 0x01, 0, 0, 0, 0, 0, 0]);

        assert_eq!(split, Some(8));
        assert_eq!(
            seq.buf,
            vec![
                CAPTURE_TDO | 8,
                0x55,
                CAPTURE_TDO | TMS_HIGH | 1,
                0x01,
            ]
        );
        assert_eq!(seq.capture_len, 2);
    }

    #[test]
    fn single_bit_dr_exchange_raises_tms_in_place() {
        let mut seq = SequenceBuilder::with_capacity(8);
        let split = seq.shift_dr(0, 1, 1, &[0x01, 0, 0, 0, 0, 0, 0, 0]);

        assert_eq!(split, None);
        assert_eq!(seq.buf, vec![CAPTURE_TDO | TMS_HIGH | 1, 0x01]);
        assert_eq!(seq.capture_len, 1);
    }

    #[test]
    fn full_width_dr_exchange() {
        // 64 bits encode as count 0; the fixup shortens to 63 and takes
        // the final bit from the very top of the payload.
        let data = [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x80];
        let mut seq = SequenceBuilder::with_capacity(16);
        let split = seq.shift_dr(0, 1, 64, &data);

        assert_eq!(split, Some(63));
        assert_eq!(seq.buf[0], CAPTURE_TDO | 63);
        assert_eq!(&seq.buf[1..9], &data);
        assert_eq!(&seq.buf[9..], &[CAPTURE_TDO | TMS_HIGH | 1, 0x01]);
        assert_eq!(seq.capture_len, 9);
    }

    #[test]
    fn long_bypass_padding_is_chunked() {
        let mut seq = SequenceBuilder::with_capacity(32);
        seq.shift_zeros(70);
        assert_eq!(seq.buf.len(), 9 + 1 + 1);
        assert_eq!(seq.buf[0], 0x00);
        assert_eq!(seq.buf[9], 6);
        assert_eq!(seq.records, 2);
    }

    #[test]
    fn run_length_accounting() {
        assert_eq!(run_length(0), 0);
        assert_eq!(run_length(9), 3);
        assert_eq!(run_length(64), 9);
        assert_eq!(run_length(70), 11);
    }
}
