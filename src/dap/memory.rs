//! Memory AP transfers.
//!
//! All transfers share the same skeleton: route SELECT to the AP (bank
//! 0), program CSW for the transfer width and increment mode, write TAR,
//! then move data through DRW. SELECT and CSW writes are elided when the
//! shadows already hold the wanted values, and the shadows are only
//! updated after the batch committed successfully.

use crate::adapter::{CommandQueue, PortType};
use crate::error::AdiError;

use super::ap::{self, AddressIncrement, Csw, DataSize, MemoryApConfig};
use super::dp::{Register, Select};
use super::{AccessPortHandle, ApState, Dap};

impl<Q: CommandQueue> Dap<Q> {
    fn memory_state(
        &self,
        ap: AccessPortHandle,
    ) -> Result<(u8, MemoryApConfig, Csw), AdiError> {
        let entry = &self.aps[ap.slot];
        match &entry.state {
            ApState::Memory { csw, config, .. } => Ok((entry.index, *config, *csw)),
            ApState::Jtag => Err(AdiError::NotAMemoryAp),
        }
    }

    /// Queue SELECT and CSW updates for a transfer through `ap_index`,
    /// skipping registers whose shadows already match. Returns the
    /// values the shadows must take once the batch commits.
    fn queue_transfer_setup(
        &mut self,
        ap_index: u8,
        csw_shadow: Csw,
        size: DataSize,
        increment: AddressIncrement,
    ) -> (Select, Csw) {
        let mut select = self.select;
        select.set_ap_sel(ap_index);
        select.set_ap_bank_sel(0);
        let mut csw = csw_shadow;
        csw.set_addr_inc(increment as u8);
        csw.set_size(size as u8);

        if self.select != select {
            self.queue
                .queue_write(PortType::DebugPort, Select::ADDRESS, select.0);
        }
        if csw_shadow != csw {
            self.queue
                .queue_write(PortType::AccessPort, Csw::ADDRESS, csw.0);
        }
        (select, csw)
    }

    fn queue_tar(&mut self, address: u64, large_address: bool) {
        self.queue
            .queue_write(PortType::AccessPort, ap::AP_TAR_LSB, address as u32);
        if large_address {
            self.queue
                .queue_write(PortType::AccessPort, ap::AP_TAR_MSB, (address >> 32) as u32);
        }
    }

    fn update_shadows(&mut self, slot: usize, select: Select, csw: Csw) {
        self.select = select;
        if let ApState::Memory { csw: shadow, .. } = &mut self.aps[slot].state {
            *shadow = csw;
        }
    }

    /// Read a byte through the memory AP.
    pub fn read_word_8(&mut self, ap: AccessPortHandle, address: u64) -> Result<u8, AdiError> {
        let (index, config, shadow) = self.memory_state(ap)?;
        if !config.less_word_transfers {
            return Err(AdiError::UnsupportedTransferWidth);
        }
        let (select, csw) =
            self.queue_transfer_setup(index, shadow, DataSize::U8, AddressIncrement::Off);
        self.queue_tar(address, config.large_address);
        self.queue.queue_read(PortType::AccessPort, ap::AP_DRW);
        let word = self.commit_expect(1)?[0];
        self.update_shadows(ap.slot, select, csw);
        // The byte sits on the lane matching the address offset.
        Ok((word >> ((address & 0x3) * 8)) as u8)
    }

    /// Read a halfword through the memory AP. `address` must be 2-byte
    /// aligned.
    pub fn read_word_16(&mut self, ap: AccessPortHandle, address: u64) -> Result<u16, AdiError> {
        let (index, config, shadow) = self.memory_state(ap)?;
        if address & 0x1 != 0 {
            tracing::warn!("halfword read from unaligned address {address:#x}");
            return Err(AdiError::MemoryNotAligned {
                address,
                alignment: 2,
            });
        }
        if !config.less_word_transfers {
            return Err(AdiError::UnsupportedTransferWidth);
        }
        let (select, csw) =
            self.queue_transfer_setup(index, shadow, DataSize::U16, AddressIncrement::Off);
        self.queue_tar(address, config.large_address);
        self.queue.queue_read(PortType::AccessPort, ap::AP_DRW);
        let word = self.commit_expect(1)?[0];
        self.update_shadows(ap.slot, select, csw);
        Ok((word >> ((address & 0x3) * 8)) as u16)
    }

    /// Read a word through the memory AP. `address` must be 4-byte
    /// aligned.
    pub fn read_word_32(&mut self, ap: AccessPortHandle, address: u64) -> Result<u32, AdiError> {
        let (index, config, shadow) = self.memory_state(ap)?;
        if address & 0x3 != 0 {
            tracing::warn!("word read from unaligned address {address:#x}");
            return Err(AdiError::MemoryNotAligned {
                address,
                alignment: 4,
            });
        }
        let (select, csw) =
            self.queue_transfer_setup(index, shadow, DataSize::U32, AddressIncrement::Off);
        self.queue_tar(address, config.large_address);
        self.queue.queue_read(PortType::AccessPort, ap::AP_DRW);
        let word = self.commit_expect(1)?[0];
        self.update_shadows(ap.slot, select, csw);
        Ok(word)
    }

    /// Read a doubleword through the memory AP. Needs the large data
    /// extension; `address` must be 8-byte aligned.
    pub fn read_word_64(&mut self, ap: AccessPortHandle, address: u64) -> Result<u64, AdiError> {
        let (index, config, shadow) = self.memory_state(ap)?;
        if address & 0x7 != 0 {
            tracing::warn!("doubleword read from unaligned address {address:#x}");
            return Err(AdiError::MemoryNotAligned {
                address,
                alignment: 8,
            });
        }
        if !config.large_data {
            return Err(AdiError::UnsupportedTransferWidth);
        }
        let (select, csw) =
            self.queue_transfer_setup(index, shadow, DataSize::U64, AddressIncrement::Off);
        self.queue_tar(address, config.large_address);
        // Low word first, then high.
        self.queue.queue_read(PortType::AccessPort, ap::AP_DRW);
        self.queue.queue_read(PortType::AccessPort, ap::AP_DRW);
        let results = self.commit_expect(2)?;
        self.update_shadows(ap.slot, select, csw);
        Ok(u64::from(results[0]) | (u64::from(results[1]) << 32))
    }

    /// Write a byte through the memory AP.
    pub fn write_word_8(
        &mut self,
        ap: AccessPortHandle,
        address: u64,
        data: u8,
    ) -> Result<(), AdiError> {
        let (index, config, shadow) = self.memory_state(ap)?;
        if !config.less_word_transfers {
            return Err(AdiError::UnsupportedTransferWidth);
        }
        let (select, csw) =
            self.queue_transfer_setup(index, shadow, DataSize::U8, AddressIncrement::Off);
        self.queue_tar(address, config.large_address);
        self.queue.queue_write(
            PortType::AccessPort,
            ap::AP_DRW,
            u32::from(data) << ((address & 0x3) * 8),
        );
        self.commit_expect(0)?;
        self.update_shadows(ap.slot, select, csw);
        Ok(())
    }

    /// Write a halfword through the memory AP. `address` must be 2-byte
    /// aligned.
    pub fn write_word_16(
        &mut self,
        ap: AccessPortHandle,
        address: u64,
        data: u16,
    ) -> Result<(), AdiError> {
        let (index, config, shadow) = self.memory_state(ap)?;
        if address & 0x1 != 0 {
            tracing::warn!("halfword write to unaligned address {address:#x}");
            return Err(AdiError::MemoryNotAligned {
                address,
                alignment: 2,
            });
        }
        if !config.less_word_transfers {
            return Err(AdiError::UnsupportedTransferWidth);
        }
        let (select, csw) =
            self.queue_transfer_setup(index, shadow, DataSize::U16, AddressIncrement::Off);
        self.queue_tar(address, config.large_address);
        self.queue.queue_write(
            PortType::AccessPort,
            ap::AP_DRW,
            u32::from(data) << ((address & 0x3) * 8),
        );
        self.commit_expect(0)?;
        self.update_shadows(ap.slot, select, csw);
        Ok(())
    }

    /// Write a word through the memory AP. `address` must be 4-byte
    /// aligned.
    pub fn write_word_32(
        &mut self,
        ap: AccessPortHandle,
        address: u64,
        data: u32,
    ) -> Result<(), AdiError> {
        let (index, config, shadow) = self.memory_state(ap)?;
        if address & 0x3 != 0 {
            tracing::warn!("word write to unaligned address {address:#x}");
            return Err(AdiError::MemoryNotAligned {
                address,
                alignment: 4,
            });
        }
        let (select, csw) =
            self.queue_transfer_setup(index, shadow, DataSize::U32, AddressIncrement::Off);
        self.queue_tar(address, config.large_address);
        self.queue.queue_write(PortType::AccessPort, ap::AP_DRW, data);
        self.commit_expect(0)?;
        self.update_shadows(ap.slot, select, csw);
        Ok(())
    }

    /// Write a doubleword through the memory AP. Needs the large data
    /// extension; `address` must be 8-byte aligned.
    pub fn write_word_64(
        &mut self,
        ap: AccessPortHandle,
        address: u64,
        data: u64,
    ) -> Result<(), AdiError> {
        let (index, config, shadow) = self.memory_state(ap)?;
        if address & 0x7 != 0 {
            tracing::warn!("doubleword write to unaligned address {address:#x}");
            return Err(AdiError::MemoryNotAligned {
                address,
                alignment: 8,
            });
        }
        if !config.large_data {
            return Err(AdiError::UnsupportedTransferWidth);
        }
        let (select, csw) =
            self.queue_transfer_setup(index, shadow, DataSize::U64, AddressIncrement::Off);
        self.queue_tar(address, config.large_address);
        self.queue
            .queue_write(PortType::AccessPort, ap::AP_DRW, data as u32);
        self.queue
            .queue_write(PortType::AccessPort, ap::AP_DRW, (data >> 32) as u32);
        self.commit_expect(0)?;
        self.update_shadows(ap.slot, select, csw);
        Ok(())
    }

    /// Read a block of DRW words starting at `address`.
    ///
    /// Each element of `data` receives one raw DRW word: with
    /// [`AddressIncrement::Packed`] that is a packed bus word, otherwise
    /// one element per access with the data on its byte lane. Runs with
    /// auto-increment are split at every 1 KiB TAR boundary.
    pub fn block_read(
        &mut self,
        ap: AccessPortHandle,
        address: u64,
        increment: AddressIncrement,
        size: DataSize,
        data: &mut [u32],
    ) -> Result<(), AdiError> {
        let (index, config, shadow) = self.memory_state(ap)?;
        self.check_block_request(&config, address, increment, size)?;
        let (select, csw) = self.queue_transfer_setup(index, shadow, size, increment);
        self.queue_block(address, increment, size, data.len(), &config, None);
        let results = self.commit_expect(data.len())?;
        data.copy_from_slice(&results);
        self.update_shadows(ap.slot, select, csw);
        Ok(())
    }

    /// Write a block of DRW words starting at `address`.
    ///
    /// The element layout matches [`block_read`](Self::block_read).
    pub fn block_write(
        &mut self,
        ap: AccessPortHandle,
        address: u64,
        increment: AddressIncrement,
        size: DataSize,
        data: &[u32],
    ) -> Result<(), AdiError> {
        let (index, config, shadow) = self.memory_state(ap)?;
        self.check_block_request(&config, address, increment, size)?;
        let (select, csw) = self.queue_transfer_setup(index, shadow, size, increment);
        self.queue_block(address, increment, size, data.len(), &config, Some(data));
        self.commit_expect(0)?;
        self.update_shadows(ap.slot, select, csw);
        Ok(())
    }

    fn check_block_request(
        &self,
        config: &MemoryApConfig,
        address: u64,
        increment: AddressIncrement,
        size: DataSize,
    ) -> Result<(), AdiError> {
        match size {
            DataSize::U8 => {
                if !config.less_word_transfers {
                    return Err(AdiError::UnsupportedTransferWidth);
                }
            }
            DataSize::U16 => {
                if !config.less_word_transfers {
                    return Err(AdiError::UnsupportedTransferWidth);
                }
                if address & 0x1 != 0 {
                    return Err(AdiError::MemoryNotAligned {
                        address,
                        alignment: 2,
                    });
                }
            }
            DataSize::U32 => {
                if address & 0x3 != 0 {
                    return Err(AdiError::MemoryNotAligned {
                        address,
                        alignment: 4,
                    });
                }
            }
            // DRW is 32 bits; wider block transfers do not exist.
            DataSize::U64 | DataSize::U128 | DataSize::U256 => {
                return Err(AdiError::UnsupportedTransferWidth);
            }
        }
        if increment == AddressIncrement::Packed && !config.packed_transfers {
            return Err(AdiError::UnsupportedTransferWidth);
        }
        Ok(())
    }

    /// Queue the TAR writes and DRW block accesses of a block transfer,
    /// splitting auto-increment runs at 1 KiB TAR boundaries.
    fn queue_block(
        &mut self,
        address: u64,
        increment: AddressIncrement,
        size: DataSize,
        count: usize,
        config: &MemoryApConfig,
        data: Option<&[u32]>,
    ) {
        let chunk = |this: &mut Self, range: std::ops::Range<usize>| match data {
            Some(values) => this.queue.queue_write_block(
                PortType::AccessPort,
                ap::AP_DRW,
                &values[range],
            ),
            None => this
                .queue
                .queue_read_block(PortType::AccessPort, ap::AP_DRW, range.len()),
        };

        if increment == AddressIncrement::Off {
            self.queue_tar(address, config.large_address);
            chunk(self, 0..count);
            return;
        }

        // Bytes the TAR advances per DRW access.
        let shift = match increment {
            AddressIncrement::Packed => 2,
            _ => size as u64,
        };
        let end = address + ((count as u64) << shift);
        let mut current = address;
        let mut pos = 0;
        while current < end {
            self.queue_tar(current, config.large_address);
            let next = (((current >> 10) + 1) << 10).min(end);
            let accesses = ((next - current) >> shift) as usize;
            chunk(self, pos..pos + accesses);
            pos += accesses;
            current = next;
        }
    }

    /// Read the CSW of a memory AP and refresh its shadow.
    pub fn read_csw(&mut self, ap: AccessPortHandle) -> Result<Csw, AdiError> {
        let (index, _, _) = self.memory_state(ap)?;
        let mut select = self.select;
        select.set_ap_sel(index);
        select.set_ap_bank_sel(0);
        if self.select != select {
            self.queue
                .queue_write(PortType::DebugPort, Select::ADDRESS, select.0);
        }
        self.queue.queue_read(PortType::AccessPort, Csw::ADDRESS);
        let csw = Csw(self.commit_expect(1)?[0]);
        self.update_shadows(ap.slot, select, csw);
        Ok(csw)
    }

    /// Write the CSW of a memory AP and refresh its shadow.
    pub fn write_csw(&mut self, ap: AccessPortHandle, csw: Csw) -> Result<(), AdiError> {
        let (index, _, _) = self.memory_state(ap)?;
        let mut select = self.select;
        select.set_ap_sel(index);
        select.set_ap_bank_sel(0);
        if self.select != select {
            self.queue
                .queue_write(PortType::DebugPort, Select::ADDRESS, select.0);
        }
        self.queue
            .queue_write(PortType::AccessPort, Csw::ADDRESS, csw.0);
        self.commit_expect(0)?;
        self.update_shadows(ap.slot, select, csw);
        Ok(())
    }

    /// Read the component and peripheral identification registers of the
    /// CoreSight component at `component_base` (4 KiB aligned).
    ///
    /// Returns `(CID, PID)` assembled from the byte-wide id registers at
    /// the top of the component's 4 KiB block.
    pub fn read_cid_pid(
        &mut self,
        ap: AccessPortHandle,
        component_base: u64,
    ) -> Result<(u32, u64), AdiError> {
        if component_base & 0xFFF != 0 {
            tracing::warn!("component base {component_base:#x} is not 4 KiB aligned");
            return Err(AdiError::ComponentBaseNotAligned(component_base));
        }
        let cid0 = self.read_word_32(ap, component_base + 0xFF0)?;
        let cid1 = self.read_word_32(ap, component_base + 0xFF4)?;
        let cid2 = self.read_word_32(ap, component_base + 0xFF8)?;
        let cid3 = self.read_word_32(ap, component_base + 0xFFC)?;
        let pid0 = self.read_word_32(ap, component_base + 0xFE0)?;
        let pid1 = self.read_word_32(ap, component_base + 0xFE4)?;
        let pid2 = self.read_word_32(ap, component_base + 0xFE8)?;
        let pid3 = self.read_word_32(ap, component_base + 0xFEC)?;
        let pid4 = self.read_word_32(ap, component_base + 0xFD0)?;

        let cid = ((cid3 & 0xFF) << 24) | ((cid2 & 0xFF) << 16) | ((cid1 & 0xFF) << 8) | (cid0 & 0xFF);
        let pid = (u64::from(pid4 & 0xFF) << 32)
            | (u64::from(pid3 & 0xFF) << 24)
            | (u64::from(pid2 & 0xFF) << 16)
            | (u64::from(pid1 & 0xFF) << 8)
            | u64::from(pid0 & 0xFF);
        Ok((cid, pid))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{MockQueue, Op, AHB_AP_IDR, CTRL_POWERED};
    use super::super::{AccessPort, AccessPortHandle, ApState, Dap};
    use super::*;
    use crate::adapter::PortType;
    use crate::dap::ap::Idr;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    const DRW: u8 = ap::AP_DRW;
    const TAR: u8 = ap::AP_TAR_LSB;

    fn ap_config() -> MemoryApConfig {
        MemoryApConfig {
            less_word_transfers: true,
            packed_transfers: true,
            ..Default::default()
        }
    }

    /// A powered DAP with a fabricated memory AP at index 1. The SELECT
    /// shadow is zero, so the first transfer has to route SELECT.
    fn test_dap(config: MemoryApConfig) -> (Dap<MockQueue>, AccessPortHandle) {
        let mut dap = Dap::new(MockQueue::with_responses([CTRL_POWERED])).unwrap();
        dap.queue_mut().take_log();
        let handle = dap.insert_test_ap(AccessPort {
            index: 1,
            idr: Idr(AHB_AP_IDR),
            state: ApState::Memory {
                csw: Csw(0x52),
                config,
                rom: 0xE00F_F003,
            },
        });
        (dap, handle)
    }

    fn write(address: u8, value: u32) -> Op {
        Op::Write {
            port: PortType::AccessPort,
            address,
            value,
        }
    }

    #[test_case(0x2000_0000, true ; "word aligned")]
    #[test_case(0x2000_0001, false ; "word off by one")]
    #[test_case(0x2000_0002, false ; "word off by two")]
    #[test_case(0x2000_0004, true ; "next word")]
    fn word_read_alignment(address: u64, ok: bool) {
        let (mut dap, ap) = test_dap(ap_config());
        assert_eq!(dap.read_word_32(ap, address).is_ok(), ok);
    }

    #[test_case(0x2000_0000, true ; "halfword aligned")]
    #[test_case(0x2000_0001, false ; "halfword odd")]
    #[test_case(0x2000_0002, true ; "upper lane")]
    fn halfword_write_alignment(address: u64, ok: bool) {
        let (mut dap, ap) = test_dap(ap_config());
        assert_eq!(dap.write_word_16(ap, address, 0x1234).is_ok(), ok);
    }

    #[test_case(0x2000_0000, true ; "doubleword aligned")]
    #[test_case(0x2000_0004, false ; "doubleword half aligned")]
    fn doubleword_write_alignment(address: u64, ok: bool) {
        let config = MemoryApConfig {
            large_data: true,
            ..ap_config()
        };
        let (mut dap, ap) = test_dap(config);
        assert_eq!(dap.write_word_64(ap, address, 0x1122_3344_5566_7788).is_ok(), ok);
    }

    #[test]
    fn byte_lanes_on_write() {
        let (mut dap, ap) = test_dap(ap_config());
        dap.write_word_8(ap, 0x2000_0003, 0xAB).unwrap();
        let log = dap.queue_mut().take_log();
        assert!(log.contains(&write(DRW, 0xAB00_0000)));

        dap.write_word_16(ap, 0x2000_0002, 0x1234).unwrap();
        let log = dap.queue_mut().take_log();
        assert!(log.contains(&write(DRW, 0x1234_0000)));
    }

    #[test]
    fn byte_lanes_on_read() {
        let (mut dap, ap) = test_dap(ap_config());
        dap.queue_mut().push_responses([0x00AB_0000]);
        assert_eq!(dap.read_word_8(ap, 0x2000_0002).unwrap(), 0xAB);

        dap.queue_mut().push_responses([0xBEEF_0000]);
        assert_eq!(dap.read_word_16(ap, 0x2000_0002).unwrap(), 0xBEEF);
    }

    #[test]
    fn narrow_transfers_need_support() {
        let config = MemoryApConfig {
            less_word_transfers: false,
            packed_transfers: false,
            ..Default::default()
        };
        let (mut dap, ap) = test_dap(config);
        assert!(matches!(
            dap.read_word_8(ap, 0x2000_0000),
            Err(AdiError::UnsupportedTransferWidth)
        ));
        assert!(matches!(
            dap.write_word_16(ap, 0x2000_0000, 0),
            Err(AdiError::UnsupportedTransferWidth)
        ));
        // Word transfers always work.
        assert!(dap.read_word_32(ap, 0x2000_0000).is_ok());
    }

    #[test]
    fn doubleword_needs_large_data() {
        let (mut dap, ap) = test_dap(ap_config());
        assert!(matches!(
            dap.read_word_64(ap, 0x2000_0000),
            Err(AdiError::UnsupportedTransferWidth)
        ));
    }

    #[test]
    fn doubleword_moves_low_word_first() {
        let config = MemoryApConfig {
            large_data: true,
            ..ap_config()
        };
        let (mut dap, ap) = test_dap(config);
        dap.write_word_64(ap, 0x2000_0008, 0x1122_3344_5566_7788).unwrap();
        let log = dap.queue_mut().take_log();
        let drw_writes: Vec<_> = log
            .iter()
            .filter_map(|op| match op {
                Op::Write {
                    address: DRW,
                    value,
                    ..
                } => Some(*value),
                _ => None,
            })
            .collect();
        assert_eq!(drw_writes, vec![0x5566_7788, 0x1122_3344]);

        dap.queue_mut().push_responses([0x5566_7788, 0x1122_3344]);
        assert_eq!(
            dap.read_word_64(ap, 0x2000_0008).unwrap(),
            0x1122_3344_5566_7788
        );
    }

    #[test]
    fn wide_tar_writes_both_halves() {
        let config = MemoryApConfig {
            large_address: true,
            ..ap_config()
        };
        let (mut dap, ap) = test_dap(config);
        dap.write_word_32(ap, 0x12_3456_7890, 0).unwrap();
        let log = dap.queue_mut().take_log();
        assert!(log.contains(&write(ap::AP_TAR_LSB, 0x3456_7890)));
        assert!(log.contains(&write(ap::AP_TAR_MSB, 0x12)));
    }

    #[test]
    fn select_and_csw_writes_are_elided() {
        let (mut dap, ap) = test_dap(ap_config());
        dap.read_word_32(ap, 0x2000_0000).unwrap();
        let log = dap.queue_mut().take_log();
        assert_eq!(
            log,
            vec![
                Op::Write {
                    port: PortType::DebugPort,
                    address: 0x08,
                    value: 0x0100_0000
                },
                write(0x01, 0x42), // increment off, word size
                write(TAR, 0x2000_0000),
                Op::Read {
                    port: PortType::AccessPort,
                    address: DRW
                },
                Op::Commit,
            ]
        );

        // Same AP, same width: the shadows already match.
        dap.read_word_32(ap, 0x2000_0004).unwrap();
        let log = dap.queue_mut().take_log();
        assert_eq!(
            log,
            vec![
                write(TAR, 0x2000_0004),
                Op::Read {
                    port: PortType::AccessPort,
                    address: DRW
                },
                Op::Commit,
            ]
        );
    }

    #[test]
    fn failed_commit_keeps_shadows_stale() {
        let (mut dap, ap) = test_dap(ap_config());
        dap.queue_mut().fail_commits = 1;
        assert!(matches!(
            dap.read_word_32(ap, 0x2000_0000),
            Err(AdiError::Adapter(_))
        ));
        let log = dap.queue_mut().take_log();
        assert_eq!(log.last(), Some(&Op::CleanPending));

        // The shadows were not updated, so the next transfer programs
        // SELECT and CSW again.
        dap.read_word_32(ap, 0x2000_0000).unwrap();
        let log = dap.queue_mut().take_log();
        assert!(log.contains(&Op::Write {
            port: PortType::DebugPort,
            address: 0x08,
            value: 0x0100_0000
        }));
        assert!(log.contains(&write(0x01, 0x42)));
    }

    #[test]
    fn block_read_splits_at_1k_boundary() {
        let (mut dap, ap) = test_dap(ap_config());
        dap.queue_mut().push_responses([1, 2, 3, 4]);
        let mut data = [0u32; 4];
        dap.block_read(ap, 0x3F8, AddressIncrement::Single, DataSize::U32, &mut data)
            .unwrap();
        assert_eq!(data, [1, 2, 3, 4]);

        let log = dap.queue_mut().take_log();
        assert_eq!(
            log,
            vec![
                Op::Write {
                    port: PortType::DebugPort,
                    address: 0x08,
                    value: 0x0100_0000
                },
                // CSW already holds single increment, word size.
                write(TAR, 0x3F8),
                Op::ReadBlock {
                    port: PortType::AccessPort,
                    address: DRW,
                    count: 2
                },
                write(TAR, 0x400),
                Op::ReadBlock {
                    port: PortType::AccessPort,
                    address: DRW,
                    count: 2
                },
                Op::Commit,
            ]
        );
    }

    #[test]
    fn packed_block_counts_bus_words() {
        let (mut dap, ap) = test_dap(ap_config());
        dap.block_write(
            ap,
            0x3FC,
            AddressIncrement::Packed,
            DataSize::U16,
            &[0xAAAA_BBBB, 0xCCCC_DDDD],
        )
        .unwrap();
        let log = dap.queue_mut().take_log();
        assert_eq!(
            log,
            vec![
                Op::Write {
                    port: PortType::DebugPort,
                    address: 0x08,
                    value: 0x0100_0000
                },
                write(0x01, 0x61), // packed increment, halfword size
                write(TAR, 0x3FC),
                Op::WriteBlock {
                    port: PortType::AccessPort,
                    address: DRW,
                    values: vec![0xAAAA_BBBB]
                },
                write(TAR, 0x400),
                Op::WriteBlock {
                    port: PortType::AccessPort,
                    address: DRW,
                    values: vec![0xCCCC_DDDD]
                },
                Op::Commit,
            ]
        );
    }

    #[test]
    fn fixed_address_block_is_one_run() {
        let (mut dap, ap) = test_dap(ap_config());
        dap.queue_mut().push_responses([0, 0, 0]);
        let mut data = [0u32; 3];
        dap.block_read(ap, 0x4000_1000, AddressIncrement::Off, DataSize::U32, &mut data)
            .unwrap();
        let log = dap.queue_mut().take_log();
        let tar_writes = log
            .iter()
            .filter(|op| matches!(op, Op::Write { address: TAR, .. }))
            .count();
        assert_eq!(tar_writes, 1);
        assert!(log.contains(&Op::ReadBlock {
            port: PortType::AccessPort,
            address: DRW,
            count: 3
        }));
    }

    #[test]
    fn block_rejects_wide_and_unsupported_sizes() {
        let (mut dap, ap) = test_dap(ap_config());
        let mut data = [0u32; 2];
        assert!(matches!(
            dap.block_read(ap, 0, AddressIncrement::Single, DataSize::U64, &mut data),
            Err(AdiError::UnsupportedTransferWidth)
        ));

        let config = MemoryApConfig::default();
        let (mut dap, ap) = test_dap(config);
        assert!(matches!(
            dap.block_read(ap, 0, AddressIncrement::Single, DataSize::U8, &mut data),
            Err(AdiError::UnsupportedTransferWidth)
        ));
        assert!(matches!(
            dap.block_read(ap, 0, AddressIncrement::Packed, DataSize::U32, &mut data),
            Err(AdiError::UnsupportedTransferWidth)
        ));
    }

    #[test]
    fn csw_accessors_refresh_the_shadow() {
        let (mut dap, ap) = test_dap(ap_config());
        // Increment off, word size: matches what a word read wants.
        dap.write_csw(ap, Csw(0x42)).unwrap();
        dap.queue_mut().take_log();

        dap.read_word_32(ap, 0x2000_0000).unwrap();
        let log = dap.queue_mut().take_log();
        let csw_writes = log
            .iter()
            .filter(|op| matches!(op, Op::Write { address: 0x01, .. }))
            .count();
        assert_eq!(csw_writes, 0);

        dap.queue_mut().push_responses([0x52]);
        assert_eq!(dap.read_csw(ap).unwrap().0, 0x52);
    }

    #[test]
    fn cid_pid_assembly() {
        let (mut dap, ap) = test_dap(ap_config());
        dap.queue_mut().push_responses([
            0x0D, 0x10, 0x05, 0xB1, // CID0..CID3 of a ROM table
            0x41, 0x01, 0x14, 0x00, 0x04, // PID0..PID4
        ]);
        let (cid, pid) = dap.read_cid_pid(ap, 0xE00F_F000).unwrap();
        assert_eq!(cid, 0xB105_100D);
        assert_eq!(pid, 0x04_0014_0141);

        let log = dap.queue_mut().take_log();
        let tar_writes: Vec<_> = log
            .iter()
            .filter_map(|op| match op {
                Op::Write {
                    address: TAR,
                    value,
                    ..
                } => Some(*value),
                _ => None,
            })
            .collect();
        assert_eq!(
            tar_writes,
            vec![
                0xE00F_FFF0,
                0xE00F_FFF4,
                0xE00F_FFF8,
                0xE00F_FFFC,
                0xE00F_FFE0,
                0xE00F_FFE4,
                0xE00F_FFE8,
                0xE00F_FFEC,
                0xE00F_FFD0,
            ]
        );
    }

    #[test]
    fn cid_pid_requires_aligned_base() {
        let (mut dap, ap) = test_dap(ap_config());
        assert!(matches!(
            dap.read_cid_pid(ap, 0xE00F_F100),
            Err(AdiError::ComponentBaseNotAligned(_))
        ));
        // Nothing was queued for the misaligned request.
        assert_eq!(dap.queue_mut().take_log(), vec![]);
    }

    #[test]
    fn cid_pid_failure_discards_partial_results() {
        let (mut dap, ap) = test_dap(ap_config());
        dap.queue_mut().fail_commits = 1;
        assert!(dap.read_cid_pid(ap, 0xE00F_F000).is_err());
        let log = dap.queue_mut().take_log();
        assert_eq!(log.last(), Some(&Op::CleanPending));
    }
}
