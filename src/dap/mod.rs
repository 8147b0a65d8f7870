//! The ADIv5 Debug Access Port engine.
//!
//! [`Dap`] owns a batched [`CommandQueue`] to the adapter, the shadow of
//! the DP SELECT register, and a cache of discovered access ports.
//! Powering up the debug domain, scanning the AP space, and all memory
//! AP transfers go through it.

pub mod ap;
pub mod dp;
mod memory;

use crate::adapter::{CommandQueue, PortType};
use crate::error::AdiError;

use ap::{ApKind, ApType, Cfg, Csw, Idr, MemoryApConfig};
use dp::{Ctrl, Register, Select};

/// Polls of CTRL/STAT before giving up on the power-up acknowledge.
const POWER_UP_ATTEMPTS: usize = 100;

/// A handle to an access port discovered on a [`Dap`].
///
/// Handles index the DAP's AP cache and stay valid for the lifetime of
/// the `Dap` that issued them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessPortHandle {
    slot: usize,
}

/// A discovered access port and its probed state.
#[derive(Debug)]
pub(crate) struct AccessPort {
    /// The AP index in DP SELECT.APSEL.
    pub(crate) index: u8,
    pub(crate) idr: Idr,
    pub(crate) state: ApState,
}

#[derive(Debug)]
pub(crate) enum ApState {
    Memory {
        /// Shadow of the last committed CSW value.
        csw: Csw,
        config: MemoryApConfig,
        /// The debug base address from the ROM register(s).
        rom: u64,
    },
    Jtag,
}

impl AccessPort {
    fn matches(&self, kind: ApKind, bus: ApType) -> bool {
        self.idr.matches(kind, bus)
    }
}

/// The DAP engine on top of a batched command queue.
#[derive(Debug)]
pub struct Dap<Q: CommandQueue> {
    queue: Q,
    /// Shadow of the last committed DP SELECT value.
    select: Select,
    aps: Vec<AccessPort>,
}

impl<Q: CommandQueue> Dap<Q> {
    /// Connect to the DAP behind `queue` and power up the debug domain.
    ///
    /// Zeroes SELECT, clears the transfer state in CTRL/STAT, requests
    /// system and debug power-up and polls for both acknowledges.
    pub fn new(queue: Q) -> Result<Self, AdiError> {
        let mut dap = Dap {
            queue,
            select: Select(0),
            aps: Vec::new(),
        };
        dap.power_up()?;
        Ok(dap)
    }

    fn power_up(&mut self) -> Result<(), AdiError> {
        self.queue
            .queue_write(PortType::DebugPort, Select::ADDRESS, 0);
        // Clear the sticky flags and select normal transfer mode.
        self.queue
            .queue_write(PortType::DebugPort, Ctrl::ADDRESS, 0x20);
        let mut req = Ctrl(0);
        req.set_csyspwrupreq(true);
        req.set_cdbgpwrupreq(true);
        self.queue
            .queue_write(PortType::DebugPort, Ctrl::ADDRESS, req.0);
        self.commit_expect(0)?;
        self.select = Select(0);

        for _ in 0..POWER_UP_ATTEMPTS {
            self.queue.queue_read(PortType::DebugPort, Ctrl::ADDRESS);
            let stat = Ctrl(self.commit_expect(1)?[0]);
            if stat.csyspwrupack() && stat.cdbgpwrupack() {
                tracing::debug!("debug domain powered up, CTRL/STAT: {:#010x}", stat.0);
                return Ok(());
            }
        }
        tracing::warn!("power-up request was never acknowledged");
        Err(AdiError::PowerUpTimeout)
    }

    /// Commit the queued batch, expecting exactly `expected` read results.
    ///
    /// On failure the pending queue is discarded and no shadow may be
    /// updated by the caller.
    fn commit_expect(&mut self, expected: usize) -> Result<Vec<u32>, AdiError> {
        let results = match self.queue.commit() {
            Ok(results) => results,
            Err(error) => {
                tracing::warn!("command batch failed: {error}");
                self.queue.clean_pending();
                return Err(error.into());
            }
        };
        if results.len() != expected {
            return Err(AdiError::ResultCount {
                expected,
                actual: results.len(),
            });
        }
        Ok(results)
    }

    /// Find an access port of the requested kind, probing the AP space
    /// if it is not cached yet.
    ///
    /// For [`ApKind::Memory`] the AP must sit on the bus given by `bus`;
    /// for [`ApKind::Jtag`] the bus is ignored. The scan stops at the
    /// first AP whose IDR reads as zero.
    pub fn find_access_port(
        &mut self,
        kind: ApKind,
        bus: ApType,
    ) -> Result<AccessPortHandle, AdiError> {
        if let Some(slot) = self.aps.iter().position(|ap| ap.matches(kind, bus)) {
            return Ok(AccessPortHandle { slot });
        }

        let mut select = self.select;
        select.set_ap_bank_sel(0xF);
        for index in 0..=u8::MAX {
            select.set_ap_sel(index);
            self.queue
                .queue_write(PortType::DebugPort, Select::ADDRESS, select.0);
            self.queue.queue_read(PortType::AccessPort, Idr::ADDRESS);
            let idr = Idr(self.commit_expect(1)?[0]);
            self.select = select;

            if idr.0 == 0 {
                tracing::debug!("AP scan ended at index {index}");
                return Err(AdiError::ApNotFound);
            }
            tracing::debug!("AP {index} IDR: {:#010x}", idr.0);
            if !idr.matches(kind, bus) {
                continue;
            }

            let state = match kind {
                ApKind::Memory => self.probe_memory_ap(index)?,
                ApKind::Jtag => ApState::Jtag,
            };
            self.aps.push(AccessPort { index, idr, state });
            return Ok(AccessPortHandle {
                slot: self.aps.len() - 1,
            });
        }
        Err(AdiError::ApNotFound)
    }

    /// Read the capabilities of the memory AP at `index` and probe which
    /// transfer modes its CSW accepts. Leaves CSW as it was found.
    fn probe_memory_ap(&mut self, index: u8) -> Result<ApState, AdiError> {
        // SELECT still has bank 0xF from the IDR read.
        self.queue.queue_read(PortType::AccessPort, Cfg::ADDRESS);
        self.queue
            .queue_read(PortType::AccessPort, ap::AP_ROM_LSB);
        let results = self.commit_expect(2)?;
        let cfg = Cfg(results[0]);
        let mut rom = u64::from(results[1]);
        if cfg.large_address() {
            self.queue
                .queue_read(PortType::AccessPort, ap::AP_ROM_MSB);
            rom |= u64::from(self.commit_expect(1)?[0]) << 32;
        }

        let mut select = self.select;
        select.set_ap_bank_sel(0);
        self.queue
            .queue_write(PortType::DebugPort, Select::ADDRESS, select.0);
        self.queue.queue_read(PortType::AccessPort, Csw::ADDRESS);
        let original = Csw(self.commit_expect(1)?[0]);
        self.select = select;

        if !original.device_en() {
            tracing::warn!("AP {index} is not enabled (CSW: {:#010x})", original.0);
            return Err(AdiError::ApNotEnabled);
        }

        // Request packed byte transfers and read back what stuck.
        let mut probe = original;
        probe.set_addr_inc(ap::AddressIncrement::Packed as u8);
        probe.set_size(ap::DataSize::U8 as u8);
        self.queue
            .queue_write(PortType::AccessPort, Csw::ADDRESS, probe.0);
        self.queue.queue_read(PortType::AccessPort, Csw::ADDRESS);
        let echoed = Csw(self.commit_expect(1)?[0]);

        let packed_transfers = echoed.addr_inc() == ap::AddressIncrement::Packed as u8;
        let less_word_transfers =
            packed_transfers || echoed.size() == ap::DataSize::U8 as u8;

        self.queue
            .queue_write(PortType::AccessPort, Csw::ADDRESS, original.0);
        self.commit_expect(0)?;

        let config = MemoryApConfig {
            large_address: cfg.large_address(),
            large_data: cfg.large_data(),
            big_endian: cfg.big_endian(),
            packed_transfers,
            less_word_transfers,
        };
        tracing::debug!("AP {index} capabilities: {config:?}, ROM: {rom:#x}");
        Ok(ApState::Memory {
            csw: original,
            config,
            rom,
        })
    }

    /// The IDR of a discovered access port.
    pub fn ap_idr(&self, ap: AccessPortHandle) -> Idr {
        self.aps[ap.slot].idr
    }

    /// The debug base address of a memory AP, from its ROM register(s).
    pub fn rom_table_base(&self, ap: AccessPortHandle) -> Result<u64, AdiError> {
        match &self.aps[ap.slot].state {
            ApState::Memory { rom, .. } => Ok(*rom),
            ApState::Jtag => Err(AdiError::NotAMemoryAp),
        }
    }

    /// The probed capabilities of a memory AP.
    pub fn ap_config(&self, ap: AccessPortHandle) -> Result<MemoryApConfig, AdiError> {
        match &self.aps[ap.slot].state {
            ApState::Memory { config, .. } => Ok(*config),
            ApState::Jtag => Err(AdiError::NotAMemoryAp),
        }
    }

    /// Write DP ABORT to terminate the current AP transaction.
    pub fn abort(&mut self) -> Result<(), AdiError> {
        let mut abort = dp::Abort(0);
        abort.set_dapabort(true);
        self.queue
            .queue_write(PortType::DebugPort, dp::Abort::ADDRESS, abort.0);
        self.commit_expect(0)?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn queue_mut(&mut self) -> &mut Q {
        &mut self.queue
    }

    /// Insert a fabricated AP cache entry. Lets transfer tests pin the
    /// shadows without replaying a discovery scan.
    #[cfg(test)]
    pub(crate) fn insert_test_ap(&mut self, ap: AccessPort) -> AccessPortHandle {
        self.aps.push(ap);
        AccessPortHandle {
            slot: self.aps.len() - 1,
        }
    }
}
