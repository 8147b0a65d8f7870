//! Access Port (AP) register definitions and identification.

use bitfield::bitfield;
use jep106::JEP106Code;

use crate::dap::dp::{impl_register, Register};

/// TAR, bits 31:0 of the Transfer Address register.
pub const AP_TAR_LSB: u8 = 0x05;
/// TAR, bits 63:32 of the Transfer Address register (large address
/// extension only).
pub const AP_TAR_MSB: u8 = 0x09;
/// DRW, the Data Read/Write register.
pub const AP_DRW: u8 = 0x0D;
/// BD0, the first Banked Data register.
pub const AP_BD0: u8 = 0x11;
/// BD1, the second Banked Data register.
pub const AP_BD1: u8 = 0x15;
/// BD2, the third Banked Data register.
pub const AP_BD2: u8 = 0x19;
/// BD3, the fourth Banked Data register.
pub const AP_BD3: u8 = 0x1D;
/// ROM, bits 63:32 of the debug base address (large address extension
/// only).
pub const AP_ROM_MSB: u8 = 0xF1;
/// ROM, bits 31:0 of the debug base address.
pub const AP_ROM_LSB: u8 = 0xF9;

bitfield! {
    /// CSW, the Control and Status Word of a memory AP.
    ///
    /// Only the fields the engine drives are named; the remaining bits
    /// are implementation defined and carried through untouched.
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct Csw(u32);
    impl Debug;
    /// A transfer is in progress. Read only.
    pub tr_in_prog, _: 7;
    /// Transactions can be issued through this AP. Read only.
    pub device_en, _: 6;
    /// The TAR increment applied after each DRW access.
    pub u8, addr_inc, set_addr_inc: 5, 4;
    /// The transfer width of DRW accesses.
    pub u8, size, set_size: 2, 0;
}

impl_register!(Csw, 0x01);

bitfield! {
    /// CFG, the memory AP Configuration register.
    #[derive(Copy, Clone)]
    pub struct Cfg(u32);
    impl Debug;
    /// Large data extension: DRW transfers wider than 32 bits.
    pub large_data, _: 2;
    /// Large address extension: 64 bit TAR.
    pub large_address, _: 1;
    /// The connected memory system is big endian.
    pub big_endian, _: 0;
}

impl_register!(Cfg, 0xF5);

bitfield! {
    /// IDR, the AP Identification register.
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct Idr(u32);
    impl Debug;
    /// The revision of the AP design.
    pub u8, revision, _: 31, 28;
    /// The continuation code of the designer's JEP106 id.
    pub u8, designer_continuation, _: 27, 24;
    /// The identity code of the designer's JEP106 id.
    pub u8, designer_identity, _: 23, 17;
    /// The class of the AP.
    pub u8, class, _: 16, 13;
    /// The variant of the AP implementation.
    pub u8, variant, _: 7, 4;
    /// The bus or protocol the AP gives access to.
    pub u8, ap_type, _: 3, 0;
}

impl_register!(Idr, 0xFD);

impl Idr {
    /// The JEP106 code of the AP designer.
    pub fn designer(&self) -> JEP106Code {
        JEP106Code::new(self.designer_continuation(), self.designer_identity())
    }

    /// Whether the AP was designed by ARM. Only ARM designed APs follow
    /// the class/type encoding this engine relies on.
    pub fn designed_by_arm(&self) -> bool {
        self.designer() == JEP106Code::new(0x4, 0x3B)
    }

    pub(crate) fn matches(&self, kind: ApKind, bus: ApType) -> bool {
        if !self.designed_by_arm() {
            return false;
        }
        match kind {
            ApKind::Jtag => self.class() == ApClass::Undefined as u8,
            ApKind::Memory => {
                self.class() == ApClass::MemAp as u8 && self.ap_type() == bus as u8
            }
        }
    }
}

/// The class of an access port, from IDR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApClass {
    /// No defined class; JTAG-APs report this.
    #[default]
    Undefined = 0b0000,
    /// COM-AP, an access port for COM port use.
    ComAp = 0b0001,
    /// MEM-AP, an access port to a connected memory system.
    MemAp = 0b1000,
}

/// The bus behind a memory AP, from IDR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApType {
    /// JTAG connection to the AP.
    #[default]
    JtagComAp = 0x0,
    /// AMBA AHB3 bus.
    AmbaAhb3 = 0x1,
    /// AMBA APB2 or APB3 bus.
    AmbaApb2Apb3 = 0x2,
    /// AMBA AXI3 or AXI4 bus.
    AmbaAxi3Axi4 = 0x4,
    /// AMBA AHB5 bus.
    AmbaAhb5 = 0x5,
    /// AMBA APB4 or APB5 bus.
    AmbaApb4Apb5 = 0x6,
    /// AMBA AXI5 bus.
    AmbaAxi5 = 0x7,
    /// AMBA AHB5 bus with enhanced HPROT.
    AmbaAhb5Hprot = 0x8,
}

/// The AP flavor a discovery request looks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApKind {
    /// A MEM-AP on a specific bus.
    Memory,
    /// A JTAG-AP.
    Jtag,
}

/// The unit of data transferred by one DRW access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataSize {
    /// 1 byte transfers.
    U8 = 0b000,
    /// 2 byte transfers.
    U16 = 0b001,
    /// 4 byte transfers.
    #[default]
    U32 = 0b010,
    /// 8 byte transfers.
    U64 = 0b011,
    /// 16 byte transfers.
    U128 = 0b100,
    /// 32 byte transfers.
    U256 = 0b101,
}

impl DataSize {
    /// Create a new `DataSize` from the CSW.Size field.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0b000 => Some(DataSize::U8),
            0b001 => Some(DataSize::U16),
            0b010 => Some(DataSize::U32),
            0b011 => Some(DataSize::U64),
            0b100 => Some(DataSize::U128),
            0b101 => Some(DataSize::U256),
            _ => None,
        }
    }
}

/// The TAR increment applied after each DRW access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressIncrement {
    /// TAR stays the same after a DRW access.
    Off = 0b00,
    /// TAR is incremented by the transfer size after each DRW access.
    #[default]
    Single = 0b01,
    /// Packed transfers: several sub-word lanes per DRW access. Only
    /// available if the AP supports sub-word transfers.
    Packed = 0b10,
}

impl AddressIncrement {
    /// Create a new `AddressIncrement` from the CSW.AddrInc field.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0b00 => Some(AddressIncrement::Off),
            0b01 => Some(AddressIncrement::Single),
            0b10 => Some(AddressIncrement::Packed),
            _ => None,
        }
    }
}

/// The capabilities of a memory AP, probed once at discovery.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryApConfig {
    /// TAR is 64 bits wide.
    pub large_address: bool,
    /// DRW transfers wider than 32 bits are supported.
    pub large_data: bool,
    /// The connected memory system is big endian.
    pub big_endian: bool,
    /// Packed transfers are supported.
    pub packed_transfers: bool,
    /// 8 and 16 bit transfers are supported.
    pub less_word_transfers: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // The IDR of a Cortex-M4 AHB-AP.
    const AHB_AP_IDR: Idr = Idr(0x2477_0011);

    #[test]
    fn idr_fields() {
        assert_eq!(AHB_AP_IDR.revision(), 0x2);
        assert_eq!(AHB_AP_IDR.class(), ApClass::MemAp as u8);
        assert_eq!(AHB_AP_IDR.variant(), 0x1);
        assert_eq!(AHB_AP_IDR.ap_type(), ApType::AmbaAhb3 as u8);
        assert_eq!(AHB_AP_IDR.designer().get(), Some("ARM Ltd"));
    }

    #[test]
    fn idr_matching() {
        assert!(AHB_AP_IDR.matches(ApKind::Memory, ApType::AmbaAhb3));
        assert!(!AHB_AP_IDR.matches(ApKind::Memory, ApType::AmbaApb2Apb3));
        assert!(!AHB_AP_IDR.matches(ApKind::Jtag, ApType::JtagComAp));

        // Same class and type, but not designed by ARM.
        let other_designer = Idr(AHB_AP_IDR.0 ^ (1 << 17));
        assert!(!other_designer.matches(ApKind::Memory, ApType::AmbaAhb3));

        let jtag_ap = Idr((0x4 << 24) | (0x3B << 17));
        assert!(jtag_ap.matches(ApKind::Jtag, ApType::JtagComAp));
    }

    #[test]
    fn csw_field_placement() {
        let mut csw = Csw(0);
        csw.set_addr_inc(AddressIncrement::Packed as u8);
        csw.set_size(DataSize::U16 as u8);
        assert_eq!(csw.0, 0x21);

        let csw = Csw(0x52);
        assert!(csw.device_en());
        assert!(!csw.tr_in_prog());
        assert_eq!(csw.addr_inc(), AddressIncrement::Single as u8);
        assert_eq!(csw.size(), DataSize::U32 as u8);
    }
}
