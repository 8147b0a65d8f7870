//! Debug Port (DP) register definitions.

use bitfield::bitfield;

/// A typed DP or AP register with a fixed request address.
///
/// For AP registers the address keeps the adapter encoding: bit 0 set,
/// bits 3:2 the register within its bank, high nibble the bank.
pub trait Register: Clone + From<u32> + Into<u32> + Sized + std::fmt::Debug {
    /// The request address of the register.
    const ADDRESS: u8;
    /// The name of the register as string.
    const NAME: &'static str;
}

macro_rules! impl_register {
    ($name:ident, $address:expr) => {
        impl Register for $name {
            const ADDRESS: u8 = $address;
            const NAME: &'static str = stringify!($name);
        }

        impl From<u32> for $name {
            fn from(raw: u32) -> Self {
                Self(raw)
            }
        }

        impl From<$name> for u32 {
            fn from(reg: $name) -> Self {
                reg.0
            }
        }
    };
}

pub(crate) use impl_register;

bitfield! {
    /// ABORT, the AP Abort register.
    ///
    /// Write-only. `DAPABORT` aborts the current AP transaction.
    #[derive(Copy, Clone)]
    pub struct Abort(u32);
    impl Debug;
    /// Clears the CTRL/STAT.STICKYORUN overrun error flag.
    pub orunerrclr, set_orunerrclr: 4;
    /// Clears the CTRL/STAT.WDATAERR write data error flag.
    pub wderrclr, set_wderrclr: 3;
    /// Clears the CTRL/STAT.STICKYERR sticky error flag.
    pub stkerrclr, set_stkerrclr: 2;
    /// Clears the CTRL/STAT.STICKYCMP sticky compare flag.
    pub stkcmpclr, set_stkcmpclr: 1;
    /// Aborts the current AP transaction.
    pub dapabort, set_dapabort: 0;
}

impl_register!(Abort, 0x00);

bitfield! {
    /// CTRL/STAT, the Control/Status register.
    #[derive(Copy, Clone)]
    pub struct Ctrl(u32);
    impl Debug;
    /// System power-up acknowledge.
    pub csyspwrupack, _: 31;
    /// System power-up request.
    pub csyspwrupreq, set_csyspwrupreq: 30;
    /// Debug power-up acknowledge.
    pub cdbgpwrupack, _: 29;
    /// Debug power-up request.
    pub cdbgpwrupreq, set_cdbgpwrupreq: 28;
    /// Debug reset acknowledge.
    pub cdbgrstack, _: 27;
    /// Debug reset request.
    pub c_dbg_rst_req, set_c_dbg_rst_req: 26;
    /// Transaction counter.
    pub u16, trn_cnt, set_trn_cnt: 23, 12;
    /// Mask lane, for pushed-compare and pushed-verify operations.
    pub u8, mask_lane, set_mask_lane: 11, 8;
    /// Write data error occurred.
    pub w_data_err, _: 7;
    /// Read mode.
    pub read_ok, _: 6;
    /// Sticky error was set by an AP transaction.
    pub sticky_err, _: 5;
    /// Sticky compare flag.
    pub stick_cmp, _: 4;
    /// Transfer mode for AP operations.
    pub u8, trn_mode, _: 3, 2;
    /// Sticky overrun flag.
    pub sticky_orun, _: 1;
    /// Overrun detection enable.
    pub orun_detect, set_orun_detect: 0;
}

impl_register!(Ctrl, 0x04);

bitfield! {
    /// SELECT, the AP Select register.
    ///
    /// Routes subsequent AP accesses to one of up to 256 APs and selects
    /// the active four-register bank within it. The engine keeps a shadow
    /// of the last committed value and elides redundant writes.
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct Select(u32);
    impl Debug;
    /// The index of the selected access port.
    pub u8, ap_sel, set_ap_sel: 31, 24;
    /// The selected AP register bank.
    pub u8, ap_bank_sel, set_ap_bank_sel: 7, 4;
    /// The selected DP register bank.
    pub u8, dp_bank_sel, set_dp_bank_sel: 3, 0;
}

impl_register!(Select, 0x08);

bitfield! {
    /// DPIDR, the Debug Port Identification register.
    #[derive(Copy, Clone)]
    pub struct DPIDR(u32);
    impl Debug;
    /// The revision of the debug port.
    pub u8, revision, _: 31, 28;
    /// The part number of the debug port.
    pub u8, part_no, _: 27, 20;
    /// Minimal debug port implemented.
    pub min, _: 16;
    /// The debug port architecture version.
    pub u8, version, _: 15, 12;
    /// The JEP106 code of the debug port designer.
    pub u16, jep_cc, _: 11, 8;
    /// The identity code of the debug port designer.
    pub u8, jep_id, _: 7, 1;
}

impl_register!(DPIDR, 0x00);

/// RDBUFF, the Read Buffer register. Returns the result of the previous
/// AP read without generating a new transaction.
pub const DP_RDBUFF: u8 = 0x0C;

/// TARGETSEL, the Target Selection register (SWD multi-drop, write-only).
pub const DP_TARGETSEL: u8 = 0x0C;

/// DLCR, the Data Link Control register.
pub const DP_DLCR: u8 = 0x14;

/// TARGETID, the Target Identification register.
pub const DP_TARGETID: u8 = 0x24;

/// DLPIDR, the Data Link Protocol Identification register.
pub const DP_DLPIDR: u8 = 0x34;

/// EVENTSTAT, the Event Status register.
pub const DP_EVENTSTAT: u8 = 0x44;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn select_field_placement() {
        let mut select = Select(0);
        select.set_ap_sel(0xA5);
        select.set_ap_bank_sel(0xF);
        select.set_dp_bank_sel(0x2);

        assert_eq!(select.0, 0xA500_00F2);
    }

    #[test]
    fn ctrl_power_up_bits() {
        let mut ctrl = Ctrl(0);
        ctrl.set_csyspwrupreq(true);
        ctrl.set_cdbgpwrupreq(true);
        assert_eq!(ctrl.0, (1 << 30) | (1 << 28));

        let acked = Ctrl(ctrl.0 | (1 << 31) | (1 << 29));
        assert!(acked.csyspwrupack());
        assert!(acked.cdbgpwrupack());
    }

    #[test]
    fn abort_transaction_bit() {
        let mut abort = Abort(0);
        abort.set_dapabort(true);
        assert_eq!(abort.0, 0x1);
    }
}
