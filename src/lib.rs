//! Debug access primitives for ARM targets.
//!
//! This crate implements the two protocol engines an on-chip debugger
//! needs between its transport driver and its target logic:
//!
//! - [`dap`]: the ADIv5 Debug Access Port engine. Powers up the debug
//!   domain, discovers access ports by scanning IDR, and moves data
//!   through memory APs with batched, shadow-elided register accesses.
//! - [`jtag`]: the scan chain engine. Tracks the TAP controller state
//!   machine, queues IR writes and DR exchanges against a multi-TAP
//!   chain and encodes them into raw sequence records.
//!
//! Both engines drive an abstract adapter ([`adapter::CommandQueue`] and
//! [`adapter::JtagAdapter`]); the USB or serial transport behind those
//! traits is out of scope here.
//!
//! ```no_run
//! use arm_adi::adapter::CommandQueue;
//! use arm_adi::dap::ap::{ApKind, ApType};
//! use arm_adi::dap::Dap;
//!
//! fn dump_rom(queue: impl CommandQueue) -> Result<(), arm_adi::AdiError> {
//!     let mut dap = Dap::new(queue)?;
//!     let ap = dap.find_access_port(ApKind::Memory, ApType::AmbaAhb3)?;
//!     let base = dap.rom_table_base(ap)?;
//!     let (cid, pid) = dap.read_cid_pid(ap, base & !0xFFF)?;
//!     println!("ROM table CID {cid:#010x}, PID {pid:#014x}");
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

pub mod adapter;
pub mod dap;
pub mod error;
pub mod jtag;

pub use adapter::{AdapterError, CommandQueue, JtagAdapter, PortType};
pub use dap::{AccessPortHandle, Dap};
pub use error::{AdiError, JtagError};
pub use jtag::{DrCapture, IdCode, ScanChain};
