//! PCI configuration-space access.
//!
//! Two interchangeable mechanisms behind one seam:
//! - [`legacy::LegacyConfig`]: port-indexed access through the 0xCF8/0xCFC
//!   pair, 256 bytes of config space per function.
//! - [`ecam::EcamConfig`]: memory-mapped extended access through a flat
//!   physical base, 4 KiB per function.
//!
//! # Reference
//! - PCI Local Bus Spec 3.0, configuration mechanism #1

pub mod ecam;
pub mod legacy;
pub mod probe;

use core::fmt;

use crate::error::Result;

pub use ecam::EcamConfig;
pub use legacy::{IoPorts, LegacyConfig, PortOps};
pub use probe::{probe, probe_extended, Presence};

/// Bus/device/function triple addressing one PCI function.
///
/// Device and function are masked to their architectural ranges
/// (device 0-31, function 0-7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PciAddress {
    pub bus: u8,
    pub device: u8,
    pub function: u8,
}

impl PciAddress {
    pub const fn new(bus: u8, device: u8, function: u8) -> Self {
        Self {
            bus,
            device: device & 0x1F,
            function: function & 0x07,
        }
    }
}

impl fmt::Display for PciAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}:{:02x}.{}", self.bus, self.device, self.function)
    }
}

/// Byte/word/dword access to one function's configuration space.
///
/// `reg` is mechanism-width: 8 bits for the legacy mechanism, up to 12 bits
/// for the extended one. There is no combined read-modify-write helper;
/// partial-register updates are an explicit read, modify, write at the
/// call site.
pub trait ConfigAccess {
    fn read8(&mut self, addr: PciAddress, reg: u16) -> Result<u8>;
    fn read16(&mut self, addr: PciAddress, reg: u16) -> Result<u16>;
    fn read32(&mut self, addr: PciAddress, reg: u16) -> Result<u32>;
    fn write8(&mut self, addr: PciAddress, reg: u16, value: u8) -> Result<()>;
    fn write16(&mut self, addr: PciAddress, reg: u16, value: u16) -> Result<()>;
    fn write32(&mut self, addr: PciAddress, reg: u16, value: u32) -> Result<()>;
}

/// Standard configuration registers used by the scanner and timer discovery.
pub mod offset {
    pub const VENDOR_ID: u16 = 0x00;
    pub const DEVICE_ID: u16 = 0x02;
    pub const CAP_POINTER: u16 = 0x34;
}
