//! Legacy (0xCF8/0xCFC) configuration mechanism.
//!
//! A 32-bit command word addressing the target dword-aligned register goes
//! to the address port; data moves through the data port. Register values
//! not aligned to the access width are stitched from two consecutive
//! dwords.

use crate::error::Result;
use crate::portio;

use super::{ConfigAccess, PciAddress};

/// PCI configuration address port.
pub const CONFIG_ADDRESS: u16 = 0xCF8;
/// PCI configuration data port.
pub const CONFIG_DATA: u16 = 0xCFC;

const ENABLE: u32 = 0x8000_0000;

/// Port backend seam; production code goes through [`IoPorts`], tests
/// substitute a mock bus. Only the operations this mechanism performs:
/// dword reads of the data port, plus writes of every width.
pub trait PortOps {
    fn read32(&mut self, port: u16) -> Result<u32>;
    fn write8(&mut self, port: u16, value: u8) -> Result<()>;
    fn write16(&mut self, port: u16, value: u16) -> Result<()>;
    fn write32(&mut self, port: u16, value: u32) -> Result<()>;
}

/// Hardware port backend (ioperm-bracketed single accesses).
#[derive(Debug, Default, Clone, Copy)]
pub struct IoPorts;

impl PortOps for IoPorts {
    fn read32(&mut self, port: u16) -> Result<u32> {
        portio::read32(port)
    }
    fn write8(&mut self, port: u16, value: u8) -> Result<()> {
        portio::write8(port, value)
    }
    fn write16(&mut self, port: u16, value: u16) -> Result<()> {
        portio::write16(port, value)
    }
    fn write32(&mut self, port: u16, value: u32) -> Result<()> {
        portio::write32(port, value)
    }
}

/// Command word for one dword-aligned register.
///
/// Bit 31 enable, 23:16 bus, 15:11 device, 10:8 function, 7:2 register
/// dword.
pub fn command_word(addr: PciAddress, reg: u16) -> u32 {
    ENABLE
        | (addr.bus as u32) << 16
        | (addr.device as u32) << 11
        | (addr.function as u32) << 8
        | (reg as u32 & 0xFC)
}

/// Legacy port-indexed configuration access.
#[derive(Debug, Default)]
pub struct LegacyConfig<P: PortOps = IoPorts> {
    ports: P,
}

impl LegacyConfig<IoPorts> {
    pub fn new() -> Self {
        Self { ports: IoPorts }
    }
}

impl<P: PortOps> LegacyConfig<P> {
    /// Access through a caller-supplied port backend.
    pub fn with_ports(ports: P) -> Self {
        Self { ports }
    }

    fn fetch(&mut self, command: u32) -> Result<u32> {
        self.ports.write32(CONFIG_ADDRESS, command)?;
        self.ports.read32(CONFIG_DATA)
    }
}

impl<P: PortOps> ConfigAccess for LegacyConfig<P> {
    fn read8(&mut self, addr: PciAddress, reg: u16) -> Result<u8> {
        let offset = (reg % 4) as u32;
        let data = self.fetch(command_word(addr, reg))?;
        // A byte never straddles the dword; shift-and-mask suffices.
        Ok(((data >> (offset * 8)) & 0xFF) as u8)
    }

    fn read16(&mut self, addr: PciAddress, reg: u16) -> Result<u16> {
        let offset = (reg % 4) as u32;
        let command = command_word(addr, reg);
        let data = self.fetch(command)?;
        let mut value = ((data >> (offset * 8)) & 0xFFFF) as u16;
        if offset > 2 {
            // Offset 3 straddles: bottom byte comes from the next dword.
            let next = self.fetch(command + 4)?;
            value |= ((next & 0xFF) as u16) << 8;
        }
        Ok(value)
    }

    fn read32(&mut self, addr: PciAddress, reg: u16) -> Result<u32> {
        let offset = (reg % 4) as u32;
        let command = command_word(addr, reg);
        let data = self.fetch(command)?;
        let mut value = data >> (offset * 8);
        if offset > 0 {
            // Unaligned dword: merge the adjacent dword's low bytes in.
            let next = self.fetch(command + 4)?;
            value |= next << (8 * (4 - offset));
        }
        Ok(value)
    }

    fn write8(&mut self, addr: PciAddress, reg: u16, value: u8) -> Result<()> {
        self.ports.write32(CONFIG_ADDRESS, command_word(addr, reg))?;
        self.ports.write8(CONFIG_DATA + (reg & 3), value)
    }

    fn write16(&mut self, addr: PciAddress, reg: u16, value: u16) -> Result<()> {
        self.ports.write32(CONFIG_ADDRESS, command_word(addr, reg))?;
        self.ports.write16(CONFIG_DATA + (reg & 3), value)
    }

    fn write32(&mut self, addr: PciAddress, reg: u16, value: u32) -> Result<()> {
        self.ports.write32(CONFIG_ADDRESS, command_word(addr, reg))?;
        self.ports.write32(CONFIG_DATA, value)
    }
}
