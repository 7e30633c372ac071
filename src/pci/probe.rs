//! Device presence and configuration-space size probing.
//!
//! A function is absent when vendor and device ID both read as all-zero or
//! all-one; otherwise the capability chain starting at register 0x34
//! decides whether the function exposes PCI-Express extended space.

use crate::error::Result;

use super::{offset, ConfigAccess, PciAddress};

/// PCI-Express capability ID.
pub const CAP_ID_PCIE: u8 = 0x10;

/// Upper bound on capability-chain steps. A well-formed chain fits in the
/// 256-byte legacy space; anything longer is cyclic or corrupt.
pub const MAX_CAP_WALK: usize = 256;

/// Outcome of probing one function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// Vendor/device IDs read as all-zero or all-one.
    NotPresent,
    /// Present, conventional 256-byte configuration space.
    Legacy256,
    /// Present with PCI-Express extended 4 KiB configuration space.
    Extended4k,
}

impl Presence {
    /// Addressable configuration bytes for this outcome.
    pub const fn config_size(self) -> usize {
        match self {
            Self::NotPresent => 0,
            Self::Legacy256 => 0x100,
            Self::Extended4k => 0x1000,
        }
    }
}

fn absent(vendor: u16, device: u16) -> bool {
    (vendor == 0x0000 && device == 0x0000) || (vendor == 0xFFFF && device == 0xFFFF)
}

/// Probe one function through the legacy-width mechanism, walking the
/// capability chain for the PCI-Express capability.
pub fn probe(cfg: &mut impl ConfigAccess, addr: PciAddress) -> Result<Presence> {
    let vendor = cfg.read16(addr, offset::VENDOR_ID)?;
    let device = cfg.read16(addr, offset::DEVICE_ID)?;
    if absent(vendor, device) {
        return Ok(Presence::NotPresent);
    }

    let mut pointer = cfg.read8(addr, offset::CAP_POINTER)?;
    for _ in 0..MAX_CAP_WALK {
        if pointer == 0 {
            return Ok(Presence::Legacy256);
        }
        let cap_id = cfg.read8(addr, pointer as u16)?;
        if cap_id == CAP_ID_PCIE {
            return Ok(Presence::Extended4k);
        }
        pointer = cfg.read8(addr, pointer as u16 + 1)?;
    }
    log::warn!("capability chain on {} did not terminate; assuming 256B", addr);
    Ok(Presence::Legacy256)
}

/// Probe one function through the extended mechanism. Reaching the device
/// at all means extended space is being addressed, so presence alone is
/// enough to report the full 4 KiB.
pub fn probe_extended(cfg: &mut impl ConfigAccess, addr: PciAddress) -> Result<Presence> {
    let vendor = cfg.read16(addr, offset::VENDOR_ID)?;
    let device = cfg.read16(addr, offset::DEVICE_ID)?;
    if absent(vendor, device) {
        return Ok(Presence::NotPresent);
    }
    Ok(Presence::Extended4k)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use std::collections::BTreeMap;

    /// Flat byte-addressed mock config space with a read counter.
    #[derive(Debug, Default)]
    struct MockConfig {
        bytes: BTreeMap<u16, u8>,
        reads: usize,
    }

    impl MockConfig {
        fn set8(&mut self, reg: u16, value: u8) {
            self.bytes.insert(reg, value);
        }

        fn set16(&mut self, reg: u16, value: u16) {
            self.set8(reg, (value & 0xFF) as u8);
            self.set8(reg + 1, (value >> 8) as u8);
        }
    }

    impl ConfigAccess for MockConfig {
        fn read8(&mut self, _addr: PciAddress, reg: u16) -> Result<u8> {
            self.reads += 1;
            Ok(self.bytes.get(&reg).copied().unwrap_or(0))
        }
        fn read16(&mut self, addr: PciAddress, reg: u16) -> Result<u16> {
            let lo = self.read8(addr, reg)? as u16;
            let hi = self.read8(addr, reg + 1)? as u16;
            Ok(lo | hi << 8)
        }
        fn read32(&mut self, addr: PciAddress, reg: u16) -> Result<u32> {
            let lo = self.read16(addr, reg)? as u32;
            let hi = self.read16(addr, reg + 2)? as u32;
            Ok(lo | hi << 16)
        }
        fn write8(&mut self, _addr: PciAddress, reg: u16, value: u8) -> Result<()> {
            self.bytes.insert(reg, value);
            Ok(())
        }
        fn write16(&mut self, addr: PciAddress, reg: u16, value: u16) -> Result<()> {
            self.write8(addr, reg, (value & 0xFF) as u8)?;
            self.write8(addr, reg + 1, (value >> 8) as u8)
        }
        fn write32(&mut self, addr: PciAddress, reg: u16, value: u32) -> Result<()> {
            self.write16(addr, reg, (value & 0xFFFF) as u16)?;
            self.write16(addr, reg + 2, (value >> 16) as u16)
        }
    }

    const DEV: PciAddress = PciAddress::new(0, 3, 0);

    fn present_device() -> MockConfig {
        let mut cfg = MockConfig::default();
        cfg.set16(0x00, 0x8086);
        cfg.set16(0x02, 0x1234);
        cfg
    }

    /// Chain of `ids` starting at 0x40 with 0x10-spaced nodes.
    fn with_chain(cfg: &mut MockConfig, ids: &[u8]) {
        cfg.set8(0x34, 0x40);
        for (i, id) in ids.iter().enumerate() {
            let node = 0x40 + 0x10 * i as u16;
            cfg.set8(node, *id);
            let next = if i + 1 < ids.len() {
                (0x40 + 0x10 * (i + 1)) as u8
            } else {
                0
            };
            cfg.set8(node + 1, next);
        }
    }

    #[test]
    fn test_absent_ids() {
        let mut cfg = MockConfig::default();
        assert_eq!(probe(&mut cfg, DEV).unwrap(), Presence::NotPresent);

        cfg.set16(0x00, 0xFFFF);
        cfg.set16(0x02, 0xFFFF);
        assert_eq!(probe(&mut cfg, DEV).unwrap(), Presence::NotPresent);
        assert_eq!(Presence::NotPresent.config_size(), 0);
    }

    #[test]
    fn test_no_capabilities() {
        let mut cfg = present_device();
        assert_eq!(probe(&mut cfg, DEV).unwrap(), Presence::Legacy256);
        assert_eq!(Presence::Legacy256.config_size(), 0x100);
    }

    #[test]
    fn test_chain_of_five_finds_pcie_at_third() {
        let mut cfg = present_device();
        with_chain(&mut cfg, &[0x01, 0x05, 0x10, 0x09, 0x0D]);
        // 4 ID reads for presence, one pointer read, then two reads per
        // step until the hit on step 3.
        let before = cfg.reads;
        assert_eq!(probe(&mut cfg, DEV).unwrap(), Presence::Extended4k);
        assert_eq!(cfg.reads - before, 4 + 1 + 2 + 2 + 1);
    }

    #[test]
    fn test_chain_of_five_without_pcie() {
        let mut cfg = present_device();
        with_chain(&mut cfg, &[0x01, 0x05, 0x09, 0x09, 0x0D]);
        let before = cfg.reads;
        assert_eq!(probe(&mut cfg, DEV).unwrap(), Presence::Legacy256);
        // Exactly five steps, then the terminating zero pointer.
        assert_eq!(cfg.reads - before, 4 + 1 + 2 * 5);
    }

    #[test]
    fn test_cyclic_chain_is_bounded() {
        let mut cfg = present_device();
        cfg.set8(0x34, 0x40);
        cfg.set8(0x40, 0x01);
        cfg.set8(0x41, 0x40); // points back at itself
        assert_eq!(probe(&mut cfg, DEV).unwrap(), Presence::Legacy256);
    }

    #[test]
    fn test_extended_probe_presence_is_enough() {
        let mut cfg = present_device();
        assert_eq!(probe_extended(&mut cfg, DEV).unwrap(), Presence::Extended4k);
        assert_eq!(Presence::Extended4k.config_size(), 0x1000);

        let mut empty = MockConfig::default();
        assert_eq!(
            probe_extended(&mut empty, DEV).unwrap(),
            Presence::NotPresent
        );
    }
}
