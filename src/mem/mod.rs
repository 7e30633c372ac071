//! Physical-address window mapping.
//!
//! Maps page-aligned physical ranges through the physical-memory device and
//! exposes typed, bounds-checked access at window offsets. Each one-shot
//! accessor is a complete resource lifecycle: open, map, access, unmap,
//! close.
//!
//! # Safety
//! Nothing here validates that an address is hardware-backed; address
//! validity rests with the caller. Works with MMIO ranges, not DRAM owned
//! by the kernel.

use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;

use crate::error::{HwError, Result};

/// Default physical-memory device.
pub const DEFAULT_MEM_PATH: &str = "/dev/mem";

/// Sub-alignment applied to the target address before windowing.
const TARGET_ALIGN: u64 = 0x10;

fn page_size() -> u64 {
    let sz = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if sz <= 0 {
        4096
    } else {
        sz as u64
    }
}

fn last_errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

/// Handle on the physical-memory device.
///
/// Holds only the device path; the device itself is opened read/write for
/// the duration of each mapping call and closed again.
#[derive(Debug, Clone)]
pub struct MemDevice {
    path: PathBuf,
}

impl Default for MemDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MemDevice {
    /// Device at the standard path.
    pub fn new() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_MEM_PATH),
        }
    }

    /// Device at a caller-chosen path (tests point this at a RAM-backed file).
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Map the smallest page-multiple window covering `len` bytes at `addr`.
    ///
    /// The base is rounded down to the page size after a 16-byte
    /// sub-alignment of the target; the length is rounded up so the
    /// requested range never runs past the window.
    pub fn map(&self, addr: u64, len: usize) -> Result<MappedWindow> {
        let len = len.max(1);
        let page = page_size();
        let target = addr & !(TARGET_ALIGN - 1);
        let page_base = target & !(page - 1);
        let offset = (addr - page_base) as usize;
        let map_len = (offset + len).next_multiple_of(page as usize);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open(&self.path)
            .map_err(|e| HwError::MemDeviceOpen {
                path: self.path.display().to_string(),
                errno: e.raw_os_error().unwrap_or(0),
            })?;

        let base = unsafe {
            libc::mmap(
                core::ptr::null_mut(),
                map_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                page_base as libc::off_t,
            )
        };
        if base == libc::MAP_FAILED {
            return Err(HwError::MapFailed {
                addr,
                len: map_len,
                errno: last_errno(),
            });
        }
        log::debug!(
            "mapped {:#x}+{:#x} (window {:#x}, offset {:#x})",
            page_base,
            map_len,
            base as usize,
            offset
        );
        // The device fd can close here; the mapping stays valid.
        Ok(MappedWindow {
            base: base as *mut u8,
            len: map_len,
            offset,
        })
    }

    /// One-shot byte read at a physical address.
    pub fn read8(&self, addr: u64) -> Result<u8> {
        let w = self.map(addr, 1)?;
        w.read8_at(w.offset())
    }

    /// One-shot word read at a physical address.
    pub fn read16(&self, addr: u64) -> Result<u16> {
        let w = self.map(addr, 2)?;
        w.read16_at(w.offset())
    }

    /// One-shot dword read at a physical address.
    pub fn read32(&self, addr: u64) -> Result<u32> {
        let w = self.map(addr, 4)?;
        w.read32_at(w.offset())
    }

    /// One-shot qword read at a physical address.
    pub fn read64(&self, addr: u64) -> Result<u64> {
        let w = self.map(addr, 8)?;
        w.read64_at(w.offset())
    }

    /// One-shot byte write at a physical address.
    pub fn write8(&self, addr: u64, value: u8) -> Result<()> {
        let w = self.map(addr, 1)?;
        w.write8_at(w.offset(), value)
    }

    /// One-shot word write at a physical address.
    pub fn write16(&self, addr: u64, value: u16) -> Result<()> {
        let w = self.map(addr, 2)?;
        w.write16_at(w.offset(), value)
    }

    /// One-shot dword write at a physical address.
    pub fn write32(&self, addr: u64, value: u32) -> Result<()> {
        let w = self.map(addr, 4)?;
        w.write32_at(w.offset(), value)
    }
}

/// Owned mapping of a page-aligned physical range.
///
/// Typed accessors are bounds-checked against the window length and
/// require the offset to be aligned to the access width (the base is
/// page-aligned, so offset alignment is pointer alignment); every access
/// is a single volatile instruction of the requested width. Unmaps on
/// `Drop`, on success and failure paths alike.
#[derive(Debug)]
pub struct MappedWindow {
    base: *mut u8,
    len: usize,
    offset: usize,
}

impl MappedWindow {
    /// Window length in bytes (page multiple).
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Offset of the requested physical address inside the window.
    /// Invariant: `offset < len`.
    pub fn offset(&self) -> usize {
        self.offset
    }

    fn check(&self, offset: usize, width: usize) -> Result<()> {
        match offset.checked_add(width) {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(HwError::OutOfWindow {
                offset,
                width,
                window: self.len,
            }),
        }
    }

    /// Bounds plus width alignment; the volatile typed accessors need both.
    fn check_access(&self, offset: usize, width: usize) -> Result<()> {
        if offset % width != 0 {
            return Err(HwError::Misaligned { offset, width });
        }
        self.check(offset, width)
    }

    /// Raw pointer to `len` bytes at `offset`, bounds-checked.
    pub fn ptr_at(&self, offset: usize, len: usize) -> Result<*mut u8> {
        self.check(offset, len)?;
        Ok(unsafe { self.base.add(offset) })
    }

    pub fn read8_at(&self, offset: usize) -> Result<u8> {
        self.check(offset, 1)?;
        Ok(unsafe { self.base.add(offset).read_volatile() })
    }

    pub fn read16_at(&self, offset: usize) -> Result<u16> {
        self.check_access(offset, 2)?;
        Ok(unsafe { (self.base.add(offset) as *const u16).read_volatile() })
    }

    pub fn read32_at(&self, offset: usize) -> Result<u32> {
        self.check_access(offset, 4)?;
        Ok(unsafe { (self.base.add(offset) as *const u32).read_volatile() })
    }

    pub fn read64_at(&self, offset: usize) -> Result<u64> {
        self.check_access(offset, 8)?;
        Ok(unsafe { (self.base.add(offset) as *const u64).read_volatile() })
    }

    pub fn write8_at(&self, offset: usize, value: u8) -> Result<()> {
        self.check(offset, 1)?;
        unsafe { self.base.add(offset).write_volatile(value) };
        Ok(())
    }

    pub fn write16_at(&self, offset: usize, value: u16) -> Result<()> {
        self.check_access(offset, 2)?;
        unsafe { (self.base.add(offset) as *mut u16).write_volatile(value) };
        Ok(())
    }

    pub fn write32_at(&self, offset: usize, value: u32) -> Result<()> {
        self.check_access(offset, 4)?;
        unsafe { (self.base.add(offset) as *mut u32).write_volatile(value) };
        Ok(())
    }

    pub fn write64_at(&self, offset: usize, value: u64) -> Result<()> {
        self.check_access(offset, 8)?;
        unsafe { (self.base.add(offset) as *mut u64).write_volatile(value) };
        Ok(())
    }
}

impl Drop for MappedWindow {
    fn drop(&mut self) {
        let rc = unsafe { libc::munmap(self.base as *mut libc::c_void, self.len) };
        if rc != 0 {
            log::warn!(
                "munmap of {:#x}+{:#x} failed (errno {})",
                self.base as usize,
                self.len,
                last_errno()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn backing_file(name: &str, len: usize) -> PathBuf {
        let path =
            std::env::temp_dir().join(format!("hwkit-mem-{}-{}", name, std::process::id()));
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(&vec![0u8; len]).unwrap();
        path
    }

    #[test]
    fn test_offset_inside_window() {
        let path = backing_file("offset", 8192);
        let mem = MemDevice::with_path(&path);
        for addr in [0u64, 1, 0xF, 0x10, 0x7FF, 0x1000, 0x1234] {
            let w = mem.map(addr, 4).unwrap();
            assert!(w.offset() < w.len(), "addr {:#x}", addr);
            assert!(w.offset() + 4 <= w.len(), "addr {:#x}", addr);
        }
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_round_trip_widths() {
        let path = backing_file("roundtrip", 8192);
        let mem = MemDevice::with_path(&path);

        mem.write8(0x101, 0xA5).unwrap();
        assert_eq!(mem.read8(0x101).unwrap(), 0xA5);

        mem.write16(0x202, 0xBEEF).unwrap();
        assert_eq!(mem.read16(0x202).unwrap(), 0xBEEF);

        mem.write32(0x304, 0xDEAD_BEEF).unwrap();
        assert_eq!(mem.read32(0x304).unwrap(), 0xDEAD_BEEF);

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_window_spans_page_boundary() {
        let path = backing_file("span", 16384);
        let mem = MemDevice::with_path(&path);
        // Request straddles the first page boundary; length must grow to
        // cover the end of the range.
        let w = mem.map(0xFFC, 16).unwrap();
        assert!(w.offset() + 16 <= w.len());
        assert_eq!(w.len() % 4096, 0);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_out_of_window_rejected() {
        let path = backing_file("bounds", 4096);
        let mem = MemDevice::with_path(&path);
        let w = mem.map(0, 16).unwrap();
        let len = w.len();
        assert!(matches!(
            w.read32_at(len - 2),
            Err(HwError::OutOfWindow { .. })
        ));
        assert!(matches!(w.ptr_at(len, 1), Err(HwError::OutOfWindow { .. })));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_misaligned_typed_access_rejected() {
        let path = backing_file("align", 8192);
        let mem = MemDevice::with_path(&path);
        let w = mem.map(0, 64).unwrap();
        assert!(matches!(w.read16_at(1), Err(HwError::Misaligned { .. })));
        assert!(matches!(w.read32_at(2), Err(HwError::Misaligned { .. })));
        assert!(matches!(w.read64_at(4), Err(HwError::Misaligned { .. })));
        assert!(matches!(
            w.write32_at(6, 0),
            Err(HwError::Misaligned { .. })
        ));
        // Byte accesses have no alignment to violate.
        assert!(w.read8_at(1).is_ok());

        // One-shot path: the window offset inherits the address alignment.
        assert!(matches!(
            mem.read32(0x7FF),
            Err(HwError::Misaligned { .. })
        ));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_missing_device_is_fatal() {
        let mem = MemDevice::with_path("/nonexistent/hwkit-mem");
        assert!(matches!(
            mem.read8(0),
            Err(HwError::MemDeviceOpen { .. })
        ));
    }
}
