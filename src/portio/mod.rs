//! Port-mapped I/O access.
//!
//! Every accessor brackets a single `in`/`out` with acquisition and release
//! of permission for exactly the port range the width touches. No permission
//! state persists between calls; each call pays the acquire/release cost.
//!
//! # Safety
//! Port must be a valid I/O port for the operation.

use crate::error::{HwError, Result};

pub mod raw;

fn last_errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

/// Scoped port permission. Released on drop, on both success and failure
/// paths; leaked permissions would accumulate across repeated calls of a
/// long-running caller.
struct IopermGuard {
    port: u16,
    width: u8,
}

impl IopermGuard {
    fn acquire(port: u16, width: u8) -> Result<Self> {
        let rc = unsafe { libc::ioperm(port as libc::c_ulong, width as libc::c_ulong, 1) };
        if rc != 0 {
            return Err(HwError::PortPermission {
                port,
                width,
                errno: last_errno(),
            });
        }
        Ok(Self { port, width })
    }
}

impl Drop for IopermGuard {
    fn drop(&mut self) {
        let rc =
            unsafe { libc::ioperm(self.port as libc::c_ulong, self.width as libc::c_ulong, 0) };
        if rc != 0 {
            log::warn!(
                "ioperm release of port {:#x} width {} failed (errno {})",
                self.port,
                self.width,
                last_errno()
            );
        }
    }
}

/// Read 8-bit value from an I/O port.
pub fn read8(port: u16) -> Result<u8> {
    let _perm = IopermGuard::acquire(port, 1)?;
    Ok(unsafe { raw::inb(port) })
}

/// Read 16-bit value from an I/O port.
pub fn read16(port: u16) -> Result<u16> {
    let _perm = IopermGuard::acquire(port, 2)?;
    Ok(unsafe { raw::inw(port) })
}

/// Read 32-bit value from an I/O port.
pub fn read32(port: u16) -> Result<u32> {
    let _perm = IopermGuard::acquire(port, 4)?;
    Ok(unsafe { raw::inl(port) })
}

/// Write 8-bit value to an I/O port.
pub fn write8(port: u16, value: u8) -> Result<()> {
    let _perm = IopermGuard::acquire(port, 1)?;
    unsafe { raw::outb(port, value) };
    Ok(())
}

/// Write 16-bit value to an I/O port.
pub fn write16(port: u16, value: u16) -> Result<()> {
    let _perm = IopermGuard::acquire(port, 2)?;
    unsafe { raw::outw(port, value) };
    Ok(())
}

/// Write 32-bit value to an I/O port.
pub fn write32(port: u16, value: u32) -> Result<()> {
    let _perm = IopermGuard::acquire(port, 4)?;
    unsafe { raw::outl(port, value) };
    Ok(())
}
