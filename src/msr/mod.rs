//! Model-specific-register access via the per-CPU register device.
//!
//! Each logical CPU exposes one register file; a register is addressed by
//! seeking to its number and moving 8 bytes. The device node appears only
//! once the `msr` kernel module is loaded, so open failures are reported to
//! the caller instead of aborting.

use std::os::unix::fs::FileExt;
use std::path::PathBuf;

use crate::error::{HwError, Result};

/// Accessor for one logical CPU's register file.
///
/// Holds only the path; the file is opened and closed inside each call.
#[derive(Debug, Clone)]
pub struct MsrDevice {
    cpu: u32,
    path: PathBuf,
}

impl MsrDevice {
    /// Accessor for `cpu`'s standard device node.
    pub fn new(cpu: u32) -> Self {
        Self {
            cpu,
            path: PathBuf::from(format!("/dev/cpu/{}/msr", cpu)),
        }
    }

    /// Accessor over a caller-chosen path (tests use a plain file).
    pub fn with_path(cpu: u32, path: impl Into<PathBuf>) -> Self {
        Self {
            cpu,
            path: path.into(),
        }
    }

    pub fn cpu(&self) -> u32 {
        self.cpu
    }

    /// Read the 8-byte value of `msr`.
    pub fn read(&self, msr: u32) -> Result<u64> {
        let file = std::fs::File::open(&self.path).map_err(|e| HwError::MsrOpen {
            cpu: self.cpu,
            errno: e.raw_os_error().unwrap_or(0),
        })?;
        let mut buf = [0u8; 8];
        file.read_exact_at(&mut buf, msr as u64)
            .map_err(|e| HwError::MsrIo {
                cpu: self.cpu,
                msr,
                errno: e.raw_os_error().unwrap_or(0),
            })?;
        Ok(u64::from_ne_bytes(buf))
    }

    /// Write the 8-byte value of `msr`.
    ///
    /// Best-effort and unconfirmed: the file operation can report success
    /// without the value persisting at the hardware level. Callers must not
    /// treat `Ok` as confirmation; read back if it matters.
    pub fn write(&self, msr: u32, value: u64) -> Result<()> {
        let file = std::fs::OpenOptions::new()
            .write(true)
            .open(&self.path)
            .map_err(|e| HwError::MsrOpen {
                cpu: self.cpu,
                errno: e.raw_os_error().unwrap_or(0),
            })?;
        file.write_all_at(&value.to_ne_bytes(), msr as u64)
            .map_err(|e| HwError::MsrIo {
                cpu: self.cpu,
                msr,
                errno: e.raw_os_error().unwrap_or(0),
            })?;
        log::debug!(
            "wrote MSR {:#x} on cpu {} (unconfirmed at hardware level)",
            msr,
            self.cpu
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn backing_file(name: &str, len: usize) -> PathBuf {
        let path =
            std::env::temp_dir().join(format!("hwkit-msr-{}-{}", name, std::process::id()));
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(&vec![0u8; len]).unwrap();
        path
    }

    #[test]
    fn test_read_at_register_offset() {
        let path = backing_file("read", 0x300);
        let msr = MsrDevice::with_path(0, &path);
        msr.write(0x1A0, 0x1122_3344_5566_7788).unwrap();
        assert_eq!(msr.read(0x1A0).unwrap(), 0x1122_3344_5566_7788);
        // Neighboring register untouched.
        assert_eq!(msr.read(0x1A8).unwrap(), 0);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_open_failure_is_recoverable_error() {
        let msr = MsrDevice::with_path(3, "/nonexistent/hwkit-msr");
        match msr.read(0x198) {
            Err(HwError::MsrOpen { cpu: 3, .. }) => {}
            other => panic!("expected MsrOpen, got {:?}", other),
        }
    }
}
