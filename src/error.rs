//! Crate error types

use core::fmt;

pub type Result<T> = core::result::Result<T, HwError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HwError {
    /// Physical-memory device could not be opened.
    MemDeviceOpen { path: String, errno: i32 },
    /// Mapping a physical range failed.
    MapFailed { addr: u64, len: usize, errno: i32 },
    /// Access outside a mapped window.
    OutOfWindow {
        offset: usize,
        width: usize,
        window: usize,
    },
    /// Typed access at an offset not aligned to its width.
    Misaligned { offset: usize, width: usize },
    /// Port-access permission was refused for the range touched.
    PortPermission { port: u16, width: u8, errno: i32 },
    /// Per-CPU MSR device could not be opened. Recoverable: load the
    /// `msr` kernel module and retry.
    MsrOpen { cpu: u32, errno: i32 },
    /// Seek or transfer on the MSR device failed.
    MsrIo { cpu: u32, msr: u32, errno: i32 },
    /// Scalar transfer exceeds the 512 MiB cap.
    TransferTooLarge { len: u64 },
    /// Caller-supplied buffer too small for the transfer.
    BufferTooSmall { needed: usize, got: usize },
    /// A wall-clock unit was requested without a calibrated frequency.
    Uncalibrated,
    /// Unrecognized time-unit name.
    UnknownUnit(String),
    /// Access width that is not 1, 2, 4, or 8 bytes.
    BadWidth(u8),
}

impl fmt::Display for HwError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MemDeviceOpen { path, errno } => {
                write!(f, "cannot open {} (errno {})", path, errno)
            }
            Self::MapFailed { addr, len, errno } => {
                write!(
                    f,
                    "mmap of {:#x} ({} bytes) failed (errno {})",
                    addr, len, errno
                )
            }
            Self::OutOfWindow {
                offset,
                width,
                window,
            } => {
                write!(
                    f,
                    "access of {} bytes at offset {:#x} outside {}-byte window",
                    width, offset, window
                )
            }
            Self::Misaligned { offset, width } => {
                write!(
                    f,
                    "{}-byte access at offset {:#x} is not {}-aligned",
                    width, offset, width
                )
            }
            Self::PortPermission { port, width, errno } => {
                write!(
                    f,
                    "ioperm refused ports {:#x}..{:#x} (errno {})",
                    port,
                    *port as u32 + *width as u32,
                    errno
                )
            }
            Self::MsrOpen { cpu, errno } => {
                write!(
                    f,
                    "cannot open MSR device for cpu {} (errno {}); is the msr module loaded?",
                    cpu, errno
                )
            }
            Self::MsrIo { cpu, msr, errno } => {
                write!(
                    f,
                    "MSR {:#x} access on cpu {} failed (errno {})",
                    msr, cpu, errno
                )
            }
            Self::TransferTooLarge { len } => {
                write!(f, "scalar transfer of {} bytes exceeds the 512 MiB cap", len)
            }
            Self::BufferTooSmall { needed, got } => {
                write!(f, "buffer too small: need {} bytes, got {}", needed, got)
            }
            Self::Uncalibrated => {
                write!(f, "wall-clock unit requested without a calibrated frequency")
            }
            Self::UnknownUnit(name) => write!(f, "unknown time unit {:?}", name),
            Self::BadWidth(bytes) => write!(f, "unsupported access width of {} bytes", bytes),
        }
    }
}

impl std::error::Error for HwError {}
