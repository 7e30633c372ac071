//! Hardware Register Access and Precision Timing Toolkit
//!
//! Userspace access to physical memory windows, I/O ports, PCI
//! configuration space, and model-specific registers, plus
//! cycle-counter-based timing calibrated against the platform timer.
//! Root privileges (or the matching capabilities) are required for every
//! hardware-facing path.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Toolkit Structure                        │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌────────────┐  ┌────────────┐  ┌────────────┐                │
//! │  │    mem     │  │   portio   │  │    pci     │                │
//! │  │            │  │            │  │            │                │
//! │  │ MemDevice  │  │ in/out     │  │ legacy cfg │                │
//! │  │ MappedWin  │  │ IopermGrd  │  │ ecam/probe │                │
//! │  └─────┬──────┘  └────────────┘  └─────┬──────┘                │
//! │        │                               │                        │
//! │  ┌─────┴──────┐  ┌────────────┐  ┌─────┴──────┐                │
//! │  │    xfer    │  │    msr     │  │    time    │                │
//! │  │            │  │            │  │            │                │
//! │  │ timed_read │  │ MsrDevice  │  │ tsc/Hpet   │                │
//! │  │ BulkCopy   │  │            │  │ calibrate  │                │
//! │  └────────────┘  └────────────┘  └────────────┘                │
//! │                                                                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use hwkit::{mem::MemDevice, time, types::TimeUnit, xfer};
//!
//! let mem = MemDevice::new();
//!
//! // Calibrate the cycle counter against the platform timer (~5 s).
//! let mut cfg = hwkit::pci::LegacyConfig::new();
//! let mut hpet = time::Hpet::locate(&mut cfg, &mem)?;
//! let mut cal = time::CalibrationContext::uncalibrated();
//! cal.calibrate(&mut hpet)?;
//!
//! // Timed 4 KiB read from an MMIO range.
//! let (us, data) = xfer::timed_read(
//!     &mem,
//!     0xFED0_0000,
//!     4096,
//!     hwkit::types::AccessWidth::Dword,
//!     TimeUnit::Micros,
//!     &cal,
//! )?;
//! println!("read {} bytes in {:.2} us", data.len(), us);
//! ```

pub mod error;
pub mod mem;
pub mod msr;
pub mod pci;
pub mod portio;
pub mod time;
pub mod types;
pub mod xfer;

pub use error::{HwError, Result};
pub use types::{AccessWidth, TimeUnit};
