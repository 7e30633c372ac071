//! Core types shared across the toolkit

use core::fmt;
use core::str::FromStr;

use crate::error::HwError;

/// Access width of a single register transfer.
///
/// Width is honored atomically: the generated access is one instruction of
/// the given size, never a sequence of narrower ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AccessWidth {
    Byte = 1,
    Word = 2,
    Dword = 4,
    Qword = 8,
}

impl AccessWidth {
    /// Width in bytes.
    pub const fn bytes(self) -> usize {
        self as usize
    }

    /// Elements needed to cover `len` bytes (rounded up).
    pub fn count_for(self, len: u64) -> u64 {
        len.div_ceil(self as u64)
    }
}

impl TryFrom<u8> for AccessWidth {
    type Error = HwError;

    fn try_from(value: u8) -> Result<Self, HwError> {
        match value {
            1 => Ok(Self::Byte),
            2 => Ok(Self::Word),
            4 => Ok(Self::Dword),
            8 => Ok(Self::Qword),
            _ => Err(HwError::BadWidth(value)),
        }
    }
}

impl fmt::Display for AccessWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Byte => write!(f, "byte"),
            Self::Word => write!(f, "word"),
            Self::Dword => write!(f, "dword"),
            Self::Qword => write!(f, "qword"),
        }
    }
}

/// Unit an elapsed-time result is reported in.
///
/// `Cycles` returns the raw counter delta; the wall-clock units divide by
/// the calibrated frequency and scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Cycles,
    Seconds,
    Millis,
    Micros,
    Nanos,
}

impl TimeUnit {
    /// Multiplier applied after dividing a cycle delta by frequency.
    pub const fn scale(self) -> f64 {
        match self {
            Self::Cycles => 1.0,
            Self::Seconds => 1.0,
            Self::Millis => 1e3,
            Self::Micros => 1e6,
            Self::Nanos => 1e9,
        }
    }

    /// Whether conversion to this unit needs a calibrated frequency.
    pub const fn needs_frequency(self) -> bool {
        !matches!(self, Self::Cycles)
    }
}

impl FromStr for TimeUnit {
    type Err = HwError;

    fn from_str(s: &str) -> Result<Self, HwError> {
        match s {
            "clocks" | "cycles" => Ok(Self::Cycles),
            "sec" => Ok(Self::Seconds),
            "ms" => Ok(Self::Millis),
            "us" => Ok(Self::Micros),
            "ns" => Ok(Self::Nanos),
            other => Err(HwError::UnknownUnit(other.into())),
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cycles => write!(f, "cycles"),
            Self::Seconds => write!(f, "sec"),
            Self::Millis => write!(f, "ms"),
            Self::Micros => write!(f, "us"),
            Self::Nanos => write!(f, "ns"),
        }
    }
}
