//! Cycle counter, platform timer, and frequency calibration.
//!
//! The cycle counter is sampled with serializing fences on both sides when
//! it brackets a measured interval; that ordering is a hard requirement of
//! every timed path, not an optimization. The platform timer (HPET main
//! counter) provides the independent time base for calibrating
//! cycles-per-second.

use crate::error::{HwError, Result};
use crate::mem::MemDevice;
use crate::pci::{ConfigAccess, PciAddress};
use crate::types::TimeUnit;

pub mod tsc;

pub use tsc::{read_tsc, read_tsc_serialized};

/// Chipset register (bus 0, device 0x1F, function 0) holding the root
/// complex base address the timer block hangs off.
pub const RCBA_REGISTER: u16 = 0xF0;
/// Timer configuration byte offset within the root complex block.
pub const HPTC_OFFSET: u64 = 0x3404;
/// Main counter offset within the timer block.
pub const MAIN_COUNTER_OFFSET: u64 = 0xF0;

/// Platform-timer ticks in the fixed calibration window (~5 s at the
/// timer's 14.318 MHz rate).
pub const CALIBRATION_TICKS: u64 = 0x44463F3;
const CALIBRATION_SECONDS: f64 = 5.0;

/// Cycle and platform-timer sampling seam. Production code uses [`Hpet`];
/// calibration tests substitute a mock source.
pub trait TimeSource {
    /// Monotonic 64-bit platform-timer value.
    fn platform_ticks(&mut self) -> Result<u64>;
    /// Cycle-counter sample.
    fn cycles(&mut self) -> u64;
}

/// Handle on the platform timer's main counter.
///
/// The hardware counter is 32 bits wide; this handle extends it to 64 bits
/// by carrying an overflow word that increments whenever a new low-word
/// sample is smaller than the previous one. The last-seen low word is
/// state of the handle, so samples must flow through one handle to stay
/// monotonic.
#[derive(Debug)]
pub struct Hpet<'a> {
    mem: &'a MemDevice,
    base: u64,
    last_low: u32,
    high: u64,
}

impl<'a> Hpet<'a> {
    /// Discover the timer block and make sure its counter is running.
    ///
    /// Reads the root-complex base from the chipset, selects one of the
    /// four possible timer bases from the low two configuration bits, and
    /// sets the enable bit if it is clear.
    pub fn locate(cfg: &mut impl ConfigAccess, mem: &'a MemDevice) -> Result<Self> {
        let bridge = PciAddress::new(0, 0x1F, 0);
        let rcba = cfg.read32(bridge, RCBA_REGISTER)? as u64 & !0x3FFF;
        let hptc = mem.read8(rcba + HPTC_OFFSET)?;
        if hptc & 0x80 == 0 {
            // Some boards leave the timer disabled until bit 7 is set.
            mem.write8((rcba + HPTC_OFFSET) & !0x3, hptc | 0x80)?;
        }
        let base = match hptc & 0x03 {
            0x00 => 0xFED0_0000,
            0x01 => 0xFED0_1000,
            0x02 => 0xFED0_2000,
            _ => 0xFED0_3000,
        };
        log::debug!("platform timer at {:#x} (rcba {:#x})", base, rcba);
        Ok(Self::at_base(mem, base))
    }

    /// Handle over a known timer base (skips chipset discovery).
    pub fn at_base(mem: &'a MemDevice, base: u64) -> Self {
        Self {
            mem,
            base,
            last_low: 0,
            high: 0,
        }
    }

    /// Physical base of the timer block.
    pub fn base(&self) -> u64 {
        self.base
    }

    /// Sample the counter, extended to 64 bits.
    pub fn read(&mut self) -> Result<u64> {
        let low = self.mem.read32(self.base + MAIN_COUNTER_OFFSET)?;
        Ok(extend_counter(&mut self.high, &mut self.last_low, low))
    }
}

impl TimeSource for Hpet<'_> {
    fn platform_ticks(&mut self) -> Result<u64> {
        self.read()
    }

    fn cycles(&mut self) -> u64 {
        // Calibration endpoints bracket a measured interval, so they get
        // the serialized read like every other timed path.
        read_tsc_serialized()
    }
}

/// Fold a new 32-bit sample into the running 64-bit value. A low word
/// smaller than the last one means the hardware counter wrapped.
fn extend_counter(high: &mut u64, last_low: &mut u32, low: u32) -> u64 {
    if low < *last_low {
        *high += 1;
    }
    *last_low = low;
    (*high << 32) + low as u64
}

/// Process-wide cycles-per-second cache; first writer wins.
static PROCESS_FREQUENCY: spin::Once<f64> = spin::Once::new();

/// Cycles-per-second holder with an explicit calibrated/uncalibrated tag.
///
/// Calibration busy-waits the fixed ~5 s platform-timer window once;
/// subsequent calls return the cached value without re-measuring. A full
/// wraparound of the platform timer inside the window is not handled
/// (the window is short against the extended counter's period).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CalibrationContext {
    frequency: Option<f64>,
}

impl CalibrationContext {
    /// Context that will measure on first use.
    pub const fn uncalibrated() -> Self {
        Self { frequency: None }
    }

    /// Context carrying a caller-supplied frequency; never measures.
    pub const fn with_frequency(hz: f64) -> Self {
        Self {
            frequency: Some(hz),
        }
    }

    pub const fn is_calibrated(&self) -> bool {
        self.frequency.is_some()
    }

    /// Calibrated cycles-per-second, if any.
    pub fn frequency(&self) -> Option<f64> {
        self.frequency
    }

    /// Derive cycles-per-second against the platform timer.
    ///
    /// Idempotent: once a frequency is held, it is returned bit-identical
    /// and the measurement window is not re-entered.
    pub fn calibrate(&mut self, source: &mut dyn TimeSource) -> Result<f64> {
        if let Some(hz) = self.frequency {
            return Ok(hz);
        }
        log::info!("calibrating cycle counter over ~5s platform-timer window");
        let deadline = source.platform_ticks()? + CALIBRATION_TICKS;
        let start_cycles = source.cycles();
        while source.platform_ticks()? < deadline {}
        let end_cycles = source.cycles();

        let hz = (end_cycles.wrapping_sub(start_cycles)) as f64 / CALIBRATION_SECONDS;
        log::info!("cycle counter runs at {:.0} Hz", hz);
        self.frequency = Some(hz);
        Ok(hz)
    }
}

/// Process-wide calibrated frequency.
///
/// Measures at most once per process; later calls (from any thread) read
/// the first result. Frequency scaling after the measurement is not
/// detected.
pub fn process_frequency(source: &mut dyn TimeSource) -> Result<f64> {
    if let Some(hz) = PROCESS_FREQUENCY.get() {
        return Ok(*hz);
    }
    let mut ctx = CalibrationContext::uncalibrated();
    let hz = ctx.calibrate(source)?;
    Ok(*PROCESS_FREQUENCY.call_once(|| hz))
}

/// Convert a cycle-counter interval to `unit`.
///
/// `Cycles` returns the raw delta; wall-clock units need `frequency` and
/// fail with [`HwError::Uncalibrated`] without one.
pub fn convert(start: u64, end: u64, unit: TimeUnit, frequency: Option<f64>) -> Result<f64> {
    let delta = end.wrapping_sub(start);
    if !unit.needs_frequency() {
        return Ok(delta as f64);
    }
    let hz = frequency.ok_or(HwError::Uncalibrated)?;
    Ok(delta as f64 * unit.scale() / hz)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_extension_monotonic_across_wrap() {
        let mut high = 0u64;
        let mut last = 0u32;
        let a = extend_counter(&mut high, &mut last, 0xFFFF_FFF0);
        let b = extend_counter(&mut high, &mut last, 0x0000_0010);
        assert!(b > a);
        assert_eq!(b, (1u64 << 32) + 0x10);
    }

    #[test]
    fn test_counter_extension_counts_multiple_wraps() {
        let mut high = 0u64;
        let mut last = 0u32;
        extend_counter(&mut high, &mut last, 0x8000_0000);
        extend_counter(&mut high, &mut last, 0x1000);
        extend_counter(&mut high, &mut last, 0x2000);
        let v = extend_counter(&mut high, &mut last, 0x0100);
        assert_eq!(v, (2u64 << 32) + 0x100);
    }

    /// Deterministic time source: the platform timer jumps past the
    /// deadline on the second sample, cycles advance a fixed amount per
    /// sample.
    struct MockSource {
        ticks: u64,
        cycles: u64,
        tick_samples: usize,
    }

    impl TimeSource for MockSource {
        fn platform_ticks(&mut self) -> Result<u64> {
            self.tick_samples += 1;
            self.ticks += CALIBRATION_TICKS;
            Ok(self.ticks)
        }

        fn cycles(&mut self) -> u64 {
            self.cycles += 10_000_000_000;
            self.cycles
        }
    }

    #[test]
    fn test_hpet_cycle_samples_are_monotonic() {
        // cycles() never touches the counter mapping, only the serialized
        // cycle-counter read.
        let mem = MemDevice::new();
        let mut hpet = Hpet::at_base(&mem, 0xFED0_0000);
        let a = hpet.cycles();
        let b = hpet.cycles();
        assert!(b >= a);
    }

    #[test]
    fn test_calibration_derives_and_caches() {
        let mut source = MockSource {
            ticks: 0,
            cycles: 0,
            tick_samples: 0,
        };
        let mut ctx = CalibrationContext::uncalibrated();
        assert!(!ctx.is_calibrated());

        let hz = ctx.calibrate(&mut source).unwrap();
        // One cycle sample at each end of the window: delta / 5.
        assert_eq!(hz, 10_000_000_000.0 / 5.0);
        assert!(ctx.is_calibrated());

        let samples_after_first = source.tick_samples;
        let hz2 = ctx.calibrate(&mut source).unwrap();
        assert_eq!(hz.to_bits(), hz2.to_bits());
        // Second call must not re-enter the measurement window.
        assert_eq!(source.tick_samples, samples_after_first);
    }

    #[test]
    fn test_supplied_frequency_skips_measurement() {
        let mut source = MockSource {
            ticks: 0,
            cycles: 0,
            tick_samples: 0,
        };
        let mut ctx = CalibrationContext::with_frequency(3.2e9);
        assert_eq!(ctx.calibrate(&mut source).unwrap(), 3.2e9);
        assert_eq!(source.tick_samples, 0);
    }

    #[test]
    fn test_convert_units() {
        let freq = Some(2_000_000_000.0);
        assert_eq!(convert(100, 1100, TimeUnit::Cycles, None).unwrap(), 1000.0);
        assert_eq!(
            convert(0, 2_000_000_000, TimeUnit::Seconds, freq).unwrap(),
            1.0
        );
        assert_eq!(convert(0, 2_000_000, TimeUnit::Millis, freq).unwrap(), 1.0);
        assert_eq!(convert(0, 2_000, TimeUnit::Micros, freq).unwrap(), 1.0);
        assert_eq!(convert(0, 2, TimeUnit::Nanos, freq).unwrap(), 1.0);
        assert!(matches!(
            convert(0, 10, TimeUnit::Seconds, None),
            Err(HwError::Uncalibrated)
        ));
    }
}
