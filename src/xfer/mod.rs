//! Timed bulk transfers against mapped physical windows.
//!
//! One window sized to the whole transfer stays mapped for the duration of
//! the timed operation; the copy itself runs between two serialized
//! cycle-counter samples, so the reported time covers the data movement and
//! nothing else. Copies go through the [`BulkCopy`] seam, selected at
//! runtime by architecture and transfer size.
//!
//! # Safety
//! Copy implementations move raw bytes between a mapped device window and
//! process memory; the public entry points derive both pointers from
//! bounds-checked sources.

use crate::error::{HwError, Result};
use crate::mem::MemDevice;
use crate::time::{convert, read_tsc_serialized, CalibrationContext};
use crate::types::{AccessWidth, TimeUnit};

/// Cap on one scalar transfer.
pub const MAX_SCALAR_TRANSFER: u64 = 512 * 1024 * 1024;

/// Granularity of the block transfer path.
pub const BLOCK_SIZE: usize = 4096;

/// Bulk-copy strategy.
///
/// `copy` moves `count` elements of `width`; `copy_blocks` moves
/// [`BLOCK_SIZE`]-byte units with a store fence after each block.
pub trait BulkCopy {
    /// # Safety
    /// `src` and `dst` must be valid for `count * width.bytes()` bytes,
    /// aligned to the width, and must not overlap.
    unsafe fn copy(&self, src: *const u8, dst: *mut u8, count: usize, width: AccessWidth);

    /// # Safety
    /// `src` and `dst` must be valid for `blocks * BLOCK_SIZE` bytes and
    /// must not overlap.
    unsafe fn copy_blocks(&self, src: *const u8, dst: *mut u8, blocks: usize) {
        for i in 0..blocks {
            let off = i * BLOCK_SIZE;
            self.copy(src.add(off), dst.add(off), BLOCK_SIZE, AccessWidth::Byte);
            store_fence();
        }
    }
}

#[cfg(target_arch = "x86_64")]
#[inline]
fn store_fence() {
    unsafe { core::arch::asm!("mfence", options(nostack, preserves_flags)) };
}

#[cfg(not(target_arch = "x86_64"))]
#[inline]
fn store_fence() {
    core::sync::atomic::fence(core::sync::atomic::Ordering::SeqCst);
}

/// Portable fallback: one volatile access per element, width honored
/// exactly.
#[derive(Debug, Clone, Copy)]
pub struct ScalarCopy;

impl BulkCopy for ScalarCopy {
    unsafe fn copy(&self, src: *const u8, dst: *mut u8, count: usize, width: AccessWidth) {
        match width {
            AccessWidth::Byte => {
                for i in 0..count {
                    dst.add(i).write_volatile(src.add(i).read_volatile());
                }
            }
            AccessWidth::Word => {
                let src = src as *const u16;
                let dst = dst as *mut u16;
                for i in 0..count {
                    dst.add(i).write_volatile(src.add(i).read_volatile());
                }
            }
            AccessWidth::Dword => {
                let src = src as *const u32;
                let dst = dst as *mut u32;
                for i in 0..count {
                    dst.add(i).write_volatile(src.add(i).read_volatile());
                }
            }
            AccessWidth::Qword => {
                let src = src as *const u64;
                let dst = dst as *mut u64;
                for i in 0..count {
                    dst.add(i).write_volatile(src.add(i).read_volatile());
                }
            }
        }
    }
}

/// String-move copy with a trailing store fence.
#[cfg(target_arch = "x86_64")]
#[derive(Debug, Clone, Copy)]
pub struct RepMovsCopy;

#[cfg(target_arch = "x86_64")]
impl BulkCopy for RepMovsCopy {
    unsafe fn copy(&self, src: *const u8, dst: *mut u8, count: usize, width: AccessWidth) {
        match width {
            AccessWidth::Byte => core::arch::asm!(
                "cld",
                "rep movsb",
                "mfence",
                inout("rsi") src => _,
                inout("rdi") dst => _,
                inout("rcx") count => _,
                options(nostack)
            ),
            AccessWidth::Word => core::arch::asm!(
                "cld",
                "rep movsw",
                "mfence",
                inout("rsi") src => _,
                inout("rdi") dst => _,
                inout("rcx") count => _,
                options(nostack)
            ),
            AccessWidth::Dword => core::arch::asm!(
                "cld",
                "rep movsd",
                "mfence",
                inout("rsi") src => _,
                inout("rdi") dst => _,
                inout("rcx") count => _,
                options(nostack)
            ),
            AccessWidth::Qword => core::arch::asm!(
                "cld",
                "rep movsq",
                "mfence",
                inout("rsi") src => _,
                inout("rdi") dst => _,
                inout("rcx") count => _,
                options(nostack)
            ),
        }
    }
}

static SCALAR: ScalarCopy = ScalarCopy;
#[cfg(target_arch = "x86_64")]
static REP_MOVS: RepMovsCopy = RepMovsCopy;

/// Pick a copy strategy for this transfer.
///
/// Short transfers stay on the scalar path; the string-move setup cost
/// only pays off past a few cache lines.
pub fn select_copy(_width: AccessWidth, len: u64) -> &'static dyn BulkCopy {
    #[cfg(target_arch = "x86_64")]
    {
        if len >= 64 {
            return &REP_MOVS;
        }
    }
    let _ = len;
    &SCALAR
}

fn check_unit(unit: TimeUnit, cal: &CalibrationContext) -> Result<()> {
    if unit.needs_frequency() && !cal.is_calibrated() {
        return Err(HwError::Uncalibrated);
    }
    Ok(())
}

fn check_cap(len: u64) -> Result<()> {
    if len > MAX_SCALAR_TRANSFER {
        return Err(HwError::TransferTooLarge { len });
    }
    Ok(())
}

fn check_align(addr: u64, width: AccessWidth) -> Result<()> {
    if addr % width.bytes() as u64 != 0 {
        return Err(HwError::Misaligned {
            offset: addr as usize,
            width: width.bytes(),
        });
    }
    Ok(())
}

/// Zeroed u64-backed buffer of at least `byte_len` bytes; keeps every
/// access width aligned on the process-memory side of a copy.
fn aligned_buf(byte_len: usize) -> Vec<u64> {
    vec![0u64; byte_len.div_ceil(8)]
}

/// Timed scalar read of `len` bytes at `addr`.
///
/// Reads ⌈len / width⌉ elements, so the returned buffer is padded up to a
/// whole element. `addr` must be aligned to `width`; unit, cap, and
/// alignment checks run before anything is mapped.
pub fn timed_read(
    mem: &MemDevice,
    addr: u64,
    len: u64,
    width: AccessWidth,
    unit: TimeUnit,
    cal: &CalibrationContext,
) -> Result<(f64, Vec<u8>)> {
    check_unit(unit, cal)?;
    check_cap(len)?;
    check_align(addr, width)?;
    let count = width.count_for(len) as usize;
    let byte_len = count * width.bytes();

    let window = mem.map(addr, byte_len)?;
    let src = window.ptr_at(window.offset(), byte_len)?;
    let mut staging = aligned_buf(byte_len);
    let copy = select_copy(width, byte_len as u64);

    let start = read_tsc_serialized();
    unsafe { copy.copy(src, staging.as_mut_ptr() as *mut u8, count, width) };
    let end = read_tsc_serialized();

    let elapsed = convert(start, end, unit, cal.frequency())?;
    let buf =
        unsafe { core::slice::from_raw_parts(staging.as_ptr() as *const u8, byte_len) }.to_vec();
    Ok((elapsed, buf))
}

/// Timed scalar write of `data` to `addr`.
///
/// When `data` is not a whole number of elements the tail element is
/// zero-padded before the copy. `addr` must be aligned to `width`.
pub fn timed_write(
    mem: &MemDevice,
    addr: u64,
    width: AccessWidth,
    unit: TimeUnit,
    cal: &CalibrationContext,
    data: &[u8],
) -> Result<f64> {
    check_unit(unit, cal)?;
    check_cap(data.len() as u64)?;
    check_align(addr, width)?;
    let count = width.count_for(data.len() as u64) as usize;
    let byte_len = count * width.bytes();

    let mut staging = aligned_buf(byte_len);
    (unsafe { core::slice::from_raw_parts_mut(staging.as_mut_ptr() as *mut u8, byte_len) })
        [..data.len()]
        .copy_from_slice(data);

    let window = mem.map(addr, byte_len)?;
    let dst = window.ptr_at(window.offset(), byte_len)?;
    let copy = select_copy(width, byte_len as u64);

    let start = read_tsc_serialized();
    unsafe { copy.copy(staging.as_ptr() as *const u8, dst, count, width) };
    let end = read_tsc_serialized();

    convert(start, end, unit, cal.frequency())
}

/// Timed block read of `blocks` 4 KiB units at `addr` into `buf`.
pub fn timed_block_read(
    mem: &MemDevice,
    addr: u64,
    blocks: usize,
    unit: TimeUnit,
    cal: &CalibrationContext,
    buf: &mut [u8],
) -> Result<f64> {
    check_unit(unit, cal)?;
    let byte_len = blocks * BLOCK_SIZE;
    if buf.len() < byte_len {
        return Err(HwError::BufferTooSmall {
            needed: byte_len,
            got: buf.len(),
        });
    }

    let window = mem.map(addr, byte_len)?;
    let src = window.ptr_at(window.offset(), byte_len)?;
    let copy = select_copy(AccessWidth::Byte, byte_len as u64);

    let start = read_tsc_serialized();
    unsafe { copy.copy_blocks(src, buf.as_mut_ptr(), blocks) };
    let end = read_tsc_serialized();

    convert(start, end, unit, cal.frequency())
}

/// Timed block write of `blocks` 4 KiB units from `buf` to `addr`.
pub fn timed_block_write(
    mem: &MemDevice,
    addr: u64,
    blocks: usize,
    unit: TimeUnit,
    cal: &CalibrationContext,
    buf: &[u8],
) -> Result<f64> {
    check_unit(unit, cal)?;
    let byte_len = blocks * BLOCK_SIZE;
    if buf.len() < byte_len {
        return Err(HwError::BufferTooSmall {
            needed: byte_len,
            got: buf.len(),
        });
    }

    let window = mem.map(addr, byte_len)?;
    let dst = window.ptr_at(window.offset(), byte_len)?;
    let copy = select_copy(AccessWidth::Byte, byte_len as u64);

    let start = read_tsc_serialized();
    unsafe { copy.copy_blocks(buf.as_ptr(), dst, blocks) };
    let end = read_tsc_serialized();

    convert(start, end, unit, cal.frequency())
}

/// Single timed dword read: access latency plus the value.
pub fn timed_probe(
    mem: &MemDevice,
    addr: u64,
    unit: TimeUnit,
    cal: &CalibrationContext,
) -> Result<(f64, u32)> {
    check_unit(unit, cal)?;
    let window = mem.map(addr, 4)?;

    let start = read_tsc_serialized();
    let value = window.read32_at(window.offset())?;
    let end = read_tsc_serialized();

    Ok((convert(start, end, unit, cal.frequency())?, value))
}
