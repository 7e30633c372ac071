//! Cycle counter (TSC) bindings.
//!
//! # Safety
//! Reads are always safe. Interval math assumes an invariant TSC.

/// Read the cycle counter (non-serializing).
///
/// Fast, but may be reordered with surrounding instructions; never use it
/// to bracket a measured interval.
#[cfg(target_arch = "x86_64")]
#[inline]
pub fn read_tsc() -> u64 {
    let lo: u32;
    let hi: u32;
    unsafe {
        core::arch::asm!(
            "rdtsc",
            out("eax") lo,
            out("edx") hi,
            options(nomem, nostack)
        );
    }
    ((hi as u64) << 32) | lo as u64
}

/// Read the cycle counter with serializing fences on both sides.
///
/// Slower, but neither the read nor the instructions around it can drift
/// across the sample. Required at both ends of every measured interval.
#[cfg(target_arch = "x86_64")]
#[inline]
pub fn read_tsc_serialized() -> u64 {
    core::sync::atomic::compiler_fence(core::sync::atomic::Ordering::SeqCst);
    let lo: u32;
    let hi: u32;
    unsafe {
        core::arch::asm!(
            "lfence",
            "rdtsc",
            "lfence",
            out("eax") lo,
            out("edx") hi,
            options(nomem, nostack)
        );
    }
    core::sync::atomic::compiler_fence(core::sync::atomic::Ordering::SeqCst);
    ((hi as u64) << 32) | lo as u64
}

/// Stub for non-x86_64 targets.
#[cfg(not(target_arch = "x86_64"))]
#[inline]
pub fn read_tsc() -> u64 {
    0
}

/// Stub for non-x86_64 targets.
#[cfg(not(target_arch = "x86_64"))]
#[inline]
pub fn read_tsc_serialized() -> u64 {
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn test_tsc_advances() {
        let a = read_tsc_serialized();
        let b = read_tsc_serialized();
        assert!(b >= a);
    }
}
