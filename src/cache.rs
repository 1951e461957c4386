// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Data cache maintenance by virtual address.
//!
//! PEs which have just been powered up may not be coherent with the PE which wrote their
//! dispatch slot, so every write to shared dispatch memory is cleaned and invalidated to the
//! point of coherency by the writer, and every read is preceded by an invalidate.

/// Cache maintenance operations over a range of virtual addresses.
pub trait CacheMaintenance {
    /// Cleans and invalidates the data cache lines covering `len` bytes from `start`.
    fn clean_invalidate(&self, start: usize, len: usize);

    /// Invalidates the data cache lines covering `len` bytes from `start`.
    fn invalidate(&self, start: usize, len: usize);
}

/// Cache maintenance using `DC CIVAC` and `DC IVAC`, followed by a `DSB SY`.
#[cfg(all(target_arch = "aarch64", not(test)))]
#[derive(Clone, Copy, Debug, Default)]
pub struct Aarch64Cache;

#[cfg(all(target_arch = "aarch64", not(test)))]
impl Aarch64Cache {
    /// Returns the smallest data cache line size in bytes, from `CTR_EL0.DminLine`.
    fn line_size() -> usize {
        let ctr: u64;
        // SAFETY: Reading `CTR_EL0` has no side effects.
        unsafe {
            core::arch::asm!("mrs {ctr}, ctr_el0", ctr = out(reg) ctr, options(nomem, nostack));
        }
        4 << ((ctr >> 16) & 0xf)
    }

    fn lines(start: usize, len: usize) -> impl Iterator<Item = usize> {
        let line = Self::line_size();
        let first = start & !(line - 1);
        (first..start + len).step_by(line)
    }
}

#[cfg(all(target_arch = "aarch64", not(test)))]
impl CacheMaintenance for Aarch64Cache {
    fn clean_invalidate(&self, start: usize, len: usize) {
        for address in Self::lines(start, len) {
            // SAFETY: Cleaning and invalidating a line writes back its current contents, so no
            // memory visible to Rust changes value.
            unsafe {
                core::arch::asm!(
                    "dc civac, {address}",
                    address = in(reg) address,
                    options(nostack),
                );
            }
        }
        // SAFETY: A barrier has no effect on memory safety.
        unsafe {
            core::arch::asm!("dsb sy", options(nostack));
        }
    }

    fn invalidate(&self, start: usize, len: usize) {
        for address in Self::lines(start, len) {
            // SAFETY: The ranges passed here are only ever shared dispatch slots, which the
            // current PE does not hold dirty in its cache when it reads them.
            unsafe {
                core::arch::asm!(
                    "dc ivac, {address}",
                    address = in(reg) address,
                    options(nostack),
                );
            }
        }
        // SAFETY: A barrier has no effect on memory safety.
        unsafe {
            core::arch::asm!("dsb sy", options(nostack));
        }
    }
}

/// Cache maintenance for hosts where all observers are coherent, such as a kernel driver's
/// user-space client or unit tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct CoherentCache;

impl CacheMaintenance for CoherentCache {
    fn clean_invalidate(&self, _start: usize, _len: usize) {}

    fn invalidate(&self, _start: usize, _len: usize) {}
}
