// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Shared test-dispatch memory: one slot per PE.
//!
//! A slot has exactly one writer at a time. The dispatcher writes the job before powering the
//! target PE on, then the target writes its status before powering itself off. Every access
//! goes through the cache maintenance discipline in [`crate::cache`].

use crate::{cache::CacheMaintenance, status::TestStatus};
use alloc::{boxed::Box, vec::Vec};
use core::{
    mem::size_of,
    sync::atomic::{AtomicU32, AtomicU64, Ordering},
};
use thiserror::Error;

/// The requested PE index has no slot.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
#[error("PE index {0} has no dispatch slot")]
pub struct InvalidPeIndex(pub usize);

/// One PE's slot. Each slot occupies whole cache lines so that maintenance on one slot never
/// touches another.
#[derive(Debug, Default)]
#[repr(C, align(64))]
struct Slot {
    data0: AtomicU64,
    data1: AtomicU64,
    status: AtomicU32,
}

impl Slot {
    fn address(&self) -> usize {
        self as *const Self as usize
    }
}

/// The dispatch slots for every PE, together with the cache maintainer used to access them.
#[derive(Debug)]
pub struct SharedMemory<C: CacheMaintenance> {
    slots: Box<[Slot]>,
    cache: C,
}

impl<C: CacheMaintenance> SharedMemory<C> {
    /// Allocates one zeroed slot per PE.
    pub fn new(num_pe: usize, cache: C) -> Self {
        let mut slots = Vec::with_capacity(num_pe);
        slots.resize_with(num_pe, Slot::default);
        Self {
            slots: slots.into_boxed_slice(),
            cache,
        }
    }

    /// Returns the number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if there are no slots.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Returns the cache maintainer.
    pub fn cache(&self) -> &C {
        &self.cache
    }

    fn slot(&self, index: usize) -> Result<&Slot, InvalidPeIndex> {
        self.slots.get(index).ok_or(InvalidPeIndex(index))
    }

    fn publish(&self, slot: &Slot) {
        self.cache.clean_invalidate(slot.address(), size_of::<Slot>());
    }

    fn refresh(&self, slot: &Slot) {
        self.cache.invalidate(slot.address(), size_of::<Slot>());
    }

    /// Writes the two data words of a PE's slot and pushes them to the point of coherency.
    pub fn set_data(&self, index: usize, data0: u64, data1: u64) -> Result<(), InvalidPeIndex> {
        let slot = self.slot(index)?;
        slot.data0.store(data0, Ordering::Relaxed);
        slot.data1.store(data1, Ordering::Relaxed);
        self.publish(slot);
        Ok(())
    }

    /// Reads the two data words of a PE's slot, invalidating first.
    pub fn data(&self, index: usize) -> Result<(u64, u64), InvalidPeIndex> {
        let slot = self.slot(index)?;
        self.refresh(slot);
        Ok((
            slot.data0.load(Ordering::Relaxed),
            slot.data1.load(Ordering::Relaxed),
        ))
    }

    /// Writes a PE's status word and pushes it to the point of coherency.
    pub fn set_status(&self, index: usize, status: TestStatus) -> Result<(), InvalidPeIndex> {
        let slot = self.slot(index)?;
        slot.status.store(status.0, Ordering::Relaxed);
        self.publish(slot);
        Ok(())
    }

    /// Reads a PE's status word, invalidating first.
    pub fn status(&self, index: usize) -> Result<TestStatus, InvalidPeIndex> {
        let slot = self.slot(index)?;
        self.refresh(slot);
        Ok(TestStatus(slot.status.load(Ordering::Relaxed)))
    }
}
