// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Bounded busy-polling.
//!
//! There is no way to cancel work running on another PE or inside the kernel driver, so waiting
//! is only ever a bounded poll which reports whether the condition was seen in time.

use core::cell::Cell;

/// The outcome of a bounded wait.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[must_use]
pub enum WaitResult {
    /// The condition became true within the budget.
    Completed,
    /// The budget ran out first. Whatever was being waited for may still be running.
    TimedOut,
}

/// A monotonic time source for polling loops.
pub trait Clock {
    /// Returns the current time in ticks. Ticks only need to be monotonic.
    fn now(&self) -> u64;

    /// Called between two polls.
    fn relax(&self) {
        core::hint::spin_loop();
    }
}

/// A clock which advances by one tick every time it is read, so a budget counts polls.
#[derive(Debug, Default)]
pub struct PollCounter {
    ticks: Cell<u64>,
}

impl PollCounter {
    /// Creates a new counter starting at zero.
    pub const fn new() -> Self {
        Self {
            ticks: Cell::new(0),
        }
    }
}

impl Clock for PollCounter {
    fn now(&self) -> u64 {
        let now = self.ticks.get();
        self.ticks.set(now.wrapping_add(1));
        now
    }
}

/// Polls `done` until it returns true or `budget` ticks of `clock` have passed.
///
/// `done` is always evaluated at least once, and once more after the budget expires so that a
/// condition which became true during the last relax is not reported as a timeout.
pub fn poll_until<K: Clock + ?Sized>(
    clock: &K,
    budget: u64,
    mut done: impl FnMut() -> bool,
) -> WaitResult {
    let start = clock.now();
    loop {
        if done() {
            return WaitResult::Completed;
        }
        if clock.now().wrapping_sub(start) >= budget {
            return if done() {
                WaitResult::Completed
            } else {
                WaitResult::TimedOut
            };
        }
        clock.relax();
    }
}
