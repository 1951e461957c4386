// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! What a PE does when the dispatcher powers it on: run the job in its slot, then power off.

use super::{PayloadContext, TestEnvironment, find_test, protocol::Job};
use crate::{
    cache::CacheMaintenance,
    psci::PowerControl,
    status::{SUB_CODE_UNKNOWN_JOB, TestStatus},
};
use alloc::sync::Arc;
use arm_psci::ErrorCode;
use core::mem::{size_of, size_of_val};
use log::{debug, error};
use spin::Once;

/// Hands the dispatch environment to PEs which the dispatcher powers on.
///
/// A PE which has just been powered on may not be coherent with the PE which published the
/// environment, so the publisher cleans the cell, the environment and the PE table to the point
/// of coherency, and a reader invalidates each of them before dereferencing it.
pub struct EnvironmentCell<C: CacheMaintenance> {
    env: Once<Arc<TestEnvironment<C>>>,
}

impl<C: CacheMaintenance> EnvironmentCell<C> {
    /// Creates an empty cell.
    pub const fn new() -> Self {
        Self { env: Once::new() }
    }

    /// Publishes `env`, unless an environment was already published, and cleans everything a
    /// secondary PE reads to find its slot.
    pub fn publish(&self, env: Arc<TestEnvironment<C>>, cache: &C) {
        let env = self.env.call_once(|| env);
        let entries = env.pe_table.entries();
        cache.clean_invalidate(Arc::as_ptr(env) as usize, size_of::<TestEnvironment<C>>());
        cache.clean_invalidate(entries.as_ptr() as usize, size_of_val(entries));
        cache.clean_invalidate(self as *const Self as usize, size_of::<Self>());
    }

    /// Returns the published environment, if any, invalidating each level before reading it.
    pub fn get(&self, cache: &C) -> Option<&Arc<TestEnvironment<C>>> {
        cache.invalidate(self as *const Self as usize, size_of::<Self>());
        let env = self.env.get()?;
        cache.invalidate(Arc::as_ptr(env) as usize, size_of::<TestEnvironment<C>>());
        let entries = env.pe_table.entries();
        cache.invalidate(entries.as_ptr() as usize, size_of_val(entries));
        Some(env)
    }
}

impl<C: CacheMaintenance> Default for EnvironmentCell<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs the job in PE `pe_index`'s slot and then powers the PE off.
///
/// Only returns if CPU_OFF fails, or with `Ok` if the power controller does not actually power
/// the PE off.
pub fn secondary_main<C: CacheMaintenance, P: PowerControl>(
    env: &TestEnvironment<C>,
    power: &P,
    pe_index: usize,
) -> Result<(), ErrorCode> {
    match env.shared.data(pe_index).map(Job::try_from) {
        Ok(Ok(Job::Run {
            test_num,
            level,
            arg,
        })) => match find_test(test_num) {
            Some(test) => {
                debug!("PE {pe_index} running test {test_num}");
                (test.payload)(&PayloadContext::new(env, pe_index, test_num, level, arg));
            }
            None => {
                error!("PE {pe_index}: no payload registered for test {test_num}");
                if let Err(e) = env.shared.set_status(
                    pe_index,
                    TestStatus::fail(level, test_num, SUB_CODE_UNKNOWN_JOB),
                ) {
                    error!("{e}");
                }
            }
        },
        Ok(Ok(Job::Idle)) => debug!("PE {pe_index} woken with no job"),
        Ok(Err(e)) => {
            error!("PE {pe_index}: {e}");
            // The level and test number are unknown, but the status must leave pending.
            if let Ok(status) = env.shared.status(pe_index) {
                let failed =
                    TestStatus::fail(status.level(), status.test_num(), SUB_CODE_UNKNOWN_JOB);
                if let Err(e) = env.shared.set_status(pe_index, failed) {
                    error!("{e}");
                }
            }
        }
        Err(e) => error!("{e}"),
    }
    power.cpu_off()
}

#[cfg(all(target_arch = "aarch64", not(test)))]
mod aarch64 {
    use super::{EnvironmentCell, secondary_main};
    use crate::{cache::Aarch64Cache, framework::TestEnvironment, psci::SmcPowerControl};
    use alloc::sync::Arc;
    use log::error;

    static ENVIRONMENT: EnvironmentCell<Aarch64Cache> = EnvironmentCell::new();

    /// Makes the dispatch environment available to PEs started by the dispatcher. Must be called
    /// before the first remote dispatch.
    pub fn publish_environment(env: Arc<TestEnvironment<Aarch64Cache>>) {
        ENVIRONMENT.publish(env, &Aarch64Cache);
    }

    /// Rust entry point for PEs powered on by the dispatcher, called by the platform's secondary
    /// entry code with the PE index passed as the CPU_ON context ID.
    #[unsafe(no_mangle)]
    pub extern "C" fn sbsa_secondary_main(context_id: u64) -> ! {
        match ENVIRONMENT.get(&Aarch64Cache) {
            Some(env) => {
                let power = SmcPowerControl { entry_point: 0 };
                if let Err(e) = secondary_main(env, &power, context_id as usize) {
                    error!("CPU_OFF failed on PE {context_id}: {e:?}");
                }
            }
            None => error!("PE {context_id} started before the dispatch environment was published"),
        }
        loop {
            // SAFETY: Waiting for an interrupt has no effect on memory safety.
            unsafe {
                core::arch::asm!("wfi", options(nomem, nostack));
            }
        }
    }
}

#[cfg(all(target_arch = "aarch64", not(test)))]
pub use aarch64::{publish_environment, sbsa_secondary_main};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cache::{
            CoherentCache,
            fake::{CacheOp, RecordingCache},
        },
        framework::PeScope,
        pe::PeInfoTable,
        registers::RegisterMap,
        sbsa_test,
        suite::Module,
    };
    use core::cell::Cell;

    #[derive(Default)]
    struct CountingPower {
        offs: Cell<u32>,
    }

    impl PowerControl for CountingPower {
        fn cpu_on(&self, _target_mpidr: u64, _context_id: u64) -> Result<(), ErrorCode> {
            Err(ErrorCode::NotSupported)
        }

        fn cpu_off(&self) -> Result<(), ErrorCode> {
            self.offs.set(self.offs.get() + 1);
            Err(ErrorCode::Denied)
        }
    }

    fn echo_arg(context: &PayloadContext) {
        if context.arg() == 0x5a {
            context.pass();
        } else {
            context.fail(1);
        }
    }
    sbsa_test!(Module::Secure, 1020, "Echo argument", PeScope::AllPes, echo_arg);

    fn environment() -> TestEnvironment<CoherentCache> {
        TestEnvironment::new(
            PeInfoTable::from_mpidrs(&[0, 1]).unwrap(),
            CoherentCache,
            RegisterMap::EMPTY,
        )
    }

    #[test]
    fn environment_cell_maintains_published_ranges() {
        let cell = EnvironmentCell::<RecordingCache>::new();
        let cache = RecordingCache::default();
        assert!(cell.get(&cache).is_none());
        let cell_range = (
            &cell as *const EnvironmentCell<RecordingCache> as usize,
            size_of::<EnvironmentCell<RecordingCache>>(),
        );
        assert_eq!(
            cache.take(),
            [CacheOp::Invalidate {
                start: cell_range.0,
                len: cell_range.1
            }]
        );

        let env = Arc::new(TestEnvironment::new(
            PeInfoTable::from_mpidrs(&[0, 1]).unwrap(),
            RecordingCache::default(),
            RegisterMap::EMPTY,
        ));
        let env_start = Arc::as_ptr(&env) as usize;
        let env_len = size_of::<TestEnvironment<RecordingCache>>();
        let entries = env.pe_table.entries();
        let entries_start = entries.as_ptr() as usize;
        let entries_len = size_of_val(entries);

        cell.publish(env.clone(), &cache);
        assert_eq!(
            cache.take(),
            [
                CacheOp::CleanInvalidate {
                    start: env_start,
                    len: env_len
                },
                CacheOp::CleanInvalidate {
                    start: entries_start,
                    len: entries_len
                },
                CacheOp::CleanInvalidate {
                    start: cell_range.0,
                    len: cell_range.1
                },
            ]
        );

        let published = cell.get(&cache).unwrap();
        assert!(Arc::ptr_eq(published, &env));
        assert_eq!(
            cache.take(),
            [
                CacheOp::Invalidate {
                    start: cell_range.0,
                    len: cell_range.1
                },
                CacheOp::Invalidate {
                    start: env_start,
                    len: env_len
                },
                CacheOp::Invalidate {
                    start: entries_start,
                    len: entries_len
                },
            ]
        );
    }

    #[test]
    fn environment_cell_keeps_first_environment() {
        let cell = EnvironmentCell::<CoherentCache>::default();
        let first = Arc::new(environment());
        cell.publish(first.clone(), &CoherentCache);
        cell.publish(Arc::new(environment()), &CoherentCache);
        assert!(Arc::ptr_eq(cell.get(&CoherentCache).unwrap(), &first));
    }

    #[test]
    fn runs_job_then_powers_off() {
        let env = environment();
        let (data0, data1) = Job::Run {
            test_num: 1020,
            level: 5,
            arg: 0x5a,
        }
        .into();
        env.shared.set_data(1, data0, data1).unwrap();
        let power = CountingPower::default();
        assert_eq!(secondary_main(&env, &power, 1), Err(ErrorCode::Denied));
        assert_eq!(power.offs.get(), 1);
        assert_eq!(env.shared.status(1), Ok(TestStatus::pass(5, 1020, 0)));
    }

    #[test]
    fn unregistered_test_fails() {
        let env = environment();
        let (data0, data1) = Job::Run {
            test_num: 4040,
            level: 4,
            arg: 0,
        }
        .into();
        env.shared.set_data(1, data0, data1).unwrap();
        let power = CountingPower::default();
        let _ = secondary_main(&env, &power, 1);
        assert_eq!(
            env.shared.status(1),
            Ok(TestStatus::fail(4, 4040, SUB_CODE_UNKNOWN_JOB))
        );
    }

    #[test]
    fn garbage_slot_fails_pending_status() {
        let env = environment();
        env.shared.set_data(1, 0xffff_0000_8000_1000, 0).unwrap();
        env.shared.set_status(1, TestStatus::pending(4, 12)).unwrap();
        let power = CountingPower::default();
        let _ = secondary_main(&env, &power, 1);
        assert_eq!(
            env.shared.status(1),
            Ok(TestStatus::fail(4, 12, SUB_CODE_UNKNOWN_JOB))
        );
        assert_eq!(power.offs.get(), 1);
    }
}
