// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Running a test payload on the calling PE and on any other PEs it targets, and consolidating
//! their statuses into one verdict.
//!
//! Remote PEs are used one-shot: the dispatcher writes a job into the target's slot and powers
//! it on with PSCI CPU_ON, the target runs the job, writes its status and powers itself off with
//! CPU_OFF. There is no way to cancel a remote PE, so waiting for one is bounded and a PE which
//! never reports is recorded as failed.

use super::{PayloadContext, PeScope, TestEntry, TestEnvironment, protocol::Job};
use crate::{
    cache::CacheMaintenance,
    options::SkipList,
    pe::psci_mpidr,
    poll::{Clock, WaitResult, poll_until},
    psci::{PowerControl, error_magnitude},
    shared_mem::InvalidPeIndex,
    status::{
        Outcome, SUB_CODE_CPU_ON_BASE, SUB_CODE_INVALID_PE, SUB_CODE_TIMEOUT, TestStatus,
    },
};
use alloc::sync::Arc;
use arm_psci::ErrorCode;
use log::{debug, error, info, warn};
use thiserror::Error;

/// Dispatcher tunables.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DispatchConfig {
    /// The compliance level recorded in every status word.
    pub level: u32,
    /// How many clock ticks to wait for remote PEs before recording a timeout.
    pub timeout: u64,
    /// How many times to try CPU_ON while the target still reports that it is on.
    pub cpu_on_retries: u32,
}

impl DispatchConfig {
    /// The default remote PE timeout, in polls.
    pub const DEFAULT_TIMEOUT: u64 = 0x100_0000;
    /// The default number of CPU_ON attempts.
    pub const DEFAULT_CPU_ON_RETRIES: u32 = 16;
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            level: 4,
            timeout: Self::DEFAULT_TIMEOUT,
            cpu_on_retries: Self::DEFAULT_CPU_ON_RETRIES,
        }
    }
}

/// Whether a test may run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[must_use]
pub enum Admission {
    /// Run the payload.
    Run,
    /// The test is in the skip list; do not run the payload.
    Skip,
}

/// The consolidated result of one test.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Verdict {
    /// The consolidated outcome.
    pub outcome: Outcome,
    /// The PE whose status decided the outcome.
    pub pe_index: usize,
    /// That PE's status word.
    pub status: TestStatus,
}

/// Running totals across a suite.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Counters {
    /// Tests initialised, including skipped ones.
    pub total: u32,
    /// Tests which passed.
    pub passed: u32,
    /// Tests which failed.
    pub failed: u32,
}

/// Errors dispatching a job to a remote PE. Each one has also been recorded as a FAIL status.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum DispatchError {
    /// The target index is outside the PE table.
    #[error(transparent)]
    InvalidPeIndex(#[from] InvalidPeIndex),
    /// PSCI refused to power on the target.
    #[error("CPU_ON for PE {index} (MPIDR {mpidr:#x}) failed: {error:?}")]
    CpuOn {
        /// The target PE index.
        index: usize,
        /// The target MPIDR.
        mpidr: u64,
        /// The last error PSCI returned.
        error: ErrorCode,
    },
}

/// Returns the slot indices a test on `pe_count` PEs touches: the first `pe_count` PEs of the
/// table, plus the calling PE if it is not among them.
fn targets(pe_count: usize, num_pe: usize, my_index: usize) -> impl Iterator<Item = usize> {
    let count = pe_count.min(num_pe);
    (0..count).chain((my_index >= count).then_some(my_index))
}

/// Runs tests on the calling PE and on remote PEs.
pub struct Dispatcher<C: CacheMaintenance, P: PowerControl, K: Clock> {
    env: Arc<TestEnvironment<C>>,
    power: P,
    clock: K,
    config: DispatchConfig,
    skip_list: SkipList,
    my_index: usize,
    counters: Counters,
}

impl<C: CacheMaintenance, P: PowerControl, K: Clock> Dispatcher<C, P, K> {
    /// Creates a dispatcher running on the PE with the given MPIDR. If the MPIDR is not in the
    /// PE table the dispatcher acts as PE 0.
    pub fn new(
        env: Arc<TestEnvironment<C>>,
        power: P,
        clock: K,
        config: DispatchConfig,
        skip_list: SkipList,
        my_mpidr: u64,
    ) -> Self {
        let my_index = env.pe_table.index_of_or_primary(my_mpidr);
        Self {
            env,
            power,
            clock,
            config,
            skip_list,
            my_index,
            counters: Counters::default(),
        }
    }

    /// Returns the shared test environment.
    pub fn env(&self) -> &Arc<TestEnvironment<C>> {
        &self.env
    }

    /// Returns the power controller.
    pub fn power(&self) -> &P {
        &self.power
    }

    /// Returns the configuration.
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Returns the skip list.
    pub fn skip_list(&self) -> &SkipList {
        &self.skip_list
    }

    /// Replaces the skip list which [`initialize_test`](Self::initialize_test) checks.
    pub fn set_skip_list(&mut self, skip_list: SkipList) {
        self.skip_list = skip_list;
    }

    /// Returns the PE table index of the calling PE.
    pub fn my_index(&self) -> usize {
        self.my_index
    }

    /// Returns the running totals.
    pub fn counters(&self) -> Counters {
        self.counters
    }

    fn targets(&self, pe_count: usize) -> impl Iterator<Item = usize> + use<C, P, K> {
        targets(pe_count, self.env.pe_table.num_pe(), self.my_index)
    }

    /// Records a status for the given PE, logging rather than failing if it has no slot.
    pub fn set_status(&self, index: usize, status: TestStatus) {
        if let Err(e) = self.env.shared.set_status(index, status) {
            error!("{e}");
        }
    }

    /// Runs a registered test on every PE its scope names, then reports and returns the verdict.
    pub fn run(&mut self, test: &TestEntry, arg: u64) -> Verdict {
        let pe_count = match test.scope {
            PeScope::OnePe => 1,
            PeScope::AllPes => self.env.pe_table.num_pe(),
        };
        if self.initialize_test(test.number, test.description, pe_count) == Admission::Run {
            let result = self.run_test_payload(test, pe_count, arg);
            if result == WaitResult::TimedOut {
                debug!("         Timed out waiting for PEs to report");
            }
        }
        let verdict = self.check_for_error(pe_count);
        debug!("         END");
        verdict
    }

    /// Prepares to run a test on `pe_count` PEs: sets their statuses to pending, then checks the
    /// skip list. A skipped test has every targeted status set to SKIP and its payload must not
    /// be run.
    pub fn initialize_test(
        &mut self,
        test_num: u32,
        description: &str,
        pe_count: usize,
    ) -> Admission {
        let level = self.config.level;
        info!("{test_num:4} : {description}");
        debug!("         START");
        self.counters.total += 1;

        for index in self.targets(pe_count) {
            self.set_status(index, TestStatus::pending(level, test_num));
        }

        if self.skip_list.skips(test_num) {
            info!("       USER OVERRIDE  - Skip Test");
            for index in self.targets(pe_count) {
                self.set_status(index, TestStatus::skip(level, test_num, 0));
            }
            return Admission::Skip;
        }
        Admission::Run
    }

    /// Runs the test's payload on the calling PE, then on every other PE of the first
    /// `pe_count` in ascending order, then waits for the remote PEs to report.
    ///
    /// Dispatch failures are recorded as FAIL statuses on the affected PE and do not stop the
    /// other PEs being dispatched.
    pub fn run_test_payload(&self, test: &TestEntry, pe_count: usize, arg: u64) -> WaitResult {
        (test.payload)(&PayloadContext::new(
            &self.env,
            self.my_index,
            test.number,
            self.config.level,
            arg,
        ));
        if pe_count <= 1 {
            return WaitResult::Completed;
        }

        for index in 0..pe_count {
            if index != self.my_index {
                if let Err(e) = self.execute_on_pe(index, test.number, arg) {
                    error!("{e}");
                }
            }
        }
        self.wait_for_test_completion(pe_count)
    }

    /// Writes the job for `test_num` into PE `index`'s slot and powers that PE on.
    ///
    /// While PSCI reports the target as still on from its previous job, CPU_ON is retried up to
    /// the configured bound. Any failure is recorded as a FAIL status: an index outside the PE
    /// table on the calling PE's slot, a PSCI error on the target's.
    pub fn execute_on_pe(
        &self,
        index: usize,
        test_num: u32,
        arg: u64,
    ) -> Result<(), DispatchError> {
        let level = self.config.level;
        let Some(mpidr) = self.env.pe_table.mpidr(index) else {
            self.set_status(
                self.my_index,
                TestStatus::fail(level, test_num, SUB_CODE_INVALID_PE),
            );
            return Err(InvalidPeIndex(index).into());
        };

        let (data0, data1) = Job::Run {
            test_num,
            level,
            arg,
        }
        .into();
        self.env.shared.set_data(index, data0, data1)?;

        let mpidr = psci_mpidr(mpidr);
        let mut result = Err(ErrorCode::AlreadyOn);
        for _ in 0..self.config.cpu_on_retries {
            result = self.power.cpu_on(mpidr, index as u64);
            if result != Err(ErrorCode::AlreadyOn) {
                break;
            }
            self.clock.relax();
        }

        result.map_err(|error| {
            self.set_status(
                index,
                TestStatus::fail(
                    level,
                    test_num,
                    SUB_CODE_CPU_ON_BASE + error_magnitude(error),
                ),
            );
            DispatchError::CpuOn {
                index,
                mpidr,
                error,
            }
        })
    }

    /// Waits until none of the first `pe_count` PEs is pending, or the timeout expires. On
    /// timeout every PE still pending is recorded as failed with sub-code 0xF.
    pub fn wait_for_test_completion(&self, pe_count: usize) -> WaitResult {
        if pe_count <= 1 {
            return WaitResult::Completed;
        }
        let shared = &self.env.shared;
        let pending = |index: usize| shared.status(index).is_ok_and(TestStatus::is_pending);

        let result = poll_until(&self.clock, self.config.timeout, || {
            !self.targets(pe_count).any(pending)
        });
        if result == WaitResult::TimedOut {
            for index in self.targets(pe_count) {
                if let Ok(status) = shared.status(index)
                    && status.is_pending()
                {
                    error!("       **Timed out** for PE index = {index}");
                    self.set_status(
                        index,
                        TestStatus::fail(status.level(), status.test_num(), SUB_CODE_TIMEOUT),
                    );
                }
            }
        }
        result
    }

    /// Consolidates the statuses of the first `pe_count` PEs, reports the result and updates the
    /// running totals.
    ///
    /// Any failing PE makes the test fail, and the lowest such index is reported. Otherwise a
    /// skip on any PE makes the test skipped. A PE which is still pending, or whose status is
    /// not a recognised result, counts as failing.
    pub fn check_for_error(&mut self, pe_count: usize) -> Verdict {
        let shared = &self.env.shared;
        let read = |index: usize| shared.status(index).unwrap_or_default();

        let verdict = if pe_count <= 1 {
            let status = read(self.my_index);
            Verdict {
                outcome: Outcome::from_status(status.0),
                pe_index: self.my_index,
                status,
            }
        } else {
            let mut verdict = Verdict {
                outcome: Outcome::Pass,
                pe_index: self.my_index,
                status: read(self.my_index),
            };
            for index in self.targets(pe_count) {
                let status = read(index);
                match Outcome::from_status(status.0) {
                    Outcome::Fail => {
                        verdict = Verdict {
                            outcome: Outcome::Fail,
                            pe_index: index,
                            status,
                        };
                        break;
                    }
                    Outcome::Skip if verdict.outcome == Outcome::Pass => {
                        verdict = Verdict {
                            outcome: Outcome::Skip,
                            pe_index: index,
                            status,
                        };
                    }
                    _ => {}
                }
            }
            verdict
        };

        match verdict.outcome {
            Outcome::Pass => self.counters.passed += 1,
            Outcome::Fail => self.counters.failed += 1,
            Outcome::Skip => {}
        }
        report_status(&verdict);
        verdict
    }
}

/// Logs the result line for a verdict.
pub fn report_status(verdict: &Verdict) {
    let status = verdict.status;
    match verdict.outcome {
        Outcome::Pass => info!("       : Result:  PASS"),
        Outcome::Fail => {
            error!(
                "       Failed on PE - {:4} for Level= {:2}",
                verdict.pe_index,
                status.level()
            );
            if status.is_fail() {
                error!("       : Result:  --FAIL-- {:x}", status.sub_code());
            } else {
                error!("       : Result:  {:8x}", status.0);
            }
        }
        Outcome::Skip => warn!("       : Result:  -SKIPPED- {:x}", status.sub_code()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cache::CoherentCache,
        framework::{find_test, secondary_main},
        pe::PeInfoTable,
        poll::PollCounter,
        registers::RegisterMap,
        sbsa_test,
        suite::Module,
    };
    use core::{
        cell::{Cell, RefCell},
        sync::atomic::{AtomicU32, Ordering},
    };
    use std::vec::Vec;

    const MPIDRS: [u64; 4] = [0x0, 0x100, 0x200, 0x300];

    fn pass_everywhere(context: &PayloadContext) {
        context.pass();
    }
    sbsa_test!(
        Module::Secure,
        1010,
        "Pass on every PE",
        PeScope::AllPes,
        pass_everywhere
    );

    fn fail_on_pe_one(context: &PayloadContext) {
        if context.pe_index() == 1 {
            context.fail(2);
        } else {
            context.pass();
        }
    }
    sbsa_test!(
        Module::Secure,
        1011,
        "Fail on PE 1",
        PeScope::AllPes,
        fail_on_pe_one
    );

    fn skip_first_fail_last(context: &PayloadContext) {
        match context.pe_index() {
            0 => context.skip(1),
            3 => context.fail(3),
            _ => context.pass(),
        }
    }
    sbsa_test!(
        Module::Secure,
        1012,
        "Skip on PE 0, fail on PE 3",
        PeScope::AllPes,
        skip_first_fail_last
    );

    static RUNS: [AtomicU32; 4] = [const { AtomicU32::new(0) }; 4];

    fn count_runs(context: &PayloadContext) {
        RUNS[context.pe_index()].fetch_add(1, Ordering::SeqCst);
        context.pass();
    }
    sbsa_test!(
        Module::Secure,
        1013,
        "Count runs per PE",
        PeScope::AllPes,
        count_runs
    );

    fn forget_status(_context: &PayloadContext) {}
    sbsa_test!(
        Module::Secure,
        1014,
        "Never report",
        PeScope::AllPes,
        forget_status
    );

    /// Runs secondary PEs inline, unless they are marked as hung.
    struct FakePower {
        env: Arc<TestEnvironment<CoherentCache>>,
        calls: RefCell<Vec<(u64, u64)>>,
        hung: RefCell<Vec<usize>>,
        already_on: Cell<u32>,
        error: Option<ErrorCode>,
    }

    impl FakePower {
        fn new(env: &Arc<TestEnvironment<CoherentCache>>) -> Self {
            Self {
                env: env.clone(),
                calls: RefCell::new(Vec::new()),
                hung: RefCell::new(Vec::new()),
                already_on: Cell::new(0),
                error: None,
            }
        }
    }

    impl PowerControl for FakePower {
        fn cpu_on(&self, target_mpidr: u64, context_id: u64) -> Result<(), ErrorCode> {
            self.calls.borrow_mut().push((target_mpidr, context_id));
            if let Some(error) = self.error {
                return Err(error);
            }
            if self.already_on.get() > 0 {
                self.already_on.set(self.already_on.get() - 1);
                return Err(ErrorCode::AlreadyOn);
            }
            let index = context_id as usize;
            if !self.hung.borrow().contains(&index) {
                secondary_main(&self.env, self, index)?;
            }
            Ok(())
        }

        fn cpu_off(&self) -> Result<(), ErrorCode> {
            Ok(())
        }
    }

    type FakeDispatcher = Dispatcher<CoherentCache, FakePower, PollCounter>;

    fn dispatcher_on(
        my_mpidr: u64,
        skip_list: SkipList,
        power: impl Fn(&mut FakePower),
    ) -> FakeDispatcher {
        let env = Arc::new(TestEnvironment::new(
            PeInfoTable::from_mpidrs(&MPIDRS).unwrap(),
            CoherentCache,
            RegisterMap::EMPTY,
        ));
        let mut fake = FakePower::new(&env);
        power(&mut fake);
        let config = DispatchConfig {
            level: 4,
            timeout: 1000,
            cpu_on_retries: DispatchConfig::DEFAULT_CPU_ON_RETRIES,
        };
        Dispatcher::new(env, fake, PollCounter::new(), config, skip_list, my_mpidr)
    }

    fn dispatcher() -> FakeDispatcher {
        dispatcher_on(0, SkipList::default(), |_| {})
    }

    fn statuses(dispatcher: &FakeDispatcher) -> Vec<TestStatus> {
        (0..MPIDRS.len())
            .map(|index| dispatcher.env().shared.status(index).unwrap())
            .collect()
    }

    #[test]
    fn every_pe_reports() {
        let mut dispatcher = dispatcher();
        let verdict = dispatcher.run(find_test(1010).unwrap(), 0);
        assert_eq!(verdict.outcome, Outcome::Pass);
        assert!(statuses(&dispatcher).iter().all(|status| status.is_pass()));
        assert_eq!(
            dispatcher.power().calls.borrow().as_slice(),
            &[(0x100, 1), (0x200, 2), (0x300, 3)]
        );
        assert_eq!(
            dispatcher.counters(),
            Counters {
                total: 1,
                passed: 1,
                failed: 0
            }
        );
    }

    #[test]
    fn caller_runs_once_when_not_first() {
        let mut dispatcher = dispatcher_on(0x200, SkipList::default(), |_| {});
        assert_eq!(dispatcher.my_index(), 2);
        let verdict = dispatcher.run(find_test(1013).unwrap(), 0);
        assert_eq!(verdict.outcome, Outcome::Pass);
        for runs in &RUNS {
            assert_eq!(runs.load(Ordering::SeqCst), 1);
        }
        let targets: Vec<u64> = dispatcher
            .power()
            .calls
            .borrow()
            .iter()
            .map(|(mpidr, _)| *mpidr)
            .collect();
        assert_eq!(targets, [0x0, 0x100, 0x300]);
    }

    #[test]
    fn skipped_test_never_runs() {
        let mut dispatcher = dispatcher_on(0, SkipList::new(&[100, 10000, 10000]), |_| {});
        assert_eq!(dispatcher.initialize_test(100, "Skipped", 4), Admission::Skip);
        assert!(statuses(&dispatcher).iter().all(|status| status.is_skip()));
        let verdict = dispatcher.check_for_error(4);
        assert_eq!(verdict.outcome, Outcome::Skip);
        assert!(dispatcher.power().calls.borrow().is_empty());
        assert_eq!(
            dispatcher.counters(),
            Counters {
                total: 1,
                passed: 0,
                failed: 0
            }
        );
    }

    #[test]
    fn any_failure_fails_test() {
        let mut dispatcher = dispatcher();
        let verdict = dispatcher.run(find_test(1011).unwrap(), 0);
        assert_eq!(verdict.outcome, Outcome::Fail);
        assert_eq!(verdict.pe_index, 1);
        assert_eq!(verdict.status.sub_code(), 2);

        // A skip scanned before the failure does not hide it.
        let verdict = dispatcher.run(find_test(1012).unwrap(), 0);
        assert_eq!(verdict.outcome, Outcome::Fail);
        assert_eq!(verdict.pe_index, 3);
        assert_eq!(dispatcher.counters().failed, 2);
    }

    #[test]
    fn already_on_is_retried() {
        let dispatcher = dispatcher_on(0, SkipList::default(), |power| power.already_on.set(3));
        dispatcher.execute_on_pe(2, 1010, 0xab).unwrap();
        let calls = dispatcher.power().calls.borrow();
        assert_eq!(calls.len(), 4);
        assert!(calls.iter().all(|(mpidr, _)| *mpidr == 0x200));
        assert!(dispatcher.env().shared.status(2).unwrap().is_pass());
        assert_eq!(
            Job::try_from(dispatcher.env().shared.data(2).unwrap()),
            Ok(Job::Run {
                test_num: 1010,
                level: 4,
                arg: 0xab
            })
        );
    }

    #[test]
    fn already_on_retries_exhausted() {
        let dispatcher = dispatcher_on(0, SkipList::default(), |power| power.already_on.set(100));
        assert_eq!(
            dispatcher.execute_on_pe(2, 31, 0xab),
            Err(DispatchError::CpuOn {
                index: 2,
                mpidr: 0x200,
                error: ErrorCode::AlreadyOn
            })
        );
        assert_eq!(dispatcher.power().calls.borrow().len(), 16);
        assert_eq!(
            dispatcher.env().shared.status(2),
            Ok(TestStatus::fail(4, 31, 0x124))
        );
    }

    #[test]
    fn cpu_on_error_recorded_on_target() {
        let dispatcher = dispatcher_on(0, SkipList::default(), |power| {
            power.error = Some(ErrorCode::InvalidParameters)
        });
        assert!(dispatcher.execute_on_pe(3, 31, 0).is_err());
        assert_eq!(dispatcher.power().calls.borrow().len(), 1);
        assert_eq!(
            dispatcher.env().shared.status(3),
            Ok(TestStatus::fail(4, 31, 0x122))
        );
    }

    #[test]
    fn invalid_index_recorded_on_caller() {
        let dispatcher = dispatcher();
        assert_eq!(
            dispatcher.execute_on_pe(4, 31, 0),
            Err(DispatchError::InvalidPeIndex(InvalidPeIndex(4)))
        );
        assert_eq!(
            dispatcher.env().shared.status(0),
            Ok(TestStatus::fail(4, 31, SUB_CODE_INVALID_PE))
        );
        assert!(dispatcher.power().calls.borrow().is_empty());
    }

    #[test]
    fn silent_payload_times_out() {
        let mut dispatcher = dispatcher();
        let test = find_test(1014).unwrap();
        assert_eq!(dispatcher.initialize_test(test.number, test.description, 4), Admission::Run);
        assert_eq!(dispatcher.run_test_payload(test, 4, 0), WaitResult::TimedOut);
        for status in statuses(&dispatcher) {
            assert!(status.is_fail());
            assert_eq!(status.sub_code(), SUB_CODE_TIMEOUT);
        }
        assert_eq!(dispatcher.check_for_error(4).outcome, Outcome::Fail);
    }

    #[test]
    fn hung_pe_does_not_leak_into_next_test() {
        let mut dispatcher = dispatcher_on(0, SkipList::default(), |power| {
            power.hung.borrow_mut().push(1)
        });
        let verdict = dispatcher.run(find_test(1010).unwrap(), 0);
        assert_eq!(verdict.outcome, Outcome::Fail);
        assert_eq!(verdict.pe_index, 1);
        assert_eq!(verdict.status.sub_code(), SUB_CODE_TIMEOUT);

        dispatcher.power().hung.borrow_mut().clear();
        assert_eq!(dispatcher.initialize_test(1011, "Next", 4), Admission::Run);
        assert!(dispatcher.env().shared.status(1).unwrap().is_pending());
        let verdict = dispatcher.run(find_test(1010).unwrap(), 0);
        assert_eq!(verdict.outcome, Outcome::Pass);
    }

    #[test]
    fn single_pe_test_reads_caller_only() {
        let mut dispatcher = dispatcher_on(0x300, SkipList::default(), |_| {});
        assert_eq!(dispatcher.initialize_test(7, "Local", 1), Admission::Run);
        dispatcher
            .env()
            .shared
            .set_status(3, TestStatus::pass(4, 7, 0))
            .unwrap();
        // PE 0 is targeted, but a one-PE test only looks at the caller.
        assert!(dispatcher.env().shared.status(0).unwrap().is_pending());
        let verdict = dispatcher.check_for_error(1);
        assert_eq!(verdict.outcome, Outcome::Pass);
        assert_eq!(verdict.pe_index, 3);
    }
}
