// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Framework for registering test payloads and running them on one or more PEs.

mod dispatch;
pub mod protocol;
mod secondary;

pub use dispatch::{Admission, Counters, DispatchConfig, DispatchError, Dispatcher, Verdict};
pub use secondary::{EnvironmentCell, secondary_main};
#[cfg(all(target_arch = "aarch64", not(test)))]
pub use secondary::{publish_environment, sbsa_secondary_main};

use crate::{
    cache::CacheMaintenance,
    pe::PeInfoTable,
    registers::{RegisterError, RegisterMap},
    shared_mem::{InvalidPeIndex, SharedMemory},
    status::{SUB_CODE_UNKNOWN_REGISTER, TestStatus},
    suite::Module,
};
use alloc::boxed::Box;
use linkme::distributed_slice;
use log::error;
use spin::Lazy;

/// All registered tests.
#[distributed_slice]
pub static SBSA_TESTS: [TestEntry];

static SBSA_TESTS_SORTED: Lazy<Box<[&'static TestEntry]>> = Lazy::new(|| {
    let mut tests = SBSA_TESTS.iter().collect::<Box<[_]>>();
    tests.sort_by_key(|test| test.number);
    tests
});

/// Returns all registered tests, sorted by test number.
pub fn registered_tests() -> &'static [&'static TestEntry] {
    &SBSA_TESTS_SORTED
}

/// Returns the registered test with the given number.
pub fn find_test(number: u32) -> Option<&'static TestEntry> {
    let tests = registered_tests();
    tests
        .binary_search_by_key(&number, |test| test.number)
        .ok()
        .map(|index| tests[index])
}

/// A test payload. It must record exactly one status for its PE through the context.
pub type Payload = fn(&PayloadContext);

/// Which PEs a test runs on.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PeScope {
    /// Only the PE running the suite.
    OnePe,
    /// Every PE in the PE info table.
    AllPes,
}

/// A single registered test.
#[derive(Debug)]
pub struct TestEntry {
    /// The functional module the test belongs to.
    pub module: Module,
    /// The test number, unique across the suite.
    pub number: u32,
    /// One-line description printed before the result.
    pub description: &'static str,
    /// Which PEs the payload runs on.
    pub scope: PeScope,
    /// The payload to run.
    pub payload: Payload,
}

/// Everything shared between the dispatching PE and the PEs it wakes.
#[derive(Debug)]
pub struct TestEnvironment<C: CacheMaintenance> {
    /// The PE info table.
    pub pe_table: PeInfoTable,
    /// One dispatch slot per PE.
    pub shared: SharedMemory<C>,
    /// System register accessors for payloads.
    pub registers: RegisterMap,
}

impl<C: CacheMaintenance> TestEnvironment<C> {
    /// Creates the environment, allocating a dispatch slot for every PE in the table.
    pub fn new(pe_table: PeInfoTable, cache: C, registers: RegisterMap) -> Self {
        let shared = SharedMemory::new(pe_table.num_pe(), cache);
        Self {
            pe_table,
            shared,
            registers,
        }
    }
}

/// Status access for payloads, independent of the cache maintainer type.
pub trait StatusSlots {
    /// Records a status for the given PE.
    fn set_status(&self, index: usize, status: TestStatus) -> Result<(), InvalidPeIndex>;

    /// Reads the status of the given PE.
    fn status(&self, index: usize) -> Result<TestStatus, InvalidPeIndex>;
}

impl<C: CacheMaintenance> StatusSlots for SharedMemory<C> {
    fn set_status(&self, index: usize, status: TestStatus) -> Result<(), InvalidPeIndex> {
        SharedMemory::set_status(self, index, status)
    }

    fn status(&self, index: usize) -> Result<TestStatus, InvalidPeIndex> {
        SharedMemory::status(self, index)
    }
}

/// What a payload sees while running on a PE.
pub struct PayloadContext<'a> {
    pe_index: usize,
    test_num: u32,
    level: u32,
    arg: u64,
    pe_table: &'a PeInfoTable,
    registers: &'a RegisterMap,
    slots: &'a dyn StatusSlots,
}

impl<'a> PayloadContext<'a> {
    /// Creates the context for running test `test_num` on PE `pe_index`.
    pub fn new<C: CacheMaintenance>(
        env: &'a TestEnvironment<C>,
        pe_index: usize,
        test_num: u32,
        level: u32,
        arg: u64,
    ) -> Self {
        Self {
            pe_index,
            test_num,
            level,
            arg,
            pe_table: &env.pe_table,
            registers: &env.registers,
            slots: &env.shared,
        }
    }

    /// The index of the PE the payload is running on.
    pub fn pe_index(&self) -> usize {
        self.pe_index
    }

    /// The test number.
    pub fn test_num(&self) -> u32 {
        self.test_num
    }

    /// The compliance level being tested.
    pub fn level(&self) -> u32 {
        self.level
    }

    /// The argument given to the dispatcher.
    pub fn arg(&self) -> u64 {
        self.arg
    }

    /// The PE info table.
    pub fn pe_table(&self) -> &PeInfoTable {
        self.pe_table
    }

    /// Records the status of this PE.
    pub fn set_status(&self, status: TestStatus) {
        if let Err(e) = self.slots.set_status(self.pe_index, status) {
            error!("{e}");
        }
    }

    /// Records a pass for this PE.
    pub fn pass(&self) {
        self.set_status(TestStatus::pass(self.level, self.test_num, 0));
    }

    /// Records a failure for this PE.
    pub fn fail(&self, sub_code: u16) {
        self.set_status(TestStatus::fail(self.level, self.test_num, sub_code));
    }

    /// Records a skip for this PE.
    pub fn skip(&self, sub_code: u16) {
        self.set_status(TestStatus::skip(self.level, self.test_num, sub_code));
    }

    /// Reads a system register by ID. If there is no accessor for it, records a failure with
    /// sub-code 0x78 and returns `None`.
    pub fn read_register(&self, id: u32) -> Option<u64> {
        self.registers
            .read(id)
            .map_err(|e| self.register_error(e))
            .ok()
    }

    /// Writes a system register by ID. If there is no write accessor for it, records a failure
    /// with sub-code 0x78.
    pub fn write_register(&self, id: u32, value: u64) {
        if let Err(e) = self.registers.write(id, value) {
            self.register_error(e);
        }
    }

    fn register_error(&self, e: RegisterError) {
        error!("PE {}: {e}", self.pe_index);
        self.fail(SUB_CODE_UNKNOWN_REGISTER);
    }
}

/// Registers a test with the framework.
///
/// ```ignore
/// sbsa_test!(Module::Pe, 1, "Check for number of PE", PeScope::OnePe, pe_count);
/// ```
#[macro_export]
macro_rules! sbsa_test {
    ($module:expr, $number:literal, $description:literal, $scope:expr, $payload:ident) => {
        paste::paste! {
            #[linkme::distributed_slice($crate::framework::SBSA_TESTS)]
            static [<_SBSA_TEST_ $payload:upper>]: $crate::framework::TestEntry =
                $crate::framework::TestEntry {
                    module: $module,
                    number: $number,
                    description: $description,
                    scope: $scope,
                    payload: $payload,
                };
        }
    };
}
