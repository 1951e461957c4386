// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Running the registered tests module by module, and the secure tests through the secure
//! test call.

use crate::{
    cache::CacheMaintenance,
    framework::{Admission, Counters, Dispatcher, registered_tests},
    options::RunOptions,
    poll::Clock,
    psci::PowerControl,
    secure_call::{SecureCall, SecureTestIndex, call, get_result, trusted_firmware_init},
    status::{Outcome, TestStatus},
};
use core::fmt::{self, Display, Formatter};
use log::{error, info, warn};

/// Version of the compliance suite.
pub const VERSION: &str = "7.2.2";

/// Functional groups of tests. Each owns a range of test numbers starting at its base.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum Module {
    /// Processing element features.
    Pe,
    /// Interrupt controller.
    Gic,
    /// Generic timers.
    Timer,
    /// Watchdogs.
    Watchdog,
    /// PCIe.
    Pcie,
    /// Power and wakeup semantics.
    Wakeup,
    /// Peripherals.
    Peripheral,
    /// IO virtualisation.
    Smmu,
    /// Tests which need the secure firmware service.
    Secure,
}

impl Module {
    /// Every module, in the order the suite runs them.
    pub const ALL: [Self; 9] = [
        Self::Pe,
        Self::Gic,
        Self::Timer,
        Self::Watchdog,
        Self::Pcie,
        Self::Wakeup,
        Self::Peripheral,
        Self::Smmu,
        Self::Secure,
    ];

    /// Returns the first test number of the module. Listing it in the skip list skips the
    /// whole module.
    pub const fn base(self) -> u32 {
        match self {
            Self::Pe => 0,
            Self::Gic => 20,
            Self::Timer => 30,
            Self::Watchdog => 40,
            Self::Pcie => 50,
            Self::Wakeup => 70,
            Self::Peripheral => 80,
            Self::Smmu => 90,
            Self::Secure => 900,
        }
    }

    /// Returns the module which the given test number belongs to.
    pub fn of(test_num: u32) -> Option<Self> {
        match test_num {
            0..20 => Some(Self::Pe),
            20..30 => Some(Self::Gic),
            30..40 => Some(Self::Timer),
            40..50 => Some(Self::Watchdog),
            50..70 => Some(Self::Pcie),
            70..80 => Some(Self::Wakeup),
            80..90 => Some(Self::Peripheral),
            90..100 => Some(Self::Smmu),
            900..1000 => Some(Self::Secure),
            _ => None,
        }
    }
}

impl Display for Module {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::Pe => "PE",
            Self::Gic => "GIC",
            Self::Timer => "Timer",
            Self::Watchdog => "Watchdog",
            Self::Pcie => "PCIe",
            Self::Wakeup => "Wakeup",
            Self::Peripheral => "Peripheral",
            Self::Smmu => "SMMU",
            Self::Secure => "Secure",
        })
    }
}

/// A test run entirely by the secure firmware.
#[derive(Clone, Copy, Debug)]
pub struct SecureTest {
    /// The test number.
    pub number: u32,
    /// The secure test to start.
    pub index: SecureTestIndex,
    /// One-line description.
    pub description: &'static str,
}

/// The tests run through the secure test call, in order.
pub const SECURE_TESTS: [SecureTest; 6] = [
    SecureTest {
        number: 902,
        index: SecureTestIndex::SysCounter,
        description: "Check System Generic Counter",
    },
    SecureTest {
        number: 903,
        index: SecureTestIndex::El3Phy,
        description: "Check EL1-S PE timer interrupt",
    },
    SecureTest {
        number: 904,
        index: SecureTestIndex::WdWs0,
        description: "Check Secure Watchdog WS0 intr",
    },
    SecureTest {
        number: 905,
        index: SecureTestIndex::SecureUart,
        description: "Check Secure UART Access",
    },
    SecureTest {
        number: 906,
        index: SecureTestIndex::Wakeup,
        description: "Check Wakeup from Secure timer",
    },
    SecureTest {
        number: 907,
        index: SecureTestIndex::SysTimerInt,
        description: "System Wakeup Timer interrupt",
    },
];

/// How many times to ask for a secure test's result while it is pending.
const SECURE_RESULT_ATTEMPTS: u32 = 3;

/// Runs the whole suite with one dispatcher.
pub struct Suite<'a, C: CacheMaintenance, P: PowerControl, K: Clock> {
    dispatcher: &'a mut Dispatcher<C, P, K>,
    options: &'a RunOptions,
    secure: Option<&'a dyn SecureCall>,
}

impl<'a, C: CacheMaintenance, P: PowerControl, K: Clock> Suite<'a, C, P, K> {
    /// Creates a suite. Secure tests can only run if a secure call conduit is given and the
    /// options enable them. The dispatcher takes its skip list from the options.
    pub fn new(
        dispatcher: &'a mut Dispatcher<C, P, K>,
        options: &'a RunOptions,
        secure: Option<&'a dyn SecureCall>,
    ) -> Self {
        dispatcher.set_skip_list(options.skip_list.clone());
        Self {
            dispatcher,
            options,
            secure,
        }
    }

    /// Runs every module in order, prints the totals and returns them.
    pub fn run(&mut self) -> Counters {
        info!(" SBSA Architecture Compliance Suite");
        info!("    Version {VERSION}");
        info!(
            " Starting tests for level {:2} (Print level is {:2})",
            self.options.level, self.options.print_level.0
        );

        for module in Module::ALL {
            if module == Module::Secure && !self.options.secure {
                continue;
            }
            self.run_module(module);
        }

        let counters = self.dispatcher.counters();
        info!(
            "     Total Tests run  = {:4};  Tests Passed  = {:4}  Tests Failed = {:4}",
            counters.total, counters.passed, counters.failed
        );
        info!("      *** SBSA tests complete. Reset the system. ***");
        counters
    }

    /// Runs the tests of one module, returning the combined outcome or `None` if the module
    /// has no tests.
    pub fn run_module(&mut self, module: Module) -> Option<Outcome> {
        info!("      *** Starting {module} tests ***");
        if self.dispatcher.skip_list().skips_module(module) {
            info!("      USER Override - Skipping all {module} tests");
            return Some(Outcome::Skip);
        }
        if module == Module::Pcie && !self.options.pcie {
            info!("      PCIe tests disabled");
            return Some(Outcome::Skip);
        }
        if module == Module::Secure {
            return self.run_secure();
        }

        registered_tests()
            .iter()
            .filter(|test| test.module == module)
            .map(|test| self.dispatcher.run(test, 0).outcome)
            .reduce(Outcome::merge)
    }

    fn run_secure(&mut self) -> Option<Outcome> {
        let Some(conduit) = self.secure else {
            warn!("   No secure call conduit, skipping all secure tests");
            return Some(Outcome::Skip);
        };
        if !trusted_firmware_init(conduit) {
            warn!("   ARM-TF firmware not ported, skipping all secure tests");
            return Some(Outcome::Skip);
        }

        let level = self.dispatcher.config().level;
        let my_index = self.dispatcher.my_index();
        SECURE_TESTS
            .iter()
            .enumerate()
            .map(|(position, test)| {
                if self
                    .dispatcher
                    .initialize_test(test.number, test.description, 1)
                    == Admission::Run
                {
                    call(conduit, test.index, 0, 0);
                    let result = get_result(conduit, SECURE_RESULT_ATTEMPTS);
                    let sub_code = position as u16;
                    let status = match result.outcome() {
                        Some(Outcome::Pass) => TestStatus::pass(level, test.number, sub_code),
                        Some(Outcome::Skip) => TestStatus::skip(level, test.number, sub_code),
                        Some(Outcome::Fail) => TestStatus::fail(level, test.number, sub_code),
                        None => {
                            error!("       Unexpected SMC result {:#x}", result.result);
                            TestStatus::fail(level, test.number, sub_code)
                        }
                    };
                    self.dispatcher.set_status(my_index, status);
                }
                self.dispatcher.check_for_error(1).outcome
            })
            .reduce(Outcome::merge)
    }
}
