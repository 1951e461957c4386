// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! The SBSA secure test call, as seen from the normal world.
//!
//! A secure test is started with one SMC naming the test and its arguments, and its result is
//! collected with a second SMC asking for the latched result. Only one test can be in flight at
//! a time.

use crate::status::{Outcome, State, TestStatus};
use log::debug;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Function ID of the SBSA secure test call.
pub const SBSA_AVS_SMC: u32 = 0x8400_1000;

/// Value of x1 asking for the result of the last secure test.
pub const GET_RESULT: u64 = 0x9000;

/// Data returned by a successful infrastructure init, showing the service is present.
pub const INIT_SIGNATURE: u64 = 0x9abc_def9;

/// Result value latched when a test has been started but has not finished.
pub const ACS_PENDING: u64 = 0xa000_0000;

/// The secure tests and services selected by x1.
#[derive(Clone, Copy, Debug, Eq, IntoPrimitive, PartialEq, TryFromPrimitive)]
#[repr(u64)]
pub enum SecureTestIndex {
    /// Wait for the non-secure watchdog's WS1 interrupt at EL3.
    NsWdWs1 = 0x1000,
    /// Check the secure system counter registers.
    SysCounter,
    /// Check the secure system timer interrupt.
    SysTimerInt,
    /// Check the secure watchdog's WS0 interrupt at EL3.
    WdWs0,
    /// Check secure UART access.
    SecureUart,
    /// Check the CNTBase frames.
    CntBase,
    /// Check the EL3 secure physical timer interrupt.
    El3Phy,
    /// Wake from a secure timer interrupt.
    Wakeup,
    /// End of the secure test list.
    Finish,
    /// Initialise the secure test infrastructure.
    InfraInit,
    /// Return one of the platform's secure addresses.
    PlatformAddress,
    /// Route the profiling buffer interrupt to the non-secure world.
    PmbIrq,
}

/// A latched secure test result.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SecureResult {
    /// The test the result is for.
    pub test_index: u64,
    /// The result status.
    pub result: u64,
    /// First data word.
    pub data: u64,
    /// Second data word.
    pub data2: u64,
}

impl SecureResult {
    /// Returns whether the test has not finished yet.
    pub fn is_pending(&self) -> bool {
        TestStatus(self.result as u32).state() == Some(State::Pending)
    }

    /// Classifies the result, or returns `None` if it is not one of the suite-level values.
    pub fn outcome(&self) -> Option<Outcome> {
        match self.result as u32 {
            Outcome::AVS_PASS => Some(Outcome::Pass),
            Outcome::AVS_FAIL => Some(Outcome::Fail),
            Outcome::AVS_SKIP => Some(Outcome::Skip),
            _ => None,
        }
    }
}

impl From<[u64; 4]> for SecureResult {
    fn from([test_index, result, data, data2]: [u64; 4]) -> Self {
        Self {
            test_index,
            result,
            data,
            data2,
        }
    }
}

/// A conduit for the SBSA secure test call.
pub trait SecureCall {
    /// Makes the call with x1..x3 set to `args`, and returns x0..x3.
    fn smc(&self, args: [u64; 3]) -> [u64; 4];
}

/// Starts a secure test.
pub fn call<S: SecureCall + ?Sized>(conduit: &S, index: SecureTestIndex, arg1: u64, arg2: u64) {
    debug!("Secure call {index:?} ({arg1:#x}, {arg2:#x})");
    conduit.smc([index.into(), arg1, arg2]);
}

/// Fetches the latched result, asking again up to `attempts` times in total while it is pending.
pub fn get_result<S: SecureCall + ?Sized>(conduit: &S, attempts: u32) -> SecureResult {
    let mut result = SecureResult::from(conduit.smc([GET_RESULT, 0, 0]));
    for _ in 1..attempts {
        if !result.is_pending() {
            break;
        }
        result = conduit.smc([GET_RESULT, 0, 0]).into();
    }
    debug!(
        "       return data 1 is {:x}     return data 2 is {:x}",
        result.test_index, result.result
    );
    result
}

/// Starts the secure test infrastructure and returns whether the secure firmware answered with
/// the expected signature.
pub fn trusted_firmware_init<S: SecureCall + ?Sized>(conduit: &S) -> bool {
    call(conduit, SecureTestIndex::InfraInit, 0, 0);
    get_result(conduit, 2).data == INIT_SIGNATURE
}

/// Makes the SBSA secure test call with the SMC instruction.
#[cfg(all(target_arch = "aarch64", not(test)))]
#[derive(Clone, Copy, Debug, Default)]
pub struct SmcSecureCall;

#[cfg(all(target_arch = "aarch64", not(test)))]
impl SecureCall for SmcSecureCall {
    fn smc(&self, [x1, x2, x3]: [u64; 3]) -> [u64; 4] {
        let mut args = [0; 17];
        args[0] = x1;
        args[1] = x2;
        args[2] = x3;
        let ret = ::smccc::smc64(SBSA_AVS_SMC, args);
        [ret[0], ret[1], ret[2], ret[3]]
    }
}
