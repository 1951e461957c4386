// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Packed per-PE test status words.
//!
//! A status word carries the compliance level, the test number, a coarse state and a 16-bit
//! sub-code which the payload uses to say why it failed or skipped. The dispatcher only ever
//! looks at the state.

use core::fmt::{self, Debug, Display, Formatter};
use num_enum::{IntoPrimitive, TryFromPrimitive};

const STATE_SHIFT: u32 = 28;
const STATE_MASK: u32 = 0xf;
const LEVEL_SHIFT: u32 = 24;
const LEVEL_MASK: u32 = 0xf;
const TEST_NUM_SHIFT: u32 = 16;
const TEST_NUM_MASK: u32 = 0xff;
const SUB_CODE_MASK: u32 = 0xffff;

/// Sub-code recorded for a remote PE which never reported a result.
pub const SUB_CODE_TIMEOUT: u16 = 0xf;

/// Sub-code recorded when a dispatch targets a PE index outside the PE table.
pub const SUB_CODE_INVALID_PE: u16 = 0xff;

/// Sub-code recorded when a register ID has no accessor.
pub const SUB_CODE_UNKNOWN_REGISTER: u16 = 0x78;

/// Sub-code recorded when a PE finds a job it cannot run in its slot.
pub const SUB_CODE_UNKNOWN_JOB: u16 = 0xfe;

/// Base of the sub-codes recorded when PSCI CPU_ON fails; the absolute PSCI error is added.
pub const SUB_CODE_CPU_ON_BASE: u16 = 0x120;

/// The coarse state held in bits [31:28] of a status word.
#[derive(Clone, Copy, Debug, Eq, IntoPrimitive, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum State {
    /// The test has started.
    Start = 0x1,
    /// The test has ended.
    End = 0x2,
    /// The test passed on this PE.
    Pass = 0x4,
    /// The test failed on this PE.
    Fail = 0x8,
    /// The test was skipped on this PE.
    Skip = 0x9,
    /// The PE has not reported yet.
    Pending = 0xa,
}

/// A packed status word as stored in shared dispatch memory.
#[derive(Clone, Copy, Default, Eq, PartialEq)]
#[repr(transparent)]
pub struct TestStatus(pub u32);

impl TestStatus {
    /// Packs the given fields into a status word. The test number is truncated to 8 bits.
    pub const fn new(state: State, level: u32, test_num: u32, sub_code: u16) -> Self {
        Self(
            ((state as u32) << STATE_SHIFT)
                | ((level & LEVEL_MASK) << LEVEL_SHIFT)
                | ((test_num & TEST_NUM_MASK) << TEST_NUM_SHIFT)
                | sub_code as u32,
        )
    }

    /// A passing status.
    pub const fn pass(level: u32, test_num: u32, sub_code: u16) -> Self {
        Self::new(State::Pass, level, test_num, sub_code)
    }

    /// A failing status with the given sub-code.
    pub const fn fail(level: u32, test_num: u32, sub_code: u16) -> Self {
        Self::new(State::Fail, level, test_num, sub_code)
    }

    /// A skipped status with the given sub-code.
    pub const fn skip(level: u32, test_num: u32, sub_code: u16) -> Self {
        Self::new(State::Skip, level, test_num, sub_code)
    }

    /// A pending status, as written before a test runs.
    pub const fn pending(level: u32, test_num: u32) -> Self {
        Self::new(State::Pending, level, test_num, 0)
    }

    /// Marks the start of a test.
    pub const fn start(level: u32, test_num: u32) -> Self {
        Self::new(State::Start, level, test_num, 0)
    }

    /// Marks the end of a test.
    pub const fn end(level: u32, test_num: u32) -> Self {
        Self::new(State::End, level, test_num, 0)
    }

    /// Returns the state, or `None` if the state bits hold an unassigned value.
    pub fn state(self) -> Option<State> {
        State::try_from(((self.0 >> STATE_SHIFT) & STATE_MASK) as u8).ok()
    }

    /// Returns the compliance level field.
    pub const fn level(self) -> u32 {
        (self.0 >> LEVEL_SHIFT) & LEVEL_MASK
    }

    /// Returns the (8-bit) test number field.
    pub const fn test_num(self) -> u32 {
        (self.0 >> TEST_NUM_SHIFT) & TEST_NUM_MASK
    }

    /// Returns the sub-code field.
    pub const fn sub_code(self) -> u16 {
        (self.0 & SUB_CODE_MASK) as u16
    }

    /// Returns whether the PE still has to report.
    pub fn is_pending(self) -> bool {
        self.state() == Some(State::Pending)
    }

    /// Returns whether the PE reported a pass.
    pub fn is_pass(self) -> bool {
        self.state() == Some(State::Pass)
    }

    /// Returns whether the PE reported a failure.
    pub fn is_fail(self) -> bool {
        self.state() == Some(State::Fail)
    }

    /// Returns whether the PE reported a skip.
    pub fn is_skip(self) -> bool {
        self.state() == Some(State::Skip)
    }
}

impl Debug for TestStatus {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "TestStatus({:#010x}: {:?} level {} test {} sub-code {:#x})",
            self.0,
            self.state(),
            self.level(),
            self.test_num(),
            self.sub_code()
        )
    }
}

impl Display for TestStatus {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// The consolidated result of one test, or of a whole module.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
    /// Every targeted PE passed.
    Pass,
    /// At least one PE failed.
    Fail,
    /// The test was skipped.
    Skip,
}

impl Outcome {
    /// The suite-level status value for a pass.
    pub const AVS_PASS: u32 = 0;
    /// The suite-level status value for a failure.
    pub const AVS_FAIL: u32 = 0x9000_0000;
    /// The suite-level status value for a skip.
    pub const AVS_SKIP: u32 = 0x1000_0000;
    /// The suite-level status value for an infrastructure error.
    pub const AVS_ERR: u32 = 0xedcb_1234;

    /// Returns the suite-level status value used by the reference tools.
    pub const fn avs_status(self) -> u32 {
        match self {
            Self::Pass => Self::AVS_PASS,
            Self::Fail => Self::AVS_FAIL,
            Self::Skip => Self::AVS_SKIP,
        }
    }

    /// Classifies a status word returned by the kernel driver or the secure firmware.
    ///
    /// Anything which is neither a pass nor a skip counts as a failure.
    pub fn from_status(status: u32) -> Self {
        let status = TestStatus(status);
        if status.is_pass() {
            Self::Pass
        } else if status.is_skip() {
            Self::Skip
        } else {
            Self::Fail
        }
    }

    /// Combines two outcomes: a failure dominates, then a pass, then a skip.
    pub fn merge(self, other: Self) -> Self {
        match (self, other) {
            (Self::Fail, _) | (_, Self::Fail) => Self::Fail,
            (Self::Pass, _) | (_, Self::Pass) => Self::Pass,
            (Self::Skip, Self::Skip) => Self::Skip,
        }
    }
}

impl Display for Outcome {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Skip => "SKIP",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_fields() {
        let status = TestStatus::fail(4, 31, 0x124);
        assert_eq!(status.0, 0x841f_0124);
        assert_eq!(status.state(), Some(State::Fail));
        assert_eq!(status.level(), 4);
        assert_eq!(status.test_num(), 31);
        assert_eq!(status.sub_code(), 0x124);
    }

    #[test]
    fn test_num_truncated_to_eight_bits() {
        // The secure module base does not fit in the field.
        let status = TestStatus::pass(3, 901, 0);
        assert_eq!(status.test_num(), 901 & 0xff);
        assert_eq!(status.level(), 3);
        assert!(status.is_pass());
    }

    #[test]
    fn pending_and_unassigned_states() {
        assert!(TestStatus::pending(4, 1).is_pending());
        assert_eq!(TestStatus(0x3000_0000).state(), None);
        assert_eq!(TestStatus(0).state(), None);
    }

    #[test]
    fn classify_driver_status() {
        assert_eq!(Outcome::from_status(TestStatus::pass(4, 51, 0).0), Outcome::Pass);
        assert_eq!(Outcome::from_status(TestStatus::skip(4, 51, 2).0), Outcome::Skip);
        assert_eq!(Outcome::from_status(TestStatus::fail(4, 51, 2).0), Outcome::Fail);
        assert_eq!(Outcome::from_status(0xdead_beef), Outcome::Fail);
    }

    #[test]
    fn merge_outcomes() {
        assert_eq!(Outcome::Pass.merge(Outcome::Fail), Outcome::Fail);
        assert_eq!(Outcome::Skip.merge(Outcome::Pass), Outcome::Pass);
        assert_eq!(Outcome::Skip.merge(Outcome::Skip), Outcome::Skip);
        assert_eq!(Outcome::Fail.avs_status(), 0x9000_0000);
    }
}
