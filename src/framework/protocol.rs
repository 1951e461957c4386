// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! The job description the dispatcher leaves in a PE's slot before powering it on.
//!
//! A job names the test to run by number rather than by code address, so the receiving PE
//! resolves the payload itself from the test registry.

use thiserror::Error;

/// Value in the top half of data word 0 marking a slot which holds a job.
const JOB_TAG: u64 = 0x4a4f_4253;

/// Value of data word 0 for a slot with no job.
const NO_JOB: u64 = 0;

const TAG_SHIFT: u32 = 32;
const LEVEL_SHIFT: u32 = 16;
const LEVEL_MASK: u64 = 0xf;
const TEST_NUM_MASK: u64 = 0xffff;

/// The contents of a PE's dispatch slot.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Job {
    /// Nothing to run.
    Idle,
    /// Run the payload of the given test.
    Run {
        /// The test number, which identifies the payload in the registry.
        test_num: u32,
        /// The compliance level the test is running at.
        level: u32,
        /// Argument passed through to the payload.
        arg: u64,
    },
}

impl From<Job> for (u64, u64) {
    fn from(job: Job) -> Self {
        match job {
            Job::Idle => (NO_JOB, 0),
            Job::Run {
                test_num,
                level,
                arg,
            } => (
                JOB_TAG << TAG_SHIFT
                    | (u64::from(level) & LEVEL_MASK) << LEVEL_SHIFT
                    | (u64::from(test_num) & TEST_NUM_MASK),
                arg,
            ),
        }
    }
}

impl TryFrom<(u64, u64)> for Job {
    type Error = ParseJobError;

    fn try_from((data0, data1): (u64, u64)) -> Result<Self, ParseJobError> {
        if data0 == NO_JOB {
            return Ok(Self::Idle);
        }
        match data0 >> TAG_SHIFT {
            JOB_TAG => Ok(Self::Run {
                test_num: (data0 & TEST_NUM_MASK) as u32,
                level: ((data0 >> LEVEL_SHIFT) & LEVEL_MASK) as u32,
                arg: data1,
            }),
            tag => Err(ParseJobError::InvalidTag(tag)),
        }
    }
}

/// A dispatch slot which does not hold a valid job.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum ParseJobError {
    /// Data word 0 was not written by the dispatcher.
    #[error("Unexpected job tag {0:#x}")]
    InvalidTag(u64),
}
