// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Transport to the SBSA kernel driver, which runs the tests that need a kernel (PCIe, SMMU) on
//! behalf of the Linux application.

pub mod client;
pub mod protocol;

pub use client::{ClientError, DriverChannel, DriverClient, MESSAGE_TARGET, RequestState};
pub use protocol::{ApiNumber, DriverMessage, DriverParams, ProtocolError};

use crate::status::Outcome;

/// First PCIe test run through the driver. Without it passing there is no ECAM to test.
pub const PCIE_FIRST_TEST: u32 = 51;

/// Last PCIe test run through the driver.
pub const PCIE_LAST_TEST: u32 = 57;

/// Classifies a completion status returned by the driver.
pub fn outcome(status: u64) -> Outcome {
    Outcome::from_status(status as u32)
}
