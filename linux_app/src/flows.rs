// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! The test modules the Linux application runs through the SBSA kernel driver.
//!
//! A driver failure aborts only the module it happened in. The driver's info tables are freed
//! whatever happened.

use log::{debug, error, info, warn};
use sbsa_acs::{
    driver::{
        ApiNumber, ClientError, DriverChannel, DriverClient, PCIE_FIRST_TEST, PCIE_LAST_TEST,
        outcome,
    },
    options::{PrintLevel, SkipList},
    status::Outcome,
};
use std::fmt::Display;

/// The tests are driven from one PE.
pub const NUM_PE: u32 = 1;

/// The SMMU tests run for compliance levels above this one.
pub const SMMU_MIN_LEVEL: u32 = 6;

/// Runs the SMMU tests if the level asks for them, then the PCIe tests, then frees the driver's
/// info tables.
pub fn run_modules<C: DriverChannel>(
    client: &mut DriverClient<C>,
    level: u32,
    print_level: PrintLevel,
    skip_list: &SkipList,
) where
    C::Error: Display,
{
    if level > SMMU_MIN_LEVEL
        && let Err(e) = run_smmu_tests(client, level, print_level, skip_list)
    {
        abort_module(client, "SMMU", e);
    }
    if let Err(e) = run_pcie_tests(client, level, print_level, skip_list) {
        abort_module(client, "PCIe", e);
    }

    info!("\n  ** For complete SBSA test coverage, it is necessary to also run the BSA test **");
    info!("\n                    *** SBSA tests complete ***\n");

    if let Err(e) = client.clean_test_env() {
        error!("Failed to free the driver's info tables: {e}");
    }
}

fn abort_module<C: DriverChannel>(
    client: &mut DriverClient<C>,
    module: &str,
    e: ClientError<C::Error>,
) where
    C::Error: Display,
{
    error!("{module} tests aborted: {e}");
    if let Some(api) = client.abandon() {
        warn!("Abandoned driver request {api:?}");
    }
}

/// Runs the PCIe tests one by one. If the first one does not pass there is no ECAM, and the rest
/// are not run.
pub fn run_pcie_tests<C: DriverChannel>(
    client: &mut DriverClient<C>,
    level: u32,
    print_level: PrintLevel,
    skip_list: &SkipList,
) -> Result<(), ClientError<C::Error>> {
    for test_num in PCIE_FIRST_TEST..=PCIE_LAST_TEST {
        if skip_list.skips(test_num) {
            info!("Executing Test {test_num} :  USER OVERRIDE - Skip Test");
            continue;
        }
        info!("Executing Test {test_num} :  ");
        client.execute_test(
            ApiNumber::PcieExecuteTest,
            NUM_PE,
            level,
            print_level.0,
            test_num.into(),
        )?;
        let result = outcome(client.wait_for_completion()?);
        info!("RESULT: {result}");
        if result != Outcome::Pass && test_num == PCIE_FIRST_TEST {
            info!("\n No ECAM, No point continuing with PCIe tests");
            break;
        }
    }
    Ok(())
}

/// Hands the skip list to the driver and runs its SMMU tests, which report through driver
/// messages.
pub fn run_smmu_tests<C: DriverChannel>(
    client: &mut DriverClient<C>,
    level: u32,
    print_level: PrintLevel,
    skip_list: &SkipList,
) -> Result<(), ClientError<C::Error>> {
    client.update_skip_list(skip_list.to_array())?;
    client.execute_test(ApiNumber::SmmuExecuteTest, NUM_PE, level, print_level.0, 0)?;
    let status = client.wait_for_completion()?;
    debug!("SMMU tests completed with status {status:#x}");
    Ok(())
}
