// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Pieces shared by the Linux binaries of the SBSA compliance suite.

pub mod flows;
pub mod proc_channel;

use sbsa_acs::options::PrintLevel;
use std::io::Write;

/// Sends log output to stdout as bare lines, filtered by the suite's print level, so that result
/// lines look the same as from the firmware builds.
pub fn init_console(print_level: PrintLevel) {
    env_logger::Builder::new()
        .filter_level(print_level.level_filter())
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .target(env_logger::Target::Stdout)
        .init();
}
