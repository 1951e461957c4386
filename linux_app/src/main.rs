// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Runs the kernel-side SBSA tests through the SBSA kernel driver.
//!
//! Exits with 0 once the tests have been attempted, whatever their results. Driver failures are
//! reported in the output.

use clap::Parser;
use log::{debug, info};
use sbsa_acs::{
    driver::DriverClient,
    options::{DEFAULT_LEVEL, MAX_LEVEL, PrintLevel, SkipList},
    suite::VERSION,
};
use sbsa_linux_app::{
    flows::run_modules,
    init_console,
    proc_channel::{MESSAGE_PATH, ProcChannel, REQUEST_PATH},
};

/// Compliance level which runs every test, beyond the numbered levels.
const FULL_RANGE_LEVEL: u32 = 8;

#[derive(Debug, Parser)]
#[command(name = "sbsa", version = VERSION, about = "SBSA Architecture Compliance Suite")]
/// Command line of the Linux application.
struct Args {
    /// Verbosity of the prints: 1 shows all prints, 5 shows errors only.
    #[arg(short = 'v', default_value_t = PrintLevel::default().0,
          value_parser = clap::value_parser!(u32).range(1..=5))]
    verbosity: u32,

    /// Level of compliance to be tested for.
    #[arg(short = 'l', default_value_t = DEFAULT_LEVEL)]
    level: u32,

    /// Run the full range of tests, beyond the numbered levels.
    #[arg(long)]
    fr: bool,

    /// Up to three tests to skip. To skip a whole module, give its base number.
    #[arg(long, value_delimiter = ',')]
    skip: Vec<u32>,

    /// Request file of the SBSA kernel driver.
    #[arg(long, default_value = REQUEST_PATH, hide = true)]
    driver_file: String,

    /// Message file of the SBSA kernel driver.
    #[arg(long, default_value = MESSAGE_PATH, hide = true)]
    message_file: String,
}

impl Args {
    fn level(&self) -> u32 {
        if self.fr { FULL_RANGE_LEVEL } else { self.level }
    }
}

fn main() {
    let args = Args::parse();
    let print_level = PrintLevel(args.verbosity);
    init_console(print_level);
    run(&args, print_level);
}

fn run(args: &Args, print_level: PrintLevel) {
    let level = args.level();
    let skip_list = SkipList::new(&args.skip);

    info!("\n ************ SBSA Architecture Compliance Suite *********");
    info!("                        Version {VERSION}");
    if level > MAX_LEVEL {
        info!("\n Starting tests for level FR (Print level is {:2})\n", print_level.0);
    } else {
        info!("\n Starting tests for level {level:2} (Print level is {:2})\n", print_level.0);
    }

    info!(" Gathering system information....");
    let mut client = DriverClient::new(ProcChannel::new(&args.driver_file, &args.message_file));
    if let Err(e) = client.init_test_env(print_level.0) {
        debug!("{e}");
        info!("Cannot initialize test environment. Exiting....");
        return;
    }

    run_modules(&mut client, level, print_level, &skip_list);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = Args::try_parse_from(["sbsa"]).unwrap();
        assert_eq!(args.verbosity, 3);
        assert_eq!(args.level(), 4);
        assert!(args.skip.is_empty());
        assert_eq!(args.driver_file, "/proc/sbsa");
    }

    #[test]
    fn full_range_and_skip() {
        let args = Args::try_parse_from(["sbsa", "--fr", "--skip", "51,90", "-v", "1"]).unwrap();
        assert_eq!(args.level(), 8);
        assert_eq!(args.skip, [51, 90]);
        let skip_list = SkipList::new(&args.skip);
        assert_eq!(skip_list.to_array(), [51, 90, 10000]);
        assert!(skip_list.skips(95));
    }

    #[test]
    fn verbosity_range() {
        assert!(Args::try_parse_from(["sbsa", "-v", "6"]).is_err());
        assert!(Args::try_parse_from(["sbsa", "-h"]).is_err());
    }
}
