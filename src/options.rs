// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Run options: compliance level, print level, the user's skip list and which optional test
//! groups to run.

use crate::suite::Module;
use alloc::string::{String, ToString};
use arrayvec::ArrayVec;
use core::num::ParseIntError;
use log::LevelFilter;
use thiserror::Error;

/// The maximum number of entries in a skip list.
pub const MAX_SKIP: usize = 3;

/// Value of an unused skip list entry in the fixed-size form passed to the kernel driver.
pub const SKIP_UNUSED: u32 = 10000;

/// The default compliance level.
pub const DEFAULT_LEVEL: u32 = 4;

/// The lowest compliance level which can be tested.
pub const MIN_LEVEL: u32 = 3;

/// The highest compliance level which can be tested.
pub const MAX_LEVEL: u32 = 7;

/// Usage text for the UEFI-style command line.
pub const HELP: &str = "\
Usage: Sbsa.efi [-v <n>] | [-l <n>] | [-f <filename>] | [-s] | [-skip <n>] | [-p <n>]
Options:
-v      Verbosity of the Prints
        1 shows all prints, 5 shows Errors
-l      Level of compliance to be tested for
        As per the SBSA document, 3 to 7
-f      Name of the log file to record the test results in
-s      Enable the execution of secure tests
-skip   Test(s) to be skipped
        To skip a module, use Model_ID as mentioned in user guide
        To skip a particular test within a module, use the exact testcase number
-p      Enable/disable PCIe SBSA 6.0 (RCiEP) compliance tests
        1 - enables PCIe tests, 0 - disables PCIe tests";

/// Errors parsing run options.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum OptionsError {
    /// An option value was not a decimal number.
    #[error("invalid number {value:?} for {option}: {source}")]
    InvalidNumber {
        /// The option the value was given for.
        option: String,
        /// The value as given.
        value: String,
        /// Why it could not be parsed.
        source: ParseIntError,
    },
    /// An option which takes a value was the last argument.
    #[error("missing value for {0}")]
    MissingValue(String),
    /// The option is not recognised.
    #[error("Unrecognized option {0} passed")]
    UnknownOption(String),
    /// The requested compliance level is below the minimum supported.
    #[error("SBSA Level {0} is not supported.")]
    LevelNotSupported(u32),
    /// More than [`MAX_SKIP`] tests were given to skip.
    #[error("at most {MAX_SKIP} tests can be skipped")]
    TooManySkips,
    /// The PCIe option was neither 0 nor 1.
    #[error("Invalid PCIe option {0}, use \"-p 1\" to enable or \"-p 0\" to disable RCiEP tests")]
    InvalidPcieOption(u32),
    /// The NIST statistical test suite is not part of this build.
    #[error("NIST statistical tests are not supported")]
    NistNotSupported,
}

/// Tests and modules which the user asked not to run.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SkipList {
    entries: ArrayVec<u32, MAX_SKIP>,
}

impl SkipList {
    /// Creates a skip list from up to [`MAX_SKIP`] values. Unused entries and values beyond the
    /// limit are ignored.
    pub fn new(values: &[u32]) -> Self {
        Self {
            entries: values
                .iter()
                .copied()
                .filter(|&value| value != SKIP_UNUSED)
                .take(MAX_SKIP)
                .collect(),
        }
    }

    /// Parses a comma-separated list of decimal test or module numbers.
    pub fn parse(option: &str, list: &str) -> Result<Self, OptionsError> {
        let mut skip_list = Self::default();
        for value in list.split(',').map(str::trim).filter(|value| !value.is_empty()) {
            let number = parse_number(option, value)?;
            skip_list
                .entries
                .try_push(number)
                .map_err(|_| OptionsError::TooManySkips)?;
        }
        Ok(skip_list)
    }

    /// Returns the entries.
    pub fn entries(&self) -> &[u32] {
        &self.entries
    }

    /// Returns whether the given test should be skipped, either because it is listed itself or
    /// because the module it belongs to is listed.
    pub fn skips(&self, test_num: u32) -> bool {
        self.entries.contains(&test_num)
            || Module::of(test_num).is_some_and(|module| self.skips_module(module))
    }

    /// Returns whether every test of the given module should be skipped.
    pub fn skips_module(&self, module: Module) -> bool {
        self.entries.contains(&module.base())
    }

    /// Returns the fixed-size form with unused entries set to [`SKIP_UNUSED`].
    pub fn to_array(&self) -> [u32; MAX_SKIP] {
        let mut array = [SKIP_UNUSED; MAX_SKIP];
        array[..self.entries.len()].copy_from_slice(&self.entries);
        array
    }
}

/// Verbosity of the console output, from 1 (everything) to 5 (errors only).
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct PrintLevel(pub u32);

impl PrintLevel {
    /// Prints everything.
    pub const ALL: Self = Self(1);
    /// Prints test results and above. The default.
    pub const TEST: Self = Self(3);
    /// Prints errors only.
    pub const ERROR: Self = Self(5);

    /// Returns the log level filter for this print level.
    pub fn level_filter(self) -> LevelFilter {
        match self.0 {
            0..=1 => LevelFilter::Trace,
            2 => LevelFilter::Debug,
            3 => LevelFilter::Info,
            4 => LevelFilter::Warn,
            _ => LevelFilter::Error,
        }
    }
}

impl Default for PrintLevel {
    fn default() -> Self {
        Self::TEST
    }
}

/// What the command line asked for.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Command {
    /// Run the suite with these options.
    Run(RunOptions),
    /// Print usage and exit.
    Help,
}

/// Options for one run of the suite.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RunOptions {
    /// Console verbosity.
    pub print_level: PrintLevel,
    /// The compliance level to test for.
    pub level: u32,
    /// Tests and modules not to run.
    pub skip_list: SkipList,
    /// File to record the results in, as well as the console. The application opens it and
    /// passes it to [`logger::init`](crate::logger::init) as the second sink.
    pub log_file: Option<String>,
    /// Run the tests which need the secure firmware service.
    pub secure: bool,
    /// Run the PCIe tests.
    pub pcie: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            print_level: PrintLevel::default(),
            level: DEFAULT_LEVEL,
            skip_list: SkipList::default(),
            log_file: None,
            secure: false,
            pcie: true,
        }
    }
}

fn parse_number(option: &str, value: &str) -> Result<u32, OptionsError> {
    value
        .parse()
        .map_err(|source| OptionsError::InvalidNumber {
            option: option.to_string(),
            value: value.to_string(),
            source,
        })
}

/// Checks a requested compliance level: below the minimum is an error, above the maximum falls
/// back to the default.
pub fn check_level(level: u32) -> Result<u32, OptionsError> {
    if level < MIN_LEVEL {
        Err(OptionsError::LevelNotSupported(level))
    } else if level > MAX_LEVEL {
        Ok(DEFAULT_LEVEL)
    } else {
        Ok(level)
    }
}

impl RunOptions {
    /// Parses UEFI shell style arguments, not including the program name.
    ///
    /// Print levels above 5 fall back to the default. Unless `-p` is given, PCIe tests run from
    /// level 4 upwards.
    pub fn parse<'a>(args: impl IntoIterator<Item = &'a str>) -> Result<Command, OptionsError> {
        let mut options = Self::default();
        let mut pcie = None;
        let mut help = false;
        let mut args = args.into_iter();

        while let Some(option) = args.next() {
            let mut value = || {
                args.next()
                    .ok_or_else(|| OptionsError::MissingValue(option.to_string()))
            };
            match option {
                "-v" => {
                    let level = PrintLevel(parse_number(option, value()?)?);
                    options.print_level = if level > PrintLevel::ERROR {
                        PrintLevel::default()
                    } else {
                        level
                    };
                }
                "-l" => options.level = check_level(parse_number(option, value()?)?)?,
                "-f" => options.log_file = Some(value()?.to_string()),
                "-s" => options.secure = true,
                "-skip" => options.skip_list = SkipList::parse(option, value()?)?,
                "-nist" => return Err(OptionsError::NistNotSupported),
                "-p" => pcie = Some(parse_number(option, value()?)?),
                "-h" | "-help" => help = true,
                _ => return Err(OptionsError::UnknownOption(option.to_string())),
            }
        }

        if help {
            return Ok(Command::Help);
        }
        options.pcie = match pcie {
            None => options.level >= 4,
            Some(0) => false,
            Some(1) => true,
            Some(other) => return Err(OptionsError::InvalidPcieOption(other)),
        };
        Ok(Command::Run(options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_options(args: &[&str]) -> RunOptions {
        match RunOptions::parse(args.iter().copied()).unwrap() {
            Command::Run(options) => options,
            Command::Help => panic!("unexpected help"),
        }
    }

    #[test]
    fn defaults() {
        let options = run_options(&[]);
        assert_eq!(options.level, 4);
        assert_eq!(options.print_level, PrintLevel(3));
        assert!(options.pcie);
        assert!(!options.secure);
        assert_eq!(options.skip_list.to_array(), [10000; 3]);
    }

    #[test]
    fn all_options() {
        let options = run_options(&[
            "-v", "1", "-l", "5", "-f", "sbsa.log", "-s", "-skip", "20,51", "-p", "0",
        ]);
        assert_eq!(options.print_level, PrintLevel::ALL);
        assert_eq!(options.level, 5);
        assert_eq!(options.log_file.as_deref(), Some("sbsa.log"));
        assert!(options.secure);
        assert!(!options.pcie);
        assert_eq!(options.skip_list.to_array(), [20, 51, 10000]);
    }

    #[test]
    fn level_limits() {
        assert_eq!(run_options(&["-l", "9"]).level, DEFAULT_LEVEL);
        assert_eq!(
            RunOptions::parse(["-l", "2"]),
            Err(OptionsError::LevelNotSupported(2))
        );
        // PCIe tests default off below level 4.
        assert!(!run_options(&["-l", "3"]).pcie);
        assert_eq!(run_options(&["-v", "7"]).print_level, PrintLevel::TEST);
    }

    #[test]
    fn help_wins() {
        assert_eq!(RunOptions::parse(["-l", "5", "-help"]), Ok(Command::Help));
        assert_eq!(RunOptions::parse(["-h"]), Ok(Command::Help));
    }

    #[test]
    fn bad_arguments() {
        assert_eq!(
            RunOptions::parse(["-x"]),
            Err(OptionsError::UnknownOption("-x".into()))
        );
        assert_eq!(
            RunOptions::parse(["-v"]),
            Err(OptionsError::MissingValue("-v".into()))
        );
        assert!(matches!(
            RunOptions::parse(["-l", "four"]),
            Err(OptionsError::InvalidNumber { .. })
        ));
        assert_eq!(
            RunOptions::parse(["-skip", "1,2,3,4"]),
            Err(OptionsError::TooManySkips)
        );
        assert_eq!(
            RunOptions::parse(["-p", "2"]),
            Err(OptionsError::InvalidPcieOption(2))
        );
        assert_eq!(
            RunOptions::parse(["-s", "-nist"]),
            Err(OptionsError::NistNotSupported)
        );
        assert!(!HELP.contains("-nist"));
    }

    #[test]
    fn skip_by_test_or_module() {
        let skip_list = SkipList::new(&[31, 50, 10000]);
        assert!(skip_list.skips(31));
        assert!(!skip_list.skips(32));
        // 50 is the PCIe module base.
        assert!(skip_list.skips(57));
        assert!(skip_list.skips_module(Module::Pcie));
        assert!(!skip_list.skips_module(Module::Timer));
        assert_eq!(skip_list.entries(), &[31, 50]);
    }

    #[test]
    fn print_levels() {
        assert_eq!(PrintLevel::ALL.level_filter(), LevelFilter::Trace);
        assert_eq!(PrintLevel(2).level_filter(), LevelFilter::Debug);
        assert_eq!(PrintLevel::TEST.level_filter(), LevelFilter::Info);
        assert_eq!(PrintLevel(4).level_filter(), LevelFilter::Warn);
        assert_eq!(PrintLevel::ERROR.level_filter(), LevelFilter::Error);
    }
}
