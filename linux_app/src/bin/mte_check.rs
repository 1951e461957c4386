// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Checks that the kernel enables MTE for user space, by making a tagged allocation and checking
//! that an access with the wrong tag faults.

use log::info;
use sbsa_acs::options::PrintLevel;
use sbsa_linux_app::init_console;
use std::process::ExitCode;

/// Outcome of the check, and the exit code reporting it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Verdict {
    Pass,
    Fail,
    Skip,
}

impl Verdict {
    fn name(self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Skip => "SKIP",
        }
    }

    fn exit_code(self) -> ExitCode {
        match self {
            Self::Pass => ExitCode::SUCCESS,
            Self::Fail => ExitCode::FAILURE,
            Self::Skip => ExitCode::from(2),
        }
    }
}

fn main() -> ExitCode {
    init_console(PrintLevel::default());
    info!("\n B_PE_16: Check for MTE support");
    let verdict = check();
    info!("\n Result: {}", verdict.name());
    verdict.exit_code()
}

#[cfg(all(target_arch = "aarch64", target_os = "linux"))]
fn check() -> Verdict {
    mte::check()
}

#[cfg(not(all(target_arch = "aarch64", target_os = "linux")))]
fn check() -> Verdict {
    info!("\n MTE can only be checked on AArch64 Linux");
    Verdict::Skip
}

#[cfg(all(target_arch = "aarch64", target_os = "linux"))]
mod mte {
    use super::Verdict;
    use anyhow::{Context, Result, bail};
    use log::{debug, error, info};
    use std::{arch::asm, io, ptr};

    const HWCAP2_MTE: libc::c_ulong = 1 << 18;
    const HWCAP2_MTE3: libc::c_ulong = 1 << 22;

    const PR_SET_TAGGED_ADDR_CTRL: libc::c_int = 55;
    const PR_TAGGED_ADDR_ENABLE: libc::c_ulong = 1 << 0;
    const PR_MTE_TCF_SYNC: libc::c_ulong = 1 << 1;
    const PR_MTE_TCF_ASYNC: libc::c_ulong = 2 << 1;
    const PR_MTE_TAG_SHIFT: u32 = 3;
    /// Lets `IRG` pick any tag except 0.
    const PR_MTE_TAG_INCLUDE: libc::c_ulong = 0xfffe << PR_MTE_TAG_SHIFT;

    const PROT_MTE: libc::c_int = 0x20;

    /// Index of the `u64` accessed through the wrongly tagged pointer.
    const ACCESS_INDEX: usize = 18;

    fn os_error<T>(call: &'static str) -> Result<T> {
        Err(io::Error::last_os_error()).with_context(|| format!("{call} failed"))
    }

    pub fn check() -> Verdict {
        // SAFETY: `getauxval` has no preconditions.
        let hwcap2 = unsafe { libc::getauxval(libc::AT_HWCAP2) };
        if hwcap2 & (HWCAP2_MTE | HWCAP2_MTE3) == 0 {
            info!("\n MTE is not supported by the PE");
            return Verdict::Skip;
        }
        match mismatched_tag_faults() {
            Ok(true) => Verdict::Pass,
            Ok(false) => {
                error!("\n Tag check fault not generated on tag mismatch");
                Verdict::Fail
            }
            Err(e) => {
                error!("\n {e:#}");
                Verdict::Fail
            }
        }
    }

    /// Enables tag checking for this process, then checks that a wrongly tagged access to a
    /// tagged page faults.
    fn mismatched_tag_faults() -> Result<bool> {
        // SAFETY: Setting the tagged address control only affects how this process's own
        // accesses are checked.
        let ret = unsafe {
            libc::prctl(
                PR_SET_TAGGED_ADDR_CTRL,
                PR_TAGGED_ADDR_ENABLE | PR_MTE_TCF_SYNC | PR_MTE_TCF_ASYNC | PR_MTE_TAG_INCLUDE,
                0,
                0,
                0,
            )
        };
        if ret != 0 {
            return os_error("prctl(PR_SET_TAGGED_ADDR_CTRL)");
        }

        // SAFETY: `sysconf` has no preconditions.
        let page_size = usize::try_from(unsafe { libc::sysconf(libc::_SC_PAGESIZE) })
            .ok()
            .filter(|&size| size > 0)
            .context("Cannot get the page size")?;

        // SAFETY: Creating a new private anonymous mapping doesn't affect any existing memory.
        let page = unsafe {
            libc::mmap(
                ptr::null_mut(),
                page_size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if page == libc::MAP_FAILED {
            return os_error("mmap");
        }

        let result = check_page(page, page_size);

        // SAFETY: The page was mapped above and nothing refers to it any more.
        unsafe {
            libc::munmap(page, page_size);
        }
        result
    }

    fn check_page(page: *mut libc::c_void, page_size: usize) -> Result<bool> {
        // SAFETY: The range is exactly the mapping created by the caller.
        let ret = unsafe {
            libc::mprotect(page, page_size, libc::PROT_READ | libc::PROT_WRITE | PROT_MTE)
        };
        if ret != 0 {
            return os_error("mprotect(PROT_MTE)");
        }

        let tagged: *mut u64;
        // SAFETY: `IRG` only computes a tagged pointer, and `STG` sets the allocation tag of the
        // first granule of the page, which this process owns and has mapped with `PROT_MTE`.
        unsafe {
            asm!(
                ".arch_extension memtag",
                "irg {tagged}, {page}",
                "stg {tagged}, [{tagged}]",
                tagged = out(reg) tagged,
                page = in(reg) page,
                options(nostack),
            );
        }
        debug!("\n Tagged pointer {tagged:p}");

        // SAFETY: The child only touches the page, which fork gives it its own copy of.
        match unsafe { libc::fork() } {
            -1 => os_error("fork"),
            0 => {
                // SAFETY: The access is within the page, but outside the tagged granule, so with
                // MTE enabled it faults and the child never returns. Otherwise the write is to
                // memory the child owns.
                unsafe {
                    tagged.add(ACCESS_INDEX).write_volatile(1);
                    libc::_exit(0)
                }
            }
            child => killed_by_segv(child),
        }
    }

    fn killed_by_segv(child: libc::pid_t) -> Result<bool> {
        let mut status = 0;
        // SAFETY: `status` is a valid pointer for the duration of the call.
        if unsafe { libc::waitpid(child, &mut status, 0) } != child {
            return os_error("waitpid");
        }
        if libc::WIFEXITED(status) && libc::WEXITSTATUS(status) != 0 {
            bail!("Child exited with status {}", libc::WEXITSTATUS(status));
        }
        Ok(libc::WIFSIGNALED(status) && libc::WTERMSIG(status) == libc::SIGSEGV)
    }
}
