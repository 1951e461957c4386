// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! PSCI calls used to power remote PEs up for one job and back down again.

use arm_psci::ErrorCode;

/// The PSCI calls the dispatcher needs.
pub trait PowerControl {
    /// Powers on the PE with the given MPIDR, which starts at the platform's secondary entry
    /// point with `context_id` in x0.
    fn cpu_on(&self, target_mpidr: u64, context_id: u64) -> Result<(), ErrorCode>;

    /// Powers off the calling PE. Only returns on failure.
    fn cpu_off(&self) -> Result<(), ErrorCode>;
}

/// Returns the magnitude of the PSCI return code for the given error, as used in FAIL
/// sub-codes.
pub fn error_magnitude(error: ErrorCode) -> u16 {
    match error {
        ErrorCode::NotSupported => 1,
        ErrorCode::InvalidParameters => 2,
        ErrorCode::Denied => 3,
        ErrorCode::AlreadyOn => 4,
        ErrorCode::OnPending => 5,
        ErrorCode::InvalidAddress => 9,
        _ => 6,
    }
}

/// Makes PSCI calls through the SMC conduit.
#[cfg(all(target_arch = "aarch64", not(test)))]
#[derive(Clone, Copy, Debug)]
pub struct SmcPowerControl {
    /// Physical address at which powered-on PEs start executing.
    pub entry_point: u64,
}

#[cfg(all(target_arch = "aarch64", not(test)))]
impl SmcPowerControl {
    fn convert(error: ::smccc::psci::Error) -> ErrorCode {
        use ::smccc::psci::Error;

        match error {
            Error::NotSupported => ErrorCode::NotSupported,
            Error::InvalidParameters => ErrorCode::InvalidParameters,
            Error::Denied => ErrorCode::Denied,
            Error::AlreadyOn => ErrorCode::AlreadyOn,
            Error::OnPending => ErrorCode::OnPending,
            Error::InvalidAddress => ErrorCode::InvalidAddress,
            _ => ErrorCode::InternalFailure,
        }
    }
}

#[cfg(all(target_arch = "aarch64", not(test)))]
impl PowerControl for SmcPowerControl {
    fn cpu_on(&self, target_mpidr: u64, context_id: u64) -> Result<(), ErrorCode> {
        // Make sure the job written to shared memory is visible before the target starts.
        // SAFETY: A barrier has no effect on memory safety.
        unsafe {
            core::arch::asm!("dsb st", options(nostack));
        }
        ::smccc::psci::cpu_on::<::smccc::Smc>(target_mpidr, self.entry_point, context_id)
            .map_err(Self::convert)
    }

    fn cpu_off(&self) -> Result<(), ErrorCode> {
        ::smccc::psci::cpu_off::<::smccc::Smc>().map_err(Self::convert)
    }
}
