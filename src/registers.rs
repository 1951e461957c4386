// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Lookup of system register accessors by register ID.
//!
//! Payloads name registers by a numeric ID. Each ID maps to a read accessor and optionally a
//! write accessor; an ID without an entry is reported as an error rather than trapping.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use thiserror::Error;

/// System registers which payloads may access by ID.
#[derive(Clone, Copy, Debug, Eq, IntoPrimitive, PartialEq, TryFromPrimitive)]
#[repr(u32)]
pub enum RegisterId {
    /// MIDR_EL1
    MidrEl1 = 1,
    /// MPIDR_EL1
    MpidrEl1,
    /// ID_AA64PFR0_EL1
    IdAa64pfr0El1,
    /// ID_AA64PFR1_EL1
    IdAa64pfr1El1,
    /// ID_AA64MMFR0_EL1
    IdAa64mmfr0El1,
    /// ID_AA64MMFR1_EL1
    IdAa64mmfr1El1,
    /// ID_AA64DFR0_EL1
    IdAa64dfr0El1,
    /// MPAMIDR_EL1
    MpamidrEl1,
    /// PMCR_EL0
    PmcrEl0,
    /// SCTLR_EL2
    SctlrEl2,
    /// HCR_EL2
    HcrEl2,
    /// MDCR_EL2
    MdcrEl2,
}

/// Errors from register accesses by ID.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum RegisterError {
    /// The ID is not a known register, or the register has no accessor on this platform.
    #[error("unknown register ID {0}")]
    Unknown(u32),
    /// The register is known but has no write accessor.
    #[error("register {0:?} is not writable")]
    ReadOnly(RegisterId),
}

/// Accessors for one register.
#[derive(Clone, Copy, Debug)]
pub struct RegisterAccessor {
    /// The register this entry is for.
    pub id: RegisterId,
    /// Reads the register.
    pub read: fn() -> u64,
    /// Writes the register, if it is writable.
    pub write: Option<fn(u64)>,
}

/// A table of register accessors.
#[derive(Clone, Copy, Debug)]
pub struct RegisterMap {
    accessors: &'static [RegisterAccessor],
}

impl RegisterMap {
    /// Creates a map over the given accessors.
    pub const fn new(accessors: &'static [RegisterAccessor]) -> Self {
        Self { accessors }
    }

    /// A map with no registers, for hosts which cannot read system registers.
    pub const EMPTY: Self = Self::new(&[]);

    fn find(&self, id: u32) -> Result<&RegisterAccessor, RegisterError> {
        let register = RegisterId::try_from(id).map_err(|_| RegisterError::Unknown(id))?;
        self.accessors
            .iter()
            .find(|accessor| accessor.id == register)
            .ok_or(RegisterError::Unknown(id))
    }

    /// Reads the register with the given ID.
    pub fn read(&self, id: u32) -> Result<u64, RegisterError> {
        Ok((self.find(id)?.read)())
    }

    /// Writes the register with the given ID.
    pub fn write(&self, id: u32, value: u64) -> Result<(), RegisterError> {
        let accessor = self.find(id)?;
        let write = accessor.write.ok_or(RegisterError::ReadOnly(accessor.id))?;
        write(value);
        Ok(())
    }
}

#[cfg(any(target_arch = "aarch64", test))]
mod current {
    use super::{RegisterAccessor, RegisterId, RegisterMap};
    use arm_sysregs::{
        read_hcr_el2, read_id_aa64dfr0_el1, read_id_aa64mmfr0_el1, read_id_aa64mmfr1_el1,
        read_id_aa64pfr0_el1, read_id_aa64pfr1_el1, read_mdcr_el2, read_midr_el1,
        read_mpamidr_el1, read_mpidr_el1, read_pmcr_el0, read_sctlr_el2,
    };

    macro_rules! read_only {
        ($id:ident, $read:ident) => {
            RegisterAccessor {
                id: RegisterId::$id,
                read: || $read().bits(),
                write: None,
            }
        };
    }

    static ACCESSORS: [RegisterAccessor; 12] = [
        read_only!(MidrEl1, read_midr_el1),
        read_only!(MpidrEl1, read_mpidr_el1),
        read_only!(IdAa64pfr0El1, read_id_aa64pfr0_el1),
        read_only!(IdAa64pfr1El1, read_id_aa64pfr1_el1),
        read_only!(IdAa64mmfr0El1, read_id_aa64mmfr0_el1),
        read_only!(IdAa64mmfr1El1, read_id_aa64mmfr1_el1),
        read_only!(IdAa64dfr0El1, read_id_aa64dfr0_el1),
        read_only!(MpamidrEl1, read_mpamidr_el1),
        read_only!(PmcrEl0, read_pmcr_el0),
        read_only!(SctlrEl2, read_sctlr_el2),
        read_only!(HcrEl2, read_hcr_el2),
        read_only!(MdcrEl2, read_mdcr_el2),
    ];

    /// The registers of the current PE.
    pub static CURRENT_PE: RegisterMap = RegisterMap::new(&ACCESSORS);
}

#[cfg(any(target_arch = "aarch64", test))]
pub use current::CURRENT_PE;
