// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! The parts of the SMC Calling Convention the secure test service needs.

use core::fmt::{self, Debug, Display, Formatter};

const FAST_CALL: u32 = 0x8000_0000;
const SMC64: u32 = 0x4000_0000;
const OEN_MASK: u32 = 0x3f00_0000;
const OEN_SHIFT: u8 = 24;
const RESERVED_BITS: u32 = 0x7f << 17;

/// The call is not supported by the implementation.
pub const NOT_SUPPORTED: i32 = -1;

/// Value returned in x0 for an unknown function ID, or a call the caller may not make.
pub const SMC_UNK: u64 = NOT_SUPPORTED as u64;

/// The type of an SMCCC call.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SmcccCallType {
    /// An SMC32/HVC32 fast call.
    Fast32,
    /// An SMC64/HVC64 fast call.
    Fast64,
    /// A yielding call.
    Yielding,
}

/// Owning Entity Number (OEN)
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct OwningEntityNumber(pub u8);

impl OwningEntityNumber {
    /// Standard secure services, which the SBSA test call sits under.
    pub const STANDARD_SECURE: Self = Self(4);
}

impl Display for OwningEntityNumber {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An SMCCC function ID.
#[derive(Copy, Clone, Eq, PartialEq)]
#[repr(transparent)]
pub struct FunctionId(pub u32);

impl FunctionId {
    /// Creates a new `FunctionId` from its components.
    pub const fn new(call_type: SmcccCallType, oen: OwningEntityNumber, number: u16) -> Self {
        let type_bits = match call_type {
            SmcccCallType::Fast32 => FAST_CALL,
            SmcccCallType::Fast64 => FAST_CALL | SMC64,
            SmcccCallType::Yielding => 0,
        };
        Self(type_bits | (((oen.0 as u32) << OEN_SHIFT) & OEN_MASK) | (number as u32))
    }

    /// Returns the Owning Entity Number of the function ID.
    pub fn oen(self) -> OwningEntityNumber {
        OwningEntityNumber(((self.0 & OEN_MASK) >> OEN_SHIFT) as u8)
    }

    /// Returns the lower 16 bits of the function ID.
    pub fn number(self) -> u16 {
        self.0 as u16
    }

    /// Returns what type of call this is.
    pub fn call_type(self) -> SmcccCallType {
        if self.0 & FAST_CALL == 0 {
            SmcccCallType::Yielding
        } else if self.0 & SMC64 != 0 {
            SmcccCallType::Fast64
        } else {
            SmcccCallType::Fast32
        }
    }

    /// Returns false if this is a fast call but has any of bits 17-23 set.
    pub fn valid(self) -> bool {
        self.call_type() == SmcccCallType::Yielding || self.0 & RESERVED_BITS == 0
    }
}

impl Display for FunctionId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

impl Debug for FunctionId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "{:#010x} ({:?} OEN {} number {:#x})",
            self.0,
            self.call_type(),
            self.oen(),
            self.number()
        )
    }
}

/// Registers x0-x3 as written back to the caller. The SBSA call never returns more.
#[derive(Clone, Copy, Default, Eq, PartialEq)]
pub struct SmcReturn {
    used: usize,
    values: [u64; Self::MAX_VALUES],
}

impl SmcReturn {
    /// The most registers a return writes.
    pub const MAX_VALUES: usize = 4;

    /// Returns a slice containing the used values.
    pub fn values(&self) -> &[u64] {
        &self.values[..self.used]
    }

    /// Returns all four registers, with unused ones as zero.
    pub fn registers(&self) -> [u64; Self::MAX_VALUES] {
        self.values
    }
}

impl Debug for SmcReturn {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "SmcReturn(")?;
        let mut list = f.debug_list();
        for value in self.values() {
            list.entry(&format_args!("{value:#x}"));
        }
        list.finish()?;
        write!(f, ")")
    }
}

impl From<u64> for SmcReturn {
    fn from(value: u64) -> Self {
        Self {
            used: 1,
            values: [value, 0, 0, 0],
        }
    }
}

impl From<[u64; 4]> for SmcReturn {
    fn from(values: [u64; 4]) -> Self {
        Self { used: 4, values }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::format;

    #[test]
    fn sbsa_function_id() {
        let fid = FunctionId(0x8400_1000);
        assert_eq!(fid.call_type(), SmcccCallType::Fast32);
        assert_eq!(fid.oen(), OwningEntityNumber::STANDARD_SECURE);
        assert_eq!(fid.number(), 0x1000);
        assert!(fid.valid());
        assert_eq!(
            FunctionId::new(
                SmcccCallType::Fast32,
                OwningEntityNumber::STANDARD_SECURE,
                0x1000
            ),
            fid
        );
        assert!(!FunctionId(0x8402_1000).valid());
    }

    #[test]
    fn return_values() {
        let unknown = SmcReturn::from(SMC_UNK);
        assert_eq!(unknown.values(), &[u64::MAX]);
        assert_eq!(unknown.registers(), [u64::MAX, 0, 0, 0]);
        assert_eq!(
            format!("{:?}", SmcReturn::from([0x1001, 0, 0x2a, 0])),
            "SmcReturn([0x1001, 0x0, 0x2a, 0x0])"
        );
    }
}
