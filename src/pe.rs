// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! The PE info table: one entry per processing element, indexed densely from 0.

use alloc::vec::Vec;
use log::warn;
use thiserror::Error;

/// Mask of the Aff0..Aff2 fields of MPIDR_EL1.
const AFF0_2_MASK: u64 = 0x00ff_ffff;
/// Mask of the Aff3 field of MPIDR_EL1, before shifting.
const AFF3_MASK: u64 = 0xff << 32;

/// Returns the affinity fields of the given MPIDR_EL1 value, with Aff3 moved down to bits
/// [31:24]. MT, U and the reserved bits are dropped.
pub const fn mpidr_affinity(mpidr: u64) -> u32 {
    (((mpidr & AFF3_MASK) >> 8) | (mpidr & AFF0_2_MASK)) as u32
}

/// Returns the PSCI form of the given MPIDR_EL1 value: only the affinity fields, in place.
pub const fn psci_mpidr(mpidr: u64) -> u64 {
    mpidr & (AFF3_MASK | AFF0_2_MASK)
}

/// One PE as discovered by the platform.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PeInfoEntry {
    /// Linear index of the PE, equal to its position in the table.
    pub pe_num: u32,
    /// The MPIDR value of the PE, which PSCI uses to address it.
    pub mpidr: u64,
    /// The GSIV of the PE's PMU overflow interrupt.
    pub pmu_gsiv: u32,
    /// The ACPI processor UID.
    pub acpi_proc_uid: u32,
}

/// Problems found while building a [`PeInfoTable`].
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum PeTableError {
    /// The platform reported no PEs at all.
    #[error("PE info table is empty")]
    Empty,
    /// An entry's `pe_num` does not match its position.
    #[error("PE entry at position {position} has pe_num {pe_num}")]
    NotDense {
        /// Position of the entry in the table.
        position: usize,
        /// The `pe_num` the entry claims.
        pe_num: u32,
    },
    /// Two entries share an MPIDR.
    #[error("PEs {first} and {second} share MPIDR {mpidr:#x}")]
    DuplicateMpidr {
        /// Index of the first entry with the MPIDR.
        first: usize,
        /// Index of the second entry with the MPIDR.
        second: usize,
        /// The duplicated MPIDR value.
        mpidr: u64,
    },
}

/// The PE info table. Read-only once built.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PeInfoTable {
    entries: Vec<PeInfoEntry>,
}

impl PeInfoTable {
    /// Builds a table from entries reported by the platform, checking that indices are dense and
    /// that every MPIDR is unique.
    pub fn new(entries: Vec<PeInfoEntry>) -> Result<Self, PeTableError> {
        if entries.is_empty() {
            return Err(PeTableError::Empty);
        }
        for (position, entry) in entries.iter().enumerate() {
            if entry.pe_num as usize != position {
                return Err(PeTableError::NotDense {
                    position,
                    pe_num: entry.pe_num,
                });
            }
            if let Some(first) = entries[..position]
                .iter()
                .position(|other| psci_mpidr(other.mpidr) == psci_mpidr(entry.mpidr))
            {
                return Err(PeTableError::DuplicateMpidr {
                    first,
                    second: position,
                    mpidr: entry.mpidr,
                });
            }
        }
        Ok(Self { entries })
    }

    /// Builds a table from a list of MPIDR values, numbering the PEs in order.
    pub fn from_mpidrs(mpidrs: &[u64]) -> Result<Self, PeTableError> {
        Self::new(
            mpidrs
                .iter()
                .enumerate()
                .map(|(index, &mpidr)| PeInfoEntry {
                    pe_num: index as u32,
                    mpidr,
                    ..Default::default()
                })
                .collect(),
        )
    }

    /// Returns the number of PEs.
    pub fn num_pe(&self) -> usize {
        self.entries.len()
    }

    /// Returns all entries, in index order.
    pub fn entries(&self) -> &[PeInfoEntry] {
        &self.entries
    }

    /// Returns the entry for the given index.
    pub fn get(&self, index: usize) -> Option<&PeInfoEntry> {
        self.entries.get(index)
    }

    /// Returns the MPIDR of the PE with the given index.
    pub fn mpidr(&self, index: usize) -> Option<u64> {
        self.get(index).map(|entry| entry.mpidr)
    }

    /// Returns the index of the PE with the given MPIDR, comparing affinity fields only.
    pub fn index_of(&self, mpidr: u64) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| psci_mpidr(entry.mpidr) == psci_mpidr(mpidr))
    }

    /// Like [`Self::index_of`], but falls back to index 0 for an unknown MPIDR so that a
    /// misreported PE still writes somewhere the dispatcher looks.
    pub fn index_of_or_primary(&self, mpidr: u64) -> usize {
        self.index_of(mpidr).unwrap_or_else(|| {
            warn!("MPIDR {mpidr:#x} is not in the PE info table, using PE index 0");
            0
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn affinity_packing() {
        assert_eq!(mpidr_affinity(0x0000_0001_0002_0304), 0x0102_0304);
        // MT and U bits are dropped.
        assert_eq!(mpidr_affinity(0x8100_0100), 0x0000_0100);
        assert_eq!(psci_mpidr(0x4000_0000_8100_0100), 0x0100);
    }

    #[test]
    fn lookup_both_ways() {
        let table = PeInfoTable::from_mpidrs(&[0x0, 0x1, 0x100, 0x1_0000_0000]).unwrap();
        assert_eq!(table.num_pe(), 4);
        assert_eq!(table.mpidr(2), Some(0x100));
        assert_eq!(table.mpidr(4), None);
        assert_eq!(table.index_of(0x1_0000_0000), Some(3));
        // The MT bit is ignored.
        assert_eq!(table.index_of(0x0100_0001), Some(1));
        assert_eq!(table.index_of(0x200), None);
        assert_eq!(table.index_of_or_primary(0x200), 0);
    }

    #[test]
    fn reject_empty() {
        assert_eq!(PeInfoTable::new(vec![]), Err(PeTableError::Empty));
    }

    #[test]
    fn reject_sparse_indices() {
        let entries = vec![
            PeInfoEntry {
                pe_num: 0,
                mpidr: 0,
                ..Default::default()
            },
            PeInfoEntry {
                pe_num: 2,
                mpidr: 1,
                ..Default::default()
            },
        ];
        assert_eq!(
            PeInfoTable::new(entries),
            Err(PeTableError::NotDense {
                position: 1,
                pe_num: 2
            })
        );
    }

    #[test]
    fn reject_duplicate_mpidr() {
        assert_eq!(
            PeInfoTable::from_mpidrs(&[0x0, 0x100, 0x100]),
            Err(PeTableError::DuplicateMpidr {
                first: 1,
                second: 2,
                mpidr: 0x100
            })
        );
    }
}
