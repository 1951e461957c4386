// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Built-in PE tests.

use crate::{
    framework::{PayloadContext, PeScope},
    pe::psci_mpidr,
    registers::RegisterId,
    sbsa_test,
    suite::Module,
};
use log::error;

/// The largest number of PEs a system may have from level 2 upwards.
const MAX_NUM_PE: usize = 2 << 27;

/// The largest number of PEs a level 0 or 1 system may have.
const MAX_NUM_PE_LEVEL0: usize = 8;

sbsa_test!(
    Module::Pe,
    1,
    "Check for number of PE",
    PeScope::OnePe,
    number_of_pe
);
fn number_of_pe(context: &PayloadContext) {
    let num_pe = context.pe_table().num_pe();
    let limit = if context.level() < 2 {
        MAX_NUM_PE_LEVEL0
    } else {
        MAX_NUM_PE
    };
    if num_pe > limit {
        error!("Number of PE is {num_pe}");
        context.fail(1);
    } else {
        context.pass();
    }
}

sbsa_test!(
    Module::Pe,
    3,
    "Check MPIDR matches PE table",
    PeScope::AllPes,
    mpidr_matches_table
);
/// Every PE checks that its own MPIDR is the one the PE table lists at its index, which is what
/// the dispatcher relies on to power the right PE on.
fn mpidr_matches_table(context: &PayloadContext) {
    let Some(mpidr) = context.read_register(RegisterId::MpidrEl1.into()) else {
        return;
    };
    match context.pe_table().mpidr(context.pe_index()) {
        Some(expected) if psci_mpidr(expected) == psci_mpidr(mpidr) => context.pass(),
        Some(expected) => {
            error!(
                "PE {} has MPIDR {mpidr:#x}, table says {expected:#x}",
                context.pe_index()
            );
            context.fail(1);
        }
        None => context.fail(2),
    }
}
