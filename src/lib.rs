// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Core of the Arm SBSA architecture compliance suite.
//!
//! The suite runs test payloads on one or more PEs, waking the other PEs with PSCI `CPU_ON` and
//! collecting their results through per-PE slots in shared memory. Tests which need a kernel run
//! inside the SBSA kernel driver and are driven through [`driver`], and tests which need EL3 run
//! inside the secure firmware's [`services::sbsa`] service and are driven through
//! [`secure_call`].

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod cache;
pub mod driver;
pub mod framework;
pub mod logger;
pub mod options;
mod payloads;
pub mod pe;
pub mod platform;
pub mod poll;
pub mod psci;
pub mod registers;
pub mod secure_call;
pub mod services;
pub mod shared_mem;
pub mod smccc;
pub mod status;
pub mod suite;
