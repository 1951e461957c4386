// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! The SBSA secure test service.
//!
//! The normal world starts a test by calling `SBSA_AVS_SMC` with the test index in x1. The test
//! runs to completion within that call and its result is latched, to be read back by a second
//! call with `GET_RESULT` in x1. Reading the result does not clear it. There is a single latch,
//! so only one normal world caller may use the service at a time.

use super::{Service, owns};
use crate::{
    platform::{
        CntpsCtl, INTR_ID_UNAVAILABLE, SECURE_PHYSICAL_TIMER_INTID, ScrRouting, SecurePlatform,
        WatchdogKind,
    },
    poll::{PollCounter, WaitResult, poll_until},
    secure_call::{
        ACS_PENDING, GET_RESULT, INIT_SIGNATURE, SBSA_AVS_SMC, SecureResult, SecureTestIndex,
    },
    smccc::{OwningEntityNumber, SMC_UNK, SmcReturn},
    status::Outcome,
};
use log::{debug, info, warn};
use spin::mutex::SpinMutex;

const PASS: u64 = Outcome::AVS_PASS as u64;
const FAIL: u64 = Outcome::AVS_FAIL as u64;
const SKIP: u64 = Outcome::AVS_SKIP as u64;

/// Polls spent waiting for a device interrupt.
const INTERRUPT_POLLS: u64 = 100_000;
/// Polls spent waiting for the secure physical timer.
const TIMER_POLLS: u64 = 0x10000;

// System counter CNTControlBase frame.
const CNTCR: usize = 0x000;
const CNTSR: usize = 0x004;
const CNTCV_LO: usize = 0x008;
const CNTCV_HI: usize = 0x00c;
const CNTFID0: usize = 0x020;
const COUNTER_ID0: usize = 0xfd0;

/// Above this frequency a 56-bit counter could roll over within 15 years.
const MAX_COUNTER_FREQUENCY: u32 = 150_000_000;

// CNTBaseN frame.
const CNTP_TVAL: usize = 0x28;
const CNTP_CTL: usize = 0x2c;

// Generic watchdog control frame.
const WCS: usize = 0x0;
const WOR: usize = 0x8;

// SP805 watchdog.
const WDOG_LOAD: usize = 0x0;
const WDOG_CONTROL: usize = 0x8;
const WDOG_LOCK: usize = 0xc00;
const WDOG_UNLOCK_KEY: u32 = 0x1acc_e551;

// PL011 UART.
const UARTDR: usize = 0x00;
const UARTFR: usize = 0x18;

const SYSTEM_TIMER_TICKS: u32 = 100;
const WATCHDOG_TICKS: u32 = 100;

/// The SBSA secure test service.
pub struct Sbsa<P: SecurePlatform> {
    platform: P,
    latch: SpinMutex<SecureResult>,
}

impl<P: SecurePlatform> Sbsa<P> {
    /// Function number of `SBSA_AVS_SMC` within the standard secure service range.
    const FUNCTION_NUMBER: u16 = SBSA_AVS_SMC as u16;

    /// Creates the service for the given platform, with nothing latched.
    pub fn new(platform: P) -> Self {
        Self {
            platform,
            latch: SpinMutex::new(SecureResult::default()),
        }
    }

    /// Returns the platform the service probes.
    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Returns the latched result, as `GET_RESULT` would.
    pub fn latched(&self) -> SecureResult {
        *self.latch.lock()
    }

    /// Starts or queries a secure test. `x1` selects the test, `x2` is its argument.
    pub fn handle(&self, x1: u64, x2: u64) -> SmcReturn {
        if x1 == GET_RESULT {
            let latched = self.latched();
            return [
                latched.test_index,
                latched.result,
                latched.data,
                latched.data2,
            ]
            .into();
        }

        *self.latch.lock() = SecureResult {
            test_index: x1,
            result: ACS_PENDING,
            data: 0,
            data2: 0,
        };
        debug!("SBSA SMC handler entry {x1:#x} {x2:#x}");

        match SecureTestIndex::try_from(x1) {
            Ok(SecureTestIndex::NsWdWs1) => self.ns_watchdog_ws1(x2 as u32),
            Ok(SecureTestIndex::SysCounter) => self.system_counter(),
            Ok(SecureTestIndex::SysTimerInt) => self.system_timer_interrupt(),
            Ok(SecureTestIndex::WdWs0) => self.watchdog_ws0(),
            Ok(SecureTestIndex::SecureUart) => self.secure_uart(),
            Ok(SecureTestIndex::El3Phy) => self.el3_physical_timer(),
            Ok(SecureTestIndex::Wakeup) => self.secure_timer_wakeup(),
            Ok(SecureTestIndex::InfraInit) => {
                self.set_status(PASS, INIT_SIGNATURE);
            }
            Ok(SecureTestIndex::PlatformAddress) => self.platform_address(x2),
            Ok(SecureTestIndex::PmbIrq) => self.pmbirq(x2),
            Ok(SecureTestIndex::CntBase | SecureTestIndex::Finish) | Err(_) => {
                info!("SBSA inside handler {x1:x} {x2:x}");
                self.set_status(SKIP, 0xff);
                warn!("Unimplemented SBSA Standard Service Call: {x1:#x}");
                return SMC_UNK.into();
            }
        }
        0u64.into()
    }

    fn set_status(&self, result: u64, data: u64) {
        let mut latch = self.latch.lock();
        latch.result = result;
        latch.data = data;
    }

    fn set_result(&self, result: u64) {
        self.latch.lock().result = result;
    }

    fn set_data2(&self, data2: u64) {
        self.latch.lock().data2 = data2;
    }

    /// Polls the interrupt controller until `matches` accepts a pending INTID.
    fn wait_for_interrupt(&self, polls: u64, matches: impl Fn(u32) -> bool) -> Option<u32> {
        let mut intid = INTR_ID_UNAVAILABLE;
        let result = poll_until(&PollCounter::new(), polls, || {
            intid = self.platform.pending_interrupt_id();
            matches(intid)
        });
        (result == WaitResult::Completed).then_some(intid)
    }

    fn any_interrupt(intid: u32) -> bool {
        intid != INTR_ID_UNAVAILABLE
    }

    fn complete_interrupt(&self, intid: u32) {
        self.platform.acknowledge_interrupt();
        self.platform.end_of_interrupt(intid);
    }

    fn ns_watchdog_ws1(&self, expected: u32) {
        match self.wait_for_interrupt(INTERRUPT_POLLS, |intid| intid == expected) {
            Some(intid) => {
                self.complete_interrupt(intid);
                info!("Received WS1 watchdog with INTID = {intid}");
                self.set_result(PASS);
            }
            None => self.set_result(FAIL),
        }
    }

    fn system_counter(&self) {
        let base = self.platform.layout().cnt_control_base;
        let read = |offset: usize| self.platform.mmio_read(base + offset);
        let write = |offset: usize, value: u32| self.platform.mmio_write(base + offset, value);

        let id = read(COUNTER_ID0);
        if id == 0 || id == 0xffff_ffff {
            return self.set_status(FAIL, 1);
        }
        write(COUNTER_ID0, 0xffff_ffff);
        if read(COUNTER_ID0) != id {
            return self.set_status(FAIL, 2);
        }

        let status = read(CNTSR);
        write(CNTSR, 0xffff_ffff);
        if read(CNTSR) != status {
            return self.set_status(FAIL, 3);
        }

        for (offset, value, sub_code) in [
            (CNTCR, 0xff00_ff00, 4),
            (CNTCV_LO, 0xa5a5_a5a5, 5),
            (CNTCV_HI, 0x5a5a_5a5a, 6),
        ] {
            write(offset, value);
            if read(offset) != value {
                return self.set_status(FAIL, sub_code);
            }
        }

        // Halt the counter just below 56 bits and let it run across.
        write(CNTCR, 0);
        write(CNTCV_LO, 0xffff_fffe);
        write(CNTCV_HI, 0x00ff_ffff);
        write(CNTCR, 1);
        read(CNTCV_LO);
        if read(CNTCV_HI) == 0 {
            return self.set_status(FAIL, 7);
        }

        if read(CNTFID0) > MAX_COUNTER_FREQUENCY {
            return self.set_status(FAIL, 8);
        }

        // The normal world checks it cannot see this value at the returned address.
        let marker = 0xdead_beef;
        write(CNTCV_LO, marker);
        self.set_status(PASS, (base + CNTCV_LO) as u64);
        self.set_data2(marker.into());
    }

    fn system_timer_interrupt(&self) {
        let layout = self.platform.layout();
        if !layout.secure_system_timer {
            warn!("Secure System timer is not implemented for SBSA L3-FW compliant platform");
            return self.set_status(FAIL, 1);
        }
        if layout.cnt_base_n == 0 {
            warn!("CNTBaseN can't be 0 for SBSA L3-FW compliant platform");
            return self.set_status(FAIL, 2);
        }
        let base = layout.cnt_base_n;
        self.platform.mmio_write(base + CNTP_TVAL, SYSTEM_TIMER_TICKS);
        self.platform.mmio_write(base + CNTP_CTL, 1);
        let intid = self.wait_for_interrupt(INTERRUPT_POLLS, Self::any_interrupt);
        self.platform.mmio_write(base + CNTP_CTL, 0);

        match intid {
            Some(intid) => {
                self.complete_interrupt(intid);
                if intid == layout.system_timer_intid {
                    self.set_status(PASS, 0);
                } else {
                    warn!("Secure System Timer Interrupt-ID is incorrect, intID = {intid:#x}");
                    self.set_status(FAIL, 3);
                }
            }
            None => {
                warn!("Secure System Timer did not generate an Interrupt");
                self.set_status(FAIL, 4);
            }
        }
    }

    fn watchdog_ws0(&self) {
        let intid = match self.platform.layout().watchdog {
            WatchdogKind::None => return self.set_status(SKIP, 1),
            WatchdogKind::Generic { base } => {
                self.platform.mmio_write(base + WCS, 0);
                info!("Enabling watchdog");
                self.platform.mmio_write(base + WOR, WATCHDOG_TICKS);
                self.platform.mmio_write(base + WCS, 1);
                let intid = self.wait_for_interrupt(INTERRUPT_POLLS, Self::any_interrupt);
                self.platform.mmio_write(base + WCS, 0);
                intid
            }
            WatchdogKind::Sp805 { base } => {
                // Firmware locks the watchdog after loading it at boot.
                self.platform.mmio_write(base + WDOG_LOCK, WDOG_UNLOCK_KEY);
                self.platform.mmio_write(base + WDOG_CONTROL, 0);
                info!("Enabling watchdog");
                self.platform.mmio_write(base + WDOG_LOAD, 0x50);
                self.platform.mmio_write(base + WDOG_CONTROL, 1);
                let intid = self.wait_for_interrupt(INTERRUPT_POLLS, Self::any_interrupt);
                self.platform.mmio_write(base + WDOG_CONTROL, 0);
                intid
            }
        };
        match intid {
            Some(intid) => {
                self.complete_interrupt(intid);
                info!("Secure Watchdog Interrupt is {intid:#x}");
                self.set_result(PASS);
            }
            None => {
                warn!("Secure Watchdog did not generate an Interrupt");
                self.set_result(FAIL);
            }
        }
    }

    fn secure_uart(&self) {
        let base = self.platform.layout().secure_uart_base;
        info!("Testing UART controller at {base:#x}");
        if base == 0 {
            return self.set_status(FAIL, 1);
        }

        let flags = self.platform.mmio_read(base + UARTFR);
        self.platform.mmio_write(base + UARTFR, !flags);
        if self.platform.mmio_read(base + UARTFR) != flags {
            warn!("UARTFR is not Read Only");
            return self.set_status(FAIL, 1);
        }

        // Bits 11:8 of UARTDR are the read-only receive error flags.
        let data = self.platform.mmio_read(base + UARTDR);
        self.platform.mmio_write(base + UARTDR, data | 0x0f00);
        if (self.platform.mmio_read(base + UARTDR) >> 8) & 0xf != (data >> 8) & 0xf {
            warn!("UARTDR Bits 11:8 are not Read Only");
            return self.set_status(FAIL, 1);
        }
        self.set_status(PASS, 1);
    }

    /// Waits for the secure physical timer, which must already be running, then stops it.
    fn wait_for_secure_timer(&self) {
        match self.wait_for_interrupt(TIMER_POLLS, |intid| {
            intid == SECURE_PHYSICAL_TIMER_INTID
        }) {
            Some(intid) => {
                self.complete_interrupt(intid);
                debug!(
                    "cleared CNTPS interrupt {:#x}",
                    self.platform.pending_interrupt_id()
                );
                self.set_result(PASS);
            }
            None => self.set_result(FAIL),
        }
        self.platform.write_cntps_ctl(CntpsCtl::empty());
    }

    fn el3_physical_timer(&self) {
        debug!("Programming Secure PE timer");
        self.platform.set_scr_el3(ScrRouting::IRQ | ScrRouting::FIQ);
        self.platform.write_cntps_tval(20);
        self.platform.write_cntps_ctl(CntpsCtl::ENABLE);
        self.wait_for_secure_timer();
    }

    fn secure_timer_wakeup(&self) {
        debug!("Programming Secure PE timer");
        self.platform.write_cntps_tval(10_000);
        self.platform.write_cntps_ctl(CntpsCtl::ENABLE);
        info!("Placing the PE to sleep");
        self.platform.cpu_suspend();
        self.wait_for_secure_timer();
    }

    fn platform_address(&self, index: u64) {
        let Some(&address) = self.platform.layout().trusted_sram.get(index as usize) else {
            return self.set_status(FAIL, 0xff);
        };
        self.set_status(PASS, address as u64);
        self.set_data2(self.platform.memory_read(address));
    }

    fn pmbirq(&self, nspb: u64) {
        self.platform.set_mdcr_nspb((nspb & 0x3) as u8);
        self.set_status(PASS, INIT_SIGNATURE);
    }
}

impl<P: SecurePlatform> Service for Sbsa<P> {
    owns!(
        OwningEntityNumber::STANDARD_SECURE,
        Self::FUNCTION_NUMBER..=Self::FUNCTION_NUMBER
    );

    fn handle_non_secure_smc(&self, regs: &[u64; 4]) -> SmcReturn {
        self.handle(regs[1], regs[2])
    }
}
