// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! The hooks a secure firmware port provides for the SBSA secure test service.


use bitflags::bitflags;

/// Value returned by the interrupt controller when no interrupt is pending.
pub const INTR_ID_UNAVAILABLE: u32 = 0xffff_ffff;

/// INTID of the EL1 secure physical timer.
pub const SECURE_PHYSICAL_TIMER_INTID: u32 = 29;

bitflags! {
    /// Routing bits of SCR_EL3 the service sets while waiting for EL3 interrupts.
    #[derive(Debug, Eq, PartialEq, Clone, Copy)]
    #[repr(transparent)]
    pub struct ScrRouting: u64 {
        /// Physical IRQs are taken to EL3.
        const IRQ = 1 << 1;
        /// Physical FIQs are taken to EL3.
        const FIQ = 1 << 2;
    }
}

bitflags! {
    /// CNTPS_CTL_EL1 bits.
    #[derive(Debug, Eq, PartialEq, Clone, Copy, Default)]
    #[repr(transparent)]
    pub struct CntpsCtl: u64 {
        /// The timer is enabled.
        const ENABLE = 1 << 0;
        /// The timer interrupt is masked.
        const IMASK = 1 << 1;
        /// The timer condition is met.
        const ISTATUS = 1 << 2;
    }
}

/// The trusted watchdog a platform has, if any.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WatchdogKind {
    /// No trusted watchdog.
    None,
    /// An SBSA generic watchdog with its control frame at `base`.
    Generic {
        /// Physical address of the control frame.
        base: usize,
    },
    /// An Arm SP805 watchdog at `base`.
    Sp805 {
        /// Physical address of the watchdog.
        base: usize,
    },
}

/// Secure-only addresses and interrupt IDs of the platform.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SecureLayout {
    /// CNTControlBase of the system counter.
    pub cnt_control_base: usize,
    /// Whether a secure system timer frame is implemented.
    pub secure_system_timer: bool,
    /// CNTBaseN of the secure system timer frame, or 0.
    pub cnt_base_n: usize,
    /// INTID the secure system timer is wired to.
    pub system_timer_intid: u32,
    /// The trusted watchdog.
    pub watchdog: WatchdogKind,
    /// Base of the secure UART, or 0.
    pub secure_uart_base: usize,
    /// Addresses in trusted SRAM that the normal world must not be able to read.
    pub trusted_sram: [usize; 4],
}

/// Hardware access for the secure test service.
///
/// Every method runs at EL3 on the PE that made the SMC, with interrupts masked.
pub trait SecurePlatform {
    /// Returns the platform's secure addresses.
    fn layout(&self) -> &SecureLayout;

    /// Reads a 32-bit device register at the given physical address.
    fn mmio_read(&self, address: usize) -> u32;

    /// Writes a 32-bit device register at the given physical address.
    fn mmio_write(&self, address: usize, value: u32);

    /// Reads a 64-bit word of secure memory at the given physical address.
    fn memory_read(&self, address: usize) -> u64;

    /// Returns the INTID of the highest priority pending interrupt, or [`INTR_ID_UNAVAILABLE`].
    fn pending_interrupt_id(&self) -> u32;

    /// Acknowledges the highest priority pending interrupt.
    fn acknowledge_interrupt(&self);

    /// Signals end of interrupt for the given INTID.
    fn end_of_interrupt(&self, intid: u32);

    /// Sets the given bits in SCR_EL3.
    fn set_scr_el3(&self, bits: ScrRouting);

    /// Writes CNTPS_TVAL_EL1.
    fn write_cntps_tval(&self, ticks: u32);

    /// Writes CNTPS_CTL_EL1.
    fn write_cntps_ctl(&self, ctl: CntpsCtl);

    /// Sets MDCR_EL3.NSPB to the given 2-bit value, leaving the other fields alone.
    fn set_mdcr_nspb(&self, nspb: u8);

    /// Puts the calling PE into its default suspend state until an interrupt wakes it.
    fn cpu_suspend(&self);
}
