// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! SMC dispatch for the secure firmware side of the suite.

pub mod sbsa;

use crate::{
    platform::SecurePlatform,
    smccc::{FunctionId, SMC_UNK, SmcReturn},
};
use log::warn;

/// Helper macro to define the range of SMC function ID values covered by a service
#[macro_export]
macro_rules! owns {
    // service handles the entire Owning Entity Number (OEN)
    ($owning_entity:expr) => {
        #[inline(always)]
        fn owns(&self, function: $crate::smccc::FunctionId) -> bool {
            function.oen() == $owning_entity
                && matches!(
                    function.call_type(),
                    $crate::smccc::SmcccCallType::Fast32 | $crate::smccc::SmcccCallType::Fast64
                )
        }
    };
    // service handles a sub-range of the OEN
    // range refers to the lower 16 bits [15:0] of the SMC FunctionId
    ($owning_entity:expr, $range:expr) => {
        #[inline(always)]
        fn owns(&self, function: $crate::smccc::FunctionId) -> bool {
            function.oen() == $owning_entity
                && $range.contains(&function.number())
                && matches!(
                    function.call_type(),
                    $crate::smccc::SmcccCallType::Fast32 | $crate::smccc::SmcccCallType::Fast64
                )
        }
    };
}
pub(crate) use owns;

/// The security state an SMC came from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum World {
    /// Normal world.
    NonSecure,
    /// Secure world.
    Secure,
}

/// A service which handles some range of SMC calls.
pub trait Service {
    /// Returns whether this service is intended to handle the given function ID.
    fn owns(&self, function: FunctionId) -> bool;

    /// Handles the given SMC call from Normal World. `regs` holds x0 to x3.
    fn handle_non_secure_smc(&self, _regs: &[u64; 4]) -> SmcReturn {
        SMC_UNK.into()
    }

    /// Handles the given SMC call from Secure World. `regs` holds x0 to x3.
    fn handle_secure_smc(&self, _regs: &[u64; 4]) -> SmcReturn {
        SMC_UNK.into()
    }
}

/// Contains an instance of all of the services the suite adds to the secure firmware.
///
/// A firmware port keeps one of these for its lifetime and forwards SMCs from its runtime loop to
/// [`Services::handle_smc`].
pub struct Services<P: SecurePlatform> {
    /// The SBSA secure test service.
    pub sbsa: sbsa::Sbsa<P>,
}

impl<P: SecurePlatform> Services<P> {
    /// Creates the services for the given platform.
    pub fn new(platform: P) -> Self {
        Self {
            sbsa: sbsa::Sbsa::new(platform),
        }
    }

    /// Routes an SMC to the service which owns its function ID.
    pub fn handle_smc(&self, regs: &[u64; 4], world: World) -> SmcReturn {
        let function = FunctionId(regs[0] as u32);

        if !function.valid() {
            return SMC_UNK.into();
        }

        let service: &dyn Service = if self.sbsa.owns(function) {
            &self.sbsa
        } else {
            warn!("Unhandled SMC {function:?}");
            return SMC_UNK.into();
        };

        match world {
            World::NonSecure => service.handle_non_secure_smc(regs),
            World::Secure => service.handle_secure_smc(regs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        platform::{WatchdogKind, test::TestPlatform},
        secure_call::{GET_RESULT, INIT_SIGNATURE, SBSA_AVS_SMC, SecureTestIndex},
    };

    fn services() -> Services<TestPlatform> {
        Services::new(TestPlatform::new(WatchdogKind::None))
    }

    #[test]
    fn infra_init_from_normal_world() {
        let services = services();
        let init = [
            SBSA_AVS_SMC.into(),
            SecureTestIndex::InfraInit.into(),
            0,
            0,
        ];
        assert_eq!(
            services.handle_smc(&init, World::NonSecure).values(),
            [0]
        );
        let result = services.handle_smc(
            &[SBSA_AVS_SMC.into(), GET_RESULT, 0, 0],
            World::NonSecure,
        );
        assert_eq!(result.values(), [0x1009, 0, INIT_SIGNATURE, 0]);
    }

    #[test]
    fn secure_caller_refused() {
        let services = services();
        let init = [
            SBSA_AVS_SMC.into(),
            SecureTestIndex::InfraInit.into(),
            0,
            0,
        ];
        assert_eq!(
            services.handle_smc(&init, World::Secure).values(),
            [SMC_UNK]
        );
        // Nothing was latched.
        assert_eq!(services.sbsa.latched().test_index, 0);
    }

    #[test]
    fn other_function_ids_unknown() {
        let services = services();
        // PSCI_VERSION is not ours.
        assert_eq!(
            services
                .handle_smc(&[0x8400_0000, 0, 0, 0], World::NonSecure)
                .values(),
            [SMC_UNK]
        );
        // Reserved bits set in a fast call.
        assert_eq!(
            services
                .handle_smc(&[0x8402_1000, 0x1009, 0, 0], World::NonSecure)
                .values(),
            [SMC_UNK]
        );
    }
}
