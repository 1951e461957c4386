// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Binary records exchanged with the SBSA kernel driver.
//!
//! Both records are read and written in native byte order with the C layout the driver uses on
//! an LP64 kernel. A request is written to the request file, and reading the same file back
//! returns a record of the same shape whose `api_num` field holds the driver status and whose
//! `arg0` holds [`DRV_STATUS_PENDING`] until the request has finished. The message file streams
//! fixed-size text records.

use core::ffi::CStr;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use thiserror::Error;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Driver status: the driver is ready for a request.
pub const DRV_STATUS_AVAILABLE: u64 = 0x1000_0000;

/// Driver status: the last request has not finished.
pub const DRV_STATUS_PENDING: u64 = 0x4000_0000;

/// Size in bytes of a [`DriverParams`] record.
pub const DRIVER_PARAMS_SIZE: usize = 40;

/// Size in bytes of a [`DriverMessage`] record.
pub const DRIVER_MESSAGE_SIZE: usize = 104;

/// Length of the text field of a message record, including its NUL terminator.
pub const MESSAGE_STRING_LEN: usize = 92;

/// The requests the driver understands.
#[derive(Clone, Copy, Debug, Eq, IntoPrimitive, PartialEq, TryFromPrimitive)]
#[repr(u32)]
pub enum ApiNumber {
    /// Gather the info tables the kernel-side tests need.
    CreateInfoTables = 0x1000,
    /// Run one PCIe test.
    PcieExecuteTest = 0x2000,
    /// Replace the driver's skip list.
    UpdateSkipList = 0x3000,
    /// Run the PCIe exerciser tests.
    ExerciserExecuteTest = 0x4000,
    /// Run the SMMU tests.
    SmmuExecuteTest = 0x5000,
    /// Free the info tables.
    FreeInfoTables = 0x9000,
}

/// A malformed record.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum ProtocolError {
    /// Fewer bytes than a whole record.
    #[error("Short driver record: expected {expected} bytes, got {actual}")]
    ShortRecord {
        /// The record size.
        expected: usize,
        /// The number of bytes available.
        actual: usize,
    },
    /// A request selector the driver does not define.
    #[error("Unknown driver API number {0:#x}")]
    UnknownApi(u32),
    /// Message text without a terminator, or not UTF-8.
    #[error("Malformed driver message")]
    InvalidMessage,
}

/// A request to the driver, and the driver's response to it.
#[derive(Clone, Copy, Debug, Default, Eq, FromBytes, Immutable, IntoBytes, KnownLayout, PartialEq)]
#[repr(C)]
pub struct DriverParams {
    /// Request selector, or driver status on readback.
    pub api_num: u32,
    /// Number of PEs to run on.
    pub num_pe: u32,
    /// Compliance level.
    pub level: u32,
    padding: [u8; 4],
    /// First argument, or [`DRV_STATUS_PENDING`] on readback while busy.
    pub arg0: u64,
    /// Second argument, or the completion status on readback.
    pub arg1: u64,
    /// Third argument.
    pub arg2: u64,
}

const _: () = assert!(size_of::<DriverParams>() == DRIVER_PARAMS_SIZE);

impl DriverParams {
    /// Creates a record with the given fields and zeroed padding.
    pub const fn new(api_num: u32, num_pe: u32, level: u32, args: [u64; 3]) -> Self {
        Self {
            api_num,
            num_pe,
            level,
            padding: [0; 4],
            arg0: args[0],
            arg1: args[1],
            arg2: args[2],
        }
    }

    /// Creates a request for the given API.
    pub const fn request(api: ApiNumber, num_pe: u32, level: u32, args: [u64; 3]) -> Self {
        Self::new(api as u32, num_pe, level, args)
    }

    /// Parses a record from the start of `bytes`.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        Self::read_from_prefix(bytes)
            .map(|(params, _)| params)
            .map_err(|_| ProtocolError::ShortRecord {
                expected: DRIVER_PARAMS_SIZE,
                actual: bytes.len(),
            })
    }

    /// Returns the record as the driver expects to read it.
    pub fn encode(&self) -> &[u8] {
        self.as_bytes()
    }

    /// Returns the request selector.
    pub fn api(&self) -> Result<ApiNumber, ProtocolError> {
        ApiNumber::try_from(self.api_num).map_err(|e| ProtocolError::UnknownApi(e.number))
    }

    /// Returns whether the driver is still working on the last request.
    pub fn is_pending(&self) -> bool {
        self.arg0 == DRV_STATUS_PENDING
    }
}

/// A progress message from the driver.
#[derive(Clone, Debug, Eq, FromBytes, Immutable, IntoBytes, KnownLayout, PartialEq)]
#[repr(C)]
pub struct DriverMessage {
    string: [u8; MESSAGE_STRING_LEN],
    padding: [u8; 4],
    /// Value the driver attaches to the message.
    pub data: u64,
}

const _: () = assert!(size_of::<DriverMessage>() == DRIVER_MESSAGE_SIZE);

impl DriverMessage {
    /// Creates a message record. Text beyond the field is truncated.
    pub fn new(text: &str, data: u64) -> Self {
        let mut string = [0; MESSAGE_STRING_LEN];
        let len = text.len().min(MESSAGE_STRING_LEN - 1);
        string[..len].copy_from_slice(&text.as_bytes()[..len]);
        Self {
            string,
            padding: [0; 4],
            data,
        }
    }

    /// Parses a record from the start of `bytes`.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        Self::read_from_prefix(bytes)
            .map(|(message, _)| message)
            .map_err(|_| ProtocolError::ShortRecord {
                expected: DRIVER_MESSAGE_SIZE,
                actual: bytes.len(),
            })
    }

    /// Returns the record as the driver writes it.
    pub fn encode(&self) -> &[u8] {
        self.as_bytes()
    }

    /// Returns the message text, up to its NUL terminator.
    pub fn text(&self) -> Result<&str, ProtocolError> {
        CStr::from_bytes_until_nul(&self.string)
            .ok()
            .and_then(|text| text.to_str().ok())
            .ok_or(ProtocolError::InvalidMessage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_layout() {
        let request = DriverParams::request(ApiNumber::PcieExecuteTest, 1, 3, [7, 3, 0]);
        let bytes = request.encode();
        assert_eq!(bytes.len(), DRIVER_PARAMS_SIZE);
        assert_eq!(bytes[0..4], 0x2000u32.to_ne_bytes());
        assert_eq!(bytes[4..8], 1u32.to_ne_bytes());
        assert_eq!(bytes[8..12], 3u32.to_ne_bytes());
        assert_eq!(bytes[12..16], [0; 4]);
        assert_eq!(bytes[16..24], 7u64.to_ne_bytes());
        assert_eq!(bytes[24..32], 3u64.to_ne_bytes());
        assert_eq!(DriverParams::decode(bytes), Ok(request));
    }

    #[test]
    fn short_response() {
        assert_eq!(
            DriverParams::decode(&[0; 12]),
            Err(ProtocolError::ShortRecord {
                expected: 40,
                actual: 12
            })
        );
    }

    #[test]
    fn api_numbers() {
        let request = DriverParams::new(0x5000, 1, 7, [0; 3]);
        assert_eq!(request.api(), Ok(ApiNumber::SmmuExecuteTest));
        let status = DriverParams::new(0x1234, 0, 0, [DRV_STATUS_PENDING, 0, 0]);
        assert_eq!(status.api(), Err(ProtocolError::UnknownApi(0x1234)));
        assert!(status.is_pending());
    }

    #[test]
    fn message_text() {
        let message = DriverMessage::new("       PCIe test 51 running\n", 0x33);
        let bytes = message.encode();
        assert_eq!(bytes.len(), DRIVER_MESSAGE_SIZE);
        assert_eq!(bytes[96..], 0x33u64.to_ne_bytes());
        let decoded = DriverMessage::decode(bytes).unwrap();
        assert_eq!(decoded.text(), Ok("       PCIe test 51 running\n"));
        assert_eq!(decoded.data, 0x33);
    }

    #[test]
    fn unterminated_message() {
        let mut bytes = [b'x'; DRIVER_MESSAGE_SIZE];
        bytes[MESSAGE_STRING_LEN..].fill(0);
        assert_eq!(
            DriverMessage::decode(&bytes).unwrap().text(),
            Err(ProtocolError::InvalidMessage)
        );
    }
}
