// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Request/response client for the SBSA kernel driver.

use super::protocol::{
    ApiNumber, DRIVER_MESSAGE_SIZE, DRIVER_PARAMS_SIZE, DriverMessage, DriverParams,
    ProtocolError,
};
use alloc::vec::Vec;
use log::{debug, info, warn};
use thiserror::Error;

/// Log target for text the driver streams while it works.
pub const MESSAGE_TARGET: &str = "sbsa_msg";

/// Transport to the driver's request and message files.
///
/// Each call is one complete access: open, transfer, close.
pub trait DriverChannel {
    /// The transport's error type.
    type Error;

    /// Writes one request record.
    fn write_request(&mut self, request: &[u8]) -> Result<(), Self::Error>;

    /// Reads back one request-sized record into `response`, returning the number of bytes read.
    fn read_response(&mut self, response: &mut [u8]) -> Result<usize, Self::Error>;

    /// Appends whatever message records are available to `messages`.
    fn read_messages(&mut self, messages: &mut Vec<u8>) -> Result<(), Self::Error>;
}

/// Where the client is in the life of a request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RequestState {
    /// No request outstanding.
    Idle,
    /// A request has been written and nobody has polled for it yet.
    RequestWritten(ApiNumber),
    /// The client is polling for the completion of a request.
    Pending(ApiNumber),
}

/// An error talking to the driver.
#[derive(Debug, Error)]
pub enum ClientError<E> {
    /// The transport failed.
    #[error("Driver transport failed: {0}")]
    Transport(E),
    /// The driver returned a malformed record.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// A request was submitted while another one has not completed.
    #[error("Driver request {0:?} is still outstanding")]
    Busy(ApiNumber),
    /// The driver stayed busy for longer than the poll limit.
    #[error("Driver still busy after {0} polls")]
    PollLimit(u64),
}

/// Talks to the driver one request at a time.
///
/// The driver's response carries nothing to say which request it answers, so the client refuses
/// to submit a request until the previous one has been polled to completion.
pub struct DriverClient<C: DriverChannel> {
    channel: C,
    state: RequestState,
    poll_limit: Option<u64>,
    messages: Vec<u8>,
}

impl<C: DriverChannel> DriverClient<C> {
    /// Creates a client which polls for as long as the driver stays busy.
    pub fn new(channel: C) -> Self {
        Self {
            channel,
            state: RequestState::Idle,
            poll_limit: None,
            messages: Vec::new(),
        }
    }

    /// Gives up waiting for a request after `polls` busy responses.
    pub fn with_poll_limit(mut self, polls: u64) -> Self {
        self.poll_limit = Some(polls);
        self
    }

    /// Returns the request state.
    pub fn state(&self) -> RequestState {
        self.state
    }

    /// Returns the channel.
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Asks the driver to build its info tables, and waits for it to finish.
    pub fn init_test_env(&mut self, print_level: u32) -> Result<u64, ClientError<C::Error>> {
        self.submit(DriverParams::request(
            ApiNumber::CreateInfoTables,
            0,
            0,
            [0, u64::from(print_level), 0],
        ))?;
        self.wait_for_completion()
    }

    /// Submits a test request. Call [`DriverClient::wait_for_completion`] for its status.
    pub fn execute_test(
        &mut self,
        api: ApiNumber,
        num_pe: u32,
        level: u32,
        print_level: u32,
        test_input: u64,
    ) -> Result<(), ClientError<C::Error>> {
        self.submit(DriverParams::request(
            api,
            num_pe,
            level,
            [test_input, u64::from(print_level), 0],
        ))
    }

    /// Sends the skip list to the driver. The driver does not report completion for this one.
    pub fn update_skip_list(&mut self, skip: [u32; 3]) -> Result<(), ClientError<C::Error>> {
        self.check_idle()?;
        let request = DriverParams::request(
            ApiNumber::UpdateSkipList,
            0,
            0,
            skip.map(u64::from),
        );
        self.channel
            .write_request(request.encode())
            .map_err(ClientError::Transport)
    }

    /// Asks the driver to free its info tables, and waits for it to finish.
    pub fn clean_test_env(&mut self) -> Result<u64, ClientError<C::Error>> {
        self.submit(DriverParams::request(
            ApiNumber::FreeInfoTables,
            0,
            0,
            [0; 3],
        ))?;
        self.wait_for_completion()
    }

    /// Polls the driver until it is no longer busy, logging its messages as they arrive, and
    /// returns the completion status.
    ///
    /// Polling with no request outstanding returns the driver's last status.
    pub fn wait_for_completion(&mut self) -> Result<u64, ClientError<C::Error>> {
        if let RequestState::RequestWritten(api) = self.state {
            self.state = RequestState::Pending(api);
        }
        let mut polls = 0;
        let response = loop {
            let response = self.read_response()?;
            if !response.is_pending() {
                break response;
            }
            self.drain_messages()?;
            polls += 1;
            if self.poll_limit.is_some_and(|limit| polls >= limit) {
                return Err(ClientError::PollLimit(polls));
            }
        };
        self.drain_messages()?;
        debug!(
            "Driver status {:#x}, completion {:#x}",
            response.api_num, response.arg1
        );
        self.state = RequestState::Idle;
        Ok(response.arg1)
    }

    /// Gives up on the outstanding request, if any, so that the next one can be submitted. Used
    /// after a failure has left a request without a completion.
    pub fn abandon(&mut self) -> Option<ApiNumber> {
        match core::mem::replace(&mut self.state, RequestState::Idle) {
            RequestState::Idle => None,
            RequestState::RequestWritten(api) | RequestState::Pending(api) => Some(api),
        }
    }

    fn check_idle(&self) -> Result<(), ClientError<C::Error>> {
        match self.state {
            RequestState::Idle => Ok(()),
            RequestState::RequestWritten(api) | RequestState::Pending(api) => {
                Err(ClientError::Busy(api))
            }
        }
    }

    fn submit(&mut self, request: DriverParams) -> Result<(), ClientError<C::Error>> {
        self.check_idle()?;
        let api = request.api()?;
        self.channel
            .write_request(request.encode())
            .map_err(ClientError::Transport)?;
        self.state = RequestState::RequestWritten(api);
        Ok(())
    }

    fn read_response(&mut self) -> Result<DriverParams, ClientError<C::Error>> {
        let mut response = [0; DRIVER_PARAMS_SIZE];
        let len = self
            .channel
            .read_response(&mut response)
            .map_err(ClientError::Transport)?;
        Ok(DriverParams::decode(&response[..len])?)
    }

    fn drain_messages(&mut self) -> Result<(), ClientError<C::Error>> {
        self.messages.clear();
        self.channel
            .read_messages(&mut self.messages)
            .map_err(ClientError::Transport)?;
        let records = self.messages.chunks_exact(DRIVER_MESSAGE_SIZE);
        if !records.remainder().is_empty() {
            warn!(
                "Dropping {} bytes of partial driver message",
                records.remainder().len()
            );
        }
        for record in records {
            let message = DriverMessage::decode(record)?;
            match message.text() {
                Ok(text) => info!(target: MESSAGE_TARGET, "{}", text.trim_end_matches('\n')),
                Err(e) => warn!("{e}"),
            }
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::{fake::FakeDriver, *};
    use crate::driver::protocol::DRV_STATUS_PENDING;
    use alloc::vec;

    #[test]
    fn execute_then_wait_drains_messages() {
        let mut driver = FakeDriver::default();
        driver.busy_then_complete(2, 0);
        driver.messages.push_back(vec![
            DriverMessage::new("Checking ECAM\n", 0),
            DriverMessage::new("BDF 0x0 found\n", 0),
        ]);
        driver.messages.push_back(vec![DriverMessage::new("done\n", 0)]);
        driver
            .messages
            .push_back(vec![DriverMessage::new("after completion\n", 0)]);
        let mut client = DriverClient::new(driver);

        client
            .execute_test(ApiNumber::PcieExecuteTest, 1, 3, 3, 7)
            .unwrap();
        assert_eq!(
            client.state(),
            RequestState::RequestWritten(ApiNumber::PcieExecuteTest)
        );
        assert_eq!(client.wait_for_completion().unwrap(), 0);
        assert_eq!(client.state(), RequestState::Idle);

        let driver = client.channel();
        assert_eq!(
            driver.requests,
            [DriverParams::new(0x2000, 1, 3, [7, 3, 0])]
        );
        assert_eq!(driver.polls, 3);
        // Both busy polls and the completion each drained one batch.
        assert!(driver.messages.is_empty());
    }

    #[test]
    fn wait_without_request_returns_last_status() {
        let mut driver = FakeDriver::default();
        driver.busy_then_complete(0, 0x1000_0000);
        let mut client = DriverClient::new(driver);
        assert_eq!(client.wait_for_completion().unwrap(), 0x1000_0000);
        assert_eq!(client.wait_for_completion().unwrap(), 0x1000_0000);
        assert_eq!(client.channel().polls, 2);
        assert!(client.channel().requests.is_empty());
    }

    #[test]
    fn one_request_at_a_time() {
        let mut client = DriverClient::new(FakeDriver::default());
        client
            .execute_test(ApiNumber::SmmuExecuteTest, 1, 7, 3, 0)
            .unwrap();
        assert!(matches!(
            client.execute_test(ApiNumber::PcieExecuteTest, 1, 7, 3, 51),
            Err(ClientError::Busy(ApiNumber::SmmuExecuteTest))
        ));
        assert!(matches!(
            client.update_skip_list([90, 10000, 10000]),
            Err(ClientError::Busy(ApiNumber::SmmuExecuteTest))
        ));
        assert_eq!(client.channel().requests.len(), 1);
    }

    #[test]
    fn init_and_clean() {
        let mut driver = FakeDriver::default();
        driver.busy_then_complete(1, 0);
        driver.busy_then_complete(0, 0);
        let mut client = DriverClient::new(driver);
        assert_eq!(client.init_test_env(3).unwrap(), 0);
        client.update_skip_list([51, 10000, 10000]).unwrap();
        assert_eq!(client.clean_test_env().unwrap(), 0);
        assert_eq!(
            client.channel().requests,
            [
                DriverParams::new(0x1000, 0, 0, [0, 3, 0]),
                DriverParams::new(0x3000, 0, 0, [51, 10000, 10000]),
                DriverParams::new(0x9000, 0, 0, [0, 0, 0]),
            ]
        );
    }

    #[test]
    fn poll_limit() {
        let mut driver = FakeDriver::default();
        driver
            .responses
            .push_back(DriverParams::new(0, 0, 0, [DRV_STATUS_PENDING, 0, 0]));
        let mut client = DriverClient::new(driver).with_poll_limit(5);
        client
            .execute_test(ApiNumber::PcieExecuteTest, 1, 4, 3, 52)
            .unwrap();
        assert!(matches!(
            client.wait_for_completion(),
            Err(ClientError::PollLimit(5))
        ));
        assert_eq!(
            client.state(),
            RequestState::Pending(ApiNumber::PcieExecuteTest)
        );
    }

    #[test]
    fn abandoned_request_frees_client() {
        let mut driver = FakeDriver::default();
        driver
            .responses
            .push_back(DriverParams::new(0, 0, 0, [DRV_STATUS_PENDING, 0, 0]));
        let mut client = DriverClient::new(driver).with_poll_limit(2);
        client
            .execute_test(ApiNumber::SmmuExecuteTest, 1, 7, 3, 0)
            .unwrap();
        assert!(client.wait_for_completion().is_err());
        assert_eq!(client.abandon(), Some(ApiNumber::SmmuExecuteTest));
        assert_eq!(client.state(), RequestState::Idle);
        assert_eq!(client.abandon(), None);
        client
            .execute_test(ApiNumber::PcieExecuteTest, 1, 7, 3, 51)
            .unwrap();
        assert_eq!(client.channel().requests.len(), 2);
    }

    #[test]
    fn short_response_is_an_error() {
        struct Truncating;

        impl DriverChannel for Truncating {
            type Error = ();

            fn write_request(&mut self, _request: &[u8]) -> Result<(), ()> {
                Ok(())
            }

            fn read_response(&mut self, _response: &mut [u8]) -> Result<usize, ()> {
                Ok(8)
            }

            fn read_messages(&mut self, _messages: &mut Vec<u8>) -> Result<(), ()> {
                Err(())
            }
        }

        let mut client = DriverClient::new(Truncating);
        assert!(matches!(
            client.wait_for_completion(),
            Err(ClientError::Protocol(ProtocolError::ShortRecord {
                expected: 40,
                actual: 8
            }))
        ));
    }
}
