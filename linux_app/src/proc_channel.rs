// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! The SBSA kernel driver's `/proc` files as a [`DriverChannel`].

use sbsa_acs::driver::DriverChannel;
use std::{
    fs::{File, OpenOptions},
    io::{self, Read, Write},
    path::{Path, PathBuf},
};
use thiserror::Error;

/// Request and response file created by the driver.
pub const REQUEST_PATH: &str = "/proc/sbsa";

/// Message stream file created by the driver.
pub const MESSAGE_PATH: &str = "/proc/sbsa_msg";

/// Failure to access one of the driver's files.
#[derive(Debug, Error)]
#[error("{path}: {source}")]
pub struct ProcError {
    path: String,
    #[source]
    source: io::Error,
}

impl ProcError {
    fn at(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| Self {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Opens the driver's files afresh for every access, as the driver expects.
#[derive(Clone, Debug)]
pub struct ProcChannel {
    request_path: PathBuf,
    message_path: PathBuf,
}

impl ProcChannel {
    /// Creates a channel for the given request and message files.
    pub fn new(request_path: impl Into<PathBuf>, message_path: impl Into<PathBuf>) -> Self {
        Self {
            request_path: request_path.into(),
            message_path: message_path.into(),
        }
    }
}

impl Default for ProcChannel {
    fn default() -> Self {
        Self::new(REQUEST_PATH, MESSAGE_PATH)
    }
}

impl DriverChannel for ProcChannel {
    type Error = ProcError;

    fn write_request(&mut self, request: &[u8]) -> Result<(), ProcError> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.request_path)
            .and_then(|mut file| file.write_all(request))
            .map_err(ProcError::at(&self.request_path))
    }

    fn read_response(&mut self, response: &mut [u8]) -> Result<usize, ProcError> {
        let mut bytes = Vec::with_capacity(response.len());
        File::open(&self.request_path)
            .and_then(|file| file.take(response.len() as u64).read_to_end(&mut bytes))
            .map_err(ProcError::at(&self.request_path))?;
        response[..bytes.len()].copy_from_slice(&bytes);
        Ok(bytes.len())
    }

    fn read_messages(&mut self, messages: &mut Vec<u8>) -> Result<(), ProcError> {
        File::open(&self.message_path)
            .and_then(|mut file| file.read_to_end(messages))
            .map(|_| ())
            .map_err(ProcError::at(&self.message_path))
    }
}
