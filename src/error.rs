//! Driver error types.

use std::time::Duration;

use thiserror::Error;

use crate::device::DeviceState;

/// Errors surfaced by the driver.
///
/// All variants are terminal to the operation that raised them; the driver
/// never retries or resends. After [`Error::ProtocolDesync`] or
/// [`Error::ReadTimeout`] the byte stream may be mid-frame and the device
/// must be closed and reopened.
#[derive(Error, Debug)]
pub enum Error {
    /// No attached device matched the requested vendor/product pair.
    #[error("device {vendor:04x}:{product:04x} not found")]
    DeviceNotFound {
        /// Requested USB vendor id
        vendor: u16,
        /// Requested USB product id
        product: u16,
    },

    /// Read, write, or configuration failure reported by the transport.
    #[error("transport error: {0}")]
    Transport(String),

    /// The accumulation watchdog elapsed before the expected bytes arrived.
    #[error("read timed out after {elapsed:?}: got {got} of {needed} bytes")]
    ReadTimeout {
        /// Time since the last read that made progress
        elapsed: Duration,
        /// Bytes the read-exact loop was asked for
        needed: usize,
        /// Bytes accumulated before the stall
        got: usize,
    },

    /// Unexpected magic bytes in a reply or chunk header.
    #[error("protocol desync: expected {expected} magic, got {found:?}")]
    ProtocolDesync {
        /// Magic the frame should have carried
        expected: &'static str,
        /// Bytes actually received
        found: [u8; 4],
    },

    /// A chunk header declared more bytes than remain outstanding.
    #[error("framing overflow: chunk declares {declared} bytes, {outstanding} outstanding")]
    FramingOverflow {
        /// Payload length declared by the chunk header
        declared: usize,
        /// Bytes still missing from the destination buffer
        outstanding: usize,
    },

    /// Requested exposure cannot be represented in the timer register.
    #[error("exposure of {millis} ms exceeds the timer register range")]
    ExposureTooLarge {
        /// Requested exposure in milliseconds
        millis: u32,
    },

    /// Operation attempted while the device is closed or faulted.
    #[error("device is {state:?}, close and reopen required")]
    InvalidState {
        /// State the device was in
        state: DeviceState,
    },
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
