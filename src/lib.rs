//! Spectrolink - protocol driver for a synchronous-FIFO USB spectrometer
//!
//! This library implements the spectrometer's wire protocol: framed commands
//! and replies, chunked sample-data reassembly, a stall watchdog, and the
//! exposure-time register encoding. USB plumbing lives behind the
//! [`transport::Transport`] trait; the FTDI D2XX backend is gated behind the
//! `hardware` cargo feature so the core builds and tests without the vendor
//! library.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use spectrolink::{MockTransport, Spectrometer, SpectrometerOptions};
//!
//! // MockTransport stands in for the FTDI link; with the `hardware`
//! // feature enabled, use `Spectrometer::open(UsbId::default())` instead.
//! let transport = MockTransport::new();
//! let mut device = Spectrometer::new(transport, SpectrometerOptions::default())?;
//!
//! device.initialize()?;
//! device.set_timer(100)?;
//!
//! let frame = device.read_frame(1)?;
//! println!("read {} samples", frame.samples().len());
//! # Ok::<(), spectrolink::Error>(())
//! ```
//!
//! # Fault model
//!
//! Every failure is terminal to the in-flight operation; nothing is retried
//! internally. A desync or timeout leaves the byte stream possibly mid-frame,
//! so the device transitions to [`DeviceState::Faulted`] and must be closed
//! and reopened before further use.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod device;
mod error;
pub mod measurement;
pub mod protocol;
pub mod transport;

pub use device::{DeviceState, PIXEL_COUNT, Spectrometer, SpectrometerOptions};
pub use error::{Error, Result};
pub use measurement::Measurement;
pub use protocol::{ChunkHeader, CommandCode, CommandFrame, ProtocolEngine, ReplyFrame};
#[cfg(feature = "hardware")]
pub use transport::FtdiTransport;
pub use transport::{MockTransport, Transport, UsbId};
