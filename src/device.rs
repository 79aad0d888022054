//! Device facade: the two spectrometer operations plus link lifecycle.

use std::time::Duration;

use tracing::debug;

use crate::error::{Error, Result};
use crate::measurement::Measurement;
use crate::protocol::{CommandCode, ProtocolEngine};
#[cfg(feature = "hardware")]
use crate::transport::FtdiTransport;
use crate::transport::Transport;
#[cfg(feature = "hardware")]
use crate::transport::UsbId;

/// Fixed sensor pixel count written to the device at initialization.
pub const PIXEL_COUNT: u32 = 4102;

/// Raw timer register value sent by `initialize`: significand 1000 with a
/// zero exponent, i.e. 100 tenths of a millisecond. A safe default exposure.
const DEFAULT_TIMER_REGISTER: u32 = 0x03E8;

/// Timer register packing limits: a 10-bit significand and base-10 exponent.
const MAX_SIGNIFICAND: u64 = 1023;

/// Connection lifecycle of a [`Spectrometer`].
///
/// There is no resynchronization procedure: a desync or timeout leaves the
/// byte stream possibly mid-frame, so the device parks in `Faulted` until
/// it is closed and reopened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// Handle closed; a fresh open is required.
    Closed,
    /// Link configured and usable.
    Open,
    /// A desync or timeout poisoned the byte stream.
    Faulted,
}

/// Configuration for constructing a [`Spectrometer`].
#[derive(Debug, Clone, Copy)]
pub struct SpectrometerOptions {
    /// Engine accumulation watchdog. Must cover the configured exposure
    /// time, or long exposures will be cut off as stalls.
    pub read_timeout: Duration,
}

impl Default for SpectrometerOptions {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(3000),
        }
    }
}

impl SpectrometerOptions {
    /// Override the engine watchdog timeout.
    #[must_use]
    pub const fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }
}

/// High-level handle to one spectrometer.
///
/// Sequences engine exchanges into the device operations and applies the
/// device-specific encodings: the exposure register packing and the
/// offset-binary sample transform.
pub struct Spectrometer<T: Transport> {
    engine: ProtocolEngine<T>,
    state: DeviceState,
}

impl<T: Transport> Spectrometer<T> {
    /// Wrap an already-constructed transport. Configures the link and
    /// leaves the device in [`DeviceState::Open`].
    pub fn new(transport: T, options: SpectrometerOptions) -> Result<Self> {
        let engine = ProtocolEngine::new(transport, options.read_timeout)?;
        Ok(Self {
            engine,
            state: DeviceState::Open,
        })
    }

    /// Reset acquisition state and program the default exposure and the
    /// sensor pixel count, in that order.
    ///
    /// A failure aborts mid-sequence with no rollback; the device is left
    /// indeterminate and must be reopened.
    pub fn initialize(&mut self) -> Result<()> {
        self.run(|engine| {
            engine.send_command(CommandCode::WriteControl, 0)?;
            engine.send_command(CommandCode::WriteTimer, DEFAULT_TIMER_REGISTER)?;
            engine.send_command(CommandCode::WritePixelCount, PIXEL_COUNT)?;
            Ok(())
        })?;
        debug!("device initialized");
        Ok(())
    }

    /// Program the exposure time, in milliseconds.
    pub fn set_timer(&mut self, millis: u32) -> Result<()> {
        let register = encode_exposure(millis)?;
        debug!(millis, register, "set exposure");
        self.run(|engine| {
            engine.send_command(CommandCode::WriteTimer, register)?;
            Ok(())
        })
    }

    /// Read `count` repeated exposures into one measurement record.
    ///
    /// The device streams `pixel_count * count` raw 16-bit samples back as
    /// length-prefixed chunks; `count = 0` completes after the command
    /// exchange alone and yields an empty record.
    pub fn read_frame(&mut self, count: u16) -> Result<Measurement> {
        let pixels = PIXEL_COUNT as usize;
        let measures = usize::from(count);

        let raw = self.run(|engine| {
            engine.send_command(CommandCode::ReadFrame, u32::from(count))?;
            let total = pixels * measures * 2;
            let mut raw = vec![0u8; total];
            engine.read_data(&mut raw, total)?;
            Ok(raw)
        })?;

        Ok(Measurement::from_wire(pixels, measures, &raw))
    }

    /// Firmware version reported by the device.
    pub fn firmware_version(&mut self) -> Result<u16> {
        self.run(|engine| Ok(engine.send_command(CommandCode::ReadVersion, 0)?.data))
    }

    /// Contents of the device error register.
    pub fn error_register(&mut self) -> Result<u16> {
        self.run(|engine| Ok(engine.send_command(CommandCode::ReadErrors, 0)?.data))
    }

    /// Pixels per measurement for this sensor.
    #[must_use]
    pub fn pixel_count(&self) -> u32 {
        PIXEL_COUNT
    }

    /// Whether the device is open and usable.
    #[must_use]
    pub fn is_opened(&self) -> bool {
        self.state == DeviceState::Open
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// Close the transport handle. Aborts any in-flight read; the only way
    /// out of [`DeviceState::Faulted`].
    pub fn close(&mut self) -> Result<()> {
        if self.state != DeviceState::Closed {
            self.engine.close()?;
            self.state = DeviceState::Closed;
            debug!("device closed");
        }
        Ok(())
    }

    /// Gate an operation on the state machine and record faults.
    fn run<R>(&mut self, op: impl FnOnce(&mut ProtocolEngine<T>) -> Result<R>) -> Result<R> {
        if self.state != DeviceState::Open {
            return Err(Error::InvalidState { state: self.state });
        }
        match op(&mut self.engine) {
            Err(err @ (Error::ProtocolDesync { .. } | Error::ReadTimeout { .. })) => {
                self.state = DeviceState::Faulted;
                debug!(error = %err, "stream fault, reopen required");
                Err(err)
            }
            other => other,
        }
    }
}

#[cfg(feature = "hardware")]
impl Spectrometer<FtdiTransport> {
    /// Open the first attached device matching `id` with default options.
    pub fn open(id: UsbId) -> Result<Self> {
        Self::open_with(id, None, SpectrometerOptions::default())
    }

    /// Open a device matching `id`, filtered by serial number when given.
    pub fn open_with(id: UsbId, serial: Option<&str>, options: SpectrometerOptions) -> Result<Self> {
        let transport = FtdiTransport::open_serial(id, serial)?;
        Self::new(transport, options)
    }
}

/// Pack an exposure in milliseconds into the device timer register.
///
/// The register holds a 10-bit significand and a base-10 exponent,
/// representing `significand * 10^(exponent - 1)` tenths of a millisecond.
/// Repeated truncating division is the device firmware's own quantization
/// and must not be rounded. Exposures needing an exponent of 4 or more do
/// not fit the field.
fn encode_exposure(millis: u32) -> Result<u32> {
    let mut value = u64::from(millis) * 10;
    let mut exponent = 1u32;

    while value > MAX_SIGNIFICAND {
        value /= 10;
        exponent += 1;
        if exponent == 4 {
            return Err(Error::ExposureTooLarge { millis });
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    Ok(value as u32 | (exponent << 16))
}
