//! FTDI D2XX transport backend (feature = "hardware")

use std::time::Duration;

use libftd2xx::{BitMode, Ftdi, FtdiCommon, list_devices};
use tracing::debug;

use super::{Transport, UsbId};
use crate::error::{Error, Result};

fn transport_err(op: &str, status: libftd2xx::FtStatus) -> Error {
    Error::Transport(format!("{op}: {status:?}"))
}

/// Transport over an FTDI FT-series FIFO bridge via the vendor D2XX
/// library. Enumeration, driver state, and per-transfer timeouts all live
/// down in the vendor library; this wrapper only maps the contract.
pub struct FtdiTransport {
    handle: Ftdi,
}

impl FtdiTransport {
    /// Open the first attached device matching `id`.
    pub fn open(id: UsbId) -> Result<Self> {
        Self::open_serial(id, None)
    }

    /// Open a device matching `id`, filtered by serial number when given.
    pub fn open_serial(id: UsbId, serial: Option<&str>) -> Result<Self> {
        let devices = list_devices().map_err(|e| transport_err("enumeration failed", e))?;

        for (index, info) in devices.iter().enumerate() {
            if info.vendor_id != id.vendor || info.product_id != id.product {
                continue;
            }
            if let Some(serial) = serial {
                if info.serial_number != serial {
                    continue;
                }
            }
            debug!(
                index,
                serial = %info.serial_number,
                "opening FTDI device"
            );
            let handle = Ftdi::with_index(i32::try_from(index).unwrap())
                .map_err(|e| transport_err("open failed", e))?;
            return Ok(Self { handle });
        }

        Err(Error::DeviceNotFound {
            vendor: id.vendor,
            product: id.product,
        })
    }
}

impl Transport for FtdiTransport {
    fn set_bit_mode(&mut self, mask: u8, enable: u8) -> Result<()> {
        let mode = match enable {
            0x00 => BitMode::Reset,
            0x40 => BitMode::SyncFifo,
            other => {
                return Err(Error::Transport(format!("unsupported bit-mode {other:#04x}")));
            }
        };
        self.handle
            .set_bit_mode(mask, mode)
            .map_err(|e| transport_err("set_bit_mode failed", e))
    }

    fn set_timeouts(&mut self, read: Duration, write: Duration) -> Result<()> {
        self.handle
            .set_timeouts(read, write)
            .map_err(|e| transport_err("set_timeouts failed", e))
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.handle
            .read(buf)
            .map_err(|e| transport_err("read failed", e))
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.handle
            .write(buf)
            .map_err(|e| transport_err("write failed", e))
    }

    fn close(&mut self) -> Result<()> {
        self.handle
            .close()
            .map_err(|e| transport_err("close failed", e))
    }
}
