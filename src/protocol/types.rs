//! Command operation selectors

use std::fmt;

/// Operation selector byte of a command frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandCode {
    /// Write the acquisition control register (0 = reset/idle)
    WriteControl = 0x01,
    /// Write the exposure timer register (packed significand/exponent)
    WriteTimer = 0x02,
    /// Stream back N repeated exposures of sample data
    ReadFrame = 0x05,
    /// Write the sensor pixel count
    WritePixelCount = 0x0c,
    /// Read the firmware version
    ReadVersion = 0x91,
    /// Read the device error register
    ReadErrors = 0x92,
}

impl CommandCode {
    /// Convert from byte
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::WriteControl),
            0x02 => Some(Self::WriteTimer),
            0x05 => Some(Self::ReadFrame),
            0x0c => Some(Self::WritePixelCount),
            0x91 => Some(Self::ReadVersion),
            0x92 => Some(Self::ReadErrors),
            _ => None,
        }
    }

    /// Convert to byte
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for CommandCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::WriteControl => "WriteControl",
            Self::WriteTimer => "WriteTimer",
            Self::ReadFrame => "ReadFrame",
            Self::WritePixelCount => "WritePixelCount",
            Self::ReadVersion => "ReadVersion",
            Self::ReadErrors => "ReadErrors",
        };
        write!(f, "{name}")
    }
}
