//! Measurement records returned to callers.

use bytes::Buf;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Samples collected by one `read_frame` call.
///
/// The flat vectors are row-major: measurement index major, pixel index
/// minor, so measurement `m` occupies `samples[m * pixel_count ..
/// (m + 1) * pixel_count]`. A successfully returned record always satisfies
/// `samples.len() == clipped.len() == pixel_count * measure_count`.
///
/// Records are created fresh per call and owned exclusively by the caller;
/// no shared state survives the call that produced one.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Measurement {
    pixel_count: usize,
    measure_count: usize,
    samples: Vec<i32>,
    clipped: Vec<bool>,
}

impl Measurement {
    /// Decode a record from raw wire samples.
    ///
    /// Each sample arrives as a little-endian u16 in the sensor's
    /// offset-binary encoding; flipping the most-significant bit yields
    /// two's-complement. Saturation is flagged on the transformed value:
    /// `i16::MAX` here marks exactly the samples whose raw value was
    /// `0xFFFF`, the top of the ADC range.
    pub(crate) fn from_wire(pixel_count: usize, measure_count: usize, mut wire: &[u8]) -> Self {
        debug_assert_eq!(wire.len(), pixel_count * measure_count * 2);

        let len = pixel_count * measure_count;
        let mut samples = Vec::with_capacity(len);
        let mut clipped = Vec::with_capacity(len);
        while wire.has_remaining() {
            let sample = (wire.get_u16_le() ^ 0x8000) as i16;
            samples.push(i32::from(sample));
            clipped.push(sample == i16::MAX);
        }

        Self {
            pixel_count,
            measure_count,
            samples,
            clipped,
        }
    }

    /// Pixels per measurement.
    #[must_use]
    pub fn pixel_count(&self) -> usize {
        self.pixel_count
    }

    /// Number of repeated exposures in this record.
    #[must_use]
    pub fn measure_count(&self) -> usize {
        self.measure_count
    }

    /// All samples, measurement-major.
    #[must_use]
    pub fn samples(&self) -> &[i32] {
        &self.samples
    }

    /// Saturation flags, same shape as [`Self::samples`].
    #[must_use]
    pub fn clipped(&self) -> &[bool] {
        &self.clipped
    }

    /// Samples of one measurement row.
    ///
    /// # Panics
    ///
    /// Panics if `index >= measure_count`.
    #[must_use]
    pub fn measurement(&self, index: usize) -> &[i32] {
        assert!(index < self.measure_count, "measurement index out of range");
        &self.samples[index * self.pixel_count..(index + 1) * self.pixel_count]
    }
}
