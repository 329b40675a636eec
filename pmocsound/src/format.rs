//! Sample representation shared by the pipeline and the engine.
//!
//! Engines work either in 32-bit or in 64-bit floats. The path is chosen once
//! at setup by [`FormatDispatch::negotiate`] and kept for the whole session.

use std::fmt;
use std::mem::size_of;

use serde::{Deserialize, Serialize};

use crate::error::{CsoundError, Result};

/// The two float sample formats an engine can use natively.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SampleFormat {
    F32,
    F64,
}

impl SampleFormat {
    /// Maps an engine sample width in bytes to a format.
    pub const fn from_width(width: usize) -> Option<Self> {
        match width {
            4 => Some(Self::F32),
            8 => Some(Self::F64),
            _ => None,
        }
    }

    #[inline(always)]
    pub const fn width(self) -> usize {
        match self {
            SampleFormat::F32 => size_of::<f32>(),
            SampleFormat::F64 => size_of::<f64>(),
        }
    }

    /// Pipeline format name in native endianness (`F32LE`, `F64BE`, ...).
    pub const fn native_name(self) -> &'static str {
        match (self, cfg!(target_endian = "little")) {
            (SampleFormat::F32, true) => "F32LE",
            (SampleFormat::F32, false) => "F32BE",
            (SampleFormat::F64, true) => "F64LE",
            (SampleFormat::F64, false) => "F64BE",
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.native_name())
    }
}

/// Float sample types the engine ports can hold.
pub trait EngineSample: bytemuck::Pod + Copy + Send + Sync + 'static {
    const FORMAT: SampleFormat;

    fn to_f64(self) -> f64;
    fn from_f64(value: f64) -> Self;
}

impl EngineSample for f32 {
    const FORMAT: SampleFormat = SampleFormat::F32;

    #[inline(always)]
    fn to_f64(self) -> f64 {
        self as f64
    }

    #[inline(always)]
    fn from_f64(value: f64) -> Self {
        value as f32
    }
}

impl EngineSample for f64 {
    const FORMAT: SampleFormat = SampleFormat::F64;

    #[inline(always)]
    fn to_f64(self) -> f64 {
        self
    }

    #[inline(always)]
    fn from_f64(value: f64) -> Self {
        value
    }
}

/// Session-wide binding of the sample routines.
///
/// The tag is validated once; the routines below only branch on it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FormatDispatch {
    format: SampleFormat,
}

impl FormatDispatch {
    /// Binds the processing path for an engine of `native_width` bytes per
    /// sample.
    ///
    /// # Errors
    ///
    /// `UnsupportedSampleWidth` when the engine is neither 32 nor 64 bits,
    /// `FormatMismatch` when the pipeline negotiated the other format.
    pub fn negotiate(native_width: usize, negotiated: Option<SampleFormat>) -> Result<Self> {
        let native = SampleFormat::from_width(native_width)
            .ok_or(CsoundError::UnsupportedSampleWidth(native_width))?;
        match negotiated {
            Some(negotiated) if negotiated != native => {
                Err(CsoundError::FormatMismatch { negotiated, native })
            }
            _ => Ok(Self { format: native }),
        }
    }

    pub fn format(&self) -> SampleFormat {
        self.format
    }

    #[inline(always)]
    pub fn sample_width(&self) -> usize {
        self.format.width()
    }

    /// Multiplies every sample of `bytes` by `factor`.
    pub fn scale_in_place(&self, bytes: &mut [u8], factor: f64) {
        match self.format {
            SampleFormat::F32 => scale_samples::<f32>(bytes, factor),
            SampleFormat::F64 => scale_samples::<f64>(bytes, factor),
        }
    }

    /// Reads sample `index` of an interleaved byte buffer.
    pub fn read_sample(&self, bytes: &[u8], index: usize) -> f64 {
        match self.format {
            SampleFormat::F32 => read_at::<f32>(bytes, index),
            SampleFormat::F64 => read_at::<f64>(bytes, index),
        }
    }

    /// Writes sample `index` of an interleaved byte buffer.
    pub fn write_sample(&self, bytes: &mut [u8], index: usize, value: f64) {
        match self.format {
            SampleFormat::F32 => write_at::<f32>(bytes, index, value),
            SampleFormat::F64 => write_at::<f64>(bytes, index, value),
        }
    }

    /// Number of samples held by `len` bytes, rejecting partial samples.
    pub fn sample_count(&self, len: usize) -> Result<usize> {
        let width = self.sample_width();
        if len % width != 0 {
            return Err(CsoundError::NonIntegralFrameCount {
                len,
                frame_bytes: width,
            });
        }
        Ok(len / width)
    }
}

// Pipeline buffers carry no alignment guarantee, hence the unaligned reads.
fn scale_samples<S: EngineSample>(bytes: &mut [u8], factor: f64) {
    for raw in bytes.chunks_exact_mut(size_of::<S>()) {
        let sample: S = bytemuck::pod_read_unaligned(raw);
        let scaled = S::from_f64(sample.to_f64() * factor);
        raw.copy_from_slice(bytemuck::bytes_of(&scaled));
    }
}

fn read_at<S: EngineSample>(bytes: &[u8], index: usize) -> f64 {
    let width = size_of::<S>();
    let sample: S = bytemuck::pod_read_unaligned(&bytes[index * width..(index + 1) * width]);
    sample.to_f64()
}

fn write_at<S: EngineSample>(bytes: &mut [u8], index: usize, value: f64) {
    let width = size_of::<S>();
    let sample = S::from_f64(value);
    bytes[index * width..(index + 1) * width].copy_from_slice(bytemuck::bytes_of(&sample));
}

/// Serializes float samples into native-endian bytes.
pub fn samples_to_bytes<S: EngineSample>(samples: &[S]) -> Vec<u8> {
    bytemuck::cast_slice(samples).to_vec()
}

/// Decodes native-endian bytes into float samples.
pub fn bytes_to_samples<S: EngineSample>(bytes: &[u8]) -> Vec<S> {
    bytes
        .chunks_exact(size_of::<S>())
        .map(bytemuck::pod_read_unaligned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negotiate_binds_native_width() {
        assert_eq!(
            FormatDispatch::negotiate(8, None).unwrap().format(),
            SampleFormat::F64
        );
        assert_eq!(
            FormatDispatch::negotiate(4, Some(SampleFormat::F32))
                .unwrap()
                .sample_width(),
            4
        );
    }

    #[test]
    fn test_negotiate_rejects_mismatch_and_odd_widths() {
        assert!(matches!(
            FormatDispatch::negotiate(8, Some(SampleFormat::F32)),
            Err(CsoundError::FormatMismatch {
                negotiated: SampleFormat::F32,
                native: SampleFormat::F64
            })
        ));
        assert!(matches!(
            FormatDispatch::negotiate(2, None),
            Err(CsoundError::UnsupportedSampleWidth(2))
        ));
    }

    #[test]
    fn test_scale_in_place_both_paths() {
        let dispatch = FormatDispatch::negotiate(4, None).unwrap();
        let mut bytes = samples_to_bytes(&[2.0f32, -4.0, 8.0]);
        dispatch.scale_in_place(&mut bytes, 0.5);
        assert_eq!(bytes_to_samples::<f32>(&bytes), vec![1.0, -2.0, 4.0]);

        let dispatch = FormatDispatch::negotiate(8, None).unwrap();
        let mut bytes = samples_to_bytes(&[32768.0f64, -16384.0]);
        dispatch.scale_in_place(&mut bytes, 1.0 / 32768.0);
        assert_eq!(dispatch.read_sample(&bytes, 0), 1.0);
        assert_eq!(dispatch.read_sample(&bytes, 1), -0.5);
    }

    #[test]
    fn test_unaligned_access() {
        let dispatch = FormatDispatch::negotiate(8, None).unwrap();
        let mut storage = vec![0u8; 17];
        let view = &mut storage[1..];
        dispatch.write_sample(view, 1, 0.25);
        assert_eq!(dispatch.read_sample(view, 1), 0.25);
        assert_eq!(dispatch.read_sample(view, 0), 0.0);
    }

    #[test]
    fn test_sample_count() {
        let dispatch = FormatDispatch::negotiate(4, None).unwrap();
        assert_eq!(dispatch.sample_count(16).unwrap(), 4);
        assert!(dispatch.sample_count(15).is_err());
    }
}
