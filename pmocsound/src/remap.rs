//! Output sizing when the engine changes the channel count.
//!
//! One formula covers equal, up-mixing and down-mixing geometries:
//! `frames = input_len / (input_channels × width)`,
//! `output_len = frames × output_channels × width`.

use crate::engine::BlockGeometry;
use crate::error::{CsoundError, Result};

/// Computes the output byte length for `input_len` bytes of interleaved input.
///
/// # Errors
///
/// `NonIntegralFrameCount` when `input_len` is not a whole number of input
/// frames. Truncating here would silently drop audio, so the caller must
/// treat it as fatal for the buffer.
///
/// # Exemples
///
/// ```
/// use pmocsound::remap::compute_output_size;
///
/// // 100 stereo f64 frames downmixed to mono
/// assert_eq!(compute_output_size(1600, 2, 1, 8).unwrap(), 800);
/// ```
pub fn compute_output_size(
    input_len: usize,
    input_channels: usize,
    output_channels: usize,
    sample_width: usize,
) -> Result<usize> {
    let frame_bytes = input_channels * sample_width;
    if frame_bytes == 0 {
        return Err(CsoundError::InvalidGeometry(format!(
            "input frame of {input_channels} channels × {sample_width} bytes"
        )));
    }
    if input_len % frame_bytes != 0 {
        return Err(CsoundError::NonIntegralFrameCount {
            len: input_len,
            frame_bytes,
        });
    }
    let frames = input_len / frame_bytes;
    Ok(frames * output_channels * sample_width)
}

/// [`compute_output_size`] bound to the channel geometry of one engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelRemapper {
    input_channels: usize,
    output_channels: usize,
    sample_width: usize,
}

impl ChannelRemapper {
    pub fn new(input_channels: usize, output_channels: usize, sample_width: usize) -> Result<Self> {
        if input_channels == 0 || output_channels == 0 || sample_width == 0 {
            return Err(CsoundError::InvalidGeometry(format!(
                "cannot remap {input_channels} → {output_channels} channels of {sample_width}-byte samples"
            )));
        }
        Ok(Self {
            input_channels,
            output_channels,
            sample_width,
        })
    }

    pub fn for_geometry(geometry: &BlockGeometry) -> Result<Self> {
        Self::new(
            geometry.input_channels,
            geometry.output_channels,
            geometry.format.width(),
        )
    }

    pub fn output_size(&self, input_len: usize) -> Result<usize> {
        compute_output_size(
            input_len,
            self.input_channels,
            self.output_channels,
            self.sample_width,
        )
    }

    /// Bytes of one input sample frame (one sample per channel).
    pub fn input_frame_bytes(&self) -> usize {
        self.input_channels * self.sample_width
    }

    pub fn output_frame_bytes(&self) -> usize {
        self.output_channels * self.sample_width
    }

    pub fn is_passthrough(&self) -> bool {
        self.input_channels == self.output_channels
    }
}
