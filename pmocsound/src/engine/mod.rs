//! Boundary with the block-based synthesis engine.
//!
//! The adapter never does DSP itself: it copies fixed-size windows into the
//! engine's input port, runs one block, and copies the output port back.
//! Ports belong to the engine and are looked up on every step, so nothing
//! outside the engine can hold them past `stop()`.

pub mod reference;

use std::path::Path;
use std::sync::Arc;

use tracing::warn;

use crate::error::{CsoundError, Result};
use crate::format::SampleFormat;
use crate::messages::MessageSink;

pub use reference::{Generator, ReferenceEngine, ReferenceProgram};

/// Result of one block step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockStatus {
    Continue,
    /// The score is over. The output of this step is still valid.
    ReachedEnd,
}

impl BlockStatus {
    pub fn is_end(self) -> bool {
        matches!(self, BlockStatus::ReachedEnd)
    }
}

/// A compiled, block-based DSP engine.
///
/// `block_size`, the channel counts, the sample rate and the sample width
/// are fixed once `compile` succeeded and for as long as the handle lives.
pub trait BlockEngine: Send {
    /// Compiles the program found at `location`.
    fn compile(&mut self, location: &Path) -> Result<()>;

    fn start(&mut self) -> Result<()>;
    fn stop(&mut self);
    fn reset(&mut self);

    /// Sample frames per block (ksmps).
    fn block_size(&self) -> usize;
    fn sample_rate(&self) -> u32;
    fn input_channels(&self) -> usize;
    fn output_channels(&self) -> usize;
    /// Amplitude of a full-scale sample (0dBFS).
    fn full_scale_level(&self) -> f64;
    /// Bytes per sample of the engine ports, 4 or 8.
    fn native_sample_width(&self) -> usize;

    /// Interleaved input window of `block_size × input_channels` samples.
    fn input_port(&mut self) -> &mut [u8];
    /// Interleaved output window of `block_size × output_channels` samples.
    fn output_port(&self) -> &[u8];

    fn run_block(&mut self) -> BlockStatus;
    fn rewind_score(&mut self, offset_seconds: f64);
}

/// Creates engine handles. The diagnostics sink is handed over explicitly.
pub trait EngineFactory {
    type Engine: BlockEngine;

    fn create(&self, messages: Arc<dyn MessageSink>) -> Result<Self::Engine>;
}

impl<F, E> EngineFactory for F
where
    F: Fn(Arc<dyn MessageSink>) -> Result<E>,
    E: BlockEngine,
{
    type Engine = E;

    fn create(&self, messages: Arc<dyn MessageSink>) -> Result<E> {
        self(messages)
    }
}

/// Everything derived from a compiled engine, captured once.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlockGeometry {
    pub block_size: usize,
    pub input_channels: usize,
    pub output_channels: usize,
    pub sample_rate: u32,
    pub format: SampleFormat,
    pub full_scale: f64,
}

impl BlockGeometry {
    /// Reads and validates the geometry of a compiled engine.
    pub fn from_engine<E: BlockEngine + ?Sized>(engine: &mut E) -> Result<Self> {
        let width = engine.native_sample_width();
        let format =
            SampleFormat::from_width(width).ok_or(CsoundError::UnsupportedSampleWidth(width))?;
        let geometry = Self {
            block_size: engine.block_size(),
            input_channels: engine.input_channels(),
            output_channels: engine.output_channels(),
            sample_rate: engine.sample_rate(),
            format,
            full_scale: engine.full_scale_level(),
        };

        if geometry.block_size == 0 {
            return Err(CsoundError::InvalidGeometry("block size is 0".into()));
        }
        if geometry.sample_rate == 0 {
            return Err(CsoundError::InvalidGeometry("sample rate is 0".into()));
        }
        if !(geometry.full_scale.is_finite() && geometry.full_scale > 0.0) {
            return Err(CsoundError::InvalidGeometry(format!(
                "full-scale level {} is not a positive amplitude",
                geometry.full_scale
            )));
        }
        let input_port = engine.input_port().len();
        if input_port != geometry.input_frame_bytes() {
            return Err(CsoundError::InvalidGeometry(format!(
                "input port holds {input_port} bytes, expected {}",
                geometry.input_frame_bytes()
            )));
        }
        let output_port = engine.output_port().len();
        if output_port != geometry.output_frame_bytes() {
            return Err(CsoundError::InvalidGeometry(format!(
                "output port holds {output_port} bytes, expected {}",
                geometry.output_frame_bytes()
            )));
        }
        if !geometry.block_size.is_power_of_two() {
            warn!(
                block_size = geometry.block_size,
                "engine ksmps is not a power of two"
            );
        }
        Ok(geometry)
    }

    #[inline]
    pub fn input_frame_bytes(&self) -> usize {
        self.block_size * self.input_channels * self.format.width()
    }

    #[inline]
    pub fn output_frame_bytes(&self) -> usize {
        self.block_size * self.output_channels * self.format.width()
    }

    /// Bytes of one output sample frame, i.e. one sample per output channel.
    #[inline]
    pub fn output_bytes_per_sample_frame(&self) -> usize {
        self.output_channels * self.format.width()
    }
}

/// Creates, compiles and starts an engine, then reads its geometry.
pub(crate) fn open_engine<F: EngineFactory>(
    factory: &F,
    messages: Arc<dyn MessageSink>,
    location: &Path,
) -> Result<(F::Engine, BlockGeometry)> {
    let mut engine = factory.create(messages)?;
    engine.compile(location)?;
    engine.start()?;
    match BlockGeometry::from_engine(&mut engine) {
        Ok(geometry) => Ok((engine, geometry)),
        Err(err) => {
            engine.stop();
            Err(err)
        }
    }
}
