//! Push-style block transform: one input buffer in, one output buffer out.
//!
//! Each call pushes the whole input into a [`StreamAdapter`] and runs one
//! engine block per complete input frame. Per block the order is fixed:
//! copy the input window into the engine, run the block, copy that block's
//! output. Bytes short of a frame stay buffered for the next call.

use tracing::{debug, trace};

use crate::adapter::StreamAdapter;
use crate::engine::{BlockEngine, BlockGeometry};
use crate::error::{AdapterError, CsoundError, Result};
use crate::remap::ChannelRemapper;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransformStatus {
    Continue,
    /// The score ended during this call and looping is off. The output
    /// written so far is valid and must be delivered.
    LastBuffer,
    /// Nothing was processed: the score ended in a previous call.
    EndOfStream,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransformOutcome {
    /// Engine block steps run during the call.
    pub blocks: usize,
    pub bytes_written: usize,
    pub status: TransformStatus,
}

impl TransformOutcome {
    fn end_of_stream() -> Self {
        Self {
            blocks: 0,
            bytes_written: 0,
            status: TransformStatus::EndOfStream,
        }
    }
}

pub struct BlockTransformEngine<E: BlockEngine> {
    engine: E,
    adapter: StreamAdapter,
    geometry: BlockGeometry,
    remapper: ChannelRemapper,
    looping: bool,
    eos_pending: bool,
}

impl<E: BlockEngine> BlockTransformEngine<E> {
    /// Wraps a compiled and started engine.
    pub fn new(mut engine: E, looping: bool) -> Result<Self> {
        let geometry = BlockGeometry::from_engine(&mut engine)?;
        Self::with_geometry(engine, geometry, looping)
    }

    /// Wraps an engine whose geometry was already read with
    /// [`BlockGeometry::from_engine`].
    pub(crate) fn with_geometry(
        mut engine: E,
        geometry: BlockGeometry,
        looping: bool,
    ) -> Result<Self> {
        // A zero-sized frame would make the block loop spin forever.
        if geometry.input_frame_bytes() == 0 || geometry.output_frame_bytes() == 0 {
            return Err(CsoundError::InvalidGeometry(format!(
                "transform needs non-empty frames, got {} input and {} output bytes",
                geometry.input_frame_bytes(),
                geometry.output_frame_bytes()
            )));
        }
        let ports = (engine.input_port().len(), engine.output_port().len());
        if ports != (geometry.input_frame_bytes(), geometry.output_frame_bytes()) {
            return Err(CsoundError::InvalidGeometry(format!(
                "engine ports hold {} and {} bytes, geometry expects {} and {}",
                ports.0,
                ports.1,
                geometry.input_frame_bytes(),
                geometry.output_frame_bytes()
            )));
        }
        let remapper = ChannelRemapper::for_geometry(&geometry)?;
        Ok(Self {
            engine,
            adapter: StreamAdapter::with_capacity(2 * geometry.input_frame_bytes()),
            geometry,
            remapper,
            looping,
            eos_pending: false,
        })
    }

    pub fn geometry(&self) -> &BlockGeometry {
        &self.geometry
    }

    pub fn remapper(&self) -> &ChannelRemapper {
        &self.remapper
    }

    pub fn looping(&self) -> bool {
        self.looping
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    /// Input bytes waiting for a complete frame.
    pub fn buffered(&self) -> usize {
        self.adapter.available()
    }

    pub fn is_eos_pending(&self) -> bool {
        self.eos_pending
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn into_engine(self) -> E {
        self.engine
    }

    /// Output bytes the next [`transform`](Self::transform) writes for
    /// `input_len` new input bytes, taking buffered bytes into account.
    pub fn output_len_for(&self, input_len: usize) -> Result<usize> {
        let frame = self.geometry.input_frame_bytes();
        let consumable = (self.adapter.available() + input_len) / frame * frame;
        self.remapper.output_size(consumable)
    }

    /// Runs as many blocks as the buffered input and `output` allow.
    ///
    /// Engine output is written contiguously from the start of `output`.
    ///
    /// # Errors
    ///
    /// `NonIntegralFrameCount` when `input` is not a whole number of sample
    /// frames. The input is then dropped and nothing is buffered.
    pub fn transform(&mut self, input: &[u8], output: &mut [u8]) -> Result<TransformOutcome> {
        self.remapper.output_size(input.len())?;
        if self.eos_pending {
            trace!("score already ended, not processing {} bytes", input.len());
            return Ok(TransformOutcome::end_of_stream());
        }

        self.adapter.push(input);

        let in_frame = self.geometry.input_frame_bytes();
        let out_frame = self.geometry.output_frame_bytes();
        let mut cursor = 0;
        let mut blocks = 0;
        let mut status = TransformStatus::Continue;

        while cursor + out_frame <= output.len() {
            let window = match self.adapter.take_window(in_frame) {
                Ok(window) => window,
                Err(AdapterError::InsufficientData { .. }) => break,
                Err(err) => return Err(err.into()),
            };
            self.engine.input_port().copy_from_slice(window);
            let step = self.engine.run_block();
            output[cursor..cursor + out_frame].copy_from_slice(self.engine.output_port());
            cursor += out_frame;
            blocks += 1;
            self.adapter.flush(in_frame)?;

            if step.is_end() {
                if self.looping {
                    debug!("reached the end of the score, rewinding");
                    self.engine.rewind_score(0.0);
                } else {
                    debug!("reached the end of the score, end of stream after this buffer");
                    self.eos_pending = true;
                    status = TransformStatus::LastBuffer;
                    break;
                }
            }
        }

        trace!(
            blocks,
            written = cursor,
            buffered = self.adapter.available(),
            "transform done"
        );
        Ok(TransformOutcome {
            blocks,
            bytes_written: cursor,
            status,
        })
    }

    /// Restarts the score and clears a pending end of stream.
    pub fn rewind(&mut self) {
        self.engine.rewind_score(0.0);
        self.eos_pending = false;
    }

    /// Drops buffered input and resets the engine performance state.
    pub fn reset(&mut self) {
        self.adapter.clear();
        self.engine.reset();
        self.eos_pending = false;
    }
}
