//! # pmocsound
//!
//! Adapter between streaming audio pipelines and block-based synthesis
//! engines.
//!
//! Pipelines deliver and request buffers of arbitrary size, while an engine
//! only exchanges fixed blocks of `ksmps` sample frames per step. This crate
//! re-chunks the streams in both directions and keeps the timing exact.
//!
//! ## Features
//!
//! - **Push-style filtering**: [`CsoundFilter`] runs every input buffer
//!   through the engine, carrying partial blocks over to the next call
//! - **Pull-style generation**: [`CsoundSource`] produces chunks with
//!   sample-accurate, drift-free timestamps
//! - **Sink**: [`CsoundSink`] feeds pipeline audio to the engine input, one
//!   ring buffer segment per block
//! - **Engine agnostic**: any [`BlockEngine`] works; [`ReferenceEngine`] is a
//!   deterministic pure-Rust implementation
//!
//! ## Example: filter a buffer
//!
//! ```no_run
//! use pmocsound::{CsoundFilter, ElementConfig, FlowStatus, PipelineBuffer, ReferenceEngine};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let filter = CsoundFilter::<ReferenceEngine>::new("csoundfilter0");
//!     filter.start(&ElementConfig::new("gain.yaml"), &ReferenceEngine::factory())?;
//!
//!     let input = PipelineBuffer::from_vec(vec![0u8; 4096]);
//!     let mut output = filter.prepare_output_buffer(&input)?;
//!     if filter.transform(&input, &mut output)? == FlowStatus::Eos {
//!         println!("score finished");
//!     }
//!
//!     filter.stop()?;
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod buffer;
pub mod clock;
pub mod config;
pub mod elements;
pub mod engine;
pub mod error;
pub mod format;
pub mod messages;
pub mod remap;
pub mod transform;

pub use adapter::StreamAdapter;
pub use buffer::PipelineBuffer;
pub use clock::{ChunkPlan, ClockTime, ClockTimeDiff, LiveSourceClock, SECOND};
pub use config::ElementConfig;
pub use elements::{
    CsoundFilter, CsoundSink, CsoundSource, FillOutcome, FlowStatus, RingBufferSpec, SinkSpec,
};
pub use engine::{
    BlockEngine, BlockGeometry, BlockStatus, EngineFactory, ReferenceEngine, ReferenceProgram,
};
pub use error::{AdapterError, CsoundError, Result};
pub use format::{FormatDispatch, SampleFormat};
pub use messages::{MessageKind, MessageSink, Severity, TracingMessageSink};
pub use remap::{compute_output_size, ChannelRemapper};
pub use transform::{BlockTransformEngine, TransformOutcome, TransformStatus};
