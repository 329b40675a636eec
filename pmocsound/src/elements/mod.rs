//! Pipeline elements built on the block engine.
//!
//! - [`CsoundFilter`]: push-style transform, one buffer in, one buffer out.
//! - [`CsoundSource`]: pull-style generator with sample-accurate timestamps.
//! - [`CsoundSink`]: consumer feeding the engine input one segment at a time.
//!
//! Each element owns at most one running session, created by `start` (or
//! `prepare` for the sink) and destroyed by `stop` (`close`). The session is
//! kept behind a `parking_lot::Mutex`, so control calls made from another
//! thread are serialized with block processing.

mod filter;
mod sink;
mod source;

pub use filter::{CsoundFilter, FlowStatus};
pub use sink::{CsoundSink, RingBufferSpec, SinkSpec};
pub use source::{CsoundSource, FillOutcome};

use std::sync::Arc;

use crate::config::ElementConfig;
use crate::engine::{open_engine, BlockEngine, BlockGeometry, EngineFactory};
use crate::error::Result;
use crate::format::FormatDispatch;
use crate::messages::{MessageSink, TracingMessageSink};

/// Engine session shared by every element kind while it starts.
pub(crate) struct OpenedEngine<E> {
    pub engine: E,
    pub geometry: BlockGeometry,
    pub dispatch: FormatDispatch,
}

/// Validates `config`, then creates, compiles and starts an engine whose
/// sample format agrees with the negotiated one.
pub(crate) fn open_for_element<F>(
    element: &str,
    config: &ElementConfig,
    factory: &F,
) -> Result<OpenedEngine<F::Engine>>
where
    F: EngineFactory,
{
    config.validate()?;
    let location = config.location()?;
    let messages: Arc<dyn MessageSink> = Arc::new(TracingMessageSink::new(element));
    let (mut engine, geometry) = open_engine(factory, messages, location)?;
    match FormatDispatch::negotiate(geometry.format.width(), config.format) {
        Ok(dispatch) => Ok(OpenedEngine {
            engine,
            geometry,
            dispatch,
        }),
        Err(err) => {
            engine.stop();
            Err(err)
        }
    }
}

pub(crate) fn log_geometry(element: &str, geometry: &BlockGeometry) {
    tracing::info!(
        element,
        ksmps = geometry.block_size,
        sr = geometry.sample_rate,
        nchnls = geometry.output_channels,
        nchnls_i = geometry.input_channels,
        format = %geometry.format,
        "engine started"
    );
}

/// Stops the engine of a session that failed after `open_for_element`.
pub(crate) fn abandon<E: BlockEngine>(mut engine: E) {
    engine.stop();
}
