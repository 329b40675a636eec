use parking_lot::Mutex;
use tracing::{debug, info};

use super::{abandon, log_geometry, open_for_element};
use crate::buffer::PipelineBuffer;
use crate::config::ElementConfig;
use crate::engine::{BlockEngine, BlockGeometry, EngineFactory};
use crate::error::{CsoundError, Result};
use crate::format::{FormatDispatch, SampleFormat};
use crate::transform::{BlockTransformEngine, TransformStatus};

/// Outcome of [`CsoundFilter::transform`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowStatus {
    /// The output buffer is valid and must be pushed downstream.
    Ok,
    Eos,
}

struct FilterSession<E: BlockEngine> {
    transform: BlockTransformEngine<E>,
    dispatch: FormatDispatch,
}

/// Audio filter running every input buffer through the engine.
pub struct CsoundFilter<E: BlockEngine> {
    name: String,
    session: Mutex<Option<FilterSession<E>>>,
}

impl<E: BlockEngine> CsoundFilter<E> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            session: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_started(&self) -> bool {
        self.session.lock().is_some()
    }

    pub fn start<F>(&self, config: &ElementConfig, factory: &F) -> Result<()>
    where
        F: EngineFactory<Engine = E>,
    {
        let mut session = self.session.lock();
        if session.is_some() {
            return Err(CsoundError::AlreadyStarted);
        }

        let opened = open_for_element(&self.name, config, factory)?;
        let geometry = opened.geometry;
        if geometry.input_channels == 0 || geometry.output_channels == 0 {
            abandon(opened.engine);
            return Err(CsoundError::InvalidGeometry(format!(
                "a filter needs input and output channels, engine has {} in and {} out",
                geometry.input_channels, geometry.output_channels
            )));
        }
        let transform =
            BlockTransformEngine::with_geometry(opened.engine, geometry, config.loop_score)?;
        log_geometry(&self.name, &geometry);

        *session = Some(FilterSession {
            transform,
            dispatch: opened.dispatch,
        });
        Ok(())
    }

    pub fn stop(&self) -> Result<()> {
        let session = self.session.lock().take().ok_or(CsoundError::NotStarted)?;
        let mut engine = session.transform.into_engine();
        engine.stop();
        info!(element = %self.name, "engine stopped");
        Ok(())
    }

    /// Allocates the output buffer for `input`.
    ///
    /// The input must hold whole sample frames. The buffer is sized for the
    /// blocks the next [`transform`](Self::transform) will run and carries the
    /// input timestamp and duration.
    pub fn prepare_output_buffer(&self, input: &PipelineBuffer) -> Result<PipelineBuffer> {
        let guard = self.session.lock();
        let session = guard.as_ref().ok_or(CsoundError::NotStarted)?;
        session.transform.remapper().output_size(input.len())?;
        let size = session.transform.output_len_for(input.len())?;
        let mut output = PipelineBuffer::allocate(size)?;
        output.copy_metadata_from(input);
        Ok(output)
    }

    /// Processes `input` into `output`, which is truncated to the bytes
    /// written.
    ///
    /// The buffer during which the score ended is returned with
    /// [`FlowStatus::Ok`]; the following calls return [`FlowStatus::Eos`]
    /// until [`rewind`](Self::rewind).
    pub fn transform(
        &self,
        input: &PipelineBuffer,
        output: &mut PipelineBuffer,
    ) -> Result<FlowStatus> {
        let mut guard = self.session.lock();
        let session = guard.as_mut().ok_or(CsoundError::NotStarted)?;
        let outcome = session
            .transform
            .transform(input.map_read(), output.map_write())?;
        output.set_size(outcome.bytes_written);
        match outcome.status {
            TransformStatus::Continue => Ok(FlowStatus::Ok),
            TransformStatus::LastBuffer => {
                debug!(element = %self.name, "delivering the last buffer of the score");
                Ok(FlowStatus::Ok)
            }
            TransformStatus::EndOfStream => Ok(FlowStatus::Eos),
        }
    }

    /// Restarts the score from its beginning.
    pub fn rewind(&self) -> Result<()> {
        let mut guard = self.session.lock();
        let session = guard.as_mut().ok_or(CsoundError::NotStarted)?;
        session.transform.rewind();
        debug!(element = %self.name, "score rewound");
        Ok(())
    }

    pub fn geometry(&self) -> Result<BlockGeometry> {
        let guard = self.session.lock();
        let session = guard.as_ref().ok_or(CsoundError::NotStarted)?;
        Ok(*session.transform.geometry())
    }

    /// Sample format bound at start.
    pub fn format(&self) -> Result<SampleFormat> {
        let guard = self.session.lock();
        let session = guard.as_ref().ok_or(CsoundError::NotStarted)?;
        Ok(session.dispatch.format())
    }

    /// Runs `f` with the engine, under the element lock.
    pub fn with_engine<R>(&self, f: impl FnOnce(&mut E) -> R) -> Result<R> {
        let mut guard = self.session.lock();
        let session = guard.as_mut().ok_or(CsoundError::NotStarted)?;
        Ok(f(session.transform.engine_mut()))
    }
}
