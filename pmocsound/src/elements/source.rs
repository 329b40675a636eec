use parking_lot::Mutex;
use tracing::{debug, info, trace};

use super::{abandon, log_geometry, open_for_element};
use crate::adapter::StreamAdapter;
use crate::buffer::PipelineBuffer;
use crate::clock::{ClockTime, LiveSourceClock};
use crate::config::ElementConfig;
use crate::engine::{BlockEngine, BlockGeometry, EngineFactory};
use crate::error::{CsoundError, Result};
use crate::format::FormatDispatch;

#[derive(Debug)]
pub enum FillOutcome {
    Buffer(PipelineBuffer),
    Eos,
}

impl FillOutcome {
    pub fn into_buffer(self) -> Option<PipelineBuffer> {
        match self {
            FillOutcome::Buffer(buffer) => Some(buffer),
            FillOutcome::Eos => None,
        }
    }

    pub fn is_eos(&self) -> bool {
        matches!(self, FillOutcome::Eos)
    }
}

struct SourceSession<E: BlockEngine> {
    engine: E,
    geometry: BlockGeometry,
    dispatch: FormatDispatch,
    clock: LiveSourceClock,
    // Engine output not yet handed out.
    pending: StreamAdapter,
    looping: bool,
    live: bool,
    eos_pending: bool,
}

impl<E: BlockEngine> SourceSession<E> {
    fn fill(&mut self, element: &str, requested_len: Option<usize>) -> Result<FillOutcome> {
        if self.eos_pending && self.pending.is_empty() {
            return Ok(FillOutcome::Eos);
        }

        let bpf = self.geometry.output_bytes_per_sample_frame();
        // Requests smaller than one sample frame fall back to the default
        // chunk size.
        let requested = requested_len
            .map(|len| (len / bpf) as u64)
            .filter(|&samples| samples > 0);
        let mut plan = self.clock.next_chunk(requested);
        let size = chunk_bytes(plan.samples, bpf)?;
        let mut buffer = PipelineBuffer::allocate(size)?;

        while self.pending.available() < size && !self.eos_pending {
            let step = self.engine.run_block();
            self.pending.push(self.engine.output_port());
            if step.is_end() {
                if self.looping {
                    debug!(element, "reached the end of the score, rewinding");
                    self.engine.rewind_score(0.0);
                } else {
                    debug!(element, "reached the end of the score, end of stream after this buffer");
                    self.eos_pending = true;
                    break;
                }
            }
        }

        // The score ended before the chunk was complete: deliver what it
        // produced. No block runs past the end.
        if self.pending.available() < size {
            let samples = (self.pending.available() / bpf) as u64;
            plan = self.clock.next_chunk(Some(samples));
            buffer.set_size(samples as usize * bpf);
        }

        self.pending.copy_to(buffer.map_write())?;
        self.dispatch
            .scale_in_place(buffer.map_write(), 1.0 / self.geometry.full_scale);
        buffer.set_timestamp(Some(plan.timestamp));
        buffer.set_duration(Some(plan.duration));
        self.clock.commit(&plan);

        trace!(
            element,
            samples = plan.samples,
            timestamp = plan.timestamp,
            duration = plan.duration,
            "produced buffer"
        );
        Ok(FillOutcome::Buffer(buffer))
    }
}

fn chunk_bytes(samples: u64, bpf: usize) -> Result<usize> {
    usize::try_from(samples)
        .ok()
        .and_then(|samples| samples.checked_mul(bpf))
        .ok_or(CsoundError::AllocationFailed { size: usize::MAX })
}

/// Source generating audio from a score, without any input.
pub struct CsoundSource<E: BlockEngine> {
    name: String,
    session: Mutex<Option<SourceSession<E>>>,
}

impl<E: BlockEngine> CsoundSource<E> {
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
        if geometry.output_channels == 0 {
            abandon(opened.engine);
            return Err(CsoundError::InvalidGeometry(
                "a source needs at least one output channel".into(),
            ));
        }
        log_geometry(&self.name, &geometry);

        *session = Some(SourceSession {
            engine: opened.engine,
            geometry,
            dispatch: opened.dispatch,
            clock: LiveSourceClock::new(
                geometry.sample_rate,
                config.samples_per_buffer,
                config.timestamp_offset,
            ),
            pending: StreamAdapter::with_capacity(2 * geometry.output_frame_bytes()),
            looping: config.loop_score,
            live: config.is_live,
            eos_pending: false,
        });
        Ok(())
    }

    pub fn stop(&self) -> Result<()> {
        let mut session = self.session.lock().take().ok_or(CsoundError::NotStarted)?;
        session.engine.stop();
        info!(element = %self.name, "engine stopped");
        Ok(())
    }

    /// Produces the next chunk.
    ///
    /// `requested_len` is a byte count, rounded down to whole sample frames.
    /// Without it the configured `samples_per_buffer` is used.
    pub fn fill(&self, requested_len: Option<usize>) -> Result<FillOutcome> {
        let mut guard = self.session.lock();
        let session = guard.as_mut().ok_or(CsoundError::NotStarted)?;
        session.fill(&self.name, requested_len)
    }

    /// Start and end time of a buffer, for live sources only.
    pub fn times(&self, buffer: &PipelineBuffer) -> Option<(ClockTime, ClockTime)> {
        let live = self.session.lock().as_ref().is_some_and(|s| s.live);
        if !live {
            return None;
        }
        let start = buffer.timestamp()?;
        Some((start, start + buffer.duration().unwrap_or(0)))
    }

    pub fn is_live(&self) -> bool {
        self.session.lock().as_ref().is_some_and(|s| s.live)
    }

    pub fn is_seekable(&self) -> bool {
        false
    }

    /// Index of the next sample to be produced.
    pub fn position(&self) -> Result<u64> {
        let guard = self.session.lock();
        let session = guard.as_ref().ok_or(CsoundError::NotStarted)?;
        Ok(session.clock.position())
    }

    pub fn geometry(&self) -> Result<BlockGeometry> {
        let guard = self.session.lock();
        let session = guard.as_ref().ok_or(CsoundError::NotStarted)?;
        Ok(session.geometry)
    }

    pub fn with_engine<R>(&self, f: impl FnOnce(&mut E) -> R) -> Result<R> {
        let mut guard = self.session.lock();
        let session = guard.as_mut().ok_or(CsoundError::NotStarted)?;
        Ok(f(&mut session.engine))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_bytes() {
        assert_eq!(chunk_bytes(1024, 16).unwrap(), 16_384);
        assert!(matches!(
            chunk_bytes(u64::MAX / 4, 16),
            Err(CsoundError::AllocationFailed { size: usize::MAX })
        ));
    }
}
