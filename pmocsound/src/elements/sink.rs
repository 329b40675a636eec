use parking_lot::Mutex;
use tracing::{debug, info, trace};

use super::{abandon, log_geometry, open_for_element};
use crate::adapter::StreamAdapter;
use crate::clock::scale_u64;
use crate::config::ElementConfig;
use crate::engine::{BlockEngine, BlockGeometry, EngineFactory};
use crate::error::{AdapterError, CsoundError, Result};

/// Ring buffer request from the audio backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SinkSpec {
    pub rate: u32,
    pub buffer_time_us: u64,
}

/// Ring buffer layout matching one engine block per segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RingBufferSpec {
    /// Bytes per segment: one engine input block.
    pub segsize: usize,
    pub latency_time_us: u64,
    pub segtotal: u64,
}

struct SinkSession<E: BlockEngine> {
    engine: E,
    geometry: BlockGeometry,
    spec: RingBufferSpec,
    adapter: StreamAdapter,
}

/// Sink feeding pipeline audio to the engine input.
pub struct CsoundSink<E: BlockEngine> {
    name: String,
    session: Mutex<Option<SinkSession<E>>>,
}

impl<E: BlockEngine> CsoundSink<E> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            session: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_prepared(&self) -> bool {
        self.session.lock().is_some()
    }

    /// Starts the engine and sizes the ring buffer after its block.
    pub fn prepare<F>(
        &self,
        config: &ElementConfig,
        factory: &F,
        spec: SinkSpec,
    ) -> Result<RingBufferSpec>
    where
        F: EngineFactory<Engine = E>,
    {
        let mut session = self.session.lock();
        if session.is_some() {
            return Err(CsoundError::AlreadyStarted);
        }
        if spec.rate == 0 {
            return Err(CsoundError::InvalidConfig("sink rate must not be 0".into()));
        }

        let opened = open_for_element(&self.name, config, factory)?;
        let geometry = opened.geometry;
        let ring = match ring_buffer_spec(&geometry, spec) {
            Ok(ring) => ring,
            Err(err) => {
                abandon(opened.engine);
                return Err(err);
            }
        };
        log_geometry(&self.name, &geometry);
        info!(
            element = %self.name,
            segsize = ring.segsize,
            latency_time_us = ring.latency_time_us,
            segtotal = ring.segtotal,
            "ring buffer prepared"
        );

        *session = Some(SinkSession {
            engine: opened.engine,
            geometry,
            spec: ring,
            adapter: StreamAdapter::with_capacity(2 * ring.segsize),
        });
        Ok(ring)
    }

    /// Consumes `data`, running one block per complete segment. Incomplete
    /// segments wait for the next write.
    pub fn write(&self, data: &[u8]) -> Result<usize> {
        let mut guard = self.session.lock();
        let session = guard.as_mut().ok_or(CsoundError::NotStarted)?;
        let segsize = session.spec.segsize;
        session.adapter.push(data);

        loop {
            let window = match session.adapter.take_window(segsize) {
                Ok(window) => window,
                Err(AdapterError::InsufficientData { .. }) => break,
                Err(err) => return Err(err.into()),
            };
            session.engine.input_port().copy_from_slice(window);
            let step = session.engine.run_block();
            session.adapter.flush(segsize)?;
            if step.is_end() {
                debug!(element = %self.name, "score finished while writing");
                return Err(CsoundError::ScoreFinished);
            }
        }

        trace!(
            element = %self.name,
            written = data.len(),
            buffered = session.adapter.available(),
            "write done"
        );
        Ok(data.len())
    }

    /// Frames queued in the device; the engine plays synchronously.
    pub fn delay(&self) -> u32 {
        0
    }

    /// Drops buffered bytes and resets the engine performance.
    pub fn reset(&self) -> Result<()> {
        let mut guard = self.session.lock();
        let session = guard.as_mut().ok_or(CsoundError::NotStarted)?;
        session.adapter.clear();
        session.engine.reset();
        debug!(element = %self.name, "sink reset");
        Ok(())
    }

    pub fn close(&self) -> Result<()> {
        let mut session = self.session.lock().take().ok_or(CsoundError::NotStarted)?;
        session.engine.stop();
        info!(element = %self.name, "engine stopped");
        Ok(())
    }

    pub fn ring_buffer_spec(&self) -> Result<RingBufferSpec> {
        let guard = self.session.lock();
        let session = guard.as_ref().ok_or(CsoundError::NotStarted)?;
        Ok(session.spec)
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

fn ring_buffer_spec(geometry: &BlockGeometry, spec: SinkSpec) -> Result<RingBufferSpec> {
    let bpf = geometry.format.width() * geometry.input_channels;
    if bpf == 0 {
        return Err(CsoundError::InvalidGeometry(
            "a sink needs at least one input channel".into(),
        ));
    }
    let segsize = geometry.input_frame_bytes();
    let latency_time_us = scale_u64(segsize as u64, 1_000_000, spec.rate as u64 * bpf as u64);
    if latency_time_us == 0 {
        return Err(CsoundError::InvalidGeometry(format!(
            "a block of {} samples lasts less than 1us at {} Hz",
            geometry.block_size, spec.rate
        )));
    }
    Ok(RingBufferSpec {
        segsize,
        latency_time_us,
        segtotal: spec.buffer_time_us / latency_time_us,
    })
}
