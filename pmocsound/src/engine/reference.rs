//! Deterministic pure-Rust block engine.
//!
//! Its "program" is a small YAML document describing the block geometry, a
//! gain applied to the input and an optional generator. Output sample `i` of
//! a block only depends on input sample `i` of the same block and on the
//! score position, which makes block ordering observable from the outside.
//!
//! ```yaml
//! ksmps: 32
//! sr: 48000
//! nchnls: 2
//! nchnls_i: 2
//! 0dbfs: 1.0
//! sample_width: 8
//! gain: 0.5
//! score_blocks: 1500
//! generator:
//!   kind: sine
//!   frequency: 440.0
//!   amplitude: 0.25
//! ```

use std::f64::consts::TAU;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{BlockEngine, BlockStatus};
use crate::error::{CsoundError, Result};
use crate::format::EngineSample;
use crate::messages::{MessageKind, MessageSink};

fn default_gain() -> f64 {
    1.0
}

fn default_full_scale() -> f64 {
    1.0
}

fn default_sample_width() -> usize {
    8
}

/// Signal added to every output channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Generator {
    /// `amplitude × 0dbfs × sin(2π f t)`
    Sine { frequency: f64, amplitude: f64 },
    /// `step × n` where `n` is the score position in samples.
    Ramp { step: f64 },
    Constant { value: f64 },
}

impl Generator {
    fn value(&self, position: u64, sample_rate: u32, full_scale: f64) -> f64 {
        match *self {
            Generator::Sine {
                frequency,
                amplitude,
            } => {
                let t = position as f64 / sample_rate as f64;
                amplitude * full_scale * (TAU * frequency * t).sin()
            }
            Generator::Ramp { step } => step * position as f64,
            Generator::Constant { value } => value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceProgram {
    pub ksmps: usize,
    pub sr: u32,
    /// Output channels.
    pub nchnls: usize,
    /// Input channels.
    #[serde(default)]
    pub nchnls_i: usize,
    #[serde(rename = "0dbfs", default = "default_full_scale")]
    pub full_scale: f64,
    #[serde(default = "default_sample_width")]
    pub sample_width: usize,
    #[serde(default = "default_gain")]
    pub gain: f64,
    /// Length of the score in blocks; `None` plays forever.
    #[serde(default)]
    pub score_blocks: Option<u64>,
    #[serde(default)]
    pub generator: Option<Generator>,
}

impl ReferenceProgram {
    pub fn from_yaml_str(source: &str) -> std::result::Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(source)
    }

    pub fn to_yaml_string(&self) -> std::result::Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

#[derive(Debug)]
enum Ports {
    Empty,
    F32 { input: Vec<f32>, output: Vec<f32> },
    F64 { input: Vec<f64>, output: Vec<f64> },
}

impl Ports {
    fn allocate(program: &ReferenceProgram) -> Option<Self> {
        let input = program.ksmps * program.nchnls_i;
        let output = program.ksmps * program.nchnls;
        match program.sample_width {
            4 => Some(Ports::F32 {
                input: vec![0.0; input],
                output: vec![0.0; output],
            }),
            8 => Some(Ports::F64 {
                input: vec![0.0; input],
                output: vec![0.0; output],
            }),
            _ => None,
        }
    }

    fn clear(&mut self) {
        match self {
            Ports::Empty => {}
            Ports::F32 { input, output } => {
                input.fill(0.0);
                output.fill(0.0);
            }
            Ports::F64 { input, output } => {
                input.fill(0.0);
                output.fill(0.0);
            }
        }
    }
}

pub struct ReferenceEngine {
    messages: Arc<dyn MessageSink>,
    program: Option<ReferenceProgram>,
    location: Option<PathBuf>,
    ports: Ports,
    running: bool,
    // Score position in samples since the last rewind.
    position: u64,
    blocks_performed: u64,
}

impl std::fmt::Debug for ReferenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceEngine")
            .field("program", &self.program)
            .field("location", &self.location)
            .field("running", &self.running)
            .field("position", &self.position)
            .finish()
    }
}

impl ReferenceEngine {
    pub fn new(messages: Arc<dyn MessageSink>) -> Self {
        Self {
            messages,
            program: None,
            location: None,
            ports: Ports::Empty,
            running: false,
            position: 0,
            blocks_performed: 0,
        }
    }

    /// Factory usable by every element.
    pub fn factory() -> impl Fn(Arc<dyn MessageSink>) -> Result<ReferenceEngine> + Clone + Send + Sync
    {
        |messages| Ok(ReferenceEngine::new(messages))
    }

    /// Compiles an in-memory program, bypassing the file system.
    pub fn compile_program(&mut self, program: ReferenceProgram) -> Result<()> {
        let location = self
            .location
            .clone()
            .unwrap_or_else(|| PathBuf::from("<memory>"));
        let ports = Ports::allocate(&program).ok_or_else(|| {
            let reason = format!("unsupported sample width {}", program.sample_width);
            self.messages.engine_message(MessageKind::Error, &reason);
            CsoundError::CompileFailed {
                location: location.clone(),
                reason,
            }
        })?;
        self.messages.engine_message(
            MessageKind::Default,
            &format!(
                "compiled {}: ksmps={} sr={} nchnls={} nchnls_i={}",
                location.display(),
                program.ksmps,
                program.sr,
                program.nchnls,
                program.nchnls_i
            ),
        );
        self.ports = ports;
        self.program = Some(program);
        self.position = 0;
        self.blocks_performed = 0;
        Ok(())
    }

    pub fn program(&self) -> Option<&ReferenceProgram> {
        self.program.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Blocks performed since the last rewind.
    pub fn blocks_performed(&self) -> u64 {
        self.blocks_performed
    }

    fn render<S: EngineSample>(
        program: &ReferenceProgram,
        position: u64,
        input: &[S],
        output: &mut [S],
    ) {
        let nchnls_i = program.nchnls_i;
        if program.nchnls == 0 {
            return;
        }
        for (frame, out) in output.chunks_exact_mut(program.nchnls).enumerate() {
            let offset = program
                .generator
                .map(|g| g.value(position + frame as u64, program.sr, program.full_scale))
                .unwrap_or(0.0);
            for (channel, sample) in out.iter_mut().enumerate() {
                let dry = if nchnls_i > 0 {
                    input[frame * nchnls_i + channel % nchnls_i].to_f64()
                } else {
                    0.0
                };
                *sample = S::from_f64(program.gain * dry + offset);
            }
        }
    }
}

impl BlockEngine for ReferenceEngine {
    fn compile(&mut self, location: &Path) -> Result<()> {
        self.location = Some(location.to_path_buf());
        let fail = |reason: String| {
            self.messages.engine_message(MessageKind::Error, &reason);
            CsoundError::CompileFailed {
                location: location.to_path_buf(),
                reason,
            }
        };
        let source = fs::read_to_string(location).map_err(|e| fail(e.to_string()))?;
        let program = ReferenceProgram::from_yaml_str(&source).map_err(|e| fail(e.to_string()))?;
        self.compile_program(program)
    }

    fn start(&mut self) -> Result<()> {
        if self.program.is_none() {
            return Err(CsoundError::InvalidGeometry(
                "engine started before a program was compiled".into(),
            ));
        }
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn reset(&mut self) {
        self.ports.clear();
        self.position = 0;
        self.blocks_performed = 0;
    }

    fn block_size(&self) -> usize {
        self.program.as_ref().map_or(0, |p| p.ksmps)
    }

    fn sample_rate(&self) -> u32 {
        self.program.as_ref().map_or(0, |p| p.sr)
    }

    fn input_channels(&self) -> usize {
        self.program.as_ref().map_or(0, |p| p.nchnls_i)
    }

    fn output_channels(&self) -> usize {
        self.program.as_ref().map_or(0, |p| p.nchnls)
    }

    fn full_scale_level(&self) -> f64 {
        self.program.as_ref().map_or(1.0, |p| p.full_scale)
    }

    fn native_sample_width(&self) -> usize {
        self.program
            .as_ref()
            .map_or(default_sample_width(), |p| p.sample_width)
    }

    fn input_port(&mut self) -> &mut [u8] {
        match &mut self.ports {
            Ports::Empty => &mut [],
            Ports::F32 { input, .. } => bytemuck::cast_slice_mut(input.as_mut_slice()),
            Ports::F64 { input, .. } => bytemuck::cast_slice_mut(input.as_mut_slice()),
        }
    }

    fn output_port(&self) -> &[u8] {
        match &self.ports {
            Ports::Empty => &[],
            Ports::F32 { output, .. } => bytemuck::cast_slice(output.as_slice()),
            Ports::F64 { output, .. } => bytemuck::cast_slice(output.as_slice()),
        }
    }

    fn run_block(&mut self) -> BlockStatus {
        let Some(program) = self.program.as_ref() else {
            return BlockStatus::ReachedEnd;
        };
        match &mut self.ports {
            Ports::Empty => return BlockStatus::ReachedEnd,
            Ports::F32 { input, output } => {
                Self::render(program, self.position, input.as_slice(), output.as_mut_slice())
            }
            Ports::F64 { input, output } => {
                Self::render(program, self.position, input.as_slice(), output.as_mut_slice())
            }
        }
        self.position += program.ksmps as u64;
        self.blocks_performed += 1;

        match program.score_blocks {
            Some(length) if self.blocks_performed >= length => {
                if self.blocks_performed == length {
                    self.messages
                        .engine_message(MessageKind::Default, "Score finished");
                }
                BlockStatus::ReachedEnd
            }
            _ => BlockStatus::Continue,
        }
    }

    fn rewind_score(&mut self, offset_seconds: f64) {
        let Some(program) = self.program.as_ref() else {
            return;
        };
        let ksmps = program.ksmps.max(1) as u64;
        let offset = (offset_seconds.max(0.0) * program.sr as f64) as u64;
        self.blocks_performed = offset / ksmps;
        self.position = self.blocks_performed * ksmps;
    }
}
