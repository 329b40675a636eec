//! Element settings.
//!
//! Settings are read from YAML. Keys are case-insensitive and every field can
//! be overridden from the environment with the `PMOCSOUND__` prefix, for
//! example `PMOCSOUND__LOOP=true` or `PMOCSOUND__SAMPLES_PER_BUFFER=512`.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use tracing::{debug, info};

use crate::clock::{ClockTimeDiff, DEFAULT_SAMPLES_PER_BUFFER, MAX_SAMPLES_PER_BUFFER};
use crate::error::CsoundError;
use crate::format::SampleFormat;

const ENV_PREFIX: &str = "PMOCSOUND__";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElementConfig {
    /// Program compiled by the engine when the element starts.
    pub location: Option<PathBuf>,
    /// Restart the score when it ends instead of ending the stream.
    #[serde(rename = "loop")]
    pub loop_score: bool,
    pub is_live: bool,
    /// Added to every timestamp produced by the source, in nanoseconds.
    pub timestamp_offset: ClockTimeDiff,
    pub samples_per_buffer: u64,
    /// Format negotiated by the pipeline. `None` accepts the engine format.
    pub format: Option<SampleFormat>,
}

impl Default for ElementConfig {
    fn default() -> Self {
        Self {
            location: None,
            loop_score: false,
            is_live: false,
            timestamp_offset: 0,
            samples_per_buffer: DEFAULT_SAMPLES_PER_BUFFER,
            format: None,
        }
    }
}

impl ElementConfig {
    pub fn new(location: impl Into<PathBuf>) -> Self {
        Self {
            location: Some(location.into()),
            ..Self::default()
        }
    }

    pub fn from_yaml_str(source: &str) -> Result<Self> {
        let value: Value = serde_yaml::from_str(source).context("invalid element config YAML")?;
        Self::from_value(lower_keys(value))
    }

    /// Reads a config file, then applies the `PMOCSOUND__` environment
    /// overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = fs::read_to_string(path)
            .with_context(|| format!("could not read config file {}", path.display()))?;
        let config = Self::from_yaml_str(&source)
            .with_context(|| format!("could not parse config file {}", path.display()))?
            .with_overrides(env::vars())?;
        info!(config_file = %path.display(), "Loaded element config");
        Ok(config)
    }

    /// Applies overrides given as `(PMOCSOUND__KEY, value)` pairs. Variables
    /// without the prefix are ignored; values are parsed as YAML scalars.
    pub fn with_overrides<I, K, V>(self, vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut value = serde_yaml::to_value(&self).context("could not serialize element config")?;
        let Value::Mapping(map) = &mut value else {
            return Ok(self);
        };
        for (key, raw) in vars {
            let Some(field) = key.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let field = field.to_lowercase();
            debug!(key = %field, "Applying config override from environment");
            map.insert(Value::String(field), convert_env_value(raw.as_ref()));
        }
        Self::from_value(value).context("invalid config override")
    }

    /// Checks the settings needed to start an element.
    pub fn validate(&self) -> crate::Result<()> {
        self.location()?;
        if !(1..=MAX_SAMPLES_PER_BUFFER).contains(&self.samples_per_buffer) {
            return Err(CsoundError::InvalidConfig(format!(
                "samples_per_buffer must be between 1 and {MAX_SAMPLES_PER_BUFFER}, got {}",
                self.samples_per_buffer
            )));
        }
        Ok(())
    }

    pub fn location(&self) -> crate::Result<&Path> {
        match self.location.as_deref() {
            Some(path) if !path.as_os_str().is_empty() => Ok(path),
            _ => Err(CsoundError::InvalidConfig("no program location set".into())),
        }
    }

    fn from_value(value: Value) -> Result<Self> {
        Ok(serde_yaml::from_value(value)?)
    }
}

fn convert_env_value(value: &str) -> Value {
    serde_yaml::from_str::<Value>(value).unwrap_or_else(|_| Value::String(value.to_string()))
}

fn lower_keys(value: Value) -> Value {
    match value {
        Value::Mapping(map) => {
            let mut lowered = Mapping::new();
            for (key, value) in map {
                let key = match key {
                    Value::String(s) => Value::String(s.to_lowercase()),
                    other => other,
                };
                lowered.insert(key, value);
            }
            Value::Mapping(lowered)
        }
        other => other,
    }
}
