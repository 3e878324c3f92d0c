use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::types::{ChannelKind, PhysioError, Result};

/// Milliseconds in one day; logger timestamps wrap at midnight.
pub const MS_PER_DAY: i64 = 86_400_000;

/// Static settings for one log kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Time between consecutive samples (ms)
    pub sampling_period_ms: f64,
    /// Leading descriptor tokens preceding the samples
    pub header_items: usize,
    /// Number of sub-traces packed round-robin into the stream
    pub interleave: usize,
    /// Baseline subtracted from each sub-trace (one entry per sub-trace, or empty)
    pub offsets: Vec<i32>,
}

impl ChannelConfig {
    fn single(sampling_period_ms: f64) -> Self {
        ChannelConfig {
            sampling_period_ms,
            header_items: 4,
            interleave: 1,
            offsets: Vec::new(),
        }
    }

    /// Offset for one sub-trace, 0 when none is configured.
    pub fn offset(&self, index: usize) -> i32 {
        self.offsets.get(index).copied().unwrap_or(0)
    }
}

/// Marker values and field names of the logger's file format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatConfig {
    /// Raw sample value the logger writes at a trigger
    pub trigger_marker: i32,
    /// Token opening a metadata block
    pub block_start: i32,
    /// Token closing a metadata block
    pub block_stop: i32,
    /// Field name carrying the format version inside a metadata block
    pub version_field: String,
    /// Footer field carrying the start stamp
    pub start_time_field: String,
    /// Footer field carrying the stop stamp
    pub stop_time_field: String,
}

impl Default for FormatConfig {
    fn default() -> Self {
        FormatConfig {
            trigger_marker: 5000,
            block_start: 5002,
            block_stop: 6002,
            version_field: "LOGVERSION".to_string(),
            start_time_field: "LogStartMDHTime".to_string(),
            stop_time_field: "LogStopMDHTime".to_string(),
        }
    }
}

/// Limits applied when reconciling logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToleranceConfig {
    /// Largest accepted start-stamp difference between two logs (ms)
    pub max_clock_offset_ms: f64,
    /// Largest gap at the end of a trace that is zero-padded (ms)
    pub max_missing_tail_ms: f64,
    /// Allowed TR deviation, in sampling periods
    pub tr_tolerance_periods: f64,
}

impl Default for ToleranceConfig {
    fn default() -> Self {
        ToleranceConfig {
            max_clock_offset_ms: 3000.0,
            max_missing_tail_ms: 3000.0,
            tr_tolerance_periods: 2.0,
        }
    }
}

/// Complete configuration for one hardware/software generation.
///
/// Passed explicitly to every stage so synthetic fixtures can override any
/// constant.
///
/// # Examples
///
/// ```
/// use physio_sync::PhysioConfig;
///
/// let config = PhysioConfig::default();
/// assert_eq!(config.format.trigger_marker, 5000);
/// assert_eq!(config.trigger.sampling_period_ms, 2.5);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysioConfig {
    /// Value written for a pulse in pulse-train outputs
    pub pulse_value: i32,
    pub format: FormatConfig,
    pub tolerance: ToleranceConfig,
    pub trigger: ChannelConfig,
    pub respiration: ChannelConfig,
    pub pulse: ChannelConfig,
    pub cardiac: ChannelConfig,
}

impl Default for PhysioConfig {
    fn default() -> Self {
        PhysioConfig {
            pulse_value: 5000,
            format: FormatConfig::default(),
            tolerance: ToleranceConfig::default(),
            trigger: ChannelConfig::single(2.5),
            respiration: ChannelConfig::single(20.0),
            pulse: ChannelConfig::single(20.0),
            cardiac: ChannelConfig {
                sampling_period_ms: 2.5,
                header_items: 5,
                interleave: 4,
                offsets: vec![2048, 2048, 2048, 2048],
            },
        }
    }
}

impl PhysioConfig {
    /// Settings for one log kind.
    pub fn channel(&self, kind: ChannelKind) -> &ChannelConfig {
        match kind {
            ChannelKind::Trigger => &self.trigger,
            ChannelKind::Respiration => &self.respiration,
            ChannelKind::Pulse => &self.pulse,
            ChannelKind::Cardiac => &self.cardiac,
        }
    }

    /// Parses a TOML document; absent keys keep their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: PhysioConfig =
            toml::from_str(content).map_err(|e| PhysioError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration from a TOML file.
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PhysioError::MissingFile(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    fn validate(&self) -> Result<()> {
        for kind in [
            ChannelKind::Trigger,
            ChannelKind::Respiration,
            ChannelKind::Pulse,
            ChannelKind::Cardiac,
        ] {
            let channel = self.channel(kind);
            if !(channel.sampling_period_ms > 0.0) {
                return Err(PhysioError::Config(format!(
                    "{} sampling period must be positive",
                    kind
                )));
            }
            if channel.interleave == 0 {
                return Err(PhysioError::Config(format!(
                    "{} interleave factor must be at least 1",
                    kind
                )));
            }
        }
        if self.format.block_start == self.format.block_stop {
            return Err(PhysioError::Config(
                "metadata block start and stop markers must differ".to_string(),
            ));
        }
        Ok(())
    }
}
