use ndarray::Array1;
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Pulse train decoded from a trigger log.
///
/// One entry per trigger-channel sample, each either `0` or the configured
/// pulse output value.
pub type PulseTrain = Array1<i32>;

/// Value trace of one physiological channel, trigger markers removed.
pub type Trace = Array1<i32>;

/// One parsed raw log file.
///
/// Created once per input file and never modified afterwards.
#[derive(Debug, Clone)]
pub struct RawLog {
    /// Format version read from the `LOGVERSION` metadata block (0 if absent)
    pub format_version: i32,
    /// Logger start time in ms since local midnight
    pub start_time_ms: u32,
    /// Logger stop time in ms since local midnight, if the footer carries one
    pub stop_time_ms: Option<u32>,
    /// Sample stream with metadata blocks and descriptor tokens removed
    pub samples: Array1<i32>,
}

impl RawLog {
    /// Returns the number of samples in the stream.
    pub fn num_samples(&self) -> usize {
        self.samples.len()
    }

    /// Returns the wall-clock span between start and stop stamps in ms,
    /// corrected for a recording that crosses midnight.
    pub fn logged_span_ms(&self) -> Option<u32> {
        self.stop_time_ms.map(|stop| {
            if stop >= self.start_time_ms {
                stop - self.start_time_ms
            } else {
                stop + crate::config::MS_PER_DAY as u32 - self.start_time_ms
            }
        })
    }
}

/// Occurrence count of each interior inter-pulse gap length (in samples).
///
/// The first and last segments of a pulse train are partial and never enter
/// the histogram.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntervalHistogram {
    counts: BTreeMap<usize, usize>,
}

impl IntervalHistogram {
    /// Builds a histogram from a list of gap lengths.
    pub fn from_lengths<I: IntoIterator<Item = usize>>(lengths: I) -> Self {
        let mut counts = BTreeMap::new();
        for len in lengths {
            *counts.entry(len).or_insert(0) += 1;
        }
        IntervalHistogram { counts }
    }

    /// Total number of gaps recorded.
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Occurrence count for one gap length.
    pub fn count(&self, length: usize) -> usize {
        self.counts.get(&length).copied().unwrap_or(0)
    }

    /// Most frequent gap length. On equal counts the smallest length wins.
    pub fn mode(&self) -> Option<usize> {
        let mut best: Option<(usize, usize)> = None;
        for (&len, &count) in &self.counts {
            match best {
                Some((_, best_count)) if count <= best_count => {}
                _ => best = Some((len, count)),
            }
        }
        best.map(|(len, _)| len)
    }

    pub fn min(&self) -> Option<usize> {
        self.counts.keys().next().copied()
    }

    pub fn max(&self) -> Option<usize> {
        self.counts.keys().next_back().copied()
    }
}

/// Absolute time span of one run.
///
/// Offsets are in ms relative to the trigger log's own start time.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanWindow {
    /// Start of the run (ms after the trigger log started)
    pub start_offset_ms: f64,
    /// End of the run, exclusive (ms after the trigger log started)
    pub end_offset_ms: f64,
    /// Dominant repetition interval (ms); `None` in trust-start-time mode
    pub repetition_ms: Option<f64>,
    /// Number of triggers the window was estimated from
    pub interval_count: usize,
}

impl ScanWindow {
    /// Returns the duration of the window in seconds.
    pub fn duration(&self) -> f64 {
        (self.end_offset_ms - self.start_offset_ms) / 1000.0
    }
}

/// The physiological log kinds written by the logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// External trigger log (scanner pulses)
    Trigger,
    /// Respiration belt
    Respiration,
    /// Pulse oximeter
    Pulse,
    /// Cardiac electrical activity (interleaved leads)
    Cardiac,
}

impl ChannelKind {
    /// File extension the logger uses for this kind.
    pub fn extension(&self) -> &'static str {
        match self {
            ChannelKind::Trigger => "ext",
            ChannelKind::Respiration => "resp",
            ChannelKind::Pulse => "puls",
            ChannelKind::Cardiac => "ecg",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// Which triggers take part in window estimation.
///
/// Applied in field order: skip first, skip last, keep first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerPolicy {
    /// Number of leading triggers to discard
    pub skip_first: usize,
    /// Number of trailing triggers to discard
    pub skip_last: usize,
    /// Keep only this many triggers (counted after skipping)
    pub keep_first: Option<usize>,
}

/// Settings for scan window estimation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowOptions {
    /// Trigger skip/keep policy
    pub policy: TriggerPolicy,
    /// Reject trigger trains whose interval spread exceeds the tolerance
    pub check_consistency: bool,
    /// Clamp the window end to `interval_count` repetitions after its start
    pub truncate_to_tr: bool,
    /// Ignore trigger pulses and use the whole trigger log span
    pub trust_start_time: bool,
}

impl Default for WindowOptions {
    fn default() -> Self {
        WindowOptions {
            policy: TriggerPolicy::default(),
            check_consistency: true,
            truncate_to_tr: false,
            trust_start_time: false,
        }
    }
}

/// How the pulse log is emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PulseOutput {
    /// The pulse log's own trigger markers as a pulse train
    #[default]
    Triggered,
    /// The raw oximeter values
    Raw,
}

/// Options for a complete extraction run.
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    pub window: WindowOptions,
    /// Also emit the trigger log's pulse train
    pub emit_trigger: bool,
    pub pulse_output: PulseOutput,
    /// Replace outputs that already exist
    pub overwrite: bool,
}

/// One aligned sequence ready to be written.
#[derive(Debug, Clone)]
pub struct AlignedOutput {
    /// Output name suffix (e.g. "resp", "ecg2")
    pub name: String,
    /// Samples covering exactly the scan window
    pub trace: Trace,
}

/// Errors raised while extracting a run.
///
/// Every variant is fatal; the only recoverable condition (a trace ending
/// slightly early) is reported as a warning instead.
#[derive(Error, Debug)]
pub enum PhysioError {
    /// A required input log does not exist
    #[error("missing input file: {}", .0.display())]
    MissingFile(PathBuf),
    /// The log could not be read or is missing mandatory fields
    #[error("malformed log {source_name}: {reason}")]
    MalformedLog { source_name: String, reason: String },
    /// No trigger pulses left to estimate the window from
    #[error("no trigger pulses found in trigger log")]
    NoTriggersFound,
    /// Too few trigger pulses for the requested operation
    #[error("insufficient triggers: {required} required, {found} available")]
    InsufficientTriggers { required: usize, found: usize },
    /// Start stamps of two logs disagree beyond tolerance
    #[error("{channel} log start differs from trigger log by {offset_ms} ms (limit {limit_ms} ms)")]
    ClockMismatch {
        channel: String,
        offset_ms: f64,
        limit_ms: f64,
    },
    /// Trigger intervals vary beyond tolerance
    #[error("inconsistent TR: dominant {tr_ms} ms, observed range {min_ms}..{max_ms} ms")]
    InconsistentTR { tr_ms: f64, min_ms: f64, max_ms: f64 },
    /// A channel does not cover the scan window
    #[error("{channel} data too short: {missing_ms} ms of the scan window not covered")]
    DataTooShort { channel: String, missing_ms: f64 },
    /// Output destination exists and overwriting was not requested
    #[error("output file already exists: {}", .0.display())]
    OutputExists(PathBuf),
    /// Configuration could not be loaded
    #[error("invalid configuration: {0}")]
    Config(String),
    /// An I/O error occurred while writing outputs
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl PhysioError {
    /// Attaches a channel name to channel-scoped errors.
    pub fn for_channel(self, name: &str) -> Self {
        match self {
            PhysioError::ClockMismatch {
                offset_ms,
                limit_ms,
                ..
            } => PhysioError::ClockMismatch {
                channel: name.to_string(),
                offset_ms,
                limit_ms,
            },
            PhysioError::DataTooShort { missing_ms, .. } => PhysioError::DataTooShort {
                channel: name.to_string(),
                missing_ms,
            },
            other => other,
        }
    }
}

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, PhysioError>;
