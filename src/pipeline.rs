//! Two-phase extraction: every aligned output is computed before any file is
//! written, so a failing channel never leaves a partial set of outputs.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::{ChannelConfig, PhysioConfig};
use crate::types::*;
use crate::{align, codec, reader, window, writer};

/// Paths of the logs recorded during one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSet {
    /// Primary trigger log
    pub trigger: PathBuf,
    /// Alternate trigger log, used when the primary holds no pulses
    pub alternate_trigger: Option<PathBuf>,
    pub respiration: PathBuf,
    pub pulse: PathBuf,
    /// Cardiac log, if one was recorded
    pub cardiac: Option<PathBuf>,
}

impl LogSet {
    /// Locates the logs sharing a filename prefix.
    ///
    /// Trigger, respiration and pulse logs are always expected; the alternate
    /// trigger log (`.ext2`) and the cardiac log are included only if present.
    pub fn from_prefix<P: AsRef<Path>>(prefix: P) -> Self {
        let prefix = prefix.as_ref();
        let existing = |path: PathBuf| if path.exists() { Some(path) } else { None };

        LogSet {
            trigger: with_extension(prefix, ChannelKind::Trigger.extension()),
            alternate_trigger: existing(with_extension(prefix, "ext2")),
            respiration: with_extension(prefix, ChannelKind::Respiration.extension()),
            pulse: with_extension(prefix, ChannelKind::Pulse.extension()),
            cardiac: existing(with_extension(prefix, ChannelKind::Cardiac.extension())),
        }
    }

    /// Names of the outputs a run over this set will produce.
    pub fn planned_outputs(&self, options: &ExtractOptions, config: &PhysioConfig) -> Vec<String> {
        let mut names = Vec::new();
        if options.emit_trigger {
            names.push(ChannelKind::Trigger.to_string());
        }
        names.push(ChannelKind::Respiration.to_string());
        names.push(ChannelKind::Pulse.to_string());
        if self.cardiac.is_some() {
            names.extend(lead_names(config));
        }
        names
    }
}

// Helper function to append a log extension to a prefix
fn with_extension(prefix: &Path, extension: &str) -> PathBuf {
    let mut path: OsString = prefix.as_os_str().to_owned();
    path.push(".");
    path.push(extension);
    PathBuf::from(path)
}

fn lead_names(config: &PhysioConfig) -> Vec<String> {
    (1..=config.cardiac.interleave)
        .map(|i| format!("{}{}", ChannelKind::Cardiac, i))
        .collect()
}

/// Computes every aligned output of a session without touching the
/// filesystem beyond reading the logs.
///
/// # Arguments
///
/// * `logs` - Input log paths
/// * `options` - Trigger policy, window and output settings
/// * `config` - Format constants and tolerances
///
/// # Returns
///
/// The aligned outputs in write order, or the first fatal error.
pub fn compute(
    logs: &LogSet,
    options: &ExtractOptions,
    config: &PhysioConfig,
) -> Result<Vec<AlignedOutput>> {
    let (reference, train) = read_trigger(logs, options, config)?;
    let prepared = window::prepare(&train, &options.window, config)?;
    let scan = window::compute_window(
        &prepared,
        config.trigger.sampling_period_ms,
        &options.window,
        config,
    )?;

    let mut outputs = Vec::new();

    if options.emit_trigger {
        let name = ChannelKind::Trigger.to_string();
        let trace = align::align(
            &prepared,
            scan.start_offset_ms,
            scan.end_offset_ms,
            config.trigger.sampling_period_ms,
            config,
        )
        .map_err(|e| e.for_channel(&name))?;
        outputs.push(AlignedOutput { name, trace });
    }

    let resp = reader::parse(&logs.respiration, config.respiration.header_items, config)?;
    let trace = codec::to_trace(&resp.samples, config);
    outputs.push(align_channel(
        ChannelKind::Respiration.to_string(),
        &trace,
        &resp,
        &reference,
        &scan,
        &config.respiration,
        config,
    )?);

    let puls = reader::parse(&logs.pulse, config.pulse.header_items, config)?;
    let trace = match options.pulse_output {
        PulseOutput::Raw => codec::to_trace(&puls.samples, config),
        PulseOutput::Triggered => codec::to_pulses(&puls.samples, config),
    };
    outputs.push(align_channel(
        ChannelKind::Pulse.to_string(),
        &trace,
        &puls,
        &reference,
        &scan,
        &config.pulse,
        config,
    )?);

    match &logs.cardiac {
        Some(path) => {
            let ecg = reader::parse(path, config.cardiac.header_items, config)?;
            let trace = codec::to_trace(&ecg.samples, config);
            let leads = codec::split_subtraces(&trace, &config.cardiac);
            for (name, lead) in lead_names(config).into_iter().zip(leads.iter()) {
                outputs.push(align_channel(
                    name,
                    lead,
                    &ecg,
                    &reference,
                    &scan,
                    &config.cardiac,
                    config,
                )?);
            }
        }
        None => info!("no cardiac log found, skipping"),
    }

    Ok(outputs)
}

// Helper function to read the trigger log, falling back to the alternate
// log when the primary holds no pulses
fn read_trigger(
    logs: &LogSet,
    options: &ExtractOptions,
    config: &PhysioConfig,
) -> Result<(RawLog, PulseTrain)> {
    let header_items = config.trigger.header_items;
    let primary = reader::parse(&logs.trigger, header_items, config)?;
    let train = codec::to_pulses(&primary.samples, config);

    if let Some(span) = primary.logged_span_ms() {
        debug!(span_ms = span, "trigger log span");
    }

    if options.window.trust_start_time || codec::has_pulses(&train, config) {
        return Ok((primary, train));
    }

    match &logs.alternate_trigger {
        Some(path) => {
            info!(
                path = %path.display(),
                "primary trigger log has no pulses, using alternate"
            );
            let alternate = reader::parse(path, header_items, config)?;
            let train = codec::to_pulses(&alternate.samples, config);
            Ok((alternate, train))
        }
        None => Ok((primary, train)),
    }
}

// Helper function to shift the window into a channel's time frame and cut it
fn align_channel(
    name: String,
    trace: &Trace,
    log: &RawLog,
    reference: &RawLog,
    scan: &ScanWindow,
    channel: &ChannelConfig,
    config: &PhysioConfig,
) -> Result<AlignedOutput> {
    let offset_ms = align::clock_offset(log.start_time_ms, reference.start_time_ms, config)
        .map_err(|e| e.for_channel(&name))?;
    let trace = align::align(
        trace,
        scan.start_offset_ms - offset_ms,
        scan.end_offset_ms - offset_ms,
        channel.sampling_period_ms,
        config,
    )
    .map_err(|e| e.for_channel(&name))?;

    debug!(
        channel = %name,
        offset_ms,
        samples = trace.len(),
        "aligned channel"
    );
    Ok(AlignedOutput { name, trace })
}

/// Writes computed outputs as `<prefix>_<name>.1D`.
///
/// All destinations are checked before the first file is written.
pub fn persist(
    outputs: &[AlignedOutput],
    output_prefix: &Path,
    overwrite: bool,
) -> Result<Vec<PathBuf>> {
    let paths: Vec<PathBuf> = outputs
        .iter()
        .map(|o| writer::output_path(output_prefix, &o.name))
        .collect();
    for path in &paths {
        writer::check_destination(path, overwrite)?;
    }
    for (output, path) in outputs.iter().zip(&paths) {
        writer::write_trace(path, &output.trace)?;
    }
    Ok(paths)
}

/// Runs a complete extraction from input prefix to written outputs.
///
/// Existing destinations are rejected before any log is parsed, all
/// channels are then aligned, and only a fully successful run writes files.
pub fn extract<P: AsRef<Path>, Q: AsRef<Path>>(
    input_prefix: P,
    output_prefix: Q,
    options: &ExtractOptions,
    config: &PhysioConfig,
) -> Result<Vec<PathBuf>> {
    let output_prefix = output_prefix.as_ref();
    let logs = LogSet::from_prefix(input_prefix);

    for name in logs.planned_outputs(options, config) {
        writer::check_destination(&writer::output_path(output_prefix, &name), options.overwrite)?;
    }

    let outputs = compute(&logs, options, config)?;
    let paths = persist(&outputs, output_prefix, options.overwrite)?;
    info!(outputs = paths.len(), "extraction complete");
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn optional_logs_are_detected() {
        let dir = tempdir().unwrap();
        let prefix = dir.path().join("session");
        fs::write(dir.path().join("session.ecg"), "").unwrap();

        let logs = LogSet::from_prefix(&prefix);
        assert_eq!(logs.trigger, dir.path().join("session.ext"));
        assert_eq!(logs.respiration, dir.path().join("session.resp"));
        assert_eq!(logs.cardiac, Some(dir.path().join("session.ecg")));
        assert_eq!(logs.alternate_trigger, None);
    }

    #[test]
    fn planned_outputs_follow_options() {
        let dir = tempdir().unwrap();
        let logs = LogSet::from_prefix(dir.path().join("none"));
        let config = PhysioConfig::default();

        let options = ExtractOptions::default();
        assert_eq!(logs.planned_outputs(&options, &config), vec!["resp", "puls"]);

        let options = ExtractOptions {
            emit_trigger: true,
            ..Default::default()
        };
        let with_cardiac = LogSet {
            cardiac: Some(dir.path().join("x.ecg")),
            ..logs
        };
        assert_eq!(
            with_cardiac.planned_outputs(&options, &config),
            vec!["ext", "resp", "puls", "ecg1", "ecg2", "ecg3", "ecg4"]
        );
    }

    #[test]
    fn missing_trigger_log_is_fatal() {
        let dir = tempdir().unwrap();
        let logs = LogSet::from_prefix(dir.path().join("absent"));
        let result = compute(&logs, &ExtractOptions::default(), &PhysioConfig::default());
        assert!(matches!(result, Err(PhysioError::MissingFile(_))));
    }
}
