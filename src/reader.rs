use ndarray::Array1;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::debug;

use crate::config::{FormatConfig, PhysioConfig, MS_PER_DAY};
use crate::types::*;

const READ_BUFFER_SIZE: usize = 65536;

/// Loads a raw log file and returns its typed representation.
///
/// The first line of a log holds the whole sample stream; metadata blocks
/// embedded in it are removed, the format version is taken from the
/// `LOGVERSION` block when present, and the leading descriptor tokens plus
/// the trailing end-of-data token are dropped. The remaining lines form a
/// footer which is scanned for the start (and optional stop) timestamp.
///
/// # Arguments
///
/// * `file_path` - Path to the log file
/// * `header_items` - Number of leading descriptor tokens (4 for trigger,
///   respiration and pulse logs, 5 for cardiac logs)
/// * `config` - Marker values and field names of the log format
///
/// # Returns
///
/// A `Result` containing the parsed `RawLog`. Fails with `MissingFile` if the
/// file does not exist and with `MalformedLog` if it cannot be read or has no
/// start timestamp (usually a truncated file).
pub fn parse<P: AsRef<Path>>(
    file_path: P,
    header_items: usize,
    config: &PhysioConfig,
) -> Result<RawLog> {
    let path = file_path.as_ref();
    if !path.exists() {
        return Err(PhysioError::MissingFile(path.to_path_buf()));
    }

    let source_name = path.display().to_string();
    let file = File::open(path).map_err(|e| malformed(&source_name, e.to_string()))?;
    let reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);

    read_log(reader, &source_name, header_items, &config.format)
}

/// Parses a log held in memory. `source_name` only appears in error messages.
pub fn parse_str(
    content: &str,
    source_name: &str,
    header_items: usize,
    config: &PhysioConfig,
) -> Result<RawLog> {
    read_log(content.as_bytes(), source_name, header_items, &config.format)
}

fn read_log<R: BufRead>(
    mut reader: R,
    source_name: &str,
    header_items: usize,
    format: &FormatConfig,
) -> Result<RawLog> {
    let mut first_line = String::new();
    let read = reader
        .read_line(&mut first_line)
        .map_err(|e| malformed(source_name, e.to_string()))?;
    if read == 0 {
        return Err(malformed(source_name, "file is empty".to_string()));
    }

    let (format_version, tokens) = strip_metadata_blocks(&first_line, source_name, format)?;
    let samples = trim_descriptors(tokens, source_name, header_items)?;

    let (start_time_ms, stop_time_ms) = read_footer(reader, source_name, format)?;
    let start_time_ms = start_time_ms.ok_or_else(|| {
        malformed(
            source_name,
            format!("no {} field found, file may be truncated", format.start_time_field),
        )
    })?;

    debug!(
        source = source_name,
        version = format_version,
        samples = samples.len(),
        start_time_ms,
        "parsed log"
    );

    Ok(RawLog {
        format_version,
        start_time_ms,
        stop_time_ms,
        samples: Array1::from(samples),
    })
}

/// Helper function to remove metadata blocks from the sample line
///
/// Blocks run from a start marker token to the next stop marker token and do
/// not nest. Returns the format version found in a block (0 if none) and the
/// remaining numeric tokens.
fn strip_metadata_blocks(
    line: &str,
    source_name: &str,
    format: &FormatConfig,
) -> Result<(i32, Vec<i32>)> {
    let mut version = 0;
    let mut values = Vec::new();
    let mut block: Option<Vec<&str>> = None;

    for token in line.split_whitespace() {
        let numeric = token.parse::<i32>().ok();
        match block.as_mut() {
            Some(contents) => {
                if numeric == Some(format.block_stop) {
                    if let Some(v) = find_version(contents, &format.version_field) {
                        version = v;
                    }
                    block = None;
                } else {
                    contents.push(token);
                }
            }
            None => match numeric {
                Some(value) if value == format.block_start => block = Some(Vec::new()),
                Some(value) => values.push(value),
                None => {
                    return Err(malformed(
                        source_name,
                        format!("unexpected token '{}' outside metadata block", token),
                    ))
                }
            },
        }
    }

    if block.is_some() {
        return Err(malformed(
            source_name,
            "metadata block is never closed".to_string(),
        ));
    }

    Ok((version, values))
}

// Helper function to find a version number inside one metadata block
fn find_version(contents: &[&str], field: &str) -> Option<i32> {
    contents
        .iter()
        .position(|token| token.starts_with(field))
        .and_then(|i| contents.get(i + 1))
        .and_then(|token| token.parse().ok())
}

// Helper function to drop the leading descriptors and the end-of-data token
fn trim_descriptors(
    mut tokens: Vec<i32>,
    source_name: &str,
    header_items: usize,
) -> Result<Vec<i32>> {
    if tokens.len() <= header_items {
        return Err(malformed(
            source_name,
            format!(
                "expected more than {} descriptor tokens, found {}",
                header_items,
                tokens.len()
            ),
        ));
    }
    tokens.pop();
    tokens.drain(..header_items);
    Ok(tokens)
}

/// Helper function to scan the footer lines for timestamps
fn read_footer<R: BufRead>(
    reader: R,
    source_name: &str,
    format: &FormatConfig,
) -> Result<(Option<u32>, Option<u32>)> {
    let mut start = None;
    let mut stop = None;

    for line in reader.lines() {
        let line = line.map_err(|e| malformed(source_name, e.to_string()))?;
        if start.is_none() {
            start = parse_time_field(&line, &format.start_time_field, source_name)?;
        }
        if stop.is_none() {
            stop = match parse_time_field(&line, &format.stop_time_field, source_name) {
                Ok(value) => value,
                Err(e) => {
                    debug!(error = %e, "ignoring unreadable stop stamp");
                    None
                }
            };
        }
        if start.is_some() && stop.is_some() {
            break;
        }
    }

    Ok((start, stop))
}

// Helper function to read "<field>: <ms>" from one footer line
fn parse_time_field(line: &str, field: &str, source_name: &str) -> Result<Option<u32>> {
    let Some(pos) = line.find(field) else {
        return Ok(None);
    };
    let rest = line[pos + field.len()..].trim_start_matches(|c: char| c == ':' || c.is_whitespace());
    let token = rest.split_whitespace().next().unwrap_or("");

    let value: u32 = token
        .parse()
        .map_err(|_| malformed(source_name, format!("invalid {} value '{}'", field, token)))?;
    if value as i64 >= MS_PER_DAY {
        return Err(malformed(
            source_name,
            format!("{} value {} exceeds one day", field, value),
        ));
    }
    Ok(Some(value))
}

fn malformed(source_name: &str, reason: String) -> PhysioError {
    PhysioError::MalformedLog {
        source_name: source_name.to_string(),
        reason,
    }
}
