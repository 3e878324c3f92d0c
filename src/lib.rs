pub mod align;
pub mod codec;
pub mod config;
pub mod pipeline;
pub mod reader;
pub mod types;
pub mod window;
pub mod writer;

use std::path::Path;

// Re-export types
pub use config::{ChannelConfig, FormatConfig, PhysioConfig, ToleranceConfig};
pub use pipeline::{compute, extract, persist, LogSet};
pub use types::*;

/// Loads one raw log file using the header layout of its kind.
///
/// # Examples
///
/// ```no_run
/// use physio_sync::{load_log, ChannelKind, PhysioConfig};
///
/// let config = PhysioConfig::default();
/// let result = load_log("path/to/session.resp", ChannelKind::Respiration, &config);
/// match result {
///     Ok(log) => println!("Samples: {}, started at {} ms", log.num_samples(), log.start_time_ms),
///     Err(e) => println!("Error loading file: {}", e),
/// }
/// ```
pub fn load_log<P: AsRef<Path>>(
    file_path: P,
    kind: ChannelKind,
    config: &PhysioConfig,
) -> Result<RawLog> {
    reader::parse(file_path, config.channel(kind).header_items, config)
}
