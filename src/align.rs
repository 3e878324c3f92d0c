//! Mapping of the scan window onto each channel's own sample grid.

use ndarray::{s, Array1};
use tracing::warn;

use crate::config::{PhysioConfig, MS_PER_DAY};
use crate::types::*;

/// Difference between a channel's start stamp and the reference start stamp.
///
/// Stamps are ms since local midnight, so a difference larger than half a
/// day is taken to cross midnight and corrected by one day. Fails with
/// `ClockMismatch` when the corrected difference exceeds the configured
/// limit: such logs belong to different runs or come from a faulty clock.
///
/// # Examples
///
/// ```
/// use physio_sync::{align::clock_offset, PhysioConfig};
///
/// let config = PhysioConfig::default();
/// // 00:00:01.000 against 23:59:59.000 is two seconds later, not a day earlier.
/// assert_eq!(clock_offset(1_000, 86_399_000, &config).unwrap(), 2_000.0);
/// ```
pub fn clock_offset(
    channel_start_ms: u32,
    reference_start_ms: u32,
    config: &PhysioConfig,
) -> Result<f64> {
    let mut diff = channel_start_ms as i64 - reference_start_ms as i64;
    if diff > MS_PER_DAY / 2 {
        diff -= MS_PER_DAY;
    } else if diff < -MS_PER_DAY / 2 {
        diff += MS_PER_DAY;
    }

    let offset_ms = diff as f64;
    let limit_ms = config.tolerance.max_clock_offset_ms;
    if offset_ms.abs() > limit_ms {
        return Err(PhysioError::ClockMismatch {
            channel: String::new(),
            offset_ms,
            limit_ms,
        });
    }
    Ok(offset_ms)
}

/// Cuts the samples covering `[window_start_ms, window_end_ms)` out of a trace.
///
/// Both bounds must already be expressed in this channel's time frame, i.e.
/// shifted by its clock offset. The first sample is the first one at or after
/// the start; the last is the final one strictly before the end. A trace that
/// ends early by no more than the configured tolerance is padded with zeros
/// and a warning is emitted; anything shorter fails with `DataTooShort`.
pub fn align(
    trace: &Trace,
    window_start_ms: f64,
    window_end_ms: f64,
    sampling_period_ms: f64,
    config: &PhysioConfig,
) -> Result<Trace> {
    let first = (window_start_ms / sampling_period_ms).ceil() as i64;
    let mut last = (window_end_ms / sampling_period_ms).floor() as i64;
    if last as f64 * sampling_period_ms == window_end_ms {
        last -= 1;
    }

    if first < 0 {
        return Err(PhysioError::DataTooShort {
            channel: String::new(),
            missing_ms: -first as f64 * sampling_period_ms,
        });
    }
    if last < first {
        return Ok(Array1::zeros(0));
    }

    let available_last = trace.len() as i64 - 1;
    if last > available_last {
        let missing_ms = (last - available_last) as f64 * sampling_period_ms;
        if missing_ms > config.tolerance.max_missing_tail_ms {
            return Err(PhysioError::DataTooShort {
                channel: String::new(),
                missing_ms,
            });
        }
        warn!(
            missing_ms,
            "trace ends before the scan window, padding with zeros"
        );
        let mut padded: Trace = Array1::zeros(last as usize + 1);
        padded.slice_mut(s![..trace.len()]).assign(trace);
        return Ok(padded.slice(s![first as usize..]).to_owned());
    }

    Ok(trace.slice(s![first as usize..=last as usize]).to_owned())
}
