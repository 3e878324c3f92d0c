//! Decoding of raw sample streams into pulse trains and value traces.

use ndarray::{s, Array1};

use crate::config::{ChannelConfig, PhysioConfig};
use crate::types::{PulseTrain, Trace};

/// Converts a trigger-log sample stream into a pulse train.
///
/// Marker samples become the pulse value and every other sample becomes 0.
/// The logger writes a marker one sample after the actual trigger, so each
/// marker preceded by a non-marker sample is folded into that sample: the
/// pair collapses to a single pulse and the train is one element shorter per
/// detected trigger.
pub fn to_pulses(samples: &Array1<i32>, config: &PhysioConfig) -> PulseTrain {
    let marker = config.format.trigger_marker;
    let pulse = config.pulse_value;

    let mut train: Vec<i32> = Vec::with_capacity(samples.len());
    for &sample in samples.iter() {
        if sample == marker {
            if train.last() == Some(&0) {
                train.pop();
            }
            train.push(pulse);
        } else {
            train.push(0);
        }
    }

    Array1::from(train)
}

/// Returns true if the train carries at least one pulse.
pub fn has_pulses(train: &PulseTrain, config: &PhysioConfig) -> bool {
    train.iter().any(|&v| v == config.pulse_value)
}

/// Number of pulses in a train.
pub fn count_pulses(train: &PulseTrain, config: &PhysioConfig) -> usize {
    train.iter().filter(|&&v| v == config.pulse_value).count()
}

/// Converts a physiological sample stream into its value trace.
///
/// Trigger markers carry no timing meaning outside the trigger log, so they
/// are deleted without substitution.
pub fn to_trace(samples: &Array1<i32>, config: &PhysioConfig) -> Trace {
    let marker = config.format.trigger_marker;
    samples.iter().copied().filter(|&v| v != marker).collect()
}

/// Extracts sub-trace `index` of `total` round-robin interleaved sub-traces.
///
/// # Panics
///
/// Panics if `total` is zero.
pub fn deinterleave(trace: &Trace, index: usize, total: usize) -> Trace {
    assert!(total > 0, "interleave factor must be positive");
    if index >= trace.len() {
        return Array1::zeros(0);
    }
    trace.slice(s![index..;total]).to_owned()
}

/// Subtracts a constant baseline from every sample, saturating at the
/// `i32` range.
pub fn apply_offset(trace: &Trace, constant: i32) -> Trace {
    trace.mapv(|v| v.saturating_sub(constant))
}

/// Splits an interleaved trace into its sub-traces, removing each
/// sub-trace's configured baseline.
pub fn split_subtraces(trace: &Trace, channel: &ChannelConfig) -> Vec<Trace> {
    (0..channel.interleave)
        .map(|i| apply_offset(&deinterleave(trace, i, channel.interleave), channel.offset(i)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const M: i32 = 5000;

    fn config() -> PhysioConfig {
        PhysioConfig::default()
    }

    #[test]
    fn pulse_is_attributed_to_preceding_sample() {
        let samples = Array1::from(vec![7, 8, 9, M, 10, 11, 12, M, 13]);
        let train = to_pulses(&samples, &config());
        assert_eq!(train.to_vec(), vec![0, 0, 5000, 0, 0, 5000, 0]);
    }

    #[test]
    fn pulse_train_shrinks_by_one_per_marker() {
        let marker_positions = [3usize, 10, 17, 24];
        let mut raw = vec![1; 30];
        for &p in &marker_positions {
            raw[p] = M;
        }
        let train = to_pulses(&Array1::from(raw.clone()), &config());
        assert_eq!(train.len(), raw.len() - marker_positions.len());

        // Pulse k sits one sample before marker k, shifted left by the k
        // markers removed ahead of it.
        let pulses: Vec<usize> = train
            .iter()
            .enumerate()
            .filter(|(_, v)| **v == 5000)
            .map(|(i, _)| i)
            .collect();
        let expected: Vec<usize> = marker_positions
            .iter()
            .enumerate()
            .map(|(k, &p)| p - 1 - k)
            .collect();
        assert_eq!(pulses, expected);
    }

    #[test]
    fn marker_at_stream_start_is_kept() {
        let train = to_pulses(&Array1::from(vec![M, 1, 2]), &config());
        assert_eq!(train.to_vec(), vec![5000, 0, 0]);
    }

    #[test]
    fn detects_pulses() {
        let cfg = config();
        assert!(!has_pulses(&Array1::from(vec![0, 0, 0]), &cfg));
        let train = to_pulses(&Array1::from(vec![1, 2, M, 3, M]), &cfg);
        assert!(has_pulses(&train, &cfg));
        assert_eq!(count_pulses(&train, &cfg), 2);
    }

    #[test]
    fn trace_deletes_markers_and_preserves_order() {
        let samples = Array1::from(vec![M, 4, 3, M, 2, 1, M]);
        let trace = to_trace(&samples, &config());
        assert_eq!(trace.to_vec(), vec![4, 3, 2, 1]);
    }

    #[test]
    fn trace_and_pulse_train_have_equal_length() {
        let samples = Array1::from(vec![9, 9, M, 9, 9, 9, M, 9]);
        let cfg = config();
        assert_eq!(to_trace(&samples, &cfg).len(), to_pulses(&samples, &cfg).len());
    }

    #[test]
    fn deinterleave_round_trip() {
        let trace: Trace = Array1::from((0..23).collect::<Vec<i32>>());
        let total = 4;
        let parts: Vec<Trace> = (0..total).map(|i| deinterleave(&trace, i, total)).collect();

        let mut merged = vec![0; trace.len()];
        for (i, part) in parts.iter().enumerate() {
            for (k, &v) in part.iter().enumerate() {
                merged[i + k * total] = v;
            }
        }
        assert_eq!(merged, trace.to_vec());
    }

    #[test]
    fn deinterleave_past_end_is_empty() {
        let trace: Trace = Array1::from(vec![1, 2]);
        assert!(deinterleave(&trace, 3, 4).is_empty());
    }

    #[test]
    fn offset_saturates_at_extremes() {
        let trace: Trace = Array1::from(vec![i32::MIN, 0, i32::MAX]);
        assert_eq!(apply_offset(&trace, 2048).to_vec(), vec![i32::MIN, -2048, i32::MAX - 2048]);
        assert_eq!(apply_offset(&trace, -1).to_vec(), vec![i32::MIN + 1, 1, i32::MAX]);
    }

    #[test]
    fn split_removes_per_lead_baseline() {
        let mut channel = config().cardiac;
        channel.offsets = vec![100, 200, 300, 400];
        let trace: Trace = Array1::from(vec![101, 202, 303, 404, 105, 206, 307, 408]);
        let leads = split_subtraces(&trace, &channel);
        assert_eq!(leads.len(), 4);
        assert_eq!(leads[0].to_vec(), vec![1, 5]);
        assert_eq!(leads[3].to_vec(), vec![4, 8]);
    }
}
