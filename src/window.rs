//! Scan window estimation from a trigger pulse train.

use tracing::{debug, info};

use crate::codec::count_pulses;
use crate::config::PhysioConfig;
use crate::types::*;

/// Applies a trigger skip/keep policy and returns the resulting train.
///
/// Steps run in order: skip the first `skip_first` pulses, skip the last
/// `skip_last` pulses, then keep only the first `keep_first` of those left.
/// Skipped pulses are zeroed; the train keeps its length.
pub fn apply_policy(
    train: &PulseTrain,
    policy: &TriggerPolicy,
    config: &PhysioConfig,
) -> Result<PulseTrain> {
    let pulse = config.pulse_value;
    let mut result = train.clone();

    if policy.skip_first > 0 {
        let mut remaining = policy.skip_first;
        for v in result.iter_mut() {
            if remaining == 0 {
                break;
            }
            if *v == pulse {
                *v = 0;
                remaining -= 1;
            }
        }
    }

    if policy.skip_last > 0 {
        let mut remaining = policy.skip_last;
        for v in result.iter_mut().rev() {
            if remaining == 0 {
                break;
            }
            if *v == pulse {
                *v = 0;
                remaining -= 1;
            }
        }
    }

    if let Some(keep) = policy.keep_first {
        let found = count_pulses(&result, config);
        if found < keep {
            return Err(PhysioError::InsufficientTriggers {
                required: keep,
                found,
            });
        }
        let mut kept = 0;
        for v in result.iter_mut() {
            if *v == pulse {
                if kept < keep {
                    kept += 1;
                } else {
                    *v = 0;
                }
            }
        }
    }

    Ok(result)
}

/// Applies the trigger policy and verifies that pulses remain.
///
/// The policy always applies; in trust-start-time mode an empty train is
/// accepted since pulses play no part in the window.
pub fn prepare(
    train: &PulseTrain,
    options: &WindowOptions,
    config: &PhysioConfig,
) -> Result<PulseTrain> {
    let prepared = apply_policy(train, &options.policy, config)?;
    let remaining = count_pulses(&prepared, config);
    if remaining == 0 && !options.trust_start_time {
        return Err(PhysioError::NoTriggersFound);
    }
    debug!(
        total = count_pulses(train, config),
        remaining, "applied trigger policy"
    );
    Ok(prepared)
}

/// Indices of all pulses in a train.
pub fn pulse_positions(train: &PulseTrain, config: &PhysioConfig) -> Vec<usize> {
    train
        .iter()
        .enumerate()
        .filter(|(_, v)| **v == config.pulse_value)
        .map(|(i, _)| i)
        .collect()
}

/// Histogram of the interior gap lengths between consecutive pulses.
///
/// The lead-in before the first pulse and the tail after the last one are
/// partial and excluded.
pub fn interval_histogram(positions: &[usize]) -> IntervalHistogram {
    IntervalHistogram::from_lengths(positions.windows(2).map(|w| w[1] - w[0] - 1))
}

/// Computes the scan window from an already prepared pulse train.
///
/// # Arguments
///
/// * `train` - Pulse train after policy application (see [`prepare`])
/// * `sampling_period_ms` - Sampling period of the trigger log
/// * `options` - Consistency check, truncation and trust-start-time settings
/// * `config` - Pulse value and TR tolerance
///
/// # Returns
///
/// The window relative to the trigger log's start. Fails with
/// `InsufficientTriggers` when fewer than two pulses are present and with
/// `InconsistentTR` when the observed intervals stray too far from the
/// dominant one.
pub fn compute_window(
    train: &PulseTrain,
    sampling_period_ms: f64,
    options: &WindowOptions,
    config: &PhysioConfig,
) -> Result<ScanWindow> {
    let total = train.len();

    if options.trust_start_time {
        if total == 0 {
            return Err(PhysioError::InsufficientTriggers {
                required: 1,
                found: 0,
            });
        }
        let window = ScanWindow {
            start_offset_ms: 0.0,
            end_offset_ms: total as f64 * sampling_period_ms,
            repetition_ms: None,
            interval_count: count_pulses(train, config),
        };
        info!(
            end_ms = window.end_offset_ms,
            "trusting start time, using the whole trigger log"
        );
        return Ok(window);
    }

    let positions = pulse_positions(train, config);
    if positions.len() < 2 {
        return Err(PhysioError::InsufficientTriggers {
            required: 2,
            found: positions.len(),
        });
    }

    let first_segment = positions[0];
    let last_segment = total - positions[positions.len() - 1] - 1;
    let start_offset_ms = first_segment as f64 * sampling_period_ms;

    let histogram = interval_histogram(&positions);
    let (mode, min, max) = match (histogram.mode(), histogram.min(), histogram.max()) {
        (Some(mode), Some(min), Some(max)) => (mode, min, max),
        _ => {
            return Err(PhysioError::InsufficientTriggers {
                required: 2,
                found: positions.len(),
            })
        }
    };

    let repetition_ms = (mode + 1) as f64 * sampling_period_ms;
    let mut end_offset_ms = (total - last_segment) as f64 * sampling_period_ms + repetition_ms;

    if options.check_consistency {
        let min_ms = (min + 1) as f64 * sampling_period_ms;
        let max_ms = (max + 1) as f64 * sampling_period_ms;
        let tolerance = config.tolerance.tr_tolerance_periods * sampling_period_ms;
        if repetition_ms - min_ms > tolerance || max_ms - repetition_ms > tolerance {
            return Err(PhysioError::InconsistentTR {
                tr_ms: repetition_ms,
                min_ms,
                max_ms,
            });
        }
    }

    let interval_count = positions.len();
    if options.truncate_to_tr {
        let bound = start_offset_ms + interval_count as f64 * repetition_ms;
        if end_offset_ms > bound {
            debug!(
                from_ms = end_offset_ms,
                to_ms = bound,
                "truncating window to whole repetitions"
            );
            end_offset_ms = bound;
        }
    }

    debug_assert!(end_offset_ms > start_offset_ms);

    info!(
        start_ms = start_offset_ms,
        end_ms = end_offset_ms,
        tr_ms = repetition_ms,
        triggers = interval_count,
        "estimated scan window"
    );

    Ok(ScanWindow {
        start_offset_ms,
        end_offset_ms,
        repetition_ms: Some(repetition_ms),
        interval_count,
    })
}

/// Estimates the scan window of a raw trigger pulse train.
///
/// Shorthand for [`prepare`] followed by [`compute_window`].
pub fn estimate(
    train: &PulseTrain,
    sampling_period_ms: f64,
    options: &WindowOptions,
    config: &PhysioConfig,
) -> Result<ScanWindow> {
    let prepared = prepare(train, options, config)?;
    compute_window(&prepared, sampling_period_ms, options, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;

    const P: i32 = 5000;

    /// Builds a train with `lead` zeros, then pulses separated by `gaps`
    /// zeros each, then `tail` zeros.
    fn train_with_gaps(lead: usize, gaps: &[usize], tail: usize) -> PulseTrain {
        let mut v = vec![0; lead];
        v.push(P);
        for &g in gaps {
            v.extend(std::iter::repeat(0).take(g));
            v.push(P);
        }
        v.extend(std::iter::repeat(0).take(tail));
        Array1::from(v)
    }

    fn config() -> PhysioConfig {
        PhysioConfig::default()
    }

    #[test]
    fn even_train_gives_expected_tr() {
        let train = train_with_gaps(100, &[500; 9], 700);
        let window = estimate(&train, 2.5, &WindowOptions::default(), &config()).unwrap();

        assert_eq!(window.repetition_ms, Some(1252.5));
        assert_eq!(window.start_offset_ms, 250.0);
        assert_eq!(window.interval_count, 10);
        // Last pulse sits at 100 + 9 * 501; the window ends one TR after it.
        let last_pulse = 100 + 9 * 501;
        assert_eq!(
            window.end_offset_ms,
            (last_pulse + 1) as f64 * 2.5 + 1252.5
        );
        assert!(window.end_offset_ms > window.start_offset_ms);
    }

    #[test]
    fn skip_first_zeroes_leading_pulses() {
        let train = train_with_gaps(10, &[500; 9], 10);
        let policy = TriggerPolicy {
            skip_first: 2,
            ..Default::default()
        };
        let skipped = apply_policy(&train, &policy, &config()).unwrap();

        let before = pulse_positions(&train, &config());
        let after = pulse_positions(&skipped, &config());
        assert_eq!(after.len(), 8);
        assert_eq!(after, before[2..].to_vec());
        assert_eq!(skipped.len(), train.len());

        let window = estimate(
            &train,
            2.5,
            &WindowOptions {
                policy,
                ..Default::default()
            },
            &config(),
        )
        .unwrap();
        assert_eq!(window.interval_count, 8);
        assert_eq!(window.start_offset_ms, before[2] as f64 * 2.5);
    }

    #[test]
    fn policies_compose_in_order() {
        let train = train_with_gaps(0, &[3; 9], 0);
        let all = pulse_positions(&train, &config());
        let policy = TriggerPolicy {
            skip_first: 1,
            skip_last: 2,
            keep_first: Some(3),
        };
        let result = apply_policy(&train, &policy, &config()).unwrap();
        assert_eq!(pulse_positions(&result, &config()), all[1..4].to_vec());
    }

    #[test]
    fn keep_first_requires_enough_pulses() {
        let train = train_with_gaps(0, &[3; 4], 0);
        let policy = TriggerPolicy {
            keep_first: Some(6),
            ..Default::default()
        };
        match apply_policy(&train, &policy, &config()) {
            Err(PhysioError::InsufficientTriggers { required, found }) => {
                assert_eq!((required, found), (6, 5));
            }
            other => panic!("expected InsufficientTriggers, got {:?}", other),
        }
    }

    #[test]
    fn no_pulses_left_after_policy() {
        let train = train_with_gaps(5, &[3, 3], 5);
        let options = WindowOptions {
            policy: TriggerPolicy {
                skip_first: 3,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            estimate(&train, 2.5, &options, &config()),
            Err(PhysioError::NoTriggersFound)
        ));
    }

    #[test]
    fn single_pulse_is_insufficient() {
        let train = train_with_gaps(5, &[], 5);
        assert!(matches!(
            estimate(&train, 2.5, &WindowOptions::default(), &config()),
            Err(PhysioError::InsufficientTriggers { required: 2, found: 1 })
        ));
    }

    #[test]
    fn irregular_intervals_fail_consistency_check() {
        let train = train_with_gaps(5, &[500, 500, 500, 504, 500], 5);
        let result = estimate(&train, 2.5, &WindowOptions::default(), &config());
        match result {
            Err(PhysioError::InconsistentTR { tr_ms, max_ms, .. }) => {
                assert_eq!(tr_ms, 1252.5);
                assert_eq!(max_ms, 1262.5);
            }
            other => panic!("expected InconsistentTR, got {:?}", other),
        }

        let lenient = WindowOptions {
            check_consistency: false,
            ..Default::default()
        };
        assert!(estimate(&train, 2.5, &lenient, &config()).is_ok());
    }

    #[test]
    fn small_jitter_passes_consistency_check() {
        let train = train_with_gaps(5, &[500, 501, 500, 499, 502, 500], 5);
        let window = estimate(&train, 2.5, &WindowOptions::default(), &config()).unwrap();
        assert_eq!(window.repetition_ms, Some(1252.5));
    }

    #[test]
    fn truncation_trims_excess_beyond_whole_repetitions() {
        // Two gaps one sample long push the raw end 3 samples past
        // start + 10 * TR.
        let gaps = [500, 500, 501, 500, 500, 501, 500, 500, 500];
        let train = train_with_gaps(40, &gaps, 800);

        let plain = estimate(&train, 2.5, &WindowOptions::default(), &config()).unwrap();
        let truncated = estimate(
            &train,
            2.5,
            &WindowOptions {
                truncate_to_tr: true,
                ..Default::default()
            },
            &config(),
        )
        .unwrap();

        let bound = plain.start_offset_ms + 10.0 * 1252.5;
        assert_eq!(plain.end_offset_ms - bound, 7.5);
        assert_eq!(truncated.end_offset_ms, bound);
        assert_eq!(truncated.start_offset_ms, plain.start_offset_ms);
    }

    #[test]
    fn trust_start_time_uses_whole_log() {
        let train: PulseTrain = Array1::zeros(4000);
        let options = WindowOptions {
            trust_start_time: true,
            ..Default::default()
        };
        let window = estimate(&train, 2.5, &options, &config()).unwrap();
        assert_eq!(window.start_offset_ms, 0.0);
        assert_eq!(window.end_offset_ms, 10_000.0);
        assert_eq!(window.repetition_ms, None);
        assert_eq!(window.duration(), 10.0);
    }

    #[test]
    fn trust_start_time_still_applies_keep_first() {
        let options = WindowOptions {
            policy: TriggerPolicy {
                keep_first: Some(5),
                ..Default::default()
            },
            trust_start_time: true,
            ..Default::default()
        };
        let empty: PulseTrain = Array1::zeros(4000);
        assert!(matches!(
            estimate(&empty, 2.5, &options, &config()),
            Err(PhysioError::InsufficientTriggers { required: 5, found: 0 })
        ));

        let train = train_with_gaps(0, &[3; 9], 0);
        let prepared = prepare(&train, &options, &config()).unwrap();
        assert_eq!(count_pulses(&prepared, &config()), 5);
        let window = compute_window(&prepared, 2.5, &options, &config()).unwrap();
        assert_eq!(window.end_offset_ms, train.len() as f64 * 2.5);
    }

    #[test]
    fn trust_start_time_rejects_empty_trigger_log() {
        let options = WindowOptions {
            trust_start_time: true,
            ..Default::default()
        };
        let train: PulseTrain = Array1::zeros(0);
        assert!(matches!(
            estimate(&train, 2.5, &options, &config()),
            Err(PhysioError::InsufficientTriggers { required: 1, found: 0 })
        ));
    }

    #[test]
    fn histogram_ignores_partial_segments() {
        let hist = interval_histogram(&[100, 104, 108, 113]);
        assert_eq!(hist.count(3), 2);
        assert_eq!(hist.count(4), 1);
        assert_eq!(hist.total(), 3);
    }
}
