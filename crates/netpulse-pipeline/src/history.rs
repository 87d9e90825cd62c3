//! Fixed-capacity history of aggregate rate samples.

use std::collections::VecDeque;

use netpulse_core::HistorySample;

use crate::config::{SamplerConfig, MAX_HISTORY_SAMPLES};
use crate::error::{PipelineError, PipelineResult};

const PREALLOCATED_SAMPLES: usize = 1024;

/// Time-ordered FIFO ring of [`HistorySample`]s.
///
/// Invariants: `len() <= capacity()` and timestamps strictly increase from
/// oldest to newest.
#[derive(Debug, Clone)]
pub struct HistoryRing {
    samples: VecDeque<HistorySample>,
    capacity: usize,
}

impl HistoryRing {
    /// Create a ring holding at most `capacity` samples.
    pub fn new(capacity: usize) -> PipelineResult<Self> {
        if capacity == 0 {
            return Err(PipelineError::InvalidConfig(
                "history capacity must be at least one sample".to_string(),
            ));
        }
        if capacity > MAX_HISTORY_SAMPLES {
            return Err(PipelineError::InvalidConfig(format!(
                "history capacity {capacity} exceeds {MAX_HISTORY_SAMPLES} samples"
            )));
        }
        Ok(Self {
            samples: VecDeque::with_capacity(capacity.min(PREALLOCATED_SAMPLES)),
            capacity,
        })
    }

    /// Create a ring sized to `window_seconds / interval`.
    pub fn for_config(config: &SamplerConfig) -> PipelineResult<Self> {
        Self::new(config.history_capacity())
    }

    /// Append a sample, evicting the oldest when full.
    ///
    /// Returns `false` (and leaves the ring untouched) when the sample is not
    /// strictly newer than the newest entry.
    pub fn append(&mut self, sample: HistorySample) -> bool {
        if let Some(newest) = self.samples.back() {
            if sample.timestamp_ms <= newest.timestamp_ms {
                return false;
            }
        }
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
        true
    }

    /// All samples, oldest first.
    pub fn snapshot(&self) -> Vec<HistorySample> {
        self.samples.iter().copied().collect()
    }

    pub fn latest(&self) -> Option<&HistorySample> {
        self.samples.back()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ts: i64) -> HistorySample {
        HistorySample::new(ts, ts as f64, 0.0)
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(HistoryRing::new(0).is_err());
    }

    #[test]
    fn test_oversized_capacity_rejected() {
        assert!(HistoryRing::new(MAX_HISTORY_SAMPLES + 1).is_err());
        assert!(HistoryRing::new(usize::MAX).is_err());

        let config = SamplerConfig {
            interval_ms: 1,
            window_seconds: u64::MAX / 1000,
            ..Default::default()
        };
        assert!(matches!(
            HistoryRing::for_config(&config),
            Err(PipelineError::InvalidConfig(_))
        ));
        assert_eq!(
            HistoryRing::new(MAX_HISTORY_SAMPLES).unwrap().capacity(),
            MAX_HISTORY_SAMPLES
        );
    }

    #[test]
    fn test_evicts_oldest_on_overflow() {
        let mut ring = HistoryRing::new(3).unwrap();
        for ts in 1..=5 {
            assert!(ring.append(sample(ts)));
            assert!(ring.len() <= ring.capacity());
        }

        let timestamps: Vec<i64> = ring.snapshot().iter().map(|s| s.timestamp_ms).collect();
        assert_eq!(timestamps, vec![3, 4, 5]);
        assert_eq!(ring.latest().unwrap().timestamp_ms, 5);
    }

    #[test]
    fn test_rejects_non_increasing_timestamps() {
        let mut ring = HistoryRing::new(4).unwrap();
        assert!(ring.append(sample(10)));
        assert!(!ring.append(sample(10)));
        assert!(!ring.append(sample(9)));
        assert!(ring.append(sample(11)));
        assert_eq!(ring.len(), 2);
    }

    #[test]
    fn test_contents_strictly_increasing_under_mixed_input() {
        let mut ring = HistoryRing::new(5).unwrap();
        for ts in [5, 3, 6, 6, 1, 9, 12, 11, 13, 20, 2] {
            ring.append(sample(ts));
        }
        let snap = ring.snapshot();
        assert!(snap.len() <= 5);
        assert!(snap.windows(2).all(|w| w[0].timestamp_ms < w[1].timestamp_ms));
    }

    #[test]
    fn test_snapshot_does_not_mutate() {
        let mut ring = HistoryRing::new(2).unwrap();
        ring.append(sample(1));
        let a = ring.snapshot();
        let b = ring.snapshot();
        assert_eq!(a, b);
        assert_eq!(ring.len(), 1);
    }

    #[test]
    fn test_capacity_from_config() {
        let config = SamplerConfig {
            interval_ms: 500,
            window_seconds: 10,
            ..Default::default()
        };
        let ring = HistoryRing::for_config(&config).unwrap();
        assert_eq!(ring.capacity(), 20);
        assert!(ring.is_empty());
    }
}
