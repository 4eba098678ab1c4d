//! Bounded per-unit trend history

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of samples a unit keeps before evicting the oldest
pub const DEFAULT_HISTORY_CAPACITY: usize = 60;

/// One trend sample recorded per control tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySample {
    /// When the sample was taken
    pub timestamp: DateTime<Utc>,
    /// Zone temperature after the thermal step
    pub temperature: f64,
    /// Setpoint the unit was driving towards
    pub setpoint: f64,
    /// Output demand, 100 while cooling or heating, otherwise 0
    pub output: u8,
}

/// Fixed-capacity, append-only sample ring (oldest evicted first)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct History {
    capacity: usize,
    samples: VecDeque<HistorySample>,
}

impl Default for History {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

impl History {
    /// Create an empty history holding at most `capacity` samples
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    /// Append a sample, dropping the oldest ones past capacity
    pub fn push(&mut self, sample: HistorySample) {
        self.samples.push_back(sample);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Most recent sample
    pub fn latest(&self) -> Option<&HistorySample> {
        self.samples.back()
    }

    /// Oldest retained sample
    pub fn oldest(&self) -> Option<&HistorySample> {
        self.samples.front()
    }

    /// Iterate oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &HistorySample> {
        self.samples.iter()
    }

    /// Copy the samples out, oldest first
    pub fn to_vec(&self) -> Vec<HistorySample> {
        self.samples.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(temperature: f64) -> HistorySample {
        HistorySample {
            timestamp: Utc::now(),
            temperature,
            setpoint: 72.0,
            output: 0,
        }
    }

    #[test]
    fn test_history_evicts_oldest_past_capacity() {
        let mut history = History::default();

        for i in 0..61 {
            history.push(sample(i as f64));
        }

        assert_eq!(history.len(), DEFAULT_HISTORY_CAPACITY);
        // Sample 0 was evicted, sample 60 is the newest
        assert_eq!(history.oldest().unwrap().temperature, 1.0);
        assert_eq!(history.latest().unwrap().temperature, 60.0);
        assert!(history.iter().all(|s| s.temperature != 0.0));
    }

    #[test]
    fn test_history_zero_capacity_keeps_one() {
        let mut history = History::with_capacity(0);
        history.push(sample(70.0));
        history.push(sample(71.0));

        assert_eq!(history.capacity(), 1);
        assert_eq!(history.len(), 1);
        assert_eq!(history.latest().unwrap().temperature, 71.0);
    }
}
