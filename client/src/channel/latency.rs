// src/channel/latency.rs

use std::collections::VecDeque;

use serde::Serialize;

pub const LATENCY_WINDOW: usize = 10;

/// Rolling push-latency statistics over the last [`LATENCY_WINDOW`] samples.
#[derive(Debug, Clone, Default)]
pub struct LatencyTracker {
    samples: VecDeque<i64>,
    total_samples: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencyStats {
    pub samples: usize,
    pub min_ms: i64,
    pub max_ms: i64,
    pub avg_ms: f64,
}

impl LatencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `received_at_ms - emitted_at_ms`. Clock skew can make this
    /// negative; such samples count as zero.
    pub fn record(&mut self, emitted_at_ms: i64, received_at_ms: i64) -> i64 {
        let latency = received_at_ms.saturating_sub(emitted_at_ms).max(0);
        if self.samples.len() == LATENCY_WINDOW {
            self.samples.pop_front();
        }
        self.samples.push_back(latency);
        self.total_samples += 1;
        latency
    }

    /// Samples currently in the window.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples recorded since the channel was created.
    pub fn total_samples(&self) -> u64 {
        self.total_samples
    }

    pub fn stats(&self) -> Option<LatencyStats> {
        let min_ms = *self.samples.iter().min()?;
        let max_ms = *self.samples.iter().max()?;
        let sum: i128 = self.samples.iter().map(|&s| i128::from(s)).sum();
        Some(LatencyStats {
            samples: self.samples.len(),
            min_ms,
            max_ms,
            avg_ms: sum as f64 / self.samples.len() as f64,
        })
    }
}
