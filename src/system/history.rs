use std::collections::VecDeque;

pub const DEFAULT_CAPACITY: usize = 100;

/// Bounded FIFO of recent valid samples plus a lifetime high-water mark.
///
/// The peak survives eviction: it only ever grows, even after the sample
/// that produced it has left the window.
#[derive(Debug, Clone)]
pub struct UsageHistory {
    samples: VecDeque<f32>,
    capacity: usize,
    peak: f32,
}

impl UsageHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            peak: 0.0,
        }
    }

    pub fn push(&mut self, value: f32) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
        if value > self.peak {
            self.peak = value;
        }
    }

    pub fn peak(&self) -> f32 {
        self.peak
    }

    pub fn average(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.samples.iter().map(|&v| f64::from(v)).sum();
        (sum / self.samples.len() as f64) as f32
    }

    pub fn latest(&self) -> Option<f32> {
        self.samples.back().copied()
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

    pub fn iter(&self) -> impl Iterator<Item = f32> + '_ {
        self.samples.iter().copied()
    }
}

impl Default for UsageHistory {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Clamp a computed percentage into `[0, 100]`, mapping NaN to zero.
pub fn clamp_percent(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_push_and_average() {
        let mut history = UsageHistory::new(100);
        history.push(10.0);
        history.push(30.0);
        assert_eq!(history.len(), 2);
        assert!((history.average() - 20.0).abs() < 1e-4);
        assert_eq!(history.latest(), Some(30.0));
    }

    #[test]
    fn ring_buffer_caps_at_capacity() {
        let mut history = UsageHistory::new(5);
        for i in 0..10 {
            history.push(i as f32);
        }
        let kept: Vec<f32> = history.iter().collect();
        assert_eq!(kept, vec![5.0, 6.0, 7.0, 8.0, 9.0]);
    }

    #[test]
    fn peak_survives_eviction() {
        let mut history = UsageHistory::new(2);
        history.push(90.0);
        history.push(10.0);
        history.push(20.0);
        assert!(history.iter().all(|v| v < 90.0));
        assert_eq!(history.peak(), 90.0);
    }

    #[test]
    fn empty_history_reports_zero() {
        let history = UsageHistory::default();
        assert_eq!(history.average(), 0.0);
        assert_eq!(history.peak(), 0.0);
        assert!(history.is_empty());
        assert_eq!(history.capacity(), DEFAULT_CAPACITY);
    }

    #[test]
    fn clamp_percent_handles_out_of_range() {
        assert_eq!(clamp_percent(-3.0), 0.0);
        assert_eq!(clamp_percent(140.0), 100.0);
        assert_eq!(clamp_percent(f32::NAN), 0.0);
        assert_eq!(clamp_percent(42.5), 42.5);
    }
}
