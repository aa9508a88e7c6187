use std::collections::VecDeque;

/// Bounded FIFO buffer of scalar samples.
///
/// The cap is a hard length limit, not a time window: when full, the oldest
/// value is evicted to make room. Means are computed over whatever the
/// buffer currently holds; an empty buffer yields `None`, never zero or NaN.
#[derive(Debug)]
pub struct RollingBuffer {
    values: VecDeque<f64>,
    capacity: usize,
    stats: RollingBufferStats,
}

/// Counters for monitoring buffer churn between flushes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RollingBufferStats {
    pub samples_pushed: u64,
    pub samples_evicted: u64,
}

impl RollingBuffer {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "rolling buffer capacity must be greater than 0");
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
            stats: RollingBufferStats::default(),
        }
    }

    /// Append a value, evicting the oldest entry when at capacity
    pub fn push(&mut self, value: f64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
            self.stats.samples_evicted += 1;
        }
        self.values.push_back(value);
        self.stats.samples_pushed += 1;
    }

    /// Arithmetic mean of the buffered values, `None` when empty
    pub fn mean(&self) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        let sum: f64 = self.values.iter().sum();
        Some(sum / self.values.len() as f64)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn stats(&self) -> RollingBufferStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_of_pushed_values() {
        let mut buffer = RollingBuffer::new(10);
        assert!(buffer.mean().is_none());

        buffer.push(2.0);
        buffer.push(4.0);
        buffer.push(6.0);
        assert_eq!(buffer.mean(), Some(4.0));
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn test_fifo_eviction_at_capacity() {
        let mut buffer = RollingBuffer::new(3);
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            buffer.push(v);
        }

        // Oldest two were evicted; mean covers 3, 4, 5
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.mean(), Some(4.0));

        let stats = buffer.stats();
        assert_eq!(stats.samples_pushed, 5);
        assert_eq!(stats.samples_evicted, 2);
    }

    #[test]
    fn test_clear_resets_values_not_counters() {
        let mut buffer = RollingBuffer::new(4);
        buffer.push(1.0);
        buffer.push(2.0);
        buffer.clear();

        assert!(buffer.is_empty());
        assert!(buffer.mean().is_none());
        assert_eq!(buffer.stats().samples_pushed, 2);
    }

    #[test]
    #[should_panic(expected = "capacity must be greater than 0")]
    fn test_zero_capacity_rejected() {
        RollingBuffer::new(0);
    }
}
