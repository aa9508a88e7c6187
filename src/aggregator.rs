use crate::rolling::RollingBuffer;
use crate::sample::{Coordinate, WindowSnapshot};
use tracing::{debug, trace};

/// Accumulates raw sensor readings between summarization ticks and answers
/// "give me the current window summary and reset".
///
/// The recorder serializes access through a mutex; every method here is
/// synchronous so the snapshot can never interleave with sample recording.
#[derive(Debug)]
pub struct SampleAggregator {
    speed_samples: RollingBuffer,
    motion_samples: RollingBuffer,
    steps_total: u64,
    last_flushed_steps: u64,
    last_coordinate: Option<Coordinate>,
}

impl SampleAggregator {
    pub fn new(speed_capacity: usize, motion_capacity: usize) -> Self {
        Self {
            speed_samples: RollingBuffer::new(speed_capacity),
            motion_samples: RollingBuffer::new(motion_capacity),
            steps_total: 0,
            last_flushed_steps: 0,
            last_coordinate: None,
        }
    }

    /// Record one speed sample in km/h
    pub fn record_speed_sample(&mut self, kmh: f64) {
        if !kmh.is_finite() {
            trace!("Discarding non-finite speed sample");
            return;
        }
        self.speed_samples.push(kmh);
    }

    /// Record one motion magnitude sample
    pub fn record_motion_sample(&mut self, magnitude: f64) {
        if !magnitude.is_finite() {
            trace!("Discarding non-finite motion sample");
            return;
        }
        self.motion_samples.push(magnitude);
    }

    /// Overwrite the running cumulative step total.
    ///
    /// The platform counter is nominally monotonic but may reset (device
    /// reboot). A total below the running total re-anchors the flush
    /// baseline at the regressed value, so the window's delta clamps to
    /// zero instead of going negative and later windows resume correct
    /// accounting from there.
    pub fn record_step_total(&mut self, cumulative: u64) {
        if cumulative < self.steps_total {
            debug!(
                "Step counter regressed from {} to {}; re-anchoring baseline",
                self.steps_total, cumulative
            );
            self.last_flushed_steps = cumulative;
        }
        self.steps_total = cumulative;
    }

    /// Overwrite the last known position; coordinates are never averaged
    pub fn record_position(&mut self, coordinate: Coordinate) {
        self.last_coordinate = Some(coordinate);
    }

    /// Compute the window summary and reset for the next window.
    ///
    /// Buffers are cleared and the step baseline advanced before this
    /// returns, so no sample can be counted into two consecutive windows.
    pub fn snapshot_and_reset(&mut self) -> WindowSnapshot {
        let snapshot = WindowSnapshot {
            avg_speed: self.speed_samples.mean(),
            avg_motion: self.motion_samples.mean(),
            steps_delta: self.steps_total.saturating_sub(self.last_flushed_steps),
            coordinate: self.last_coordinate,
        };

        self.speed_samples.clear();
        self.motion_samples.clear();
        self.last_flushed_steps = self.steps_total;

        trace!(
            avg_speed = ?snapshot.avg_speed,
            avg_motion = ?snapshot.avg_motion,
            steps_delta = snapshot.steps_delta,
            "Window snapshot taken"
        );

        snapshot
    }

    pub fn steps_total(&self) -> u64 {
        self.steps_total
    }

    pub fn last_coordinate(&self) -> Option<Coordinate> {
        self.last_coordinate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aggregator() -> SampleAggregator {
        SampleAggregator::new(120, 600)
    }

    #[test]
    fn test_snapshot_means_exact_window() {
        let mut agg = aggregator();
        agg.record_speed_sample(10.0);
        agg.record_speed_sample(20.0);
        agg.record_motion_sample(1.0);
        agg.record_motion_sample(2.0);
        agg.record_motion_sample(3.0);

        let snapshot = agg.snapshot_and_reset();
        assert_eq!(snapshot.avg_speed, Some(15.0));
        assert_eq!(snapshot.avg_motion, Some(2.0));

        // Next window starts clean: None, not zero
        let next = agg.snapshot_and_reset();
        assert!(next.avg_speed.is_none());
        assert!(next.avg_motion.is_none());
    }

    #[test]
    fn test_no_sample_counted_twice() {
        let mut agg = aggregator();
        agg.record_speed_sample(30.0);
        let first = agg.snapshot_and_reset();
        assert_eq!(first.avg_speed, Some(30.0));

        agg.record_speed_sample(10.0);
        let second = agg.snapshot_and_reset();
        assert_eq!(second.avg_speed, Some(10.0));
    }

    #[test]
    fn test_steps_delta_across_windows() {
        let mut agg = aggregator();
        agg.record_step_total(100);
        assert_eq!(agg.snapshot_and_reset().steps_delta, 100);

        agg.record_step_total(130);
        agg.record_step_total(150);
        assert_eq!(agg.snapshot_and_reset().steps_delta, 50);

        // No movement, no delta
        assert_eq!(agg.snapshot_and_reset().steps_delta, 0);
    }

    #[test]
    fn test_steps_deltas_sum_to_counter_movement() {
        let mut agg = aggregator();
        let totals = [10u64, 25, 25, 40, 90];
        let mut summed = 0;
        for total in totals {
            agg.record_step_total(total);
            summed += agg.snapshot_and_reset().steps_delta;
        }
        assert_eq!(summed, 90 - 0);
    }

    #[test]
    fn test_step_counter_regression_clamps_to_zero() {
        let mut agg = aggregator();
        agg.record_step_total(500);
        assert_eq!(agg.snapshot_and_reset().steps_delta, 500);

        // Platform counter reset mid-window
        agg.record_step_total(20);
        assert_eq!(agg.snapshot_and_reset().steps_delta, 0);

        // Accounting resumes from the regressed baseline
        agg.record_step_total(35);
        assert_eq!(agg.snapshot_and_reset().steps_delta, 15);
    }

    #[test]
    fn test_regression_mid_window_counts_from_regressed_value() {
        let mut agg = aggregator();
        agg.record_step_total(10);
        agg.record_step_total(2);
        agg.record_step_total(7);

        // Pre-regression movement is forgotten; only 2 -> 7 counts
        assert_eq!(agg.snapshot_and_reset().steps_delta, 5);
    }

    #[test]
    fn test_last_coordinate_not_averaged() {
        let mut agg = aggregator();
        agg.record_position(Coordinate {
            latitude: 1.0,
            longitude: 1.0,
        });
        agg.record_position(Coordinate {
            latitude: 59.3,
            longitude: 18.0,
        });

        let snapshot = agg.snapshot_and_reset();
        let coord = snapshot.coordinate.unwrap();
        assert_eq!(coord.latitude, 59.3);
        assert_eq!(coord.longitude, 18.0);

        // Last known survives the reset
        assert!(agg.snapshot_and_reset().coordinate.is_some());
    }

    #[test]
    fn test_non_finite_samples_discarded() {
        let mut agg = aggregator();
        agg.record_speed_sample(f64::NAN);
        agg.record_motion_sample(f64::INFINITY);
        let snapshot = agg.snapshot_and_reset();
        assert!(snapshot.avg_speed.is_none());
        assert!(snapshot.avg_motion.is_none());
    }
}
