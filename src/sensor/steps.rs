use super::{StepSource, SubscriptionHandle};
use crate::error::{FitrecError, Result};
use crate::sample::{SourceKind, StepReading};
use async_trait::async_trait;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Synthetic step counter: reports a cumulative total that grows by a few
/// steps per emission, the way a platform pedometer does.
pub struct SimulatedStepSource {
    emit_interval: Duration,
    steps_per_tick: u64,
}

impl SimulatedStepSource {
    pub fn new() -> Self {
        Self {
            emit_interval: Duration::from_secs(2),
            steps_per_tick: 3,
        }
    }

    pub fn with_cadence(emit_interval: Duration, steps_per_tick: u64) -> Self {
        Self {
            emit_interval,
            steps_per_tick,
        }
    }
}

impl Default for SimulatedStepSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StepSource for SimulatedStepSource {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn subscribe(&self, tx: mpsc::Sender<StepReading>) -> Result<SubscriptionHandle> {
        let emit_interval = self.emit_interval;
        let steps_per_tick = self.steps_per_tick;

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(emit_interval);
            let mut total = 0u64;

            loop {
                interval.tick().await;
                total += steps_per_tick;

                if tx.send(StepReading { total }).await.is_err() {
                    debug!("Step receiver dropped; simulated source stopping");
                    break;
                }
                trace!("Simulated step total {} emitted", total);
            }
        });

        Ok(SubscriptionHandle::new("steps", task))
    }
}

/// Step source replaying cumulative totals recorded as JSON lines. Totals
/// are forwarded verbatim, including regressions, so counter-reset handling
/// downstream can be exercised from a fixture.
pub struct ReplayStepSource {
    readings: Vec<StepReading>,
    emit_interval: Duration,
}

impl ReplayStepSource {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())?;
        let mut readings = Vec::new();
        for (number, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let reading: StepReading = serde_json::from_str(line).map_err(|e| {
                FitrecError::sensor(
                    SourceKind::StepCount.to_string(),
                    format!("bad fixture line {}: {}", number + 1, e),
                )
            })?;
            readings.push(reading);
        }
        Ok(Self {
            readings,
            emit_interval: Duration::from_millis(500),
        })
    }

    pub fn from_readings(readings: Vec<StepReading>, emit_interval: Duration) -> Self {
        Self {
            readings,
            emit_interval,
        }
    }
}

#[async_trait]
impl StepSource for ReplayStepSource {
    fn name(&self) -> &'static str {
        "replay"
    }

    async fn subscribe(&self, tx: mpsc::Sender<StepReading>) -> Result<SubscriptionHandle> {
        let readings = self.readings.clone();
        let emit_interval = self.emit_interval;

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(emit_interval);
            for reading in readings {
                interval.tick().await;
                if tx.send(reading).await.is_err() {
                    break;
                }
            }
            debug!("Replay step fixture exhausted");
        });

        Ok(SubscriptionHandle::new("steps", task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simulated_totals_are_cumulative() {
        let source = SimulatedStepSource::with_cadence(Duration::from_millis(1), 5);
        let (tx, mut rx) = mpsc::channel(16);
        let mut handle = source.subscribe(tx).await.unwrap();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.total, 5);
        assert_eq!(second.total, 10);

        handle.cancel();
    }

    #[tokio::test]
    async fn test_replay_preserves_regressions() {
        let readings = vec![
            StepReading { total: 100 },
            StepReading { total: 7 },
            StepReading { total: 20 },
        ];
        let source = ReplayStepSource::from_readings(readings, Duration::from_millis(1));
        let (tx, mut rx) = mpsc::channel(16);
        let _handle = source.subscribe(tx).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().total, 100);
        assert_eq!(rx.recv().await.unwrap().total, 7);
        assert_eq!(rx.recv().await.unwrap().total, 20);
        assert!(rx.recv().await.is_none());
    }
}
