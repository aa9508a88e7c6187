use super::{MotionSource, SubscriptionHandle};
use crate::error::{FitrecError, Result};
use crate::sample::{MotionReading, SourceKind};
use async_trait::async_trait;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Synthetic motion source: emits rotation-rate readings on a fixed cadence
/// until the receiver goes away.
pub struct SimulatedMotionSource {
    emit_interval: Duration,
}

impl SimulatedMotionSource {
    pub fn new() -> Self {
        Self::with_interval(Duration::from_millis(100))
    }

    pub fn with_interval(emit_interval: Duration) -> Self {
        Self { emit_interval }
    }
}

impl Default for SimulatedMotionSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MotionSource for SimulatedMotionSource {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn subscribe(&self, tx: mpsc::Sender<MotionReading>) -> Result<SubscriptionHandle> {
        let emit_interval = self.emit_interval;

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(emit_interval);
            let mut tick = 0u64;

            loop {
                interval.tick().await;
                tick += 1;

                let t = tick as f64 * 0.1;
                let reading = MotionReading {
                    rotation: Some([t.sin() * 0.5, t.cos() * 0.5, (t * 0.3).sin() * 0.2]),
                    acceleration: None,
                };

                if tx.send(reading).await.is_err() {
                    debug!("Motion receiver dropped; simulated source stopping");
                    break;
                }
                trace!("Simulated motion reading {} emitted", tick);
            }
        });

        Ok(SubscriptionHandle::new("motion", task))
    }
}

/// Motion source replaying readings recorded as JSON lines, one reading per
/// line, emitted on a fixed cadence. The delivery task ends when the
/// fixture is exhausted.
pub struct ReplayMotionSource {
    readings: Vec<MotionReading>,
    emit_interval: Duration,
}

impl ReplayMotionSource {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())?;
        let mut readings = Vec::new();
        for (number, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let reading: MotionReading = serde_json::from_str(line).map_err(|e| {
                FitrecError::sensor(
                    SourceKind::Motion.to_string(),
                    format!("bad fixture line {}: {}", number + 1, e),
                )
            })?;
            readings.push(reading);
        }
        Ok(Self {
            readings,
            emit_interval: Duration::from_millis(100),
        })
    }

    pub fn from_readings(readings: Vec<MotionReading>, emit_interval: Duration) -> Self {
        Self {
            readings,
            emit_interval,
        }
    }
}

#[async_trait]
impl MotionSource for ReplayMotionSource {
    fn name(&self) -> &'static str {
        "replay"
    }

    async fn subscribe(&self, tx: mpsc::Sender<MotionReading>) -> Result<SubscriptionHandle> {
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
            debug!("Replay motion fixture exhausted");
        });

        Ok(SubscriptionHandle::new("motion", task))
    }
}
