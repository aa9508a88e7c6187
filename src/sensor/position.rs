use super::{AccessStatus, PositionSource};
use crate::error::{FitrecError, Result};
use crate::sample::{Coordinate, PositionFix, SourceKind};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// Synthetic position source for development and tests: wanders slowly
/// around a fixed origin at walking speed.
pub struct SimulatedPositionSource {
    origin: Coordinate,
    tick: AtomicU64,
}

impl SimulatedPositionSource {
    pub fn new() -> Self {
        Self::with_origin(Coordinate {
            latitude: 59.3293,
            longitude: 18.0686,
        })
    }

    pub fn with_origin(origin: Coordinate) -> Self {
        Self {
            origin,
            tick: AtomicU64::new(0),
        }
    }
}

impl Default for SimulatedPositionSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PositionSource for SimulatedPositionSource {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn request_access(&self) -> AccessStatus {
        AccessStatus::Granted
    }

    async fn sample_once(&self) -> Result<Option<PositionFix>> {
        let tick = self.tick.fetch_add(1, Ordering::Relaxed) as f64;

        // Small deterministic drift, roughly a stroll
        let fix = PositionFix {
            coordinate: Coordinate {
                latitude: self.origin.latitude + (tick * 0.7).sin() * 1e-4,
                longitude: self.origin.longitude + (tick * 0.4).cos() * 1e-4,
            },
            speed_ms: Some(1.2 + (tick * 0.3).sin().abs()),
        };

        trace!("Simulated position fix at tick {}", tick);
        Ok(Some(fix))
    }
}

/// Position source replaying fixes recorded as JSON lines. Each line is a
/// serialized `PositionFix`; once exhausted the source reports no fix,
/// which downstream treats as a degraded (null-producing) window.
pub struct ReplayPositionSource {
    fixes: Mutex<VecDeque<PositionFix>>,
}

impl ReplayPositionSource {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())?;
        let mut fixes = VecDeque::new();
        for (number, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let fix: PositionFix = serde_json::from_str(line).map_err(|e| {
                FitrecError::sensor(
                    SourceKind::Position.to_string(),
                    format!("bad fixture line {}: {}", number + 1, e),
                )
            })?;
            fixes.push_back(fix);
        }
        Ok(Self {
            fixes: Mutex::new(fixes),
        })
    }

    pub fn from_fixes(fixes: Vec<PositionFix>) -> Self {
        Self {
            fixes: Mutex::new(fixes.into()),
        }
    }

    pub fn remaining(&self) -> usize {
        self.fixes.lock().len()
    }
}

#[async_trait]
impl PositionSource for ReplayPositionSource {
    fn name(&self) -> &'static str {
        "replay"
    }

    async fn request_access(&self) -> AccessStatus {
        AccessStatus::Granted
    }

    async fn sample_once(&self) -> Result<Option<PositionFix>> {
        Ok(self.fixes.lock().pop_front())
    }
}
