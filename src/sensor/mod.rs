use crate::config::SensorConfig;
use crate::error::Result;
use crate::sample::{MotionReading, PositionFix, StepReading};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub mod motion;
pub mod position;
pub mod steps;

pub use motion::{ReplayMotionSource, SimulatedMotionSource};
pub use position::{ReplayPositionSource, SimulatedPositionSource};
pub use steps::{ReplayStepSource, SimulatedStepSource};

/// Outcome of the one-time access request made before the recorder arms
/// its timers. `Denied` aborts start; `Unavailable` degrades the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessStatus {
    Granted,
    Denied,
    Unavailable,
}

/// Handle for an active push subscription.
///
/// `cancel` is safe to call repeatedly and safe on a handle whose
/// subscription failed or never started; it never returns an error.
#[derive(Debug)]
pub struct SubscriptionHandle {
    label: &'static str,
    task: Option<JoinHandle<()>>,
}

impl SubscriptionHandle {
    pub fn new(label: &'static str, task: JoinHandle<()>) -> Self {
        Self {
            label,
            task: Some(task),
        }
    }

    /// Handle representing a subscription that never produced a task
    pub fn inert(label: &'static str) -> Self {
        Self { label, task: None }
    }

    /// Stop the underlying delivery task. Idempotent, no-throw.
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("Cancelled {} subscription", self.label);
        }
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Pull-based position source. The fast timer queries it; a `None` fix is
/// the normal answer for "nothing known right now".
#[async_trait]
pub trait PositionSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Requested exactly once, before any timer is armed
    async fn request_access(&self) -> AccessStatus;

    async fn sample_once(&self) -> Result<Option<PositionFix>>;
}

/// Push-based motion source: delivers raw vector readings into the channel
/// until cancelled or the receiver is dropped.
#[async_trait]
pub trait MotionSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn subscribe(&self, tx: mpsc::Sender<MotionReading>) -> Result<SubscriptionHandle>;
}

/// Push-based step-count source: delivers the platform's cumulative total,
/// not deltas. Delta computation belongs to the aggregator.
#[async_trait]
pub trait StepSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn subscribe(&self, tx: mpsc::Sender<StepReading>) -> Result<SubscriptionHandle>;
}

/// Minimum-gap filter for noisy push sources. Uses the tokio clock so
/// paused-time tests see consistent behavior.
#[derive(Debug)]
pub struct Throttle {
    min_gap: Duration,
    last_accepted: Option<Instant>,
}

impl Throttle {
    pub fn new(min_gap: Duration) -> Self {
        Self {
            min_gap,
            last_accepted: None,
        }
    }

    /// True when enough time has passed since the last accepted sample
    pub fn accept(&mut self) -> bool {
        let now = Instant::now();
        match self.last_accepted {
            Some(last) if now.duration_since(last) < self.min_gap => false,
            _ => {
                self.last_accepted = Some(now);
                true
            }
        }
    }
}

/// Probe the configured position providers in order; first one that
/// initializes wins and is held for the process lifetime.
pub fn select_position_source(config: &SensorConfig) -> Option<Box<dyn PositionSource>> {
    for name in &config.position_providers {
        match name.as_str() {
            "replay" => match &config.position_replay_path {
                Some(path) => match ReplayPositionSource::from_file(path) {
                    Ok(source) => {
                        info!("Selected position provider: replay ({})", path);
                        return Some(Box::new(source));
                    }
                    Err(e) => warn!("Replay position provider unavailable: {}", e),
                },
                None => debug!("Replay position provider skipped: no fixture path configured"),
            },
            "simulated" => {
                info!("Selected position provider: simulated");
                return Some(Box::new(SimulatedPositionSource::new()));
            }
            other => warn!("Unknown position provider '{}' skipped", other),
        }
    }
    warn!("No position provider available; source degraded");
    None
}

/// Probe the configured motion providers in order
pub fn select_motion_source(config: &SensorConfig) -> Option<Box<dyn MotionSource>> {
    for name in &config.motion_providers {
        match name.as_str() {
            "replay" => match &config.motion_replay_path {
                Some(path) => match ReplayMotionSource::from_file(path) {
                    Ok(source) => {
                        info!("Selected motion provider: replay ({})", path);
                        return Some(Box::new(source));
                    }
                    Err(e) => warn!("Replay motion provider unavailable: {}", e),
                },
                None => debug!("Replay motion provider skipped: no fixture path configured"),
            },
            "simulated" => {
                info!("Selected motion provider: simulated");
                return Some(Box::new(SimulatedMotionSource::new()));
            }
            other => warn!("Unknown motion provider '{}' skipped", other),
        }
    }
    warn!("No motion provider available; source degraded");
    None
}

/// Probe the configured step-count providers in order
pub fn select_step_source(config: &SensorConfig) -> Option<Box<dyn StepSource>> {
    for name in &config.step_providers {
        match name.as_str() {
            "replay" => match &config.step_replay_path {
                Some(path) => match ReplayStepSource::from_file(path) {
                    Ok(source) => {
                        info!("Selected step provider: replay ({})", path);
                        return Some(Box::new(source));
                    }
                    Err(e) => warn!("Replay step provider unavailable: {}", e),
                },
                None => debug!("Replay step provider skipped: no fixture path configured"),
            },
            "simulated" => {
                info!("Selected step provider: simulated");
                return Some(Box::new(SimulatedStepSource::new()));
            }
            other => warn!("Unknown step provider '{}' skipped", other),
        }
    }
    warn!("No step provider available; source degraded");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FitrecConfig;

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let task = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });
        let mut handle = SubscriptionHandle::new("test", task);
        assert!(handle.is_active());

        handle.cancel();
        handle.cancel();
        handle.cancel();
        assert!(!handle.is_active());
    }

    #[tokio::test]
    async fn test_inert_handle_cancel_safe() {
        let mut handle = SubscriptionHandle::inert("test");
        assert!(!handle.is_active());
        handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_min_gap() {
        let mut throttle = Throttle::new(Duration::from_millis(200));

        assert!(throttle.accept());
        assert!(!throttle.accept());

        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(!throttle.accept());

        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(throttle.accept());
        assert!(!throttle.accept());
    }

    #[test]
    fn test_probe_falls_through_to_simulated() {
        // "replay" is configured first but no fixture path is set
        let config = FitrecConfig::default().sensors;
        assert!(select_position_source(&config).is_some());
        assert!(select_motion_source(&config).is_some());
        assert!(select_step_source(&config).is_some());
    }

    #[test]
    fn test_probe_unknown_providers_yield_none() {
        let mut config = FitrecConfig::default().sensors;
        config.position_providers = vec!["bogus".to_string()];
        config.motion_providers = vec![];
        config.step_providers = vec!["also-bogus".to_string()];

        assert!(select_position_source(&config).is_none());
        assert!(select_motion_source(&config).is_none());
        assert!(select_step_source(&config).is_none());
    }
}
