use crate::aggregator::SampleAggregator;
use crate::config::FitrecConfig;
use crate::error::{FitrecError, Result};
use crate::notify::{
    DecisionEndpoint, HttpDecisionEndpoint, LocalNotifier, LogNotifier, NotificationTrigger,
};
use crate::sample::ActivityRecord;
use crate::sensor::{
    select_motion_source, select_position_source, select_step_source, AccessStatus, MotionSource,
    PositionSource, StepSource, SubscriptionHandle, Throttle,
};
use crate::storage::ActivityStore;
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Recorder lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Stopped,
    Starting,
    Running,
}

/// Background activity recorder.
///
/// Owns the sensor subscriptions, the two periodic timers and the warm-up
/// one-shot, the sample aggregator, the persistence sink and the
/// notification trigger. `start` is idempotent; `stop` is idempotent and
/// safe before any start. One instance per process is the intended shape;
/// UI-facing callers only ever touch `start`, `stop` and `is_running`.
pub struct ActivityRecorder {
    inner: Arc<RecorderInner>,
}

struct RecorderInner {
    config: FitrecConfig,
    lifecycle: Mutex<LifecycleState>,
    running: Arc<AtomicBool>,
    position_enabled: AtomicBool,
    aggregator: Arc<Mutex<SampleAggregator>>,
    store: Arc<ActivityStore>,
    trigger: Arc<NotificationTrigger>,
    position: Option<Arc<dyn PositionSource>>,
    motion: Option<Box<dyn MotionSource>>,
    steps: Option<Box<dyn StepSource>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    subscriptions: Mutex<Vec<SubscriptionHandle>>,
    flushes_completed: Arc<AtomicU64>,
}

impl ActivityRecorder {
    /// Build a recorder from configuration alone: providers are probed,
    /// the HTTP decision endpoint is wired when configured.
    pub fn new(config: FitrecConfig) -> Result<Self> {
        ActivityRecorderBuilder::new(config).build()
    }

    pub fn builder(config: FitrecConfig) -> ActivityRecorderBuilder {
        ActivityRecorderBuilder::new(config)
    }

    /// Start recording. No-op when already starting or running.
    ///
    /// Position access is requested before anything is armed; an explicit
    /// denial aborts cleanly (state back to `Stopped`, nothing armed) and
    /// is the only error this method surfaces. Missing or unavailable
    /// sources degrade with a warning.
    pub async fn start(&self) -> Result<()> {
        {
            let mut lifecycle = self.inner.lifecycle.lock();
            match *lifecycle {
                LifecycleState::Stopped => *lifecycle = LifecycleState::Starting,
                LifecycleState::Starting | LifecycleState::Running => {
                    debug!("Recorder start ignored: already {:?}", *lifecycle);
                    return Ok(());
                }
            }
        }

        info!("Starting activity recorder");

        // Location permission comes first; denial means we never arm a
        // recorder that cannot legally collect.
        match &self.inner.position {
            Some(position) => match position.request_access().await {
                AccessStatus::Granted => {
                    self.inner.position_enabled.store(true, Ordering::Relaxed);
                }
                AccessStatus::Denied => {
                    warn!("Location permission denied; recorder will not start");
                    *self.inner.lifecycle.lock() = LifecycleState::Stopped;
                    return Err(FitrecError::PermissionDenied);
                }
                AccessStatus::Unavailable => {
                    warn!("Position source unavailable; continuing degraded");
                    self.inner.position_enabled.store(false, Ordering::Relaxed);
                }
            },
            None => {
                self.inner.position_enabled.store(false, Ordering::Relaxed);
            }
        }

        if let Err(e) = self.inner.store.ensure_schema().await {
            // Storage trouble is not fatal to starting; each flush retries
            warn!("Could not ensure storage schema at start: {}", e);
        }

        self.inner.running.store(true, Ordering::Relaxed);

        self.subscribe_motion().await;
        self.subscribe_steps().await;
        self.spawn_sampling_timer();
        self.spawn_flush_timer();
        self.spawn_warmup_flush();

        *self.inner.lifecycle.lock() = LifecycleState::Running;
        info!(
            "Activity recorder running (sample every {:?}, flush every {:?})",
            self.inner.config.sample_interval(),
            self.inner.config.record_interval()
        );
        Ok(())
    }

    /// Stop recording. Idempotent and safe to call when never started.
    /// Timers are cancelled, subscriptions released best-effort; a tick
    /// already in flight is fenced off by the running flag.
    pub fn stop(&self) {
        {
            let mut lifecycle = self.inner.lifecycle.lock();
            if *lifecycle == LifecycleState::Stopped {
                debug!("Recorder stop ignored: not running");
                return;
            }
            *lifecycle = LifecycleState::Stopped;
        }

        info!("Stopping activity recorder");
        self.inner.running.store(false, Ordering::Relaxed);

        for mut subscription in self.inner.subscriptions.lock().drain(..) {
            subscription.cancel();
        }

        for task in self.inner.tasks.lock().drain(..) {
            task.abort();
        }

        info!("Activity recorder stopped");
    }

    pub fn is_running(&self) -> bool {
        *self.inner.lifecycle.lock() == LifecycleState::Running
    }

    pub fn lifecycle_state(&self) -> LifecycleState {
        *self.inner.lifecycle.lock()
    }

    /// Windows flushed (successfully or not) since construction
    pub fn flushes_completed(&self) -> u64 {
        self.inner.flushes_completed.load(Ordering::Relaxed)
    }

    /// Timer and intake tasks currently armed
    pub fn active_task_count(&self) -> usize {
        self.inner.tasks.lock().len()
    }

    /// Push subscriptions currently held
    pub fn active_subscription_count(&self) -> usize {
        self.inner.subscriptions.lock().len()
    }

    pub fn store(&self) -> Arc<ActivityStore> {
        Arc::clone(&self.inner.store)
    }

    async fn subscribe_motion(&self) {
        let Some(motion) = &self.inner.motion else {
            warn!("No motion source; source degraded for this run");
            return;
        };

        let (tx, mut rx) = mpsc::channel(64);
        match motion.subscribe(tx).await {
            Ok(handle) => {
                self.inner.subscriptions.lock().push(handle);

                let running = Arc::clone(&self.inner.running);
                let aggregator = Arc::clone(&self.inner.aggregator);
                let mut throttle = Throttle::new(self.inner.config.motion_throttle());

                let intake = tokio::spawn(async move {
                    while let Some(reading) = rx.recv().await {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        if !throttle.accept() {
                            continue;
                        }
                        if let Some(magnitude) = reading.magnitude() {
                            aggregator.lock().record_motion_sample(magnitude);
                        }
                    }
                    debug!("Motion intake finished");
                });
                self.inner.tasks.lock().push(intake);
            }
            Err(e) => warn!("Motion subscription failed; continuing degraded: {}", e),
        }
    }

    async fn subscribe_steps(&self) {
        let Some(steps) = &self.inner.steps else {
            warn!("No step source; source degraded for this run");
            return;
        };

        let (tx, mut rx) = mpsc::channel(64);
        match steps.subscribe(tx).await {
            Ok(handle) => {
                self.inner.subscriptions.lock().push(handle);

                let running = Arc::clone(&self.inner.running);
                let aggregator = Arc::clone(&self.inner.aggregator);

                let intake = tokio::spawn(async move {
                    while let Some(reading) = rx.recv().await {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        aggregator.lock().record_step_total(reading.total);
                    }
                    debug!("Step intake finished");
                });
                self.inner.tasks.lock().push(intake);
            }
            Err(e) => warn!("Step subscription failed; continuing degraded: {}", e),
        }
    }

    /// Fast tick: pull one position fix, record speed and last coordinate
    fn spawn_sampling_timer(&self) {
        let running = Arc::clone(&self.inner.running);
        let aggregator = Arc::clone(&self.inner.aggregator);
        let position = self.inner.position.clone();
        let position_enabled = self.inner.position_enabled.load(Ordering::Relaxed);
        let interval = self.inner.config.sample_interval();
        let query_timeout =
            std::time::Duration::from_secs(self.inner.config.sensors.position_timeout_secs);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The immediate first tick; sampling begins one interval in
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if !running.load(Ordering::Relaxed) {
                    break;
                }

                if !position_enabled {
                    continue;
                }
                let Some(position) = &position else {
                    continue;
                };

                match tokio::time::timeout(query_timeout, position.sample_once()).await {
                    Ok(Ok(Some(fix))) => {
                        let mut agg = aggregator.lock();
                        agg.record_position(fix.coordinate);
                        if let Some(kmh) = fix.speed_kmh() {
                            agg.record_speed_sample(kmh);
                        }
                    }
                    Ok(Ok(None)) => debug!("No position fix this tick"),
                    Ok(Err(e)) => debug!("Position query failed: {}", e),
                    Err(_) => debug!("Position query timed out"),
                }
            }
            debug!("Sampling timer finished");
        });
        self.inner.tasks.lock().push(task);
    }

    /// Slow tick: snapshot, persist, maybe notify
    fn spawn_flush_timer(&self) {
        let running = Arc::clone(&self.inner.running);
        let aggregator = Arc::clone(&self.inner.aggregator);
        let store = Arc::clone(&self.inner.store);
        let trigger = Arc::clone(&self.inner.trigger);
        let flushes = Arc::clone(&self.inner.flushes_completed);
        let interval = self.inner.config.record_interval();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if !running.load(Ordering::Relaxed) {
                    break;
                }
                flush_window(&running, &aggregator, &store, &trigger, &flushes).await;
            }
            debug!("Flush timer finished");
        });
        self.inner.tasks.lock().push(task);
    }

    /// One-shot early flush so the store is never empty for long after start
    fn spawn_warmup_flush(&self) {
        let running = Arc::clone(&self.inner.running);
        let aggregator = Arc::clone(&self.inner.aggregator);
        let store = Arc::clone(&self.inner.store);
        let trigger = Arc::clone(&self.inner.trigger);
        let flushes = Arc::clone(&self.inner.flushes_completed);
        let delay = self.inner.config.warmup_delay();

        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if running.load(Ordering::Relaxed) {
                debug!("Warm-up flush firing");
                flush_window(&running, &aggregator, &store, &trigger, &flushes).await;
            }
        });
        self.inner.tasks.lock().push(task);
    }
}

impl Drop for ActivityRecorder {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Execute one summarization tick.
///
/// The snapshot runs synchronously under the aggregator lock; buffers are
/// cleared before any await, so persistence works against captured values
/// and no sample can land in two windows. A failed persist skips the
/// notification check and the next tick retries naturally.
async fn flush_window(
    running: &AtomicBool,
    aggregator: &Mutex<SampleAggregator>,
    store: &ActivityStore,
    trigger: &NotificationTrigger,
    flushes: &AtomicU64,
) {
    if !running.load(Ordering::Relaxed) {
        return;
    }

    let snapshot = aggregator.lock().snapshot_and_reset();
    let record = ActivityRecord::from_snapshot(&snapshot, Utc::now());

    let persisted = store.flush(&record).await;
    flushes.fetch_add(1, Ordering::Relaxed);

    if persisted && running.load(Ordering::Relaxed) {
        trigger.maybe_notify(&record).await;
    }
}

/// Builder wiring the recorder's collaborators.
///
/// Anything not supplied explicitly is resolved from configuration: sensor
/// providers via ordered probing, the decision endpoint from
/// `notify.endpoint_url`, delivery through the log-backed notifier.
pub struct ActivityRecorderBuilder {
    config: FitrecConfig,
    position: Option<Box<dyn PositionSource>>,
    motion: Option<Box<dyn MotionSource>>,
    steps: Option<Box<dyn StepSource>>,
    endpoint: Option<Box<dyn DecisionEndpoint>>,
    notifier: Option<Box<dyn LocalNotifier>>,
    store: Option<ActivityStore>,
}

impl ActivityRecorderBuilder {
    pub fn new(config: FitrecConfig) -> Self {
        Self {
            config,
            position: None,
            motion: None,
            steps: None,
            endpoint: None,
            notifier: None,
            store: None,
        }
    }

    pub fn position_source(mut self, source: Box<dyn PositionSource>) -> Self {
        self.position = Some(source);
        self
    }

    pub fn motion_source(mut self, source: Box<dyn MotionSource>) -> Self {
        self.motion = Some(source);
        self
    }

    pub fn step_source(mut self, source: Box<dyn StepSource>) -> Self {
        self.steps = Some(source);
        self
    }

    pub fn decision_endpoint(mut self, endpoint: Box<dyn DecisionEndpoint>) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    pub fn notifier(mut self, notifier: Box<dyn LocalNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn store(mut self, store: ActivityStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> Result<ActivityRecorder> {
        let config = self.config;

        let position = self
            .position
            .or_else(|| select_position_source(&config.sensors));
        let motion = self.motion.or_else(|| select_motion_source(&config.sensors));
        let steps = self.steps.or_else(|| select_step_source(&config.sensors));

        let endpoint = match self.endpoint {
            Some(endpoint) => Some(endpoint),
            None => match &config.notify.endpoint_url {
                Some(url) => Some(Box::new(HttpDecisionEndpoint::new(
                    url.clone(),
                    std::time::Duration::from_secs(config.notify.request_timeout_secs),
                )?) as Box<dyn DecisionEndpoint>),
                None => None,
            },
        };

        let notifier = self.notifier.unwrap_or_else(|| Box::new(LogNotifier));
        let trigger = NotificationTrigger::new(
            endpoint,
            notifier,
            config.cooldown(),
            std::time::Duration::from_millis(config.notify.stagger_ms),
        );

        let store = self
            .store
            .unwrap_or_else(|| ActivityStore::new(&config.storage.database_path));

        let aggregator = SampleAggregator::new(
            config.recorder.speed_buffer_capacity,
            config.recorder.motion_buffer_capacity,
        );

        Ok(ActivityRecorder {
            inner: Arc::new(RecorderInner {
                config,
                lifecycle: Mutex::new(LifecycleState::Stopped),
                running: Arc::new(AtomicBool::new(false)),
                position_enabled: AtomicBool::new(false),
                aggregator: Arc::new(Mutex::new(aggregator)),
                store: Arc::new(store),
                trigger: Arc::new(trigger),
                position: position.map(Arc::from),
                motion,
                steps,
                tasks: Mutex::new(Vec::new()),
                subscriptions: Mutex::new(Vec::new()),
                flushes_completed: Arc::new(AtomicU64::new(0)),
            }),
        })
    }
}
