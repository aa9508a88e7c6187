use async_trait::async_trait;
use fitrec::notify::{DecisionEndpoint, DecisionPayload, LocalNotifier, NotificationSpec};
use fitrec::sample::{Coordinate, MotionReading, PositionFix, StepReading};
use fitrec::sensor::{ReplayMotionSource, ReplayPositionSource, ReplayStepSource};
use fitrec::{ActivityRecorder, ActivityStore, FitrecConfig, LocalNotification, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct FakeEndpoint {
    specs: Vec<NotificationSpec>,
    calls: AtomicU64,
}

impl FakeEndpoint {
    fn returning(specs: Vec<NotificationSpec>) -> Arc<Self> {
        Arc::new(Self {
            specs,
            calls: AtomicU64::new(0),
        })
    }
}

// The traits are foreign here, so the shared fakes go behind local
// newtype handles instead of impls on Arc directly
struct EndpointHandle(Arc<FakeEndpoint>);

#[async_trait]
impl DecisionEndpoint for EndpointHandle {
    async fn check(&self, _payload: &DecisionPayload) -> Result<Vec<NotificationSpec>> {
        self.0.calls.fetch_add(1, Ordering::Relaxed);
        Ok(self.0.specs.clone())
    }
}

#[derive(Default)]
struct RecordingNotifier {
    scheduled: Mutex<Vec<LocalNotification>>,
}

struct NotifierHandle(Arc<RecordingNotifier>);

#[async_trait]
impl LocalNotifier for NotifierHandle {
    async fn schedule(&self, notification: LocalNotification) -> Result<()> {
        self.0.scheduled.lock().push(notification);
        Ok(())
    }
}

fn fast_config(dir: &TempDir) -> FitrecConfig {
    let mut config = FitrecConfig::default();
    config.storage.database_path = dir
        .path()
        .join("lifecycle.sqlite")
        .to_string_lossy()
        .to_string();
    config.recorder.sample_interval_secs = 1;
    config.recorder.record_interval_secs = 1;
    config
}

#[tokio::test]
async fn warmup_flush_populates_store_quickly() {
    let dir = TempDir::new().unwrap();
    let recorder = ActivityRecorder::new(fast_config(&dir)).unwrap();

    recorder.start().await.unwrap();
    // Warm-up fires at min(5s, record interval) = 1s
    tokio::time::sleep(Duration::from_millis(1600)).await;
    recorder.stop();

    assert!(recorder.flushes_completed() >= 1);
    assert!(recorder.store().record_count().await.unwrap() >= 1);
}

#[tokio::test]
async fn notification_scheduled_once_within_cooldown() {
    let dir = TempDir::new().unwrap();
    let endpoint = FakeEndpoint::returning(vec![NotificationSpec {
        title: "T".to_string(),
        body: "B".to_string(),
        id: None,
    }]);
    let notifier = Arc::new(RecordingNotifier::default());

    let recorder = ActivityRecorder::builder(fast_config(&dir))
        .decision_endpoint(Box::new(EndpointHandle(Arc::clone(&endpoint))))
        .notifier(Box::new(NotifierHandle(Arc::clone(&notifier))))
        .build()
        .unwrap();

    recorder.start().await.unwrap();
    // Several flushes land inside the 5 minute cool-down
    tokio::time::sleep(Duration::from_millis(2600)).await;
    recorder.stop();

    assert!(recorder.flushes_completed() >= 2);
    // Only the first flush performed an endpoint check
    assert_eq!(endpoint.calls.load(Ordering::Relaxed), 1);

    let scheduled = notifier.scheduled.lock();
    assert_eq!(scheduled.len(), 1);
    assert_eq!(scheduled[0].title, "T");
    assert_eq!(scheduled[0].body, "B");
}

#[tokio::test]
async fn storage_failure_does_not_stop_scheduler() {
    let dir = TempDir::new().unwrap();
    // A directory path makes every open fail
    let broken_store = ActivityStore::new(dir.path());

    let recorder = ActivityRecorder::builder(fast_config(&dir))
        .store(broken_store)
        .build()
        .unwrap();

    recorder.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(2600)).await;

    // Still running; every window attempted and failed, none crashed it
    assert!(recorder.is_running());
    assert!(recorder.flushes_completed() >= 2);
    let stats = recorder.store().stats();
    assert!(stats.write_failures >= 2);
    assert_eq!(stats.records_written, 0);

    recorder.stop();
}

#[tokio::test]
async fn replayed_sensors_roundtrip_into_records() {
    let dir = TempDir::new().unwrap();
    let config = fast_config(&dir);

    let position = ReplayPositionSource::from_fixes(vec![
        PositionFix {
            coordinate: Coordinate {
                latitude: 59.3,
                longitude: 18.0,
            },
            speed_ms: Some(2.5),
        };
        4
    ]);
    let motion = ReplayMotionSource::from_readings(
        vec![
            MotionReading {
                rotation: Some([0.3, 0.4, 0.0]),
                acceleration: None,
            };
            10
        ],
        Duration::from_millis(250),
    );
    // Includes a counter regression mid-run
    let steps = ReplayStepSource::from_readings(
        vec![
            StepReading { total: 10 },
            StepReading { total: 2 },
            StepReading { total: 7 },
        ],
        Duration::from_millis(300),
    );

    let recorder = ActivityRecorder::builder(config)
        .position_source(Box::new(position))
        .motion_source(Box::new(motion))
        .step_source(Box::new(steps))
        .build()
        .unwrap();

    recorder.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(3600)).await;
    recorder.stop();

    let records = recorder.store().fetch_recent(20).await.unwrap();
    assert!(!records.is_empty());

    // Steps never negative; totals 10 then regress to 2 then 7: the
    // regression re-anchors the baseline at 2, so only 2 -> 7 counts
    let total_steps: i64 = records.iter().map(|r| r.steps).sum();
    assert!(records.iter().all(|r| r.steps >= 0));
    assert_eq!(total_steps, 5);

    // Position and motion made it into at least one window
    assert!(records.iter().any(|r| r.latitude == Some(59.3)));
    assert!(records
        .iter()
        .any(|r| r.gyro_movement.map_or(false, |m| (m - 0.5).abs() < 1e-9)));

    // Windows with no speed samples stay null, not zero
    for record in &records {
        if let Some(avg) = record.avg_speed {
            assert!(avg > 0.0);
        }
        assert!(!record.day_of_week.is_empty());
    }
}

#[tokio::test]
async fn restart_after_stop_records_again() {
    let dir = TempDir::new().unwrap();
    let recorder = ActivityRecorder::new(fast_config(&dir)).unwrap();

    recorder.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(1400)).await;
    recorder.stop();
    let after_first = recorder.flushes_completed();
    assert!(after_first >= 1);

    recorder.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(1400)).await;
    recorder.stop();

    assert!(recorder.flushes_completed() > after_first);
}
