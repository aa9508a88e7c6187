use crate::error::{FitrecError, Result};
use crate::sample::ActivityRecord;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Outbound payload for the decision endpoint: the summary fields plus an
/// event tag and the day-of-week string.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionPayload {
    pub event: &'static str,
    pub avg_speed: Option<f64>,
    pub gyro_movement: Option<f64>,
    pub steps: i64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub timestamp: String,
    pub day_of_week: String,
}

impl DecisionPayload {
    pub fn from_record(record: &ActivityRecord) -> Self {
        Self {
            event: "activity_summary",
            avg_speed: record.avg_speed,
            gyro_movement: record.gyro_movement,
            steps: record.steps,
            latitude: record.latitude,
            longitude: record.longitude,
            timestamp: record.timestamp_iso(),
            day_of_week: record.day_of_week.clone(),
        }
    }
}

/// One notification description returned by the decision endpoint
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct NotificationSpec {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub id: Option<String>,
}

fn default_title() -> String {
    "Reminder".to_string()
}

/// Decision endpoint response; a missing `notifications` key means no action
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DecisionResponse {
    #[serde(default)]
    pub notifications: Vec<NotificationSpec>,
}

/// A notification to place on the local device scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalNotification {
    pub id: String,
    pub title: String,
    pub body: String,
    /// Delay before delivery; staggered so a batch never fires at once
    pub fire_in: Duration,
}

/// External decision endpoint seam; tests inject fakes
#[async_trait]
pub trait DecisionEndpoint: Send + Sync {
    async fn check(&self, payload: &DecisionPayload) -> Result<Vec<NotificationSpec>>;
}

/// Local notification scheduler seam
#[async_trait]
pub trait LocalNotifier: Send + Sync {
    async fn schedule(&self, notification: LocalNotification) -> Result<()>;
}

/// reqwest-backed decision endpoint with a bounded request timeout
pub struct HttpDecisionEndpoint {
    client: reqwest::Client,
    url: String,
}

impl HttpDecisionEndpoint {
    pub fn new(url: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl DecisionEndpoint for HttpDecisionEndpoint {
    async fn check(&self, payload: &DecisionPayload) -> Result<Vec<NotificationSpec>> {
        let response = self.client.post(&self.url).json(payload).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FitrecError::component(
                "notify".to_string(),
                format!("decision endpoint responded with {}", status),
            ));
        }

        let decision: DecisionResponse = response.json().await?;
        Ok(decision.notifications)
    }
}

/// Headless delivery: notifications surface through the log stream
pub struct LogNotifier;

#[async_trait]
impl LocalNotifier for LogNotifier {
    async fn schedule(&self, notification: LocalNotification) -> Result<()> {
        info!(
            id = %notification.id,
            fire_in_ms = notification.fire_in.as_millis() as u64,
            "Notification: {}: {}",
            notification.title,
            notification.body
        );
        Ok(())
    }
}

/// Rate-limited bridge between successful persists and local notifications.
///
/// At most one endpoint check per cool-down window; calls inside the window
/// are skipped silently, not queued. The last-check timestamp advances only
/// when a check is actually performed. Endpoint failures are logged and
/// never reach the scheduler.
pub struct NotificationTrigger {
    endpoint: Option<Box<dyn DecisionEndpoint>>,
    notifier: Box<dyn LocalNotifier>,
    cooldown: Duration,
    stagger: Duration,
    last_check: Mutex<Option<Instant>>,
    checks_performed: AtomicU64,
}

impl NotificationTrigger {
    pub fn new(
        endpoint: Option<Box<dyn DecisionEndpoint>>,
        notifier: Box<dyn LocalNotifier>,
        cooldown: Duration,
        stagger: Duration,
    ) -> Self {
        if endpoint.is_none() {
            debug!("No decision endpoint configured; notification checks disabled");
        }
        Self {
            endpoint,
            notifier,
            cooldown,
            stagger,
            last_check: Mutex::new(None),
            checks_performed: AtomicU64::new(0),
        }
    }

    /// Evaluate one persisted summary. Invoked only after a successful
    /// flush; always returns without error.
    pub async fn maybe_notify(&self, record: &ActivityRecord) {
        let Some(endpoint) = &self.endpoint else {
            return;
        };

        // Cool-down gate; the timestamp advances at the moment we commit
        // to performing the check
        {
            let mut last_check = self.last_check.lock();
            let now = Instant::now();
            if let Some(last) = *last_check {
                if now.duration_since(last) < self.cooldown {
                    debug!("Notification check skipped: within cool-down");
                    return;
                }
            }
            *last_check = Some(now);
        }

        self.checks_performed.fetch_add(1, Ordering::Relaxed);
        let payload = DecisionPayload::from_record(record);

        let specs = match endpoint.check(&payload).await {
            Ok(specs) => specs,
            Err(e) => {
                warn!("Decision endpoint check failed: {}", e);
                return;
            }
        };

        if specs.is_empty() {
            debug!("Decision endpoint returned no notifications");
            return;
        }

        for (index, spec) in specs.into_iter().enumerate() {
            let notification = LocalNotification {
                id: spec.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
                title: spec.title,
                body: spec.body,
                fire_in: self.stagger * (index as u32 + 1),
            };
            if let Err(e) = self.notifier.schedule(notification).await {
                warn!("Failed to schedule local notification: {}", e);
            }
        }
    }

    pub fn checks_performed(&self) -> u64 {
        self.checks_performed.load(Ordering::Relaxed)
    }
}
