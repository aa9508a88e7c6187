use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Sensor sources feeding the recorder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Position,
    Motion,
    StepCount,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Position => "position",
            SourceKind::Motion => "motion",
            SourceKind::StepCount => "stepcount",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

/// Result of one position pull: last known coordinate plus ground speed
/// in m/s when the backend reports one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PositionFix {
    pub coordinate: Coordinate,
    pub speed_ms: Option<f64>,
}

impl PositionFix {
    /// Ground speed converted to km/h, if the fix carried one
    pub fn speed_kmh(&self) -> Option<f64> {
        self.speed_ms.filter(|s| s.is_finite()).map(|s| s * 3.6)
    }
}

/// Raw motion event: rotational rate and/or linear acceleration vectors,
/// whichever the backend exposes.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MotionReading {
    pub rotation: Option<[f64; 3]>,
    pub acceleration: Option<[f64; 3]>,
}

impl MotionReading {
    /// Scalar magnitude: Euclidean norm of the rotation-rate vector when
    /// present, acceleration as the fallback. The priority is fixed; a
    /// reading carrying both always yields the rotation norm.
    pub fn magnitude(&self) -> Option<f64> {
        self.rotation
            .or(self.acceleration)
            .map(|[x, y, z]| (x * x + y * y + z * z).sqrt())
    }
}

/// Cumulative step count as reported by the platform counter
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StepReading {
    pub total: u64,
}

/// Aggregated window values handed from the aggregator to the flush path
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowSnapshot {
    pub avg_speed: Option<f64>,
    pub avg_motion: Option<f64>,
    pub steps_delta: u64,
    pub coordinate: Option<Coordinate>,
}

/// The persisted unit: one row in `activity_log` per summarization tick.
/// Immutable once constructed. Null fields mean "no data this window",
/// never "measured zero".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub avg_speed: Option<f64>,
    pub gyro_movement: Option<f64>,
    pub steps: i64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub day_of_week: String,
}

impl ActivityRecord {
    /// Build a record from a window snapshot at the given flush instant
    pub fn from_snapshot(snapshot: &WindowSnapshot, at: DateTime<Utc>) -> Self {
        Self {
            avg_speed: snapshot.avg_speed.filter(|v| v.is_finite()),
            gyro_movement: snapshot.avg_motion.filter(|v| v.is_finite()),
            steps: snapshot.steps_delta as i64,
            latitude: snapshot.coordinate.map(|c| c.latitude),
            longitude: snapshot.coordinate.map(|c| c.longitude),
            timestamp: at,
            day_of_week: at.format("%A").to_string(),
        }
    }

    /// ISO-8601 instant with millisecond precision, UTC
    pub fn timestamp_iso(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_motion_magnitude_prefers_rotation() {
        let reading = MotionReading {
            rotation: Some([3.0, 4.0, 0.0]),
            acceleration: Some([100.0, 0.0, 0.0]),
        };
        assert_eq!(reading.magnitude(), Some(5.0));
    }

    #[test]
    fn test_motion_magnitude_acceleration_fallback() {
        let reading = MotionReading {
            rotation: None,
            acceleration: Some([0.0, 0.0, 9.81]),
        };
        assert!((reading.magnitude().unwrap() - 9.81).abs() < 1e-9);

        let empty = MotionReading::default();
        assert!(empty.magnitude().is_none());
    }

    #[test]
    fn test_speed_conversion() {
        let fix = PositionFix {
            coordinate: Coordinate {
                latitude: 59.3,
                longitude: 18.0,
            },
            speed_ms: Some(2.5),
        };
        assert!((fix.speed_kmh().unwrap() - 9.0).abs() < 1e-9);

        let no_speed = PositionFix {
            coordinate: fix.coordinate,
            speed_ms: None,
        };
        assert!(no_speed.speed_kmh().is_none());

        let nan_speed = PositionFix {
            coordinate: fix.coordinate,
            speed_ms: Some(f64::NAN),
        };
        assert!(nan_speed.speed_kmh().is_none());
    }

    #[test]
    fn test_record_from_snapshot() {
        let snapshot = WindowSnapshot {
            avg_speed: None,
            avg_motion: Some(1.25),
            steps_delta: 12,
            coordinate: Some(Coordinate {
                latitude: 59.3,
                longitude: 18.0,
            }),
        };
        // A Monday
        let at = Utc.with_ymd_and_hms(2024, 4, 1, 12, 30, 0).unwrap();
        let record = ActivityRecord::from_snapshot(&snapshot, at);

        assert_eq!(record.avg_speed, None);
        assert_eq!(record.gyro_movement, Some(1.25));
        assert_eq!(record.steps, 12);
        assert_eq!(record.latitude, Some(59.3));
        assert_eq!(record.day_of_week, "Monday");
        assert_eq!(record.timestamp_iso(), "2024-04-01T12:30:00.000Z");
    }
}
