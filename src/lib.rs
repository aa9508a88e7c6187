pub mod aggregator;
pub mod config;
pub mod error;
pub mod notify;
pub mod recorder;
pub mod rolling;
pub mod sample;
pub mod sensor;
pub mod storage;

pub use aggregator::SampleAggregator;
pub use config::FitrecConfig;
pub use error::{FitrecError, Result};
pub use notify::{
    DecisionEndpoint, DecisionPayload, DecisionResponse, HttpDecisionEndpoint, LocalNotification,
    LocalNotifier, LogNotifier, NotificationSpec, NotificationTrigger,
};
pub use recorder::{ActivityRecorder, ActivityRecorderBuilder, LifecycleState};
pub use rolling::{RollingBuffer, RollingBufferStats};
pub use sample::{
    ActivityRecord, Coordinate, MotionReading, PositionFix, SourceKind, StepReading,
    WindowSnapshot,
};
pub use sensor::{
    AccessStatus, MotionSource, PositionSource, ReplayMotionSource, ReplayPositionSource,
    ReplayStepSource, SimulatedMotionSource, SimulatedPositionSource, SimulatedStepSource,
    StepSource, SubscriptionHandle,
};
pub use storage::{ActivityStore, StoreStatsSnapshot};
