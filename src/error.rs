use thiserror::Error;

#[derive(Error, Debug)]
pub enum FitrecError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Sensor error in {source_kind}: {message}")]
    Sensor {
        source_kind: String,
        message: String,
    },

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl FitrecError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }

    pub fn sensor<S: Into<String>>(source_kind: S, message: S) -> Self {
        Self::Sensor {
            source_kind: source_kind.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FitrecError>;
