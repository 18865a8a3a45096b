use thiserror::Error;

#[derive(Error, Debug)]
pub enum AttendcamError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Submission error: {0}")]
    Submission(#[from] SubmissionError),

    #[error("Attempt error: {0}")]
    Attempt(#[from] AttemptError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl AttendcamError {
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
}

/// Errors raised while acquiring context or photo input for an attempt.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Camera is not ready: {details}")]
    CameraNotReady { details: String },

    #[error("Camera configuration failed: {details}")]
    CameraConfiguration { details: String },

    #[error("Camera capture failed: {details}")]
    CameraCapture { details: String },

    #[error("Location is unavailable: {details}")]
    LocationUnavailable { details: String },
}

/// Errors from the persisted credential store.
#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Failed to read credential store {path}: {source}")]
    StoreRead {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to write credential store {path}: {source}")]
    StoreWrite {
        path: String,
        source: std::io::Error,
    },

    #[error("Credential store {path} is not valid TOML: {source}")]
    StoreParse {
        path: String,
        source: toml::de::Error,
    },

    #[error("Failed to serialize credential store: {0}")]
    StoreSerialize(#[from] toml::ser::Error),
}

/// Client-local submission failures. Server-classified results are not
/// errors; they are `SubmissionOutcome` variants.
#[derive(Error, Debug)]
pub enum SubmissionError {
    #[error("Submission is missing required input: {missing}")]
    Incomplete { missing: &'static str },

    #[error("Invalid submission endpoint {url}: {details}")]
    InvalidEndpoint { url: String, details: String },

    #[error("Failed to build HTTP client: {details}")]
    ClientBuild { details: String },

    #[error("Failed to assemble multipart body: {details}")]
    Multipart { details: String },
}

/// Errors in attempt lifecycle management.
#[derive(Error, Debug)]
pub enum AttemptError {
    #[error("Another attendance attempt is already in flight")]
    AttemptInProgress,
}

/// Event bus publishing errors.
#[derive(Error, Debug)]
pub enum EventBusError {
    #[error("Failed to publish event: no active subscribers")]
    NoSubscribers,
}

pub type Result<T> = std::result::Result<T, AttendcamError>;
