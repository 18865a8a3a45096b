pub mod attempt;
pub mod camera;
pub mod config;
pub mod context;
pub mod credentials;
pub mod error;
pub mod events;
pub mod permissions;
pub mod presenter;
pub mod submission;
pub mod trigger;

pub use attempt::{AttemptCoordinator, AttemptReport};
pub use camera::{CapturedPhoto, StillCamera, PHOTO_FILENAME, PHOTO_MIME_TYPE};
pub use config::AttendcamConfig;
pub use context::{
    BatteryMonitor, BatteryReading, FixedLocationProvider, GeoFix, LocationProvider,
    MockLocationProvider,
};
pub use credentials::{CredentialStore, TOKEN_KEYS};
pub use error::{
    AttemptError, AttendcamError, CaptureError, CredentialError, Result, SubmissionError,
};
pub use events::{AttendanceEvent, EventBus};
pub use permissions::{Availability, PermissionGate, PermissionState, PermissionStatus};
pub use presenter::{
    ConsolePresenter, NavigationTarget, PermissionPromptAnswer, Presenter, ScriptedPresenter,
};
pub use submission::{
    classify_response, AttendanceSubmission, RecoveryAction, ResponseBody, SubmissionClient,
    SubmissionOutcome,
};
pub use trigger::KeyboardTrigger;
