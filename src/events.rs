use crate::error::EventBusError;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Events that can occur during the attendance pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AttendanceEvent {
    /// The operator requested an attendance marking
    MarkRequested { timestamp: SystemTime },
    /// A new attendance attempt has started
    AttemptStarted {
        attempt_id: String,
        timestamp: SystemTime,
    },
    /// The permission gate finished an acquisition pass
    PermissionsEvaluated {
        location_granted: bool,
        camera_granted: bool,
        battery_available: bool,
        timestamp: SystemTime,
    },
    /// Location and battery context were captured for the attempt
    ContextCaptured {
        attempt_id: String,
        location: String,
        battery_percent: u8,
        timestamp: SystemTime,
    },
    /// A still photo was captured for the attempt
    PhotoCaptured {
        attempt_id: String,
        byte_count: usize,
        timestamp: SystemTime,
    },
    /// A submission request is about to be sent
    SubmissionStarted {
        attempt_id: String,
        timestamp: SystemTime,
    },
    /// A submission call completed with a classified outcome
    SubmissionCompleted {
        attempt_id: String,
        outcome: String,
        timestamp: SystemTime,
    },
    /// The persisted credential was cleared after an auth failure
    CredentialCleared { timestamp: SystemTime },
    /// The attempt was abandoned before any submission was sent
    AttemptAbandoned {
        attempt_id: String,
        timestamp: SystemTime,
    },
    /// A system error occurred in a component
    SystemError { component: String, error: String },
    /// System shutdown requested
    ShutdownRequested {
        timestamp: SystemTime,
        reason: String,
    },
}

impl AttendanceEvent {
    /// Get the timestamp of the event
    pub fn timestamp(&self) -> SystemTime {
        match self {
            AttendanceEvent::MarkRequested { timestamp } => *timestamp,
            AttendanceEvent::AttemptStarted { timestamp, .. } => *timestamp,
            AttendanceEvent::PermissionsEvaluated { timestamp, .. } => *timestamp,
            AttendanceEvent::ContextCaptured { timestamp, .. } => *timestamp,
            AttendanceEvent::PhotoCaptured { timestamp, .. } => *timestamp,
            AttendanceEvent::SubmissionStarted { timestamp, .. } => *timestamp,
            AttendanceEvent::SubmissionCompleted { timestamp, .. } => *timestamp,
            AttendanceEvent::CredentialCleared { timestamp } => *timestamp,
            AttendanceEvent::AttemptAbandoned { timestamp, .. } => *timestamp,
            AttendanceEvent::SystemError { .. } => SystemTime::now(),
            AttendanceEvent::ShutdownRequested { timestamp, .. } => *timestamp,
        }
    }

    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            AttendanceEvent::MarkRequested { .. } => "Attendance marking requested".to_string(),
            AttendanceEvent::AttemptStarted { attempt_id, .. } => {
                format!("Attempt started: {}", attempt_id)
            }
            AttendanceEvent::PermissionsEvaluated {
                location_granted,
                camera_granted,
                battery_available,
                ..
            } => {
                format!(
                    "Permissions evaluated (location: {}, camera: {}, battery: {})",
                    location_granted, camera_granted, battery_available
                )
            }
            AttendanceEvent::ContextCaptured {
                attempt_id,
                location,
                battery_percent,
                ..
            } => {
                format!(
                    "Context captured for {}: {} at {}% battery",
                    attempt_id, location, battery_percent
                )
            }
            AttendanceEvent::PhotoCaptured {
                attempt_id,
                byte_count,
                ..
            } => {
                format!("Photo captured for {} ({} bytes)", attempt_id, byte_count)
            }
            AttendanceEvent::SubmissionStarted { attempt_id, .. } => {
                format!("Submission started: {}", attempt_id)
            }
            AttendanceEvent::SubmissionCompleted {
                attempt_id,
                outcome,
                ..
            } => {
                format!("Submission completed: {} ({})", attempt_id, outcome)
            }
            AttendanceEvent::CredentialCleared { .. } => "Credential cleared".to_string(),
            AttendanceEvent::AttemptAbandoned { attempt_id, .. } => {
                format!("Attempt abandoned: {}", attempt_id)
            }
            AttendanceEvent::SystemError { component, error } => {
                format!("Error in {}: {}", component, error)
            }
            AttendanceEvent::ShutdownRequested { reason, .. } => {
                format!("Shutdown requested: {}", reason)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            AttendanceEvent::MarkRequested { .. } => "mark_requested",
            AttendanceEvent::AttemptStarted { .. } => "attempt_started",
            AttendanceEvent::PermissionsEvaluated { .. } => "permissions_evaluated",
            AttendanceEvent::ContextCaptured { .. } => "context_captured",
            AttendanceEvent::PhotoCaptured { .. } => "photo_captured",
            AttendanceEvent::SubmissionStarted { .. } => "submission_started",
            AttendanceEvent::SubmissionCompleted { .. } => "submission_completed",
            AttendanceEvent::CredentialCleared { .. } => "credential_cleared",
            AttendanceEvent::AttemptAbandoned { .. } => "attempt_abandoned",
            AttendanceEvent::SystemError { .. } => "system_error",
            AttendanceEvent::ShutdownRequested { .. } => "shutdown_requested",
        }
    }
}

/// Async event bus for component coordination using broadcast channels
pub struct EventBus {
    sender: broadcast::Sender<AttendanceEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<AttendanceEvent> {
        self.sender.subscribe()
    }

    /// Number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Publish an event to all subscribers
    pub async fn publish(&self, event: AttendanceEvent) -> Result<usize, EventBusError> {
        // Log important events at appropriate levels
        match &event {
            AttendanceEvent::SystemError { component, error } => {
                error!("System error in {}: {}", component, error);
            }
            AttendanceEvent::SubmissionCompleted {
                attempt_id,
                outcome,
                ..
            } => {
                info!("Submission for {} completed: {}", attempt_id, outcome);
            }
            AttendanceEvent::CredentialCleared { .. } => {
                warn!("Persisted credential cleared");
            }
            AttendanceEvent::ShutdownRequested { reason, .. } => {
                info!("Shutdown requested: {}", reason);
            }
            _ => {
                debug!("Publishing event: {}", event.description());
            }
        }

        self.sender
            .send(event)
            .map_err(|_| EventBusError::NoSubscribers)
    }
}
