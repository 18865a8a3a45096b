use crate::camera::StillCamera;
use crate::context::{BatteryMonitor, LocationProvider};
use crate::presenter::{PermissionPromptAnswer, Presenter};
use std::sync::Arc;
use tracing::{debug, warn};

/// Grant state of a mandatory capability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
}

impl PermissionStatus {
    pub fn is_granted(&self) -> bool {
        matches!(self, PermissionStatus::Granted)
    }
}

/// Availability of an advisory capability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Available,
    Unavailable,
}

/// The gate's last acquisition result, threaded through the pipeline as an
/// explicit value. Never read from ambient state; re-evaluated only on an
/// explicit retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionState {
    pub location: PermissionStatus,
    pub camera: PermissionStatus,
    pub battery: Availability,
}

impl PermissionState {
    /// Location and camera are both mandatory for capture; battery is
    /// advisory and never blocks.
    pub fn capture_allowed(&self) -> bool {
        self.location.is_granted() && self.camera.is_granted()
    }

    /// Names of the denied mandatory capabilities, for prompts and logs
    pub fn denied_capabilities(&self) -> Vec<&'static str> {
        let mut denied = Vec::new();
        if !self.location.is_granted() {
            denied.push("location");
        }
        if !self.camera.is_granted() {
            denied.push("camera");
        }
        denied
    }
}

/// Acquires the terminal's capture capabilities and reports their state.
pub struct PermissionGate {
    location: Arc<dyn LocationProvider>,
    camera: Arc<StillCamera>,
    battery: Arc<BatteryMonitor>,
}

impl PermissionGate {
    pub fn new(
        location: Arc<dyn LocationProvider>,
        camera: Arc<StillCamera>,
        battery: Arc<BatteryMonitor>,
    ) -> Self {
        Self {
            location,
            camera,
            battery,
        }
    }

    /// Probe all three capabilities. Each probe is independent: one failing
    /// never blocks the others, and this method never raises. Absence of a
    /// capability is represented in the returned state.
    pub async fn acquire_all(&self) -> PermissionState {
        let location = if self.location.is_available() {
            PermissionStatus::Granted
        } else {
            warn!("Location capability denied: no provider available");
            PermissionStatus::Denied
        };

        let camera = if self.camera.probe().await {
            PermissionStatus::Granted
        } else {
            warn!("Camera capability denied: probe failed");
            PermissionStatus::Denied
        };

        let battery = if self.battery.is_available().await {
            Availability::Available
        } else {
            warn!("Battery capability unavailable; submissions will default to 0%");
            Availability::Unavailable
        };

        let state = PermissionState {
            location,
            camera,
            battery,
        };

        debug!("Permission acquisition result: {:?}", state);
        state
    }

    /// Acquire capabilities, prompting the operator to retry while a
    /// mandatory capability is denied. "Continue anyway" exits the loop with
    /// the denied state intact; the caller must still refuse to capture.
    pub async fn acquire_with_prompt(&self, presenter: &dyn Presenter) -> PermissionState {
        loop {
            let state = self.acquire_all().await;

            if state.capture_allowed() {
                return state;
            }

            match presenter.prompt_permission_retry(&state).await {
                PermissionPromptAnswer::Retry => {
                    debug!("Operator chose to retry permission acquisition");
                    continue;
                }
                PermissionPromptAnswer::ContinueAnyway => {
                    warn!(
                        "Operator continued with denied capabilities: {:?}",
                        state.denied_capabilities()
                    );
                    return state;
                }
            }
        }
    }
}
