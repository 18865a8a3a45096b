use crate::camera::StillCamera;
use crate::config::AttendcamConfig;
use crate::context::{BatteryMonitor, LocationProvider};
use crate::credentials::CredentialStore;
use crate::error::{AttemptError, Result};
use crate::events::{AttendanceEvent, EventBus};
use crate::permissions::{Availability, PermissionGate, PermissionState};
use crate::presenter::{NavigationTarget, Presenter};
use crate::submission::{RecoveryAction, SubmissionClient, SubmissionOutcome};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How one attempt ended, for callers and tests
#[derive(Debug, Clone)]
pub struct AttemptReport {
    pub attempt_id: String,
    pub started_at: DateTime<Utc>,
    pub permissions: PermissionState,
    /// Last classified outcome, if any submission was sent
    pub outcome: Option<SubmissionOutcome>,
    pub navigation: Option<NavigationTarget>,
    pub submission_count: u32,
}

impl AttemptReport {
    fn new(attempt_id: String, permissions: PermissionState) -> Self {
        Self {
            attempt_id,
            started_at: Utc::now(),
            permissions,
            outcome: None,
            navigation: None,
            submission_count: 0,
        }
    }
}

/// Resets the in-flight flag when the attempt ends, on every exit path
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Drives one attendance attempt through the pipeline:
/// permissions -> context -> photo -> submission -> recovery.
///
/// Only one attempt may be active per coordinator; a second `run_attempt`
/// while one is in flight fails with `AttemptInProgress` instead of racing
/// it to present conflicting outcomes.
pub struct AttemptCoordinator {
    gate: PermissionGate,
    location: Arc<dyn LocationProvider>,
    battery: Arc<BatteryMonitor>,
    camera: Arc<StillCamera>,
    credentials: CredentialStore,
    client: SubmissionClient,
    event_bus: Arc<EventBus>,
    in_flight: AtomicBool,
}

impl AttemptCoordinator {
    pub fn new(
        config: &AttendcamConfig,
        location: Arc<dyn LocationProvider>,
        camera: Arc<StillCamera>,
        battery: Arc<BatteryMonitor>,
        event_bus: Arc<EventBus>,
    ) -> Result<Self> {
        let gate = PermissionGate::new(
            Arc::clone(&location),
            Arc::clone(&camera),
            Arc::clone(&battery),
        );
        let credentials = CredentialStore::new(&config.credentials.store_path);
        let client = SubmissionClient::new(&config.server)?;

        Ok(Self {
            gate,
            location,
            battery,
            camera,
            credentials,
            client,
            event_bus,
            in_flight: AtomicBool::new(false),
        })
    }

    /// Whether an attempt is currently active
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Run one full attendance attempt.
    ///
    /// Cancelling the token abandons the attempt with no side effects at any
    /// point before the submission request is sent; once the request is in
    /// flight the attempt waits for its response.
    pub async fn run_attempt(
        &self,
        presenter: &dyn Presenter,
        cancel: &CancellationToken,
    ) -> Result<AttemptReport> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(AttemptError::AttemptInProgress.into());
        }
        let _guard = InFlightGuard(&self.in_flight);

        let attempt_id = Uuid::new_v4().to_string();
        info!("Starting attendance attempt {}", attempt_id);

        let _ = self
            .event_bus
            .publish(AttendanceEvent::AttemptStarted {
                attempt_id: attempt_id.clone(),
                timestamp: SystemTime::now(),
            })
            .await;

        // Permission acquisition: an explicit state value, re-evaluated only
        // through the gate's own retry prompt
        let permissions = self.gate.acquire_with_prompt(presenter).await;

        let _ = self
            .event_bus
            .publish(AttendanceEvent::PermissionsEvaluated {
                location_granted: permissions.location.is_granted(),
                camera_granted: permissions.camera.is_granted(),
                battery_available: permissions.battery == Availability::Available,
                timestamp: SystemTime::now(),
            })
            .await;

        let mut report = AttemptReport::new(attempt_id.clone(), permissions);

        if !permissions.capture_allowed() {
            warn!(
                "Attempt {} blocked: missing capabilities {:?}",
                attempt_id,
                permissions.denied_capabilities()
            );
            return Ok(report);
        }

        if cancel.is_cancelled() {
            return self.abandon(report).await;
        }

        // Context capture: one fix and one sample per attempt, taken now and
        // reused across any retries within this attempt
        let geo_fix = loop {
            match self.location.current_fix().await {
                Ok(fix) => break fix,
                Err(e) => {
                    warn!("Location fix failed for attempt {}: {}", attempt_id, e);
                    if presenter.offer_retry("Could not acquire a location fix").await {
                        continue;
                    }
                    return self.abandon(report).await;
                }
            }
        };

        let battery = self.battery.sample().await;

        let _ = self
            .event_bus
            .publish(AttendanceEvent::ContextCaptured {
                attempt_id: attempt_id.clone(),
                location: geo_fix.as_form_value(),
                battery_percent: battery.percent,
                timestamp: SystemTime::now(),
            })
            .await;

        // Credential resolution: absent means login, never an empty token
        let token = match self.credentials.resolve_token().await? {
            Some(token) => token,
            None => {
                warn!("No credential found; redirecting to login");
                presenter.navigate(NavigationTarget::Login).await;
                report.navigation = Some(NavigationTarget::Login);
                return Ok(report);
            }
        };

        if cancel.is_cancelled() {
            return self.abandon(report).await;
        }

        // Submission rounds: every round captures a fresh photo; the photo
        // is dropped after each call so a retry can never reuse a frame
        loop {
            let photo = loop {
                match self.camera.capture_frame().await {
                    Ok(photo) => break photo,
                    Err(e) => {
                        warn!("Photo capture failed for attempt {}: {}", attempt_id, e);
                        if presenter.offer_retry("Could not capture a photo").await {
                            continue;
                        }
                        return self.abandon(report).await;
                    }
                }
            };

            let _ = self
                .event_bus
                .publish(AttendanceEvent::PhotoCaptured {
                    attempt_id: attempt_id.clone(),
                    byte_count: photo.byte_count(),
                    timestamp: SystemTime::now(),
                })
                .await;

            // Last exit: once the request goes out there is no cancellation
            if cancel.is_cancelled() {
                return self.abandon(report).await;
            }

            let _ = self
                .event_bus
                .publish(AttendanceEvent::SubmissionStarted {
                    attempt_id: attempt_id.clone(),
                    timestamp: SystemTime::now(),
                })
                .await;

            let outcome = self
                .client
                .submit(&photo, &geo_fix, &battery, &token)
                .await?;
            drop(photo);

            report.submission_count += 1;
            report.outcome = Some(outcome.clone());

            let _ = self
                .event_bus
                .publish(AttendanceEvent::SubmissionCompleted {
                    attempt_id: attempt_id.clone(),
                    outcome: outcome.kind().to_string(),
                    timestamp: SystemTime::now(),
                })
                .await;

            presenter.show_outcome(&outcome).await;

            match outcome.recovery_action() {
                RecoveryAction::NavigateDashboard => {
                    presenter.navigate(NavigationTarget::Dashboard).await;
                    report.navigation = Some(NavigationTarget::Dashboard);
                    return Ok(report);
                }
                RecoveryAction::Reauthenticate => {
                    self.credentials.clear().await?;
                    let _ = self
                        .event_bus
                        .publish(AttendanceEvent::CredentialCleared {
                            timestamp: SystemTime::now(),
                        })
                        .await;
                    presenter.navigate(NavigationTarget::Login).await;
                    report.navigation = Some(NavigationTarget::Login);
                    return Ok(report);
                }
                RecoveryAction::OfferRetry => {
                    if presenter.offer_retry(retry_reason(&outcome)).await {
                        debug!(
                            "Retrying attempt {} with a fresh photo (round {})",
                            attempt_id,
                            report.submission_count + 1
                        );
                        continue;
                    }
                    info!("Attempt {} ended: retry declined", attempt_id);
                    return Ok(report);
                }
            }
        }
    }

    async fn abandon(&self, report: AttemptReport) -> Result<AttemptReport> {
        info!("Attempt {} abandoned before submission", report.attempt_id);

        let _ = self
            .event_bus
            .publish(AttendanceEvent::AttemptAbandoned {
                attempt_id: report.attempt_id.clone(),
                timestamp: SystemTime::now(),
            })
            .await;

        Ok(report)
    }
}

fn retry_reason(outcome: &SubmissionOutcome) -> &'static str {
    match outcome {
        SubmissionOutcome::FaceMismatch => "Face verification failed",
        SubmissionOutcome::NetworkError { .. } => "Could not reach the attendance server",
        _ => "The submission was rejected",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AttendcamConfig;
    use crate::context::MockLocationProvider;
    use crate::presenter::ScriptedPresenter;
    use std::sync::atomic::AtomicUsize;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve every connection the same canned HTTP response
    async fn spawn_canned_server(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let request_count = Arc::new(AtomicUsize::new(0));
        let count = Arc::clone(&request_count);

        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                count.fetch_add(1, Ordering::SeqCst);

                let mut raw = Vec::new();
                let mut buf = [0u8; 4096];
                loop {
                    let read = tokio::time::timeout(
                        std::time::Duration::from_millis(200),
                        stream.read(&mut buf),
                    )
                    .await;
                    match read {
                        Ok(Ok(0)) | Err(_) => break,
                        Ok(Ok(n)) => raw.extend_from_slice(&buf[..n]),
                        Ok(Err(_)) => break,
                    }

                    if let Some(header_end) = raw
                        .windows(4)
                        .position(|window| window == b"\r\n\r\n")
                    {
                        let headers =
                            String::from_utf8_lossy(&raw[..header_end]).to_lowercase();
                        let content_length = headers
                            .lines()
                            .find_map(|line| line.strip_prefix("content-length:"))
                            .and_then(|v| v.trim().parse::<usize>().ok());

                        if let Some(len) = content_length {
                            if raw.len() >= header_end + 4 + len {
                                break;
                            }
                        }
                    }
                }

                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_line,
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        (format!("http://{}", addr), request_count)
    }

    struct Harness {
        coordinator: AttemptCoordinator,
        camera: Arc<StillCamera>,
        credentials_path: std::path::PathBuf,
        _store_dir: tempfile::TempDir,
    }

    async fn build_harness(base_url: &str, location: MockLocationProvider) -> Harness {
        let store_dir = tempfile::TempDir::new().unwrap();
        let credentials_path = store_dir.path().join("credentials.toml");
        std::fs::write(&credentials_path, "access_token = \"test-token\"\n").unwrap();

        let mut config = AttendcamConfig::default();
        config.server.base_url = base_url.to_string();
        config.server.request_timeout_seconds = 5;
        config.credentials.store_path = credentials_path.to_string_lossy().to_string();
        // Point battery at a file that exists so the reading is stable
        let battery_path = store_dir.path().join("capacity");
        std::fs::write(&battery_path, "77\n").unwrap();
        config.battery.capacity_path = battery_path.to_string_lossy().to_string();

        let camera = Arc::new(StillCamera::mock(config.camera.clone()));
        camera.initialize().await.unwrap();

        let battery = Arc::new(BatteryMonitor::new(&config.battery));
        let event_bus = Arc::new(EventBus::new(config.system.event_bus_capacity));
        let location: Arc<dyn LocationProvider> = Arc::new(location);

        let coordinator = AttemptCoordinator::new(
            &config,
            Arc::clone(&location),
            Arc::clone(&camera),
            battery,
            event_bus,
        )
        .unwrap();

        Harness {
            coordinator,
            camera,
            credentials_path,
            _store_dir: store_dir,
        }
    }

    #[tokio::test]
    async fn test_successful_attempt_navigates_to_dashboard() {
        let (base_url, request_count) =
            spawn_canned_server("200 OK", r#"{"message":"Attendance marked successfully!"}"#)
                .await;
        let harness =
            build_harness(&base_url, MockLocationProvider::with_fix(12.9716, 77.5946)).await;
        let presenter = ScriptedPresenter::new();

        let report = harness
            .coordinator
            .run_attempt(&presenter, &CancellationToken::new())
            .await
            .unwrap();

        assert!(matches!(
            report.outcome,
            Some(SubmissionOutcome::Success { .. })
        ));
        assert_eq!(report.navigation, Some(NavigationTarget::Dashboard));
        assert_eq!(report.submission_count, 1);
        assert_eq!(request_count.load(Ordering::SeqCst), 1);
        assert_eq!(presenter.navigations(), vec![NavigationTarget::Dashboard]);
        assert!(!harness.coordinator.is_in_flight());
    }

    #[tokio::test]
    async fn test_denied_location_never_invokes_camera() {
        let (base_url, request_count) =
            spawn_canned_server("200 OK", r#"{"message":"ok"}"#).await;
        let harness = build_harness(&base_url, MockLocationProvider::unavailable()).await;
        // Continue anyway on the permission prompt: the attempt must still
        // refuse to capture
        let presenter = ScriptedPresenter::new();

        let report = harness
            .coordinator
            .run_attempt(&presenter, &CancellationToken::new())
            .await
            .unwrap();

        assert!(!report.permissions.capture_allowed());
        assert_eq!(report.outcome, None);
        assert_eq!(report.submission_count, 0);
        assert_eq!(harness.camera.frame_count(), 0);
        assert_eq!(request_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_face_mismatch_retry_uses_fresh_photo_same_context() {
        let (base_url, request_count) = spawn_canned_server(
            "400 Bad Request",
            r#"{"detail":"Face verification failed"}"#,
        )
        .await;
        let harness =
            build_harness(&base_url, MockLocationProvider::with_fix(12.9716, 77.5946)).await;
        // Accept one retry, then give up
        let presenter = ScriptedPresenter::new().with_retry_answers(vec![true, false]);

        let report = harness
            .coordinator
            .run_attempt(&presenter, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.outcome, Some(SubmissionOutcome::FaceMismatch));
        assert_eq!(report.submission_count, 2);
        assert_eq!(request_count.load(Ordering::SeqCst), 2);
        // Two rounds, two distinct photos
        assert_eq!(harness.camera.frame_count(), 2);
        assert_eq!(presenter.retry_prompt_count(), 2);
        // No navigation: the operator declined the second retry
        assert_eq!(report.navigation, None);
    }

    #[tokio::test]
    async fn test_already_marked_is_benign_no_retry_offered() {
        let (base_url, _) = spawn_canned_server(
            "400 Bad Request",
            r#"{"detail":"Attendance already marked today"}"#,
        )
        .await;
        let harness =
            build_harness(&base_url, MockLocationProvider::with_fix(12.9716, 77.5946)).await;
        let presenter = ScriptedPresenter::new();

        let report = harness
            .coordinator
            .run_attempt(&presenter, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.outcome, Some(SubmissionOutcome::AlreadyMarked));
        assert_eq!(report.navigation, Some(NavigationTarget::Dashboard));
        assert_eq!(presenter.retry_prompt_count(), 0);
    }

    #[tokio::test]
    async fn test_auth_expired_clears_credential_and_redirects() {
        let (base_url, _) = spawn_canned_server(
            "401 Unauthorized",
            r#"{"detail":"Could not validate credentials"}"#,
        )
        .await;
        let harness =
            build_harness(&base_url, MockLocationProvider::with_fix(12.9716, 77.5946)).await;
        let presenter = ScriptedPresenter::new();

        let report = harness
            .coordinator
            .run_attempt(&presenter, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.outcome, Some(SubmissionOutcome::AuthExpired));
        assert_eq!(report.navigation, Some(NavigationTarget::Login));

        // The persisted credential is gone
        let store = CredentialStore::new(&harness.credentials_path);
        assert_eq!(store.resolve_token().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_absent_credential_redirects_to_login_without_submitting() {
        let (base_url, request_count) =
            spawn_canned_server("200 OK", r#"{"message":"ok"}"#).await;
        let harness =
            build_harness(&base_url, MockLocationProvider::with_fix(12.9716, 77.5946)).await;
        std::fs::write(&harness.credentials_path, "").unwrap();
        let presenter = ScriptedPresenter::new();

        let report = harness
            .coordinator
            .run_attempt(&presenter, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.outcome, None);
        assert_eq!(report.navigation, Some(NavigationTarget::Login));
        assert_eq!(request_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_network_error_offers_retry_and_survives_cancel() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let harness = build_harness(
            &format!("http://{}", addr),
            MockLocationProvider::with_fix(12.9716, 77.5946),
        )
        .await;
        let presenter = ScriptedPresenter::new().with_retry_answers(vec![false]);

        let report = harness
            .coordinator
            .run_attempt(&presenter, &CancellationToken::new())
            .await
            .unwrap();

        assert!(matches!(
            report.outcome,
            Some(SubmissionOutcome::NetworkError { .. })
        ));
        assert_eq!(presenter.retry_prompt_count(), 1);
        assert_eq!(report.navigation, None);
    }

    #[tokio::test]
    async fn test_cancelled_attempt_submits_nothing() {
        let (base_url, request_count) =
            spawn_canned_server("200 OK", r#"{"message":"ok"}"#).await;
        let harness =
            build_harness(&base_url, MockLocationProvider::with_fix(12.9716, 77.5946)).await;
        let presenter = ScriptedPresenter::new();

        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = harness
            .coordinator
            .run_attempt(&presenter, &cancel)
            .await
            .unwrap();

        assert_eq!(report.outcome, None);
        assert_eq!(report.submission_count, 0);
        assert_eq!(request_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_second_attempt_rejected_while_first_in_flight() {
        let (base_url, _) = spawn_canned_server("200 OK", r#"{"message":"ok"}"#).await;
        let harness =
            build_harness(&base_url, MockLocationProvider::with_fix(12.9716, 77.5946)).await;

        // Simulate an active attempt
        harness.coordinator.in_flight.store(true, Ordering::SeqCst);

        let presenter = ScriptedPresenter::new();
        let result = harness
            .coordinator
            .run_attempt(&presenter, &CancellationToken::new())
            .await;

        assert!(matches!(
            result,
            Err(crate::error::AttendcamError::Attempt(
                AttemptError::AttemptInProgress
            ))
        ));

        harness.coordinator.in_flight.store(false, Ordering::SeqCst);
    }
}
