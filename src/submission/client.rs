use crate::camera::{CapturedPhoto, PHOTO_FILENAME};
use crate::config::ServerConfig;
use crate::context::{BatteryReading, GeoFix};
use crate::error::SubmissionError;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::outcome::{classify_response, ResponseBody, SubmissionOutcome};

/// One fully-assembled submission. Construction enforces the all-or-nothing
/// invariant: every part must be present and non-empty, or no request is
/// built and nothing reaches the network.
#[derive(Debug)]
pub struct AttendanceSubmission {
    pub photo: CapturedPhoto,
    pub location: String,
    pub battery_percent: u8,
    pub token: String,
}

impl AttendanceSubmission {
    pub fn assemble(
        photo: &CapturedPhoto,
        geo_fix: &GeoFix,
        battery: &BatteryReading,
        token: &str,
    ) -> Result<Self, SubmissionError> {
        if photo.is_empty() {
            return Err(SubmissionError::Incomplete { missing: "photo" });
        }

        if !geo_fix.latitude.is_finite() || !geo_fix.longitude.is_finite() {
            return Err(SubmissionError::Incomplete { missing: "location" });
        }

        if token.trim().is_empty() {
            return Err(SubmissionError::Incomplete { missing: "token" });
        }

        Ok(Self {
            photo: photo.clone(),
            location: geo_fix.as_form_value(),
            battery_percent: battery.percent,
            token: token.to_string(),
        })
    }
}

/// HTTP client for the attendance submission endpoint.
///
/// Issues exactly one request per `submit` call and never retries
/// internally; retries are a caller-driven re-invocation with a fresh photo.
pub struct SubmissionClient {
    endpoint: String,
    http: reqwest::Client,
}

impl SubmissionClient {
    pub fn new(config: &ServerConfig) -> Result<Self, SubmissionError> {
        let base = config.base_url.trim_end_matches('/');
        let endpoint = format!("{}/attendance/mark", base);

        reqwest::Url::parse(&endpoint).map_err(|e| SubmissionError::InvalidEndpoint {
            url: endpoint.clone(),
            details: e.to_string(),
        })?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| SubmissionError::ClientBuild {
                details: e.to_string(),
            })?;

        Ok(Self { endpoint, http })
    }

    /// Submission endpoint URL
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Validate inputs, send one multipart request, and classify the result.
    ///
    /// Missing input is a client-local error and produces no network call.
    /// Transport failures are not errors; they classify as `NetworkError`
    /// so the caller's recovery table applies uniformly.
    pub async fn submit(
        &self,
        photo: &CapturedPhoto,
        geo_fix: &GeoFix,
        battery: &BatteryReading,
        token: &str,
    ) -> Result<SubmissionOutcome, SubmissionError> {
        let submission = AttendanceSubmission::assemble(photo, geo_fix, battery, token)?;

        debug!(
            "Submitting attendance: location {}, battery {}%, photo {} bytes",
            submission.location,
            submission.battery_percent,
            submission.photo.byte_count()
        );

        let photo_part = reqwest::multipart::Part::bytes(submission.photo.data.as_ref().clone())
            .file_name(PHOTO_FILENAME)
            .mime_str(submission.photo.mime_type)
            .map_err(|e| SubmissionError::Multipart {
                details: e.to_string(),
            })?;

        let form = reqwest::multipart::Form::new()
            .part("file", photo_part)
            .text("location", submission.location.clone())
            .text("battery_level", submission.battery_percent.to_string());

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&submission.token)
            .multipart(form)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                warn!("Submission transport failure: {}", e);
                return Ok(SubmissionOutcome::NetworkError {
                    cause: e.to_string(),
                });
            }
        };

        let status = response.status().as_u16();

        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Submission response body failure: {}", e);
                return Ok(SubmissionOutcome::NetworkError {
                    cause: e.to_string(),
                });
            }
        };

        // A body that is not the expected JSON still classifies by status
        let body: ResponseBody = serde_json::from_slice(&bytes).unwrap_or_default();

        let outcome = classify_response(status, &body);
        info!("Submission classified as {} (status {})", outcome.kind(), status);

        Ok(outcome)
    }
}
