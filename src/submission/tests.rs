use super::*;
use crate::camera::CapturedPhoto;
use crate::config::ServerConfig;
use crate::context::{BatteryReading, GeoFix};
use crate::error::SubmissionError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

/// Minimal canned-response HTTP fixture: accepts connections, records each
/// request, answers with a fixed status line and JSON body.
struct CannedServer {
    base_url: String,
    request_count: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<String>>>,
}

async fn spawn_canned_server(status_line: &'static str, body: &'static str) -> CannedServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let request_count = Arc::new(AtomicUsize::new(0));
    let requests = Arc::new(Mutex::new(Vec::new()));

    let count = Arc::clone(&request_count);
    let recorded = Arc::clone(&requests);

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            count.fetch_add(1, Ordering::SeqCst);

            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];

            // Read headers, then the Content-Length body (idle timeout as
            // a fallback for requests without a declared length)
            loop {
                let read =
                    tokio::time::timeout(Duration::from_millis(200), stream.read(&mut buf)).await;
                match read {
                    Ok(Ok(0)) | Err(_) => break,
                    Ok(Ok(n)) => raw.extend_from_slice(&buf[..n]),
                    Ok(Err(_)) => break,
                }

                if let Some(header_end) = find_subsequence(&raw, b"\r\n\r\n") {
                    let headers = String::from_utf8_lossy(&raw[..header_end]).to_lowercase();
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

            recorded
                .lock()
                .await
                .push(String::from_utf8_lossy(&raw).to_string());

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

    CannedServer {
        base_url: format!("http://{}", addr),
        request_count,
        requests,
    }
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn client_for(base_url: &str) -> SubmissionClient {
    SubmissionClient::new(&ServerConfig {
        base_url: base_url.to_string(),
        request_timeout_seconds: 5,
    })
    .unwrap()
}

fn test_photo() -> CapturedPhoto {
    CapturedPhoto::new(vec![0xFF, 0xD8, 0x01, 0x02, 0x03, 0xFF, 0xD9])
}

fn test_fix() -> GeoFix {
    GeoFix::new(12.9716, 77.5946)
}

fn test_battery() -> BatteryReading {
    BatteryReading::new(84)
}

#[tokio::test]
async fn test_success_scenario() {
    let server =
        spawn_canned_server("200 OK", r#"{"message":"Attendance marked successfully!"}"#).await;
    let client = client_for(&server.base_url);

    let outcome = client
        .submit(&test_photo(), &test_fix(), &test_battery(), "test-token")
        .await
        .unwrap();

    assert_eq!(
        outcome,
        SubmissionOutcome::Success {
            message: "Attendance marked successfully!".to_string()
        }
    );
    assert_eq!(outcome.recovery_action(), RecoveryAction::NavigateDashboard);
}

#[tokio::test]
async fn test_request_shape_matches_endpoint_contract() {
    let server = spawn_canned_server("200 OK", r#"{"message":"ok"}"#).await;
    let client = client_for(&server.base_url);

    client
        .submit(&test_photo(), &test_fix(), &test_battery(), "test-token")
        .await
        .unwrap();

    let requests = server.requests.lock().await;
    assert_eq!(requests.len(), 1);
    let request = &requests[0];

    assert!(request.starts_with("POST /attendance/mark HTTP/1.1"));
    assert!(request
        .to_lowercase()
        .contains("authorization: bearer test-token"));
    assert!(request.contains("name=\"file\""));
    assert!(request.contains("filename=\"face_verification.jpg\""));
    assert!(request.contains("name=\"location\""));
    assert!(request.contains("12.9716,77.5946"));
    assert!(request.contains("name=\"battery_level\""));
    assert!(request.contains("84"));
}

#[tokio::test]
async fn test_face_mismatch_scenario() {
    let server =
        spawn_canned_server("400 Bad Request", r#"{"detail":"Face verification failed"}"#).await;
    let client = client_for(&server.base_url);

    let outcome = client
        .submit(&test_photo(), &test_fix(), &test_battery(), "test-token")
        .await
        .unwrap();

    assert_eq!(outcome, SubmissionOutcome::FaceMismatch);
    assert_eq!(outcome.recovery_action(), RecoveryAction::OfferRetry);
}

#[tokio::test]
async fn test_already_marked_scenario() {
    let server = spawn_canned_server(
        "400 Bad Request",
        r#"{"detail":"Attendance already marked today"}"#,
    )
    .await;
    let client = client_for(&server.base_url);

    let outcome = client
        .submit(&test_photo(), &test_fix(), &test_battery(), "test-token")
        .await
        .unwrap();

    assert_eq!(outcome, SubmissionOutcome::AlreadyMarked);
    assert_eq!(outcome.recovery_action(), RecoveryAction::NavigateDashboard);
}

#[tokio::test]
async fn test_auth_expired_scenario() {
    let server = spawn_canned_server(
        "401 Unauthorized",
        r#"{"detail":"Could not validate credentials"}"#,
    )
    .await;
    let client = client_for(&server.base_url);

    let outcome = client
        .submit(&test_photo(), &test_fix(), &test_battery(), "stale-token")
        .await
        .unwrap();

    assert_eq!(outcome, SubmissionOutcome::AuthExpired);
    assert_eq!(outcome.recovery_action(), RecoveryAction::Reauthenticate);
}

#[tokio::test]
async fn test_server_error_scenario() {
    let server = spawn_canned_server(
        "500 Internal Server Error",
        r#"{"detail":"Internal server error during attendance marking"}"#,
    )
    .await;
    let client = client_for(&server.base_url);

    let outcome = client
        .submit(&test_photo(), &test_fix(), &test_battery(), "test-token")
        .await
        .unwrap();

    assert_eq!(
        outcome,
        SubmissionOutcome::ServerError {
            status: 500,
            detail: "Internal server error during attendance marking".to_string()
        }
    );
}

#[tokio::test]
async fn test_non_json_error_body_classifies_by_status() {
    let server = spawn_canned_server("502 Bad Gateway", "upstream unavailable").await;
    let client = client_for(&server.base_url);

    let outcome = client
        .submit(&test_photo(), &test_fix(), &test_battery(), "test-token")
        .await
        .unwrap();

    assert_eq!(
        outcome,
        SubmissionOutcome::ServerError {
            status: 502,
            detail: String::new()
        }
    );
}

#[tokio::test]
async fn test_connection_refused_is_network_error_not_crash() {
    // Bind then drop to get a port nothing is listening on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = client_for(&format!("http://{}", addr));

    let outcome = client
        .submit(&test_photo(), &test_fix(), &test_battery(), "test-token")
        .await
        .unwrap();

    assert!(matches!(outcome, SubmissionOutcome::NetworkError { .. }));
    assert_eq!(outcome.recovery_action(), RecoveryAction::OfferRetry);
}

#[tokio::test]
async fn test_missing_token_makes_no_network_call() {
    let server = spawn_canned_server("200 OK", r#"{"message":"ok"}"#).await;
    let client = client_for(&server.base_url);

    let result = client
        .submit(&test_photo(), &test_fix(), &test_battery(), "   ")
        .await;

    assert!(matches!(
        result,
        Err(SubmissionError::Incomplete { missing: "token" })
    ));
    assert_eq!(server.request_count.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_empty_photo_makes_no_network_call() {
    let server = spawn_canned_server("200 OK", r#"{"message":"ok"}"#).await;
    let client = client_for(&server.base_url);

    let empty = CapturedPhoto::new(Vec::new());
    let result = client
        .submit(&empty, &test_fix(), &test_battery(), "test-token")
        .await;

    assert!(matches!(
        result,
        Err(SubmissionError::Incomplete { missing: "photo" })
    ));
    assert_eq!(server.request_count.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_exactly_one_request_per_invocation() {
    let server = spawn_canned_server(
        "500 Internal Server Error",
        r#"{"detail":"Internal server error"}"#,
    )
    .await;
    let client = client_for(&server.base_url);

    // A retryable outcome must not trigger any internal retry
    let outcome = client
        .submit(&test_photo(), &test_fix(), &test_battery(), "test-token")
        .await
        .unwrap();

    assert!(matches!(outcome, SubmissionOutcome::ServerError { .. }));
    assert_eq!(server.request_count.load(Ordering::SeqCst), 1);
}

#[test]
fn test_assembly_enforces_all_or_nothing() {
    let err = AttendanceSubmission::assemble(
        &CapturedPhoto::new(Vec::new()),
        &test_fix(),
        &test_battery(),
        "token",
    )
    .unwrap_err();
    assert!(matches!(err, SubmissionError::Incomplete { missing: "photo" }));

    let submission =
        AttendanceSubmission::assemble(&test_photo(), &test_fix(), &test_battery(), "token")
            .unwrap();
    assert_eq!(submission.location, "12.9716,77.5946");
    assert_eq!(submission.battery_percent, 84);
}
