use serde::Deserialize;

/// Detail string the server sends when face verification fails.
/// The match is exact: brittle, but authoritative per the current contract.
pub const DETAIL_FACE_MISMATCH: &str = "Face verification failed";

/// Detail string the server sends when attendance was already marked today.
pub const DETAIL_ALREADY_MARKED: &str = "Attendance already marked today";

const DEFAULT_SUCCESS_MESSAGE: &str = "Attendance marked successfully";

/// JSON body shape of the submission endpoint: `message` on success,
/// `detail` on failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseBody {
    pub message: Option<String>,
    pub detail: Option<String>,
}

/// Classified result of one submission call. Produced once per attempt
/// round; drives all subsequent presentation and navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    /// Attendance recorded; message comes from the server body
    Success { message: String },
    /// Attendance was already recorded today; treated as benign
    AlreadyMarked,
    /// The server could not match the face to the registered one
    FaceMismatch,
    /// The session token was rejected; credential must be discarded
    AuthExpired,
    /// Any other server-side rejection
    ServerError { status: u16, detail: String },
    /// The request never produced a classified server response
    NetworkError { cause: String },
}

/// What the caller must do after an outcome. The mapping is fixed: the
/// coordinator consults it instead of inspecting outcomes ad hoc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Terminal success path: navigate to the dashboard
    NavigateDashboard,
    /// Offer an immediate retry with a fresh photo (same context)
    OfferRetry,
    /// Discard the credential and redirect to login
    Reauthenticate,
}

impl SubmissionOutcome {
    /// Short tag for events and logs
    pub fn kind(&self) -> &'static str {
        match self {
            SubmissionOutcome::Success { .. } => "success",
            SubmissionOutcome::AlreadyMarked => "already_marked",
            SubmissionOutcome::FaceMismatch => "face_mismatch",
            SubmissionOutcome::AuthExpired => "auth_expired",
            SubmissionOutcome::ServerError { .. } => "server_error",
            SubmissionOutcome::NetworkError { .. } => "network_error",
        }
    }

    /// Fixed recovery mapping for the coordinator
    pub fn recovery_action(&self) -> RecoveryAction {
        match self {
            SubmissionOutcome::Success { .. } => RecoveryAction::NavigateDashboard,
            SubmissionOutcome::AlreadyMarked => RecoveryAction::NavigateDashboard,
            SubmissionOutcome::FaceMismatch => RecoveryAction::OfferRetry,
            SubmissionOutcome::AuthExpired => RecoveryAction::Reauthenticate,
            SubmissionOutcome::ServerError { .. } => RecoveryAction::OfferRetry,
            SubmissionOutcome::NetworkError { .. } => RecoveryAction::OfferRetry,
        }
    }
}

/// Map one (status, body) pair to its outcome.
///
/// Deterministic and total: identical input always yields the same variant.
/// Rule order mirrors the server contract: success status first, then the
/// known detail strings, then the auth status, then the generic bucket.
pub fn classify_response(status: u16, body: &ResponseBody) -> SubmissionOutcome {
    if (200..300).contains(&status) {
        let message = body
            .message
            .clone()
            .unwrap_or_else(|| DEFAULT_SUCCESS_MESSAGE.to_string());
        return SubmissionOutcome::Success { message };
    }

    match body.detail.as_deref() {
        Some(DETAIL_FACE_MISMATCH) => SubmissionOutcome::FaceMismatch,
        Some(DETAIL_ALREADY_MARKED) => SubmissionOutcome::AlreadyMarked,
        _ if status == 401 => SubmissionOutcome::AuthExpired,
        detail => SubmissionOutcome::ServerError {
            status,
            detail: detail.unwrap_or_default().to_string(),
        },
    }
}
