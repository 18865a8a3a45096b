mod client;
mod outcome;

#[cfg(test)]
mod tests;

pub use client::{AttendanceSubmission, SubmissionClient};
pub use outcome::{
    classify_response, RecoveryAction, ResponseBody, SubmissionOutcome, DETAIL_ALREADY_MARKED,
    DETAIL_FACE_MISMATCH,
};
