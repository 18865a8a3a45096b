use crate::permissions::PermissionState;
use crate::submission::SubmissionOutcome;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

/// Screens the pipeline can hand control to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationTarget {
    Dashboard,
    Login,
}

/// Operator's answer to a denied-permission prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionPromptAnswer {
    Retry,
    ContinueAnyway,
}

/// Boundary to the surrounding UI. The pipeline reports outcomes and asks
/// its retry questions here; everything past this trait is rendering.
#[async_trait]
pub trait Presenter: Send + Sync {
    /// Surface a classified submission outcome to the operator
    async fn show_outcome(&self, outcome: &SubmissionOutcome);

    /// Blocking prompt after a denied mandatory capability
    async fn prompt_permission_retry(&self, state: &PermissionState) -> PermissionPromptAnswer;

    /// Offer a retry after a recoverable failure; false cancels
    async fn offer_retry(&self, reason: &str) -> bool;

    /// Hand control to the named screen
    async fn navigate(&self, target: NavigationTarget);
}

/// Console presenter for the terminal binary
pub struct ConsolePresenter;

impl ConsolePresenter {
    pub fn new() -> Self {
        Self
    }

    async fn read_answer(&self) -> String {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        match lines.next_line().await {
            Ok(Some(line)) => line.trim().to_lowercase(),
            _ => String::new(),
        }
    }
}

impl Default for ConsolePresenter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Presenter for ConsolePresenter {
    async fn show_outcome(&self, outcome: &SubmissionOutcome) {
        match outcome {
            SubmissionOutcome::Success { message } => {
                println!("✓ {}", message);
            }
            SubmissionOutcome::AlreadyMarked => {
                println!("✓ Attendance already marked today");
            }
            SubmissionOutcome::FaceMismatch => {
                println!("✗ Face verification failed");
                println!("  Ensure good lighting, look directly at the camera, keep your face centered");
            }
            SubmissionOutcome::AuthExpired => {
                println!("✗ Session expired; please login again");
            }
            SubmissionOutcome::ServerError { status, detail } => {
                if detail.is_empty() {
                    println!("✗ Server error ({})", status);
                } else {
                    println!("✗ Server error ({}): {}", status, detail);
                }
            }
            SubmissionOutcome::NetworkError { cause } => {
                println!("✗ Cannot reach the attendance server: {}", cause);
            }
        }
    }

    async fn prompt_permission_retry(&self, state: &PermissionState) -> PermissionPromptAnswer {
        println!(
            "Required capabilities are unavailable: {}",
            state.denied_capabilities().join(", ")
        );
        println!("[r]etry acquisition or [c]ontinue anyway?");

        loop {
            match self.read_answer().await.as_str() {
                "r" | "retry" => return PermissionPromptAnswer::Retry,
                "c" | "continue" => return PermissionPromptAnswer::ContinueAnyway,
                _ => println!("Please answer 'r' or 'c'"),
            }
        }
    }

    async fn offer_retry(&self, reason: &str) -> bool {
        println!("{} — try again? [y/n]", reason);

        loop {
            match self.read_answer().await.as_str() {
                "y" | "yes" => return true,
                "n" | "no" => return false,
                _ => println!("Please answer 'y' or 'n'"),
            }
        }
    }

    async fn navigate(&self, target: NavigationTarget) {
        match target {
            NavigationTarget::Dashboard => info!("Returning to dashboard"),
            NavigationTarget::Login => warn!("Redirecting to login"),
        }
    }
}

/// Scripted presenter for tests and dry runs: answers prompts from queues
/// and records everything it was shown.
pub struct ScriptedPresenter {
    permission_answers: Mutex<VecDeque<PermissionPromptAnswer>>,
    retry_answers: Mutex<VecDeque<bool>>,
    shown_outcomes: Mutex<Vec<SubmissionOutcome>>,
    navigations: Mutex<Vec<NavigationTarget>>,
    permission_prompts: Mutex<usize>,
    retry_prompts: Mutex<usize>,
}

impl ScriptedPresenter {
    pub fn new() -> Self {
        Self {
            permission_answers: Mutex::new(VecDeque::new()),
            retry_answers: Mutex::new(VecDeque::new()),
            shown_outcomes: Mutex::new(Vec::new()),
            navigations: Mutex::new(Vec::new()),
            permission_prompts: Mutex::new(0),
            retry_prompts: Mutex::new(0),
        }
    }

    pub fn with_permission_answers(self, answers: Vec<PermissionPromptAnswer>) -> Self {
        *self.permission_answers.lock().unwrap() = answers.into();
        self
    }

    pub fn with_retry_answers(self, answers: Vec<bool>) -> Self {
        *self.retry_answers.lock().unwrap() = answers.into();
        self
    }

    pub fn shown_outcomes(&self) -> Vec<SubmissionOutcome> {
        self.shown_outcomes.lock().unwrap().clone()
    }

    pub fn navigations(&self) -> Vec<NavigationTarget> {
        self.navigations.lock().unwrap().clone()
    }

    pub fn permission_prompt_count(&self) -> usize {
        *self.permission_prompts.lock().unwrap()
    }

    pub fn retry_prompt_count(&self) -> usize {
        *self.retry_prompts.lock().unwrap()
    }
}

impl Default for ScriptedPresenter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Presenter for ScriptedPresenter {
    async fn show_outcome(&self, outcome: &SubmissionOutcome) {
        self.shown_outcomes.lock().unwrap().push(outcome.clone());
    }

    async fn prompt_permission_retry(&self, _state: &PermissionState) -> PermissionPromptAnswer {
        *self.permission_prompts.lock().unwrap() += 1;
        self.permission_answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(PermissionPromptAnswer::ContinueAnyway)
    }

    async fn offer_retry(&self, _reason: &str) -> bool {
        *self.retry_prompts.lock().unwrap() += 1;
        self.retry_answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(false)
    }

    async fn navigate(&self, target: NavigationTarget) {
        self.navigations.lock().unwrap().push(target);
    }
}
