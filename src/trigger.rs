use crate::error::Result;
use crate::events::{AttendanceEvent, EventBus};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::runtime::Handle;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Keyboard trigger for the attendance terminal: the operator presses a key
/// to request a marking, or quits.
pub struct KeyboardTrigger {
    event_bus: Arc<EventBus>,
    cancellation_token: CancellationToken,
}

impl KeyboardTrigger {
    /// Create a new keyboard trigger
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self {
            event_bus,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Start listening for keyboard input
    pub async fn start(&self) -> Result<()> {
        info!("Keyboard trigger active - press ENTER to mark attendance, 'q' to quit");

        let event_bus = Arc::clone(&self.event_bus);
        let cancellation_token = self.cancellation_token.clone();
        let runtime_handle = Handle::current();

        // Spawn a blocking task to handle keyboard input
        task::spawn_blocking(move || {
            if let Err(e) = enable_raw_mode() {
                error!("Failed to enable raw mode for keyboard input: {}", e);
                return;
            }

            loop {
                if cancellation_token.is_cancelled() {
                    debug!("Keyboard trigger stopping");
                    break;
                }

                match event::poll(Duration::from_millis(100)) {
                    Ok(true) => {
                        if let Ok(Event::Key(key_event)) = event::read() {
                            if key_event.kind != KeyEventKind::Press {
                                continue;
                            }

                            match key_event.code {
                                KeyCode::Enter | KeyCode::Char(' ') => {
                                    info!("Marking requested via keyboard");

                                    let mark_event = AttendanceEvent::MarkRequested {
                                        timestamp: SystemTime::now(),
                                    };

                                    let event_bus_clone = Arc::clone(&event_bus);
                                    runtime_handle.spawn(async move {
                                        if let Err(e) = event_bus_clone.publish(mark_event).await {
                                            warn!("Failed to publish mark request: {}", e);
                                        }
                                    });
                                }
                                KeyCode::Char('q') | KeyCode::Esc => {
                                    info!("Quit key pressed - requesting shutdown");

                                    let shutdown_event = AttendanceEvent::ShutdownRequested {
                                        timestamp: SystemTime::now(),
                                        reason: "User requested via keyboard".to_string(),
                                    };

                                    let event_bus_clone = Arc::clone(&event_bus);
                                    runtime_handle.spawn(async move {
                                        if let Err(e) =
                                            event_bus_clone.publish(shutdown_event).await
                                        {
                                            warn!("Failed to publish shutdown request: {}", e);
                                        }
                                    });
                                    break;
                                }
                                _ => {
                                    debug!("Key pressed: {:?}", key_event.code);
                                }
                            }
                        }
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!("Error polling for keyboard events: {}", e);
                    }
                }
            }

            if let Err(e) = disable_raw_mode() {
                error!("Failed to disable raw mode: {}", e);
            }

            debug!("Keyboard trigger task exited");
        });

        Ok(())
    }

    /// Stop the keyboard trigger
    pub async fn stop(&self) -> Result<()> {
        info!("Stopping keyboard trigger");
        self.cancellation_token.cancel();

        // Give the task a moment to clean up and disable raw mode
        tokio::time::sleep(Duration::from_millis(200)).await;

        let _ = disable_raw_mode();

        Ok(())
    }
}
