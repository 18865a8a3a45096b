use crate::config::BatteryConfig;
use std::path::PathBuf;
use std::time::SystemTime;
use tokio::fs;
use tracing::{debug, warn};

/// A single battery-level sample captured for one attendance attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatteryReading {
    /// Battery level percent, 0-100
    pub percent: u8,
    pub captured_at: SystemTime,
}

impl BatteryReading {
    pub fn new(percent: u8) -> Self {
        Self {
            percent: percent.min(100),
            captured_at: SystemTime::now(),
        }
    }

    /// Wire representation used by the submission form
    pub fn as_form_value(&self) -> String {
        self.percent.to_string()
    }
}

/// Reads the battery level from the platform power-supply interface.
///
/// Battery is advisory: a failed read degrades to a 0% reading with a
/// warning instead of blocking the attempt.
pub struct BatteryMonitor {
    capacity_path: PathBuf,
}

impl BatteryMonitor {
    pub fn new(config: &BatteryConfig) -> Self {
        Self {
            capacity_path: PathBuf::from(&config.capacity_path),
        }
    }

    /// Whether the capacity file can currently be read. Used by the
    /// permission gate; absence degrades submissions, it does not block them.
    pub async fn is_available(&self) -> bool {
        self.read_percent().await.is_ok()
    }

    /// Take one battery sample. Never fails: read errors produce the 0%
    /// default the backend also falls back to.
    pub async fn sample(&self) -> BatteryReading {
        match self.read_percent().await {
            Ok(percent) => {
                debug!("Battery level: {}%", percent);
                BatteryReading::new(percent)
            }
            Err(details) => {
                warn!(
                    "Could not read battery level from {}: {}; defaulting to 0%",
                    self.capacity_path.display(),
                    details
                );
                BatteryReading::new(0)
            }
        }
    }

    async fn read_percent(&self) -> Result<u8, String> {
        let raw = fs::read_to_string(&self.capacity_path)
            .await
            .map_err(|e| e.to_string())?;

        let percent: u8 = raw.trim().parse().map_err(|_| {
            format!("capacity file contains non-numeric value: {:?}", raw.trim())
        })?;

        Ok(percent.min(100))
    }
}
