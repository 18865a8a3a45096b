use crate::config::LocationConfig;
use crate::error::CaptureError;
use async_trait::async_trait;
use std::time::SystemTime;
use tracing::debug;

/// A single geolocation fix captured for one attendance attempt.
///
/// Immutable once captured; the attempt that requested it owns it and
/// discards it if abandoned before submission.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoFix {
    pub latitude: f64,
    pub longitude: f64,
    pub captured_at: SystemTime,
}

impl GeoFix {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            captured_at: SystemTime::now(),
        }
    }

    /// Wire representation used by the submission form: "lat,lon"
    pub fn as_form_value(&self) -> String {
        format!("{},{}", self.latitude, self.longitude)
    }

    /// Get fix age in milliseconds
    pub fn age_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(self.captured_at)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Source of geolocation fixes for the terminal.
///
/// The shipped implementation reads the terminal's surveyed mounting
/// position from configuration; a GPS-backed provider would implement the
/// same trait.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// Whether the provider can currently produce fixes. The permission
    /// gate treats an unavailable provider as location-denied.
    fn is_available(&self) -> bool;

    /// Produce one fresh fix.
    async fn current_fix(&self) -> Result<GeoFix, CaptureError>;
}

/// Location provider for fixed-mount terminals with surveyed coordinates.
pub struct FixedLocationProvider {
    position: Option<(f64, f64)>,
}

impl FixedLocationProvider {
    pub fn new(config: &LocationConfig) -> Self {
        let position = match (config.latitude, config.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        };

        Self { position }
    }
}

#[async_trait]
impl LocationProvider for FixedLocationProvider {
    fn is_available(&self) -> bool {
        self.position.is_some()
    }

    async fn current_fix(&self) -> Result<GeoFix, CaptureError> {
        match self.position {
            Some((latitude, longitude)) => {
                let fix = GeoFix::new(latitude, longitude);
                debug!("Produced fix from surveyed position: {}", fix.as_form_value());
                Ok(fix)
            }
            None => Err(CaptureError::LocationUnavailable {
                details: "terminal position is not configured".to_string(),
            }),
        }
    }
}

/// Mock location provider for testing without configuration.
pub struct MockLocationProvider {
    fix: Option<(f64, f64)>,
}

impl MockLocationProvider {
    /// Create a mock provider that always yields the given coordinates
    pub fn with_fix(latitude: f64, longitude: f64) -> Self {
        Self {
            fix: Some((latitude, longitude)),
        }
    }

    /// Create a mock provider that always fails to produce a fix
    pub fn unavailable() -> Self {
        Self { fix: None }
    }
}

#[async_trait]
impl LocationProvider for MockLocationProvider {
    fn is_available(&self) -> bool {
        self.fix.is_some()
    }

    async fn current_fix(&self) -> Result<GeoFix, CaptureError> {
        match self.fix {
            Some((latitude, longitude)) => Ok(GeoFix::new(latitude, longitude)),
            None => Err(CaptureError::LocationUnavailable {
                details: "mock provider has no fix".to_string(),
            }),
        }
    }
}
