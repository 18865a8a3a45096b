use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AttendcamConfig {
    pub server: ServerConfig,
    pub camera: CameraConfig,
    pub location: LocationConfig,
    pub battery: BatteryConfig,
    pub credentials: CredentialsConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    /// Base URL of the attendance backend (no trailing path)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Request timeout for the submission call in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Camera device index (e.g., 0 for /dev/video0)
    #[serde(default = "default_camera_index")]
    pub index: u32,

    /// Still resolution (width, height)
    #[serde(default = "default_camera_resolution")]
    pub resolution: (u32, u32),

    /// JPEG quality (1-100) requested from the encoder
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u32,

    /// Seconds to wait for the camera to deliver a frame
    #[serde(default = "default_frame_timeout")]
    pub frame_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LocationConfig {
    /// Surveyed latitude of the terminal's mounting position
    pub latitude: Option<f64>,

    /// Surveyed longitude of the terminal's mounting position
    pub longitude: Option<f64>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BatteryConfig {
    /// Power supply capacity file (percent 0-100)
    #[serde(default = "default_capacity_path")]
    pub capacity_path: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CredentialsConfig {
    /// Path of the credential store written by the login flow
    #[serde(default = "default_store_path")]
    pub store_path: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

impl AttendcamConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("attendcam.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            // Start with default values
            .set_default("server.base_url", default_base_url())?
            .set_default(
                "server.request_timeout_seconds",
                default_request_timeout() as i64,
            )?
            .set_default("camera.index", default_camera_index())?
            .set_default(
                "camera.resolution",
                vec![default_camera_resolution().0, default_camera_resolution().1],
            )?
            .set_default("camera.jpeg_quality", default_jpeg_quality())?
            .set_default(
                "camera.frame_timeout_seconds",
                default_frame_timeout() as i64,
            )?
            .set_default("battery.capacity_path", default_capacity_path())?
            .set_default("credentials.store_path", default_store_path())?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables with ATTENDCAM_ prefix
            .add_source(Environment::with_prefix("ATTENDCAM").separator("_"))
            .build()?;

        let config: AttendcamConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate server settings
        if self.server.base_url.trim().is_empty() {
            return Err(ConfigError::Message(
                "Server base_url must not be empty".to_string(),
            ));
        }

        if !self.server.base_url.starts_with("http://")
            && !self.server.base_url.starts_with("https://")
        {
            return Err(ConfigError::Message(
                "Server base_url must start with http:// or https://".to_string(),
            ));
        }

        if self.server.request_timeout_seconds == 0 {
            return Err(ConfigError::Message(
                "Server request_timeout_seconds must be greater than 0".to_string(),
            ));
        }

        // Validate camera settings
        if self.camera.resolution.0 == 0 || self.camera.resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Camera resolution must be greater than 0".to_string(),
            ));
        }

        if self.camera.jpeg_quality == 0 || self.camera.jpeg_quality > 100 {
            return Err(ConfigError::Message(
                "Camera jpeg_quality must be between 1 and 100".to_string(),
            ));
        }

        if self.camera.frame_timeout_seconds == 0 {
            return Err(ConfigError::Message(
                "Camera frame_timeout_seconds must be greater than 0".to_string(),
            ));
        }

        // Validate location settings. Both coordinates must be set together;
        // a terminal with neither is treated as location-denied, not invalid.
        match (self.location.latitude, self.location.longitude) {
            (Some(lat), Some(lon)) => {
                if !(-90.0..=90.0).contains(&lat) {
                    return Err(ConfigError::Message(
                        "Location latitude must be between -90 and 90".to_string(),
                    ));
                }
                if !(-180.0..=180.0).contains(&lon) {
                    return Err(ConfigError::Message(
                        "Location longitude must be between -180 and 180".to_string(),
                    ));
                }
            }
            (None, None) => {}
            _ => {
                return Err(ConfigError::Message(
                    "Location latitude and longitude must be set together".to_string(),
                ));
            }
        }

        // Validate system settings
        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for AttendcamConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                base_url: default_base_url(),
                request_timeout_seconds: default_request_timeout(),
            },
            camera: CameraConfig {
                index: default_camera_index(),
                resolution: default_camera_resolution(),
                jpeg_quality: default_jpeg_quality(),
                frame_timeout_seconds: default_frame_timeout(),
            },
            location: LocationConfig {
                latitude: None,
                longitude: None,
            },
            battery: BatteryConfig {
                capacity_path: default_capacity_path(),
            },
            credentials: CredentialsConfig {
                store_path: default_store_path(),
            },
            system: SystemConfig {
                event_bus_capacity: default_event_bus_capacity(),
            },
        }
    }
}

// Default value functions
fn default_base_url() -> String {
    "http://127.0.0.1:8000".to_string()
}
fn default_request_timeout() -> u64 {
    30
}

fn default_camera_index() -> u32 {
    0
}
fn default_camera_resolution() -> (u32, u32) {
    (1280, 720)
}
fn default_jpeg_quality() -> u32 {
    80
}
fn default_frame_timeout() -> u64 {
    5
}

fn default_capacity_path() -> String {
    "/sys/class/power_supply/BAT0/capacity".to_string()
}

fn default_store_path() -> String {
    "./credentials.toml".to_string()
}

fn default_event_bus_capacity() -> usize {
    100
}
