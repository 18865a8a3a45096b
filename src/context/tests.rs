use super::*;
use crate::config::{BatteryConfig, LocationConfig};
use crate::error::CaptureError;
use std::io::Write;

fn location_config(latitude: Option<f64>, longitude: Option<f64>) -> LocationConfig {
    LocationConfig {
        latitude,
        longitude,
    }
}

#[tokio::test]
async fn test_fixed_provider_produces_configured_fix() {
    let provider = FixedLocationProvider::new(&location_config(Some(12.9716), Some(77.5946)));

    assert!(provider.is_available());

    let fix = provider.current_fix().await.unwrap();
    assert_eq!(fix.latitude, 12.9716);
    assert_eq!(fix.longitude, 77.5946);
    assert_eq!(fix.as_form_value(), "12.9716,77.5946");
}

#[tokio::test]
async fn test_unconfigured_provider_is_unavailable() {
    let provider = FixedLocationProvider::new(&location_config(None, None));

    assert!(!provider.is_available());

    let err = provider.current_fix().await.unwrap_err();
    assert!(matches!(err, CaptureError::LocationUnavailable { .. }));
}

#[tokio::test]
async fn test_battery_sample_reads_capacity_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "84").unwrap();

    let monitor = BatteryMonitor::new(&BatteryConfig {
        capacity_path: file.path().to_string_lossy().to_string(),
    });

    assert!(monitor.is_available().await);

    let reading = monitor.sample().await;
    assert_eq!(reading.percent, 84);
    assert_eq!(reading.as_form_value(), "84");
}

#[tokio::test]
async fn test_battery_sample_defaults_to_zero_on_missing_file() {
    let monitor = BatteryMonitor::new(&BatteryConfig {
        capacity_path: "/nonexistent/power_supply/capacity".to_string(),
    });

    assert!(!monitor.is_available().await);

    // Read failure is advisory: the sample degrades instead of failing
    let reading = monitor.sample().await;
    assert_eq!(reading.percent, 0);
}

#[tokio::test]
async fn test_battery_sample_defaults_to_zero_on_garbage() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "not-a-number").unwrap();

    let monitor = BatteryMonitor::new(&BatteryConfig {
        capacity_path: file.path().to_string_lossy().to_string(),
    });

    let reading = monitor.sample().await;
    assert_eq!(reading.percent, 0);
}

#[tokio::test]
async fn test_battery_sample_clamps_over_100() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "120").unwrap();

    let monitor = BatteryMonitor::new(&BatteryConfig {
        capacity_path: file.path().to_string_lossy().to_string(),
    });

    let reading = monitor.sample().await;
    assert_eq!(reading.percent, 100);
}

#[test]
fn test_geo_fix_age() {
    let fix = GeoFix::new(0.0, 0.0);
    assert!(fix.age_ms() < 1000);
}
