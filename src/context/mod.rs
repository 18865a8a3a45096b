mod battery;
mod location;

#[cfg(test)]
mod tests;

pub use battery::{BatteryMonitor, BatteryReading};
pub use location::{FixedLocationProvider, GeoFix, LocationProvider, MockLocationProvider};
