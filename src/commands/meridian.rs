use anyhow::Result;
use chrono::Utc;
use std::path::Path;

use acp_observer::config::Config;
use acp_observer::meridian::{
    format_hours, local_sidereal_time, MeridianFlipCalculator, MeridianFlipConfig,
    ObservatoryLocation,
};
use acp_observer::utils::{format_clock, format_duration};

/// Print the next meridian crossing and flip window of a coordinate
pub fn meridian(
    ra: &str,
    dec: &str,
    latitude: Option<f64>,
    longitude: Option<f64>,
    config: Option<&Path>,
) -> Result<()> {
    let (location, flip) = match config {
        Some(path) => {
            let config = Config::from_file(path)?;
            (config.observatory, config.meridian_flip)
        }
        None => (ObservatoryLocation::default(), MeridianFlipConfig::default()),
    };
    let location = ObservatoryLocation::new(
        latitude.unwrap_or(location.latitude),
        longitude.unwrap_or(location.longitude),
    );

    let calculator = MeridianFlipCalculator::new(location, flip);
    let now = Utc::now();
    let window = calculator.flip_window(ra, dec, now)?;

    println!("Observatory: lat {:.4}, lon {:.4}", location.latitude, location.longitude);
    println!("Local sidereal time: {}", format_hours(local_sidereal_time(&now, location.longitude)));
    println!("Target: RA {ra}, Dec {dec}");
    println!(
        "Meridian crossing: {} (in {})",
        format_clock(&window.meridian_time),
        format_duration(window.meridian_time - now)
    );
    println!(
        "Flip window: {} .. {}",
        format_clock(&window.stop_time),
        format_clock(&window.resume_time)
    );
    println!("Current phase: {}", window.phase_at(now));
    Ok(())
}
