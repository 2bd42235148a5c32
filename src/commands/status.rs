use anyhow::{Context, Result};
use std::path::Path;

use acp_observer::acp::{AcpClient, ObservatoryClient};
use acp_observer::config::Config;

/// Connect once and print the decoded observatory status
pub async fn status(path: &Path) -> Result<()> {
    let mut config = Config::from_file(path)?;
    config.apply_env_overrides();

    let client = AcpClient::new(&config.server).context("Failed to create ACP client")?;
    client
        .connect()
        .await
        .with_context(|| format!("Failed to connect to {}", client.base_url()))?;

    let result = client.observatory_status().await;
    let title = client.title().await;
    client.disconnect().await;
    let status = result.context("Failed to fetch observatory status")?;

    println!("Server: {} ({})", client.base_url(), title.as_deref().unwrap_or("untitled"));
    println!("Observatory: {}", status.observatory_status);
    println!("Owner: {}", status.owner);
    println!("Telescope: {}", status.telescope_status);
    println!("Camera: {}", status.camera_status);
    println!("Guider: {}", status.guider_status);
    println!("Position: RA {} Dec {} (alt {} az {})", status.current_ra, status.current_dec, status.current_alt, status.current_az);
    println!("Filter: {}  Temperature: {}", status.image_filter, status.image_temperature);
    println!("Plan progress: {}  Last FWHM: {}", status.plan_progress, status.last_fwhm);
    println!("Local {}  UTC {}  LST {}", status.local_time, status.utc_time, status.lst);
    for warning in &status.warnings {
        println!("Warning: {warning}");
    }
    Ok(())
}
