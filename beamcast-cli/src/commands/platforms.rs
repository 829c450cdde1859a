//! Platforms command - list supported platform presets

use anyhow::Result;
use beamcast_core::config::Platform;

/// List the platform presets and their ingest URL templates
pub async fn platforms() -> Result<()> {
    println!("Supported platforms:\n");

    for platform in Platform::presets() {
        match platform.url_template() {
            Some(template) => {
                println!("  {:<10} {}", platform.to_string(), template.replace("{key}", "<stream key>"));
            }
            None => {
                println!("  {:<10} (requires --url)", platform.to_string());
            }
        }
    }

    println!();
    println!("Stream with:");
    println!("  beamcast stream --platform twitch --key <stream key>");
    println!("  beamcast stream --url rtmp://ingest.example.com/live --key <stream key>");

    Ok(())
}
