use colored::Colorize;

use crate::cli::{context, output};
use crate::config::app_config::AppConfig;
use crate::core::errors::Result;
use crate::core::traits::object_storage::ObjectStorage;

/// Execute the `envault files` command: list stored envelopes, newest first.
pub fn execute(location: Option<&str>) -> Result<()> {
    let dir = context::require_initialized()?;
    let config = AppConfig::load(dir)?;
    let storage = context::object_storage(dir, &config)?;

    let objects = storage.list(location)?;
    if objects.is_empty() {
        output::header("envault files");
        output::warning("No stored envelopes");
        let codes: Vec<String> = storage.locations().into_iter().map(|l| l.code).collect();
        println!("  Locations: {}", codes.join(", "));
        return Ok(());
    }

    output::header(&format!("envault files ({})", objects.len()));
    println!();
    for object in &objects {
        let key = object
            .metadata
            .get("keyName")
            .map(String::as_str)
            .unwrap_or("-");
        println!(
            "  {} {} {:<8} {:<32} {:>10}  {}",
            object.timestamp.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
            "│".dimmed(),
            object.location,
            object.name,
            format!("{} B", object.size),
            key.dimmed(),
        );
    }
    Ok(())
}
