use env_logger::{Builder, WriteStyle};
use log::{error, info, warn, LevelFilter};
use std::fs::OpenOptions;
use std::path::Path;

/// Initialize the logging system, appending to the given log file
pub fn initialize_logging(
    log_file: &Path,
    level: LevelFilter,
) -> Result<(), Box<dyn std::error::Error>> {
    // Create or append to log file
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)?;

    Builder::new()
        .filter_level(level)
        .format_timestamp_secs()
        .format_module_path(true)
        .write_style(WriteStyle::Never)
        .target(env_logger::Target::Pipe(Box::new(file)))
        .try_init()?;

    info!("Logging system initialized at level {}", level);
    Ok(())
}

/// Helper function to format sensitive data for logging
pub fn format_sensitive(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{}***{}", head, tail)
}

/// Structured log line for one orchestration stage of one account
pub fn log_reset_event(stage: &str, account: &str, success: bool, details: Option<&str>) {
    let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
    if success {
        info!(
            "Reset event: stage={}, account={}, success=true, timestamp={}, details={:?}",
            stage, account, timestamp, details
        );
    } else {
        warn!(
            "Reset event: stage={}, account={}, success=false, timestamp={}, details={:?}",
            stage, account, timestamp, details
        );
    }
}

/// Structured log line for secret store reads and writes
pub fn log_store_operation(operation: &str, record: &str, success: bool, details: Option<&str>) {
    let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
    if success {
        info!(
            "Store operation: op={}, record={}, success=true, timestamp={}, details={:?}",
            operation,
            format_sensitive(record),
            timestamp,
            details
        );
    } else {
        error!(
            "Store operation: op={}, record={}, success=false, timestamp={}, details={:?}",
            operation,
            format_sensitive(record),
            timestamp,
            details
        );
    }
}
