//! Shared utility functions used across the application

use std::error::Error;
use std::fs;
use std::path::Path;
use std::time::Duration;

use walkdir::WalkDir;

pub const USER_AGENT: &str = concat!("InstMan/", env!("CARGO_PKG_VERSION"));

const CONNECT_TIMEOUT_SECS: u64 = 10;
const IO_TIMEOUT_SECS: u64 = 30;

/// Build the shared HTTP agent with bounded timeouts.
///
/// Connect and per-read/write timeouts are bounded so a stalled repository
/// never blocks a sync forever; there is no overall deadline because game
/// package downloads can legitimately take minutes.
pub fn http_agent() -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .timeout_read(Duration::from_secs(IO_TIMEOUT_SECS))
        .timeout_write(Duration::from_secs(IO_TIMEOUT_SECS))
        .build()
}

/// Download a file from URL to the specified path
pub fn download_file(agent: &ureq::Agent, url: &str, path: &Path) -> Result<(), Box<dyn Error>> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let resp = agent.get(url).set("User-Agent", USER_AGENT).call()?;
    let mut reader = resp.into_reader();
    let mut file = fs::File::create(path)?;
    std::io::copy(&mut reader, &mut file)?;
    Ok(())
}

/// Format a byte count for display (e.g. "11.5 MB")
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    if bytes < 1024 {
        return format!("{} B", bytes);
    }

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", size, UNITS[unit])
}

/// Format transferred bytes against a total as a percentage (e.g. "42%")
pub fn percents(current: u64, total: u64) -> String {
    if total == 0 {
        return "--".to_string();
    }
    let percent = (current as f64 / total as f64 * 100.0).min(100.0);
    format!("{:.0}%", percent)
}

/// Total size in bytes of all files under a directory
pub fn dir_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}
