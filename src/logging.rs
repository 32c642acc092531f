use chrono::Local;
use log::LevelFilter;
use simplelog::{CombinedLogger, WriteLogger};
use std::fs::OpenOptions;
use std::io::Write;

/// Sets up logging to a file.
///
/// # Arguments
///
/// * `log_level` - The level of log messages to capture
/// * `log_file` - Optional path to log file. If None, creates an hourly timestamped file
///
/// # Returns
///
/// The path of the log file in use
pub fn setup_logging(log_level: LevelFilter, log_file: Option<&str>) -> std::io::Result<String> {
    let log_path = match log_file {
        Some(path) => path.to_string(),
        None => default_log_path(),
    };

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    writeln!(
        file,
        "====== PRODUCTIVITY MCP SERVER LOG - Started at {} ======",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    )?;

    CombinedLogger::init(vec![WriteLogger::new(
        log_level,
        simplelog::Config::default(),
        file,
    )])
    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

    log::info!("Logging initialized to file: {}", log_path);
    log::debug!("Debug logging enabled");

    Ok(log_path)
}

/// `mcp_productivity_<YYYYmmdd_HH>.log` in the working directory.
pub fn default_log_path() -> String {
    format!("mcp_productivity_{}.log", Local::now().format("%Y%m%d_%H"))
}

/// Claude Desktop and `--memory-only` runs cannot write log files.
pub fn is_read_only_environment(memory_only: bool) -> bool {
    memory_only || std::env::var("CLAUDE_DESKTOP").is_ok() || std::env::var("CLAUDE_AI").is_ok()
}
