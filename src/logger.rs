use chrono::Local;
use std::fs::{create_dir_all, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::settings;

const LOG_FILE: &str = "yay-packer.log";

pub struct Logger {
    log_path: PathBuf,
}

impl Logger {
    pub fn new() -> Self {
        Self::in_dir(&Self::default_log_dir())
    }

    pub fn in_dir(dir: &Path) -> Self {
        if let Err(e) = create_dir_all(dir) {
            eprintln!("Failed to create log directory {}: {}", dir.display(), e);
        }

        Self {
            log_path: dir.join(LOG_FILE),
        }
    }

    fn default_log_dir() -> PathBuf {
        // ~/.local/share/yay-packer on most systems
        dirs::data_local_dir()
            .map(|d| d.join("yay-packer"))
            .unwrap_or_else(|| PathBuf::from("/tmp/yay-packer"))
    }

    pub fn log(&self, level: LogLevel, message: &str) {
        let cfg = settings::get();
        if level.rank() > threshold(&cfg.log_level) {
            return;
        }

        self.rotate_if_needed(cfg.max_log_size_mb.max(1) * 1024 * 1024);

        let entry = format_entry(level, message);
        if let Ok(mut file) = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
        {
            let _ = file.write_all(entry.as_bytes());
        }

        if matches!(level, LogLevel::Error | LogLevel::Warning) {
            eprint!("{}", entry);
        }
    }

    #[cfg(test)]
    fn log_path(&self) -> &Path {
        &self.log_path
    }

    fn rotate_if_needed(&self, max_bytes: u64) {
        let Ok(meta) = std::fs::metadata(&self.log_path) else {
            return;
        };
        if meta.len() <= max_bytes {
            return;
        }

        let rotated = self.log_path.with_extension("log.1");
        let _ = std::fs::remove_file(&rotated);
        let _ = std::fs::rename(&self.log_path, rotated);
    }
}

fn threshold(configured: &str) -> i32 {
    match configured {
        "error" => 0,
        "warn" => 1,
        "info" => 2,
        "debug" => 3,
        _ => 2,
    }
}

fn format_entry(level: LogLevel, message: &str) -> String {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
    format!("[{}] {}: {}\n", timestamp, level.as_str(), message)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Debug,
}

impl LogLevel {
    fn as_str(&self) -> &str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Debug => "DEBUG",
        }
    }

    fn rank(&self) -> i32 {
        match self {
            LogLevel::Error => 0,
            LogLevel::Warning => 1,
            LogLevel::Info => 2,
            LogLevel::Debug => 3,
        }
    }
}

static LOGGER: OnceLock<Logger> = OnceLock::new();

pub fn get_logger() -> &'static Logger {
    LOGGER.get_or_init(Logger::new)
}

pub fn log_info(message: &str) {
    get_logger().log(LogLevel::Info, message);
}

pub fn log_warning(message: &str) {
    get_logger().log(LogLevel::Warning, message);
}

pub fn log_error(message: &str) {
    get_logger().log(LogLevel::Error, message);
}

pub fn log_debug(message: &str) {
    get_logger().log(LogLevel::Debug, message);
}
