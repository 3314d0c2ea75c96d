//! Structured console logging
//!
//! Tag + level logger with colored fixed-width prefixes. Debug output is
//! gated per module: `DEBUG=scheduler,hub` enables those tags,
//! `DEBUG=all` (or `NODE_ENV=development` with `DEBUG` unset) enables all.
//!
//! ```text
//! [SCHED   ] [ENROL        ] added repeating job price-So111...
//! ```
//!
//! Call `logger::init()` once at startup before anything logs.

mod levels;
mod tags;

pub use levels::LogLevel;
pub use tags::LogTag;

use chrono::Local;
use colored::Colorize;
use once_cell::sync::OnceCell;
use std::collections::HashSet;

const TAG_WIDTH: usize = 8;
const EVENT_WIDTH: usize = 13;

#[derive(Debug, Default)]
struct LoggerConfig {
    min_level: Option<LogLevel>,
    debug_all: bool,
    debug_tags: HashSet<String>,
}

static CONFIG: OnceCell<LoggerConfig> = OnceCell::new();

/// Initialize the logger from the environment. Safe to call more than once;
/// only the first call takes effect.
pub fn init() {
    let _ = CONFIG.set(load_config());
}

fn load_config() -> LoggerConfig {
    let mut config = LoggerConfig {
        min_level: std::env::var("LOG_LEVEL")
            .ok()
            .and_then(|raw| LogLevel::parse(&raw)),
        ..Default::default()
    };

    match std::env::var("DEBUG") {
        Ok(raw) => {
            for part in raw.split(',') {
                let part = part.trim().to_ascii_lowercase();
                if part == "all" || part == "*" {
                    config.debug_all = true;
                } else if !part.is_empty() {
                    config.debug_tags.insert(part);
                }
            }
        }
        Err(_) => {
            // Development builds get full debug output without flags.
            if std::env::var("NODE_ENV").as_deref() == Ok("development") {
                config.debug_all = true;
            }
        }
    }

    config
}

fn config() -> &'static LoggerConfig {
    CONFIG.get_or_init(load_config)
}

fn should_log(tag: LogTag, level: LogLevel) -> bool {
    if level == LogLevel::Error {
        return true;
    }
    let config = config();
    if let Some(min) = config.min_level {
        if level > min {
            return false;
        }
    }
    if level == LogLevel::Debug {
        return config.debug_all || config.debug_tags.contains(tag.debug_key());
    }
    true
}

/// Log a tagged event. `event` is a short machine-ish label (ENROL, CACHE_HIT,
/// FANOUT); `message` carries the detail.
pub fn log(tag: LogTag, event: &str, message: &str) {
    let level = match event.to_uppercase().as_str() {
        "ERROR" => LogLevel::Error,
        "WARN" | "WARNING" => LogLevel::Warning,
        "DEBUG" => LogLevel::Debug,
        _ => LogLevel::Info,
    };
    if !should_log(tag, level) {
        return;
    }
    write_line(tag, event, message);
}

fn write_line(tag: LogTag, event: &str, message: &str) {
    let time = Local::now().format("%H:%M:%S").to_string();

    let tag_str = format!("{:<width$}", tag.label(), width = TAG_WIDTH);
    let tag_str = match tag {
        LogTag::System => tag_str.bright_yellow().bold(),
        LogTag::Config => tag_str.yellow().bold(),
        LogTag::Cache => tag_str.bright_magenta().bold(),
        LogTag::Database => tag_str.magenta().bold(),
        LogTag::Chain => tag_str.bright_cyan().bold(),
        LogTag::Market => tag_str.cyan().bold(),
        LogTag::Risk => tag_str.red().bold(),
        LogTag::Validator => tag_str.bright_blue().bold(),
        LogTag::Pricing => tag_str.bright_green().bold(),
        LogTag::Scheduler => tag_str.green().bold(),
        LogTag::Hub => tag_str.blue().bold(),
        LogTag::Webserver => tag_str.white().bold(),
    };

    let event_str = format!("{:<width$}", event.to_uppercase(), width = EVENT_WIDTH);
    let event_str = match event.to_uppercase().as_str() {
        "ERROR" => event_str.bright_red().bold(),
        "WARN" | "WARNING" => event_str.bright_yellow().bold(),
        "DEBUG" => event_str.bright_black().bold(),
        "SUCCESS" => event_str.bright_green().bold(),
        "INFO" => event_str.bright_blue().bold(),
        _ => event_str.white().bold(),
    };

    println!(
        "{} [{}] [{}] {}",
        time.dimmed(),
        tag_str,
        event_str,
        message
    );
}

pub fn error(tag: LogTag, message: &str) {
    log(tag, "ERROR", message);
}

pub fn warning(tag: LogTag, message: &str) {
    log(tag, "WARNING", message);
}

pub fn info(tag: LogTag, message: &str) {
    log(tag, "INFO", message);
}

pub fn debug(tag: LogTag, message: &str) {
    log(tag, "DEBUG", message);
}

/// Truncate a mint for log lines; full addresses drown the console. Works on
/// char boundaries because malformed inbound frames end up here too.
pub fn short_mint(mint: &str) -> &str {
    match mint.char_indices().nth(8) {
        Some((idx, _)) => &mint[..idx],
        None => mint,
    }
}
