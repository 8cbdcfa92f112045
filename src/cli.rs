//! Command-line argument parsing for the demo binary.
//!
//! Uses `clap`'s derive API the way the rest of this crate's ambient stack
//! does: a styled `Args` struct, a `parse_duration` value parser for
//! human-readable timeouts, and a small `Role` enum selecting which part of
//! the framework the demo stands up.

use clap::{
    builder::styling::{AnsiColor, Styles},
    Parser, ValueEnum,
};
use std::time::Duration;

/// Defines the styles for the help message to replicate clap v3's appearance.
fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Yellow.on_default())
        .usage(AnsiColor::Yellow.on_default())
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Which part of the messaging framework this invocation stands up.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Role {
    /// Run a service manager hosting a demo "sum" RMI service.
    #[value(name = "manager")]
    Manager,
    /// Look up and call the demo "sum" service once, then exit.
    #[value(name = "client")]
    Client,
}

/// RMI comms demo: stands up a service manager and an RMI service, or calls
/// one, over a real ZeroMQ transport.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None, styles = styles())]
pub struct Args {
    /// Which role to run.
    #[arg(value_enum, default_value_t = Role::Manager, help_heading = "Core Options")]
    pub role: Role,

    /// Endpoint the service manager binds (manager role) or connects to
    /// (client role).
    #[arg(long, default_value = "tcp://127.0.0.1:5555")]
    pub manager_uri: String,

    /// Endpoint the demo "sum" service binds once started.
    #[arg(long, default_value = "tcp://*:5556")]
    pub service_endpoint: String,

    /// First addend sent by the client role.
    #[arg(long, default_value_t = 5)]
    pub a: i32,

    /// Second addend sent by the client role.
    #[arg(long, default_value_t = 4)]
    pub b: i32,

    /// Socket poll interval, e.g. "20ms", "1s".
    #[arg(long, default_value = "20ms", value_parser = parse_duration)]
    pub poll_interval: Duration,

    /// Log file path, or "stderr" to log to stderr instead of a rolling file.
    #[arg(long)]
    pub log_file: Option<String>,

    /// Silence user-facing stdout output (diagnostic logs still go to the
    /// log file/stderr).
    #[arg(short = 'q', long, help_heading = "Output and Logging")]
    pub quiet: bool,

    /// Increase diagnostic log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, help_heading = "Output and Logging")]
    pub verbose: u8,
}

/// Parse a duration from a human-readable string (e.g. "20ms", "5s", "1m").
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("duration cannot be empty".to_string());
    }

    let (num_str, unit) = if let Some(stripped) = s.strip_suffix("ms") {
        (stripped, "ms")
    } else if let Some(stripped) = s.strip_suffix('s') {
        (stripped, "s")
    } else if let Some(stripped) = s.strip_suffix('m') {
        (stripped, "m")
    } else if let Some(stripped) = s.strip_suffix('h') {
        (stripped, "h")
    } else {
        (s, "s")
    };

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("invalid number in duration: {}", num_str))?;
    if num < 0.0 {
        return Err("duration cannot be negative".to_string());
    }

    Ok(match unit {
        "ms" => Duration::from_millis(num as u64),
        "s" => Duration::from_secs(num as u64),
        "m" => Duration::from_secs((num * 60.0) as u64),
        "h" => Duration::from_secs((num * 3600.0) as u64),
        _ => return Err(format!("invalid duration unit: {}", unit)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_supported_suffixes() {
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("10").unwrap(), Duration::from_secs(10));
    }

    #[test]
    fn rejects_empty_negative_and_garbage_input() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("invalid").is_err());
        assert!(parse_duration("-5s").is_err());
    }
}
