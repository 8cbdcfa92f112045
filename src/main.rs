//! # rmi-comms demo
//!
//! A small runnable demonstration of the framework: a manager role starts a
//! `ServiceManager` and registers a "sum" RMI service on first lookup; a
//! client role looks up that service and calls it once.

use anyhow::{Context, Result};
use clap::Parser;
use rmi_comms::cli::{Args, Role};
use rmi_comms::logging::ColorizedFormatter;
use rmi_comms::rmi::{MethodRegistry, ServiceManager, ServiceProxy};
use tracing::info;
use tracing_subscriber::{filter::LevelFilter, prelude::*, Layer};

const SUM: i32 = 1;

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = match args.verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    let guard;
    let detailed_log_layer;

    if let Some("stderr") = args.log_file.as_deref() {
        detailed_log_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(log_level)
            .boxed();
        guard = None;
    } else {
        let file_appender = match args.log_file.as_deref() {
            Some(path_str) => {
                let log_path = std::path::Path::new(path_str);
                let log_dir = log_path
                    .parent()
                    .unwrap_or_else(|| std::path::Path::new("."));
                let log_filename = log_path
                    .file_name()
                    .unwrap_or_else(|| std::ffi::OsStr::new("rmi-comms.log"));
                tracing_appender::rolling::daily(log_dir, log_filename)
            }
            None => tracing_appender::rolling::daily(".", "rmi-comms.log"),
        };
        let (non_blocking_writer, file_guard) = tracing_appender::non_blocking(file_appender);
        detailed_log_layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking_writer)
            .with_ansi(false)
            .with_filter(log_level)
            .boxed();
        guard = Some(file_guard);
    }

    let stdout_log = if !args.quiet {
        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .event_format(ColorizedFormatter)
                .with_filter(log_level),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(detailed_log_layer)
        .with(stdout_log)
        .init();
    let _log_guard = guard;

    match args.role {
        Role::Manager => run_manager(&args),
        Role::Client => run_client(&args),
    }
}

/// Start a service manager and block, serving lookups for the demo "sum"
/// service until interrupted.
fn run_manager(args: &Args) -> Result<()> {
    info!(uri = %args.manager_uri, "starting service manager");
    let manager = ServiceManager::bind(&args.manager_uri, args.poll_interval)
        .context("failed to bind service manager")?;

    let service_endpoint = args.service_endpoint.clone();
    manager.register_service("sum", service_endpoint, || {
        let mut registry = MethodRegistry::new();
        registry.register(SUM, |(a, b): (i32, i32)| a + b);
        registry
    });

    info!("service manager ready, registered 'sum' for lazy start; press Ctrl+C to exit");
    loop {
        std::thread::sleep(args.poll_interval);
    }
}

/// Look up the demo "sum" service through the manager and call it once.
fn run_client(args: &Args) -> Result<()> {
    info!(manager = %args.manager_uri, "looking up 'sum' service");
    let proxy = ServiceProxy::lookup_and_connect(&args.manager_uri, "sum")
        .context("failed to look up and connect to 'sum' service")?;

    let result: i32 = proxy
        .call(SUM)
        .invoke(&(args.a, args.b))
        .context("sum call failed")?;

    info!(a = args.a, b = args.b, result, "sum call succeeded");
    println!("{} + {} = {}", args.a, args.b, result);
    Ok(())
}
