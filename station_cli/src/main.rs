//! Soldering station CLI entry point: logging setup, config loading, and
//! command dispatch.

mod cli;
mod error_fmt;
mod rt;
mod run;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use eyre::WrapErr;

use cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use error_fmt::{exit_code_for_error, format_error_json, humanize};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    let _ = color_eyre::install();

    if let Err(err) = try_main(&cli) {
        if *JSON_MODE.get().unwrap_or(&false) {
            eprintln!("{}", format_error_json(&err));
        } else {
            eprintln!("Error: {}", humanize(&err));
        }
        std::process::exit(exit_code_for_error(&err));
    }
}

fn try_main(cli: &Cli) -> eyre::Result<()> {
    match &cli.cmd {
        Commands::Health => {
            // Keep this path dependency-free so monitoring works even with a
            // broken config on disk.
            if cli.json {
                println!("{}", serde_json::json!({ "status": "ok" }));
            } else {
                println!("ok");
            }
            Ok(())
        }
        Commands::SelfCheck => {
            let cfg = load_config(cli)?;
            init_tracing(cli, &cfg.logging);
            run::self_check(&cfg)?;
            if cli.json {
                println!("{}", serde_json::json!({ "status": "ok", "check": "self" }));
            } else {
                println!("self-check ok");
            }
            Ok(())
        }
        Commands::Run {
            cycles,
            temp1,
            temp2,
            rt,
            rt_prio,
            rt_lock,
            rt_cpu,
            stats,
        } => {
            let cfg = load_config(cli)?;
            init_tracing(cli, &cfg.logging);

            let calib = cli
                .calibration
                .as_deref()
                .map(station_config::load_calibration_csv)
                .transpose()?;

            let shutdown = Arc::new(AtomicBool::new(false));
            let flag = Arc::clone(&shutdown);
            ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))
                .wrap_err("install Ctrl-C handler")?;

            let report = run::run_station(
                &cfg,
                calib.as_ref(),
                *cycles,
                *temp1,
                *temp2,
                *rt,
                *rt_prio,
                *rt_lock,
                *rt_cpu,
                *stats,
                shutdown,
            )?;

            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "status": "complete",
                        "cycles_completed": report.cycles_completed,
                        "cycles_ignored": report.cycles_ignored,
                        "overload_trips": report.overload_trips,
                    })
                );
            } else {
                println!("run complete: {} cycles", report.cycles_completed);
            }
            Ok(())
        }
    }
}

fn load_config(cli: &Cli) -> eyre::Result<station_config::Config> {
    let text = std::fs::read_to_string(&cli.config)
        .wrap_err_with(|| format!("read config {}", cli.config.display()))?;
    let cfg = station_config::load_toml(&text)
        .wrap_err_with(|| format!("parse config {}", cli.config.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Console logging at the CLI-selected level (RUST_LOG wins when set), plus
/// an optional JSON-lines file sink from `[logging]`.
fn init_tracing(cli: &Cli, logging: &station_config::Logging) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

    let level = logging.level.as_deref().unwrap_or(&cli.log_level);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    layers.push(if cli.json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer().with_writer(std::io::stderr).boxed()
    });

    if let Some(path) = &logging.file {
        let path = std::path::Path::new(path);
        let dir = path.parent().unwrap_or(std::path::Path::new("."));
        let name = path.file_name().unwrap_or(std::ffi::OsStr::new("station.log"));
        let appender = match logging.rotation.as_deref() {
            Some("daily") => tracing_appender::rolling::daily(dir, name),
            Some("hourly") => tracing_appender::rolling::hourly(dir, name),
            _ => tracing_appender::rolling::never(dir, name),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        layers.push(
            fmt::layer()
                .json()
                .with_writer(writer)
                .with_ansi(false)
                .boxed(),
        );
    }

    // A second init (tests calling in-process) is harmless
    let _ = tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init();
}
