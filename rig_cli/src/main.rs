#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod cli;
mod error_fmt;
mod motion;
mod output;
mod scale;

use std::path::Path;

use clap::Parser;
use eyre::{Result, WrapErr};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::cli::{Cli, Commands, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};
use crate::output::{emit, json_mode};

/// `RUST_LOG` wins over `--log-level` for the console.
fn console_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Console logs go to stderr so stdout carries only results. The optional
/// file sink always writes JSON lines.
fn init_tracing(cli: &Cli, logging: &rig_config::Logging) -> Option<WorkerGuard> {
    let (json_layer, text_layer) = if cli.json {
        (
            Some(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_filter(console_filter(&cli.log_level)),
            ),
            None,
        )
    } else {
        (
            None,
            Some(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_filter(console_filter(&cli.log_level)),
            ),
        )
    };

    let mut guard = None;
    let file_layer = logging.file.as_deref().map(|file| {
        let path = Path::new(file);
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = path
            .file_name()
            .map_or_else(|| "rig.log".into(), |n| n.to_string_lossy().into_owned());
        let appender = match logging.rotation.as_deref() {
            Some("daily") => tracing_appender::rolling::daily(dir, name),
            Some("hourly") => tracing_appender::rolling::hourly(dir, name),
            _ => tracing_appender::rolling::never(dir, name),
        };
        let (writer, g) = tracing_appender::non_blocking(appender);
        guard = Some(g);
        fmt::layer()
            .json()
            .with_ansi(false)
            .with_writer(writer)
            .with_filter(EnvFilter::new(logging.level.as_deref().unwrap_or("info")))
    });

    if let Err(e) = tracing_subscriber::registry()
        .with(json_layer)
        .with(text_layer)
        .with(file_layer)
        .try_init()
    {
        eprintln!("logging disabled: {e}");
    }
    guard
}

fn load_config(path: &Path) -> Result<rig_config::Config> {
    let cfg = rig_config::load_file(path)?;
    cfg.validate()
        .wrap_err_with(|| format!("invalid configuration in {}", path.display()))?;
    Ok(cfg)
}

fn self_check(cfg: &rig_config::Config, sim: bool) -> Result<()> {
    let (target, axes) = motion::probe(cfg, sim)?;
    let value = scale::probe(cfg, sim)?;
    emit(
        serde_json::json!({
            "command": "self-check",
            "motion": target,
            "axes": axes,
            "scale": value,
            "ok": true,
        }),
        || format!("motion: {target} ({axes} axes) ok\nscale: {value:.4} ok\nself-check ok"),
    );
    Ok(())
}

fn run(cli: &Cli, cfg: &rig_config::Config) -> Result<()> {
    tracing::debug!(config = %cli.config.display(), sim = cli.sim, "starting");
    match &cli.cmd {
        Commands::Weigh { timeout_ms, strict } => scale::weigh(cfg, cli.sim, *timeout_ms, *strict),
        Commands::Watch { count } => scale::watch(cfg, cli.sim, *count),
        Commands::SelfCheck => self_check(cfg, cli.sim),
        cmd => motion::run(cfg, cli.sim, cmd),
    }
}

fn report(err: &eyre::Report) -> i32 {
    tracing::error!(error = %err, "command failed");
    if json_mode() {
        println!("{}", format_error_json(err));
    } else {
        eprintln!("{}", humanize(err));
    }
    exit_code_for_error(err)
}

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    let cfg = match load_config(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => std::process::exit(report(&e)),
    };
    let guard = init_tracing(&cli, &cfg.logging);

    let code = match run(&cli, &cfg) {
        Ok(()) => 0,
        Err(e) => report(&e),
    };
    // Flush the file sink before exiting.
    drop(guard);
    std::process::exit(code);
}
