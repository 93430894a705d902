use anyhow::{anyhow, Context};
use std::{
    io::{self, Read, Write},
    path::{Path, PathBuf},
    sync::OnceLock,
};
use tracing_appender::rolling;
use tracing_subscriber::{
    filter::filter_fn, fmt::layer as fmt_layer, prelude::*, EnvFilter, Registry,
};

use feed_sanitizer::{config::AppConfig, Sanitizer};

fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("failed to load configuration")?;
    setup_tracing(&config)?;

    let site_url = std::env::args()
        .nth(1)
        .ok_or_else(|| anyhow!("usage: feed-sanitizer <site-url> < input.html"))?;

    let filter = config.filter_config()?;

    let mut input = String::new();
    io::stdin()
        .read_to_string(&mut input)
        .context("failed to read markup from stdin")?;

    let output = Sanitizer::new(&filter).sanitize(&input, &site_url);
    tracing::info!(
        %site_url,
        input_bytes = input.len(),
        output_bytes = output.len(),
        max_depth = filter.max_depth,
        "markup sanitized"
    );

    let mut stdout = io::stdout().lock();
    stdout.write_all(output.as_bytes())?;
    stdout.write_all(b"\n")?;
    stdout.flush()?;

    Ok(())
}

/// Split the log path into an existing directory and a file name.
fn log_file_location(path: &str) -> anyhow::Result<(PathBuf, String)> {
    let path = Path::new(path);
    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(|| anyhow!("invalid log file path {path:?}"))?
        .to_string();
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&directory)
        .with_context(|| format!("failed to create log directory {directory:?}"))?;
    Ok((directory, file_name))
}

fn setup_tracing(config: &AppConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = config
            .logging
            .level
            .clone()
            .unwrap_or_else(|| "info".to_string());
        EnvFilter::new(level)
    });

    let (directory, file_name) = log_file_location(&config.logging.file)?;
    let file_appender = rolling::never(directory, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
    let _ = FILE_GUARD.set(guard);

    let crate_filter = filter_fn(|meta| meta.target().starts_with("feed_sanitizer"));

    // stdout carries the sanitized markup, so diagnostics go to stderr
    let stderr_layer = fmt_layer()
        .with_writer(io::stderr)
        .with_file(true)
        .with_line_number(true);

    let file_layer = fmt_layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_file(true)
        .with_line_number(true)
        .with_filter(crate_filter);

    Registry::default()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("failed to init tracing subscriber")?;

    Ok(())
}
