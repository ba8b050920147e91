use std::fs;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::AppConfig;

/// Installs the global tracing subscriber.
///
/// Log lines go to a daily rolling file under `log_dir` and, when enabled, to
/// stdout. The filter comes from `LOG_LEVEL` if it parses, otherwise from the
/// configured level. Keep the returned guard alive until shutdown or buffered
/// lines are lost.
pub fn init_logging(cfg: &AppConfig) -> WorkerGuard {
    fs::create_dir_all(&cfg.log_dir).ok();

    let file_appender = rolling::daily(&cfg.log_dir, &cfg.log_file);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true);

    let stdout_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(true)
        .with_target(true);

    let env_filter = EnvFilter::try_from_env("LOG_LEVEL")
        .unwrap_or_else(|_| EnvFilter::new(&cfg.log_level));

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer);

    if cfg.log_to_stdout {
        registry.with(stdout_layer).init();
    } else {
        registry.init();
    }

    guard
}
