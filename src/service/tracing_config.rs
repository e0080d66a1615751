// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use super::{AppError, AppResult, LogConfig};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Maps `-v` occurrences to a default directive, `RUST_LOG` still wins.
fn env_filter(verbose: u8) -> EnvFilter {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Stdout only, for tests and local runs.
pub fn setup_local_tracing() -> AppResult<()> {
    dotenv::dotenv().ok();
    let timer = ChronoLocal::new(TIME_FORMAT.to_string());
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_timer(timer)
        .with_target(true)
        .with_thread_names(true)
        .with_thread_ids(true)
        .with_line_number(true);
    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(EnvFilter::from_default_env())
        .try_init()
        .map_err(|e| AppError::IllegalStateError(format!("tracing already set up: {}", e)))
}

/// Writes to stdout and to an hourly rolling file under `log.dir`.
///
/// Keep the returned guard alive, dropping it flushes and stops the file
/// writer.
pub fn setup_tracing(log: &LogConfig, verbose: u8) -> AppResult<WorkerGuard> {
    let file_appender = tracing_appender::rolling::hourly(&log.dir, &log.file_prefix);
    let (non_blocking, worker_guard) = tracing_appender::non_blocking(file_appender);

    // console and file at once
    let writer = non_blocking.and(std::io::stdout);

    let timer = ChronoLocal::new(TIME_FORMAT.to_string());
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_timer(timer)
        .with_target(true)
        .with_thread_names(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(true)
        .with_writer(writer);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter(verbose))
        .try_init()
        .map_err(|e| AppError::IllegalStateError(format!("tracing already set up: {}", e)))?;

    Ok(worker_guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_tracing_installs_once() {
        assert!(setup_local_tracing().is_ok());
        tracing::info!("local tracing installed");
        assert!(matches!(
            setup_local_tracing(),
            Err(AppError::IllegalStateError(_))
        ));
    }
}
