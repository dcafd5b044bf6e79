// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Global logger instance and initialization.

use super::output::{LogLevel, Output};
use std::io;
use std::sync::{Arc, Mutex, OnceLock};

static LOGGER: OnceLock<Mutex<GlobalLogger>> = OnceLock::new();

struct GlobalLogger {
    output: Option<Arc<dyn Output>>,
    level_filter: LogLevel,
}

impl GlobalLogger {
    fn new() -> Self {
        Self {
            output: None,
            level_filter: LogLevel::Info,
        }
    }

    fn log(&self, level: LogLevel, message: &str) -> io::Result<()> {
        if level < self.level_filter {
            return Ok(());
        }
        if let Some(ref output) = self.output {
            output.write_line(level, message)?;
        }
        Ok(())
    }
}

fn global() -> &'static Mutex<GlobalLogger> {
    LOGGER.get_or_init(|| Mutex::new(GlobalLogger::new()))
}

/// Install the output destination and minimum level. Call once, early
/// in the process.
pub fn init_logger(output: Arc<dyn Output>, level: LogLevel) {
    let mut guard = global().lock().unwrap_or_else(|e| e.into_inner());
    guard.output = Some(output);
    guard.level_filter = level;
}

/// No buffering is performed today; kept so call sites that expect an
/// explicit flush point (e.g. before process exit) have one.
pub fn flush_logger() {}

/// Entry point used by the `debug!`/`info!`/`warn!`/`error!` macros.
pub fn log_message(level: LogLevel, message: &str) -> io::Result<()> {
    global().lock().unwrap_or_else(|e| e.into_inner()).log(level, message)
}

/// Entry point used by [`crate::error::Error::internal`] regardless of
/// whether the caller also enabled `trace`.
pub fn log_error(message: &str) {
    let _ = log_message(LogLevel::Error, message);
}

/// Entry point used by the `trace_fn!` macro.
pub fn trace_entry(fn_name: &str) -> io::Result<()> {
    log_message(LogLevel::Debug, &format!("[ENTER:FNC] {fn_name}"))
}
