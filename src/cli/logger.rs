// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Colored console backend for the `log` facade

use anyhow::{anyhow, Result};
use colored::*;
use log::{Level, LevelFilter, Metadata, Record};

struct ConsoleLogger;

static LOGGER: ConsoleLogger = ConsoleLogger;

impl log::Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        match record.level() {
            Level::Error => eprintln!("{} {}", "ERROR:".red().bold(), record.args()),
            Level::Warn => eprintln!("{} {}", "WARNING:".yellow().bold(), record.args()),
            Level::Info => println!("{}", record.args()),
            Level::Debug | Level::Trace => {
                println!("{}", format!("[{}] {}", record.target(), record.args()).bright_black())
            }
        }
    }

    fn flush(&self) {}
}

/// Install the console logger; `verbose` enables debug output
pub fn init(verbose: bool) -> Result<()> {
    log::set_logger(&LOGGER).map_err(|e| anyhow!("failed to install logger: {}", e))?;
    log::set_max_level(if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    });
    Ok(())
}
