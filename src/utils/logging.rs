//! Logger setup plus per-module switchable logging macros.
//!
//! A module opts into the macros by declaring its own switch:
//! ```ignore
//! const ENABLE_LOGS: bool = true;
//! use crate::{log_debug, log_info};
//!
//! log_info!("sensor connected");
//! ```
//! Flipping the constant to `false` silences that module without touching
//! the global `RUST_LOG` filter.

use log::LevelFilter;

/// Maps `-v` repetitions onto a level. `RUST_LOG` still wins when set.
pub fn level_for_verbosity(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Installs `env_logger` once for the process.
pub fn init_logging(verbose: u8) {
    let _ = env_logger::Builder::new()
        .filter_level(level_for_verbosity(verbose))
        .parse_default_env()
        .format_timestamp_millis()
        .try_init();
}

/// Logs at `$level` when the calling module's `ENABLE_LOGS` is true.
#[macro_export]
macro_rules! log_gated {
    ($level:expr, $($arg:tt)+) => {
        if ENABLE_LOGS {
            ::log::log!($level, $($arg)+);
        }
    };
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)+) => { $crate::log_gated!(::log::Level::Debug, $($arg)+) };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)+) => { $crate::log_gated!(::log::Level::Info, $($arg)+) };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)+) => { $crate::log_gated!(::log::Level::Warn, $($arg)+) };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)+) => { $crate::log_gated!(::log::Level::Error, $($arg)+) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_raises_level() {
        assert_eq!(level_for_verbosity(0), LevelFilter::Info);
        assert_eq!(level_for_verbosity(1), LevelFilter::Debug);
        assert_eq!(level_for_verbosity(7), LevelFilter::Trace);
    }

    const ENABLE_LOGS: bool = false;

    #[test]
    fn gated_macros_work_as_statements_and_match_arms() {
        let outcome: Result<u8, &str> = Err("unplugged");
        match outcome {
            Ok(n) => crate::log_info!("got {n}"),
            Err(reason) => crate::log_warn!("lost link: {reason}"),
        }
        crate::log_debug!("debug {}", 1);
        crate::log_error!("error");
    }

    #[test]
    fn init_is_idempotent() {
        init_logging(0);
        init_logging(2);
    }
}
