//! Verbosity-gated diagnostics on stderr.
//!
//! Nothing is formatted unless the level is enabled. Levels:
//! - 0: SILENT (errors are returned, never logged)
//! - 1: CHANGES (committed mutations, recompute summaries)
//! - 2: CHECKS (relation validation, rejected relations)
//! - 3: DEBUG (graph construction, forward pass and DFS internals)
//!
//! Every line is tagged with its level, e.g. `[cpm changes] Added task 4 under 0`.

pub const VERBOSITY_SILENT: u8 = 0;
pub const VERBOSITY_CHANGES: u8 = 1;
pub const VERBOSITY_CHECKS: u8 = 2;
pub const VERBOSITY_DEBUG: u8 = 3;

/// Whether a message at `level` is emitted under the configured `verbosity`.
#[inline]
pub fn enabled(verbosity: u8, level: u8) -> bool {
    level > VERBOSITY_SILENT && verbosity >= level
}

/// Tag printed in front of messages at `level`.
pub fn level_tag(level: u8) -> &'static str {
    match level {
        VERBOSITY_CHANGES => "changes",
        VERBOSITY_CHECKS => "checks",
        VERBOSITY_DEBUG => "debug",
        _ => "silent",
    }
}

/// Shared body of the level macros.
#[doc(hidden)]
#[macro_export]
macro_rules! log_at {
    ($level:expr, $verbosity:expr, $($arg:tt)*) => {
        if $crate::logging::enabled($verbosity, $level) {
            eprintln!(
                "[cpm {}] {}",
                $crate::logging::level_tag($level),
                format_args!($($arg)*)
            );
        }
    };
}

/// Committed mutations and recompute results.
#[macro_export]
macro_rules! log_changes {
    ($verbosity:expr, $($arg:tt)*) => {
        $crate::log_at!($crate::logging::VERBOSITY_CHANGES, $verbosity, $($arg)*)
    };
}

/// Relation validation: redundant relations, cycle rejections.
#[macro_export]
macro_rules! log_checks {
    ($verbosity:expr, $($arg:tt)*) => {
        $crate::log_at!($crate::logging::VERBOSITY_CHECKS, $verbosity, $($arg)*)
    };
}

/// Graph edges, calculated dates, critical path candidates.
#[macro_export]
macro_rules! log_debug {
    ($verbosity:expr, $($arg:tt)*) => {
        $crate::log_at!($crate::logging::VERBOSITY_DEBUG, $verbosity, $($arg)*)
    };
}
