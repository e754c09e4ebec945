//! Tracing subscriber setup for the `audition` binary.
//!
//! Filter priority, highest first:
//!
//! 1. `AUDITION_LOG` (directives, e.g. `audition_core=debug,warn`)
//! 2. `RUST_LOG`
//! 3. `-v` / `-q` flags
//! 4. `info`
//!
//! `AUDITION_LOG` outranks `RUST_LOG` so audition's verbosity can be tuned
//! in a shell where `RUST_LOG` is already set for other tools, without
//! editing or unsetting it. A value that fails to parse is skipped and the
//! next source is tried, so a typo never stops a run.

use tracing::Level;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "AUDITION_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// `-q`: errors only.
    Quiet,
    Normal,
    /// `-v`: debug output, including per-rule regret traces.
    Verbose,
}

impl Verbosity {
    pub const fn from_flags(verbose: bool, quiet: bool) -> Self {
        if verbose {
            Self::Verbose
        } else if quiet {
            Self::Quiet
        } else {
            Self::Normal
        }
    }

    pub const fn default_level(self) -> Level {
        match self {
            Self::Quiet => Level::ERROR,
            Self::Normal => Level::INFO,
            Self::Verbose => Level::DEBUG,
        }
    }
}

/// Install the global subscriber. Call once, before loading config.
///
/// Logs go to stderr, leaving stdout for tables and summaries. Verbose runs
/// add uptime stamps and event targets.
///
/// # Panics
///
/// If a global subscriber is already installed.
pub fn init_subscriber(verbosity: Verbosity) {
    let filter = build_env_filter(verbosity);
    let use_ansi = std::io::IsTerminal::is_terminal(&std::io::stderr());

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(use_ansi)
        .with_target(verbosity == Verbosity::Verbose)
        .with_level(true);

    if verbosity == Verbosity::Verbose {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.with_timer(fmt::time::uptime()))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.without_time().compact())
            .init();
    }
}

fn build_env_filter(verbosity: Verbosity) -> EnvFilter {
    select_filter(
        std::env::var(LOG_ENV).ok().as_deref(),
        std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref(),
        verbosity,
    )
}

/// First parseable source in priority order.
fn select_filter(
    audition_log: Option<&str>,
    rust_log: Option<&str>,
    verbosity: Verbosity,
) -> EnvFilter {
    for directives in [audition_log, rust_log].into_iter().flatten() {
        if let Ok(filter) = EnvFilter::try_new(directives) {
            return filter;
        }
    }
    EnvFilter::new(verbosity.default_level().as_str())
}
