//! Logging and observability infrastructure
//!
//! Structured logging via `tracing`. The pipeline logs stage transitions at
//! `info`, strategy decisions at `debug`, and policy skips at `warn`.

use std::io::IsTerminal;
use tracing_subscriber::{
    EnvFilter,
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Check if colored output should be used.
///
/// True only when stdout is a TTY and `NO_COLOR` is unset.
fn use_color() -> bool {
    std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none()
}

/// Initialize the tracing subscriber.
///
/// Verbose mode widens the default filter to `debug` and prints targets so
/// per-stage events can be attributed to their crate.
///
/// # Errors
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            if verbose {
                EnvFilter::try_new("datasynth=debug,info")
            } else {
                EnvFilter::try_new("datasynth=info,warn")
            }
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(verbose)
                .with_ansi(use_color())
                .compact(),
        )
        .try_init()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_is_idempotent_enough() {
        // First call may succeed or fail depending on test order; the second
        // must fail cleanly rather than panic.
        let _ = init_tracing(false);
        assert!(init_tracing(true).is_err());
    }
}
