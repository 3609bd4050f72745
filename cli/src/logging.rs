use std::env;

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable holding a tracing filter, e.g. `mediasort_engine=debug`.
pub const LOG_ENV: &str = "MEDIASORT_LOG";

/// Install the global subscriber, writing to stderr so stdout stays clean.
///
/// `MEDIASORT_LOG` wins when set; otherwise the level is `info`, or `debug`
/// with `--verbose`.
pub fn init_logging(verbose: bool) {
    let directive = filter_directive(verbose, env::var(LOG_ENV).ok());
    let filter_layer = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"));

    // A second init (tests) is harmless
    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time(),
        )
        .with(filter_layer)
        .try_init();
}

fn filter_directive(verbose: bool, from_env: Option<String>) -> String {
    match from_env {
        Some(directive) if !directive.trim().is_empty() => directive,
        _ if verbose => "debug".to_string(),
        _ => "info".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directive() {
        assert_eq!(filter_directive(false, None), "info");
        assert_eq!(filter_directive(true, None), "debug");
        assert_eq!(filter_directive(true, Some("warn".to_string())), "warn");
        assert_eq!(filter_directive(false, Some("  ".to_string())), "info");
    }
}
