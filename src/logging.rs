//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

/// Filter directive to use: `RUST_LOG` wins, then `--verbose`, then the
/// configured level.
pub fn filter_directive(env: Option<String>, verbose: bool, configured: &str) -> String {
    match env {
        Some(directive) if !directive.trim().is_empty() => directive,
        _ if verbose => "debug".to_string(),
        _ => configured.to_string(),
    }
}

/// Install the global subscriber. Safe to call more than once; later calls
/// are ignored.
pub fn init(verbose: bool, configured_level: &str) {
    let directive = filter_directive(std::env::var("RUST_LOG").ok(), verbose, configured_level);
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_precedence() {
        assert_eq!(filter_directive(Some("warn".into()), true, "info"), "warn");
        assert_eq!(filter_directive(None, true, "info"), "debug");
        assert_eq!(filter_directive(Some(" ".into()), false, "error"), "error");
        assert_eq!(filter_directive(None, false, "info"), "info");
    }
}
