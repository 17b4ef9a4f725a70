// ABOUTME: Tracing subscriber setup for the vbox binary
// ABOUTME: VBOX_LOG wins over RUST_LOG; --verbose only changes the fallback level

use tracing_subscriber::EnvFilter;
use vbox_config::constants::VBOX_LOG;

fn fallback_level(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "info"
    }
}

pub fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_env(VBOX_LOG)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(fallback_level(verbose)))
}

/// Install a compact stderr subscriber. Safe to call more than once.
pub fn init(verbose: bool) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbose))
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_level() {
        assert_eq!(fallback_level(false), "info");
        assert_eq!(fallback_level(true), "debug");
    }
}
