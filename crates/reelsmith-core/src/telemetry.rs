//! Tracing setup shared by `reelsmith` and `reelsmithd`.
//!
//! Logs always go to stderr; stdout is reserved for command results.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Filter used when `RUST_LOG` is unset: our crates at `level`, HTTP
/// plumbing at `warn` unless we are debugging.
pub fn default_directives(level: Level) -> String {
    let plumbing = if level >= Level::DEBUG { level } else { Level::WARN };
    format!(
        "{level},reelsmith_core={level},reelsmithd={level},reelsmith={level},\
         tower_http={level},hyper={plumbing},reqwest={plumbing}",
        level = level.as_str().to_ascii_lowercase(),
        plumbing = plumbing.as_str().to_ascii_lowercase(),
    )
}

/// Install the global subscriber. Only the first call in a process wins.
pub fn init_tracing(json: bool, level: Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if json {
        registry
            .with(fmt::layer().json().with_current_span(true).with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
    };
    installed.ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_init_is_harmless() {
        init_tracing(false, Level::WARN);
        init_tracing(true, Level::DEBUG);
    }

    #[test]
    fn plumbing_is_quiet_by_default() {
        let info = default_directives(Level::INFO);
        assert!(info.contains("reelsmith_core=info"));
        assert!(info.contains("hyper=warn"));

        let trace = default_directives(Level::TRACE);
        assert!(trace.contains("hyper=trace"));
    }
}
