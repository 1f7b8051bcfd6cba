use std::io;

use anyhow::{Context, Result};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVE: &str = "warn";

/// Install the stderr subscriber. `RUST_LOG` directives are layered on top of `filter`.
pub fn init_tracing(filter: Option<&str>) -> Result<()> {
    let filter = filter.unwrap_or(DEFAULT_DIRECTIVE);
    let directive: Directive = filter
        .parse()
        .with_context(|| format!("Invalid log directive '{filter}'"))?;
    let env_filter = EnvFilter::builder()
        .with_default_directive(directive)
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .with_target(false)
        .compact()
        .try_init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_directive() {
        assert!(init_tracing(Some("taskdeck=loud")).is_err());
    }

    #[test]
    fn repeated_init_is_harmless() {
        assert!(init_tracing(Some("taskdeck_core=debug")).is_ok());
        assert!(init_tracing(None).is_ok());
    }
}
