//! Tracing subscriber bootstrap.

use tracing_subscriber::{fmt, EnvFilter};

use crate::types::{EpgmError, Result};

/// Installs a global `tracing` subscriber filtered by `level`.
///
/// `level` accepts any `EnvFilter` directive, e.g. `"info"` or
/// `"epgm::query::planner=debug"`.
pub fn init_logging(level: &str) -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_new(level)
                .map_err(|e| EpgmError::Config(format!("invalid log level: {e}")))?,
        )
        .with_target(true)
        .with_thread_ids(true)
        .try_init()
        .map_err(|_| EpgmError::Config("logging already initialized".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_directives() {
        let err = init_logging("epgm=loud").unwrap_err();
        assert_eq!(err.code(), "Config");
    }

    #[test]
    fn second_initialisation_is_a_config_error() {
        let _ = init_logging("warn");
        let err = init_logging("warn").unwrap_err();
        assert_eq!(err.code(), "Config");
    }
}
