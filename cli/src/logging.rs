use anyhow::{Context, Result};
use flexi_logger::{Logger, LoggerHandle, WriteMode};

pub const LOG_ENV_VAR: &str = "FROSTBOX_LOG";
const DEFAULT_LOG_SPEC: &str = "info";

/// Pick the log spec: `FROSTBOX_LOG`, then `RUST_LOG`, then `info`.
fn log_spec(frostbox_log: Option<String>, rust_log: Option<String>) -> String {
    frostbox_log
        .or(rust_log)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_LOG_SPEC.to_string())
}

/// Start the stderr logger. The returned handle must stay alive for the
/// lifetime of the process.
pub fn init() -> Result<LoggerHandle> {
    let spec = log_spec(
        std::env::var(LOG_ENV_VAR).ok(),
        std::env::var("RUST_LOG").ok(),
    );
    Logger::try_with_str(&spec)
        .with_context(|| format!("Invalid log specification '{spec}' in {LOG_ENV_VAR}"))?
        .log_to_stderr()
        .format(flexi_logger::default_format)
        .write_mode(WriteMode::Direct)
        .start()
        .context("Failed to start logger")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_spec_default() {
        assert_eq!(log_spec(None, None), "info");
        assert_eq!(log_spec(Some("  ".to_string()), None), "info");
    }

    #[test]
    fn test_log_spec_prefers_frostbox_log() {
        assert_eq!(
            log_spec(Some("debug".to_string()), Some("warn".to_string())),
            "debug"
        );
        assert_eq!(log_spec(None, Some("warn".to_string())), "warn");
    }
}
