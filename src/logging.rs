//! tracing subscriber setup for hosts embedding the client.

use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_JSON_VAR: &str = "COIN98_CONNECT_LOG_JSON";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    /// `COIN98_CONNECT_LOG_JSON=1` selects JSON lines.
    pub fn from_env() -> Self {
        Self::parse(std::env::var(LOG_JSON_VAR).ok().as_deref())
    }

    fn parse(value: Option<&str>) -> Self {
        match value {
            Some("1") | Some("true") => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Install a global stderr subscriber filtered by `RUST_LOG` (default `info`).
/// A subscriber installed earlier wins.
pub fn init_logging() {
    init_logging_with(LogFormat::from_env());
}

pub fn init_logging_with(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);
    let _ = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_selection() {
        assert_eq!(LogFormat::parse(None), LogFormat::Pretty);
        assert_eq!(LogFormat::parse(Some("0")), LogFormat::Pretty);
        assert_eq!(LogFormat::parse(Some("1")), LogFormat::Json);
        assert_eq!(LogFormat::parse(Some("true")), LogFormat::Json);
    }

    #[test]
    fn init_is_repeatable() {
        init_logging_with(LogFormat::Json);
        init_logging_with(LogFormat::Pretty);
    }
}
