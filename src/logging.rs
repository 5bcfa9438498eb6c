//! Logger setup.

use std::sync::Once;

use env_logger::WriteStyle;

static INIT: Once = Once::new();

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is not set, e.g. `info` or `micromodeler=debug`.
    pub default_filter: String,
    pub write_style: WriteStyle,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default_filter: "info".to_string(),
            write_style: WriteStyle::Auto,
        }
    }
}

/// Installs the global logger. Only the first call has an effect.
pub fn init_logging(config: &LoggingConfig) {
    INIT.call_once(|| {
        let result = env_logger::Builder::from_env(
            env_logger::Env::default().default_filter_or(config.default_filter.as_str()),
        )
        .write_style(config.write_style)
        .try_init();
        if let Err(e) = result {
            log::debug!("Keeping the installed logger: {}", e);
        }
    });
}
