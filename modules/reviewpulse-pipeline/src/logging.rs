use tracing_subscriber::EnvFilter;

/// Log targets enabled when `RUST_LOG` is unset. The API and model clients
/// log under their own crate names, so each one is listed.
pub const DEFAULT_LOG_DIRECTIVES: &str = "reviewpulse=info,review_api_client=info,ai_client=info";

/// `RUST_LOG` when set, otherwise [`DEFAULT_LOG_DIRECTIVES`].
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter())
}

fn default_filter() -> EnvFilter {
    EnvFilter::new(DEFAULT_LOG_DIRECTIVES)
}
