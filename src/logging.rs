use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::UtcTime;

/// Overrides `RUST_LOG` when set.
pub const LOG_ENV: &str = "TUBETONE_LOG";
const DEFAULT_DIRECTIVES: &str = "warn,tubetone=info";

/// Logs go to stderr so `fetch` can print output paths on stdout.
pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
