use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::EnvFilter;

const TIME_FORMAT: &str = "%H:%M:%S%.3f";

/// Installs the global subscriber. `RUST_LOG` takes precedence over `verbose`.
pub fn init(verbose: bool) {
  let default_level = if verbose { "pairchat=debug,info" } else { "pairchat=info,warn" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
  let _ = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_timer(ChronoUtc::new(TIME_FORMAT.to_string()))
    .with_target(false)
    .with_writer(std::io::stderr)
    .try_init();
}
