use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVE: &str = "dbg_proxy=info";
const VERBOSE_DIRECTIVE: &str = "dbg_proxy=debug";

/// Install the global `tracing` subscriber.
///
/// Output goes to stderr so stdout stays machine-readable. `RUST_LOG` wins over
/// `verbose` when set.
pub fn init(verbose: bool) {
    let default = if verbose {
        VERBOSE_DIRECTIVE
    } else {
        DEFAULT_DIRECTIVE
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // A subscriber may already be installed (tests, embedding applications).
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
