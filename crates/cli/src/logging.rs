// stderr log output

use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber.
///
/// `-v` forces debug (`-vv` trace). Otherwise `GEOFUSE_LOG`, then
/// `RUST_LOG`, then the settings default decide.
pub fn init(verbose: u8, default_filter: &str) {
    let filter = match verbose {
        0 => EnvFilter::try_from_env("GEOFUSE_LOG")
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new(default_filter)),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
