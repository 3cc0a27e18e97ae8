use tracing_subscriber::{
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
    Layer,
};

/// Log to stderr, keeping stdout free for statistics output.
///
/// `RUST_LOG` takes precedence; otherwise the level is `info`, or `debug` with `verbose`.
pub fn init_logging(verbose: bool) -> eyre::Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_filter(filter))
        .with(tracing_error::ErrorLayer::default())
        .try_init()?;
    Ok(())
}

pub fn init_errors() -> eyre::Result<()> {
    color_eyre::install()
}
