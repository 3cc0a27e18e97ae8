use eyre::{
    bail,
    Context as _,
    Result,
};
use std::sync::Arc;
use stream_harvester_config::{
    Args,
    Config,
};
use stream_harvester_pool::{
    control::apply_endpoint_specs,
    probe_endpoints,
    Control,
    EndpointRegistry,
    Pool,
    PoolSettings,
    UpdateMode,
    UrlConnector,
    WriterSink,
};
use tokio_util::sync::CancellationToken;

pub struct App {
    config: Config,
}

impl App {
    pub fn new(args: Args) -> Result<Self> {
        Ok(Self {
            config: Config::new(args)?,
        })
    }

    pub fn verbose(&self) -> bool {
        self.config.verbose
    }

    /// Run until Ctrl-C, then stop every worker and the control server.
    pub async fn run(self) -> Result<()> {
        let config = self.config;
        debug!(config_dir = %config.config_dir().display(), "starting with {config:?}");

        let registry = EndpointRegistry::new();
        load_endpoints(&registry, &config.endpoint_specs()?, config.strict)?;

        let connector = UrlConnector::new(config.timeout)?;
        if config.test_endpoints {
            probe_endpoints(&connector, &registry).await;
        }

        let sink = WriterSink::open(&config.output)?;
        let pool = Arc::new(Pool::new(registry, connector, PoolSettings::from(&config)));

        let shutdown = CancellationToken::new();
        let server = match config.listen_address {
            Some(address) => {
                let listener = stream_harvester_http::bind(address).await?;
                Some(tokio::spawn(stream_harvester_http::serve(
                    listener,
                    Control::new(pool.clone()),
                    shutdown.clone(),
                )))
            }
            None => {
                info!("control server disabled");
                None
            }
        };

        pool.start(config.streams, Box::new(sink)).await;

        tokio::signal::ctrl_c()
            .await
            .wrap_err("Failed to listen for Ctrl-C")?;
        info!("interrupted, shutting down");

        shutdown.cancel();
        pool.stop().await;
        if let Some(server) = server {
            server.await.wrap_err("Control server task failed")??;
        }
        Ok(())
    }
}

/// Add the startup endpoint specs to `registry`.
///
/// Unparsable specs are logged and skipped. With `strict`, it is an error if specs were given and
/// none of them could be parsed.
pub fn load_endpoints(registry: &EndpointRegistry, specs: &[String], strict: bool) -> Result<()> {
    if specs.is_empty() {
        warn!("no endpoints configured, add some through the control API");
        return Ok(());
    }

    let report = apply_endpoint_specs(registry, UpdateMode::Append, specs)?;
    if strict && report.added() == 0 {
        bail!("None of the {} endpoint specs could be parsed", specs.len());
    }
    Ok(())
}
