use crate::{
    distribution::DelayDistribution,
    output::OutputTarget,
};
use clap::Parser;
use std::{
    net::SocketAddr,
    path::PathBuf,
};

/// Stream Harvester
///
/// Keeps a pool of parallel streams open against the configured endpoints and periodically
/// reports throughput, connection and error statistics.
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version = version(), about, long_about = None)]
pub struct Args {
    /// Streaming endpoints. Either plain URLs or templates with exactly one `{{<min> <max>}}` range,
    /// e.g. `rtmp://host/app/{{1 3}}`. An optional `pixels=<int>` query parameter is kept as metadata.
    #[arg(value_name = "ENDPOINT")]
    pub endpoints: Vec<String>,

    /// Number of parallel streams to start immediately.
    #[arg(short = 'n', long, value_name = "NUM", env = "STREAM_HARVESTER_STREAMS")]
    pub streams: Option<i64>,

    /// Random distribution of the delay before a stream is (re)started. Applied when streams are
    /// initially started and whenever a stream ends, with or without error.
    /// Examples: `const:500ms`, `equal:0ms,1s`, `norm:100ms,30ms`.
    #[arg(long, value_name = "DISTRIBUTION")]
    pub restart_delay: Option<DelayDistribution>,

    /// Interval in which stream statistics are emitted.
    #[arg(long, value_name = "DURATION")]
    pub sink_interval: Option<humantime::Duration>,

    /// Inactivity timeout of a single stream. A timed out stream counts as ended.
    #[arg(long, value_name = "DURATION")]
    pub timeout: Option<humantime::Duration>,

    /// How long a worker waits before retrying when no endpoints are configured.
    #[arg(long, value_name = "DURATION")]
    pub no_endpoints_backoff: Option<humantime::Duration>,

    /// File with additional endpoints, one per line.
    #[arg(long, value_name = "FILE")]
    pub endpoints_file: Option<PathBuf>,

    /// Address of the control API (`/api/endpoints`, `/api/streams`).
    #[arg(long, value_name = "ADDRESS", env = "STREAM_HARVESTER_LISTEN_ADDRESS")]
    pub listen_address: Option<SocketAddr>,

    /// Do not start the control API.
    #[arg(long, action, conflicts_with = "listen_address")]
    pub no_control: bool,

    /// Where to write statistics: `<csv|json>://<file or ->`.
    #[arg(short, long, value_name = "TARGET", env = "STREAM_HARVESTER_OUTPUT")]
    pub output: Option<OutputTarget>,

    /// Try to connect to every initial endpoint once and log a summary before streaming starts.
    #[arg(long, action)]
    pub test_endpoints: bool,

    /// Fail at startup when endpoints were given but none of them could be parsed.
    #[arg(long, action)]
    pub strict: bool,

    /// Log at debug level unless `RUST_LOG` says otherwise.
    #[arg(short, long, action)]
    pub verbose: bool,

    /// Explicit configuration file, replaces `config.yaml` from the config directory.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

mod config_ext {
    use super::*;
    use config::{
        Map,
        Source,
        Value,
        ValueKind,
    };
    use std::collections::HashMap;

    impl Source for Args {
        fn clone_into_box(&self) -> Box<dyn Source + Send + Sync> {
            Box::new((*self).clone())
        }

        fn collect(&self) -> Result<Map<String, Value>, config::ConfigError> {
            let mut cache = HashMap::<String, Value>::new();
            if !self.endpoints.is_empty() {
                cache.insert("endpoints".to_string(), self.endpoints.clone().into());
            }
            if let Some(streams) = self.streams {
                cache.insert("streams".to_string(), streams.into());
            }
            if let Some(delay) = &self.restart_delay {
                cache.insert("restart_delay".to_string(), delay.to_string().into());
            }
            for (key, value) in [
                ("sink_interval", &self.sink_interval),
                ("timeout", &self.timeout),
                ("no_endpoints_backoff", &self.no_endpoints_backoff),
            ] {
                if let Some(value) = value {
                    cache.insert(key.to_string(), value.to_string().into());
                }
            }
            if let Some(path) = &self.endpoints_file {
                cache.insert("endpoints_file".to_string(), path.display().to_string().into());
            }
            if let Some(address) = &self.listen_address {
                cache.insert("listen_address".to_string(), address.to_string().into());
            }
            if self.no_control {
                cache.insert("listen_address".to_string(), Value::new(None, ValueKind::Nil));
            }
            if let Some(output) = &self.output {
                cache.insert("output".to_string(), output.to_string().into());
            }
            if self.test_endpoints {
                cache.insert("test_endpoints".to_string(), true.into());
            }
            if self.strict {
                cache.insert("strict".to_string(), true.into());
            }
            if self.verbose {
                cache.insert("verbose".to_string(), true.into());
            }
            Ok(cache)
        }
    }
}

pub fn version() -> String {
    let version = clap::crate_version!();
    let config_dir_path = crate::get_config_dir().display().to_string();

    format!(
        "\
{version}

Config directory: {config_dir_path}"
    )
}
