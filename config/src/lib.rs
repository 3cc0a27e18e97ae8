#[macro_use]
extern crate tracing;

mod app_config;
mod args;
pub mod distribution;
pub mod duration;
pub mod output;

use app_config::AppConfig;
pub use app_config::get_config_dir;
pub use args::Args;
pub use distribution::{
    DelayDistribution,
    DistributionError,
};
use eyre::{
    Context as _,
    Result,
};
pub use output::{
    OutputDestination,
    OutputFormat,
    OutputTarget,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    net::SocketAddr,
    path::{
        Path,
        PathBuf,
    },
    time::Duration,
};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(flatten, skip_serializing)]
    app_config: AppConfig,
    pub streams: i64,
    pub restart_delay: DelayDistribution,
    #[serde(with = "duration")]
    pub sink_interval: Duration,
    #[serde(with = "duration")]
    pub timeout: Duration,
    #[serde(with = "duration")]
    pub no_endpoints_backoff: Duration,
    #[serde(default)]
    pub endpoints: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoints_file: Option<PathBuf>,
    #[serde(default)]
    pub listen_address: Option<SocketAddr>,
    pub output: OutputTarget,
    #[serde(default)]
    pub test_endpoints: bool,
    #[serde(default)]
    pub strict: bool,
    #[serde(default)]
    pub verbose: bool,
}

const DEFAULT_CONFIG: &str = include_str!("default-config.yaml");

impl Default for Config {
    fn default() -> Self {
        serde_yml::from_str(DEFAULT_CONFIG).expect("Failed to parse default config")
    }
}

impl Config {
    /// Layers the built-in defaults, the config file and the command line (highest precedence).
    pub fn new(args: Args) -> Result<Self, config::ConfigError> {
        let config_dir = get_config_dir();
        let mut builder = config::Config::builder()
            .set_default("config_dir", config_dir.to_string_lossy().to_string())?
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Yaml));

        let (config_file, required) = match &args.config {
            Some(path) => (path.clone(), true),
            None => (config_dir.join("config.yaml"), false),
        };
        debug!(path = %config_file.display(), required, "loading config file");
        builder = builder.add_source(
            config::File::from(config_file)
                .format(config::FileFormat::Yaml)
                .required(required),
        );

        builder = builder.add_source(args);

        let cfg: Self = builder.build()?.try_deserialize()?;

        Ok(cfg)
    }

    pub fn config_dir(&self) -> &Path {
        &self.app_config.config_dir
    }

    /// All endpoint specs from the configuration plus the lines of `endpoints_file`.
    /// Blank lines and lines starting with `#` are skipped.
    pub fn endpoint_specs(&self) -> Result<Vec<String>> {
        let mut specs = self.endpoints.clone();
        if let Some(path) = &self.endpoints_file {
            let content = std::fs::read_to_string(path)
                .wrap_err_with(|| format!("Failed to read endpoints file {}", path.display()))?;
            let before = specs.len();
            specs.extend(
                content
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty() && !line.starts_with('#'))
                    .map(ToString::to_string),
            );
            debug!(path = %path.display(), loaded = specs.len() - before, "read endpoints file");
        }
        Ok(specs)
    }
}
