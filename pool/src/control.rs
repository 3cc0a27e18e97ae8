use crate::{
    endpoint::parse_endpoint_spec,
    pool::{
        Pool,
        PoolSizeChange,
    },
    registry::{
        EndpointRegistry,
        Host,
    },
    stream::StreamConnector,
};
use serde::Serialize;
use std::sync::Arc;
use strum::Display;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ControlError {
    #[error("request body contains no endpoints, send one endpoint spec per line")]
    EmptyEndpointList,
    #[error("missing pool size, use ?num=<integer>")]
    MissingPoolSize,
    #[error("pool size must be an integer but is {0:?}")]
    InvalidPoolSize(String),
}

/// Whether an endpoint update replaces the registry or extends it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UpdateMode {
    Replace,
    Append,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum EntryOutcome {
    /// At least one URL of the entry was added. `failures` lists rejected template expansions.
    Added {
        host: String,
        endpoints: usize,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        failures: Vec<String>,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryReport {
    pub spec: String,
    #[serde(flatten)]
    pub outcome: EntryOutcome,
}

/// Per-entry result of an endpoint update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointReport {
    pub mode: UpdateMode,
    /// `false` if nothing was changed, which happens when no entry could be parsed.
    pub applied: bool,
    pub entries: Vec<EntryReport>,
    pub hosts: usize,
    pub endpoints: usize,
}

impl EndpointReport {
    pub fn added(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| matches!(entry.outcome, EntryOutcome::Added { .. }))
            .count()
    }
}

/// Parse `specs` and update `registry`. In replace mode the registry is only touched if at least
/// one spec produced endpoints.
pub fn apply_endpoint_specs(
    registry: &EndpointRegistry,
    mode: UpdateMode,
    specs: &[String],
) -> Result<EndpointReport, ControlError> {
    if specs.is_empty() {
        return Err(ControlError::EmptyEndpointList);
    }

    let mut batches = Vec::new();
    let mut entries = Vec::with_capacity(specs.len());
    for spec in specs {
        let outcome = match parse_endpoint_spec(spec) {
            Ok(batch) => {
                for failure in &batch.failures {
                    warn!(spec = %spec, "Skipping endpoint: {failure}");
                }
                let outcome = EntryOutcome::Added {
                    host: batch.host.clone(),
                    endpoints: batch.endpoints.len(),
                    failures: batch.failures.iter().map(ToString::to_string).collect(),
                };
                batches.push(batch);
                outcome
            }
            Err(err) => {
                warn!(spec = %spec, "Failed to parse endpoint: {err}");
                EntryOutcome::Failed { error: err.to_string() }
            }
        };
        entries.push(EntryReport {
            spec: spec.clone(),
            outcome,
        });
    }

    let applied = !batches.is_empty();
    match mode {
        UpdateMode::Replace if applied => registry.replace_all(batches),
        UpdateMode::Replace => warn!("no endpoint could be parsed, keeping the current endpoints"),
        UpdateMode::Append => {
            for batch in batches {
                registry.add_endpoints(batch);
            }
        }
    }

    let report = EndpointReport {
        mode,
        applied,
        entries,
        hosts: registry.host_count(),
        endpoints: registry.endpoint_count(),
    };
    info!(
        %mode,
        added = report.added(),
        failed = report.entries.len() - report.added(),
        hosts = report.hosts,
        endpoints = report.endpoints,
        "updated endpoints"
    );
    Ok(report)
}

/// Non-empty, trimmed lines of a request body.
pub fn request_lines(body: &str) -> Vec<String> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToString::to_string)
        .collect()
}

pub fn parse_pool_size(value: Option<&str>) -> Result<i64, ControlError> {
    let value = value.ok_or(ControlError::MissingPoolSize)?;
    value
        .trim()
        .parse()
        .map_err(|_| ControlError::InvalidPoolSize(value.to_string()))
}

/// Transport-independent control operations on a running pool.
#[derive(Debug)]
pub struct Control<C: StreamConnector> {
    pool: Arc<Pool<C>>,
}

impl<C: StreamConnector> Clone for Control<C> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
        }
    }
}

impl<C: StreamConnector> Control<C> {
    pub fn new(pool: Arc<Pool<C>>) -> Self {
        Self { pool }
    }

    pub fn set_endpoints(&self, mode: UpdateMode, body: &str) -> Result<EndpointReport, ControlError> {
        apply_endpoint_specs(self.pool.registry(), mode, &request_lines(body))
    }

    pub fn endpoints(&self) -> Vec<Host> {
        self.pool.registry().hosts()
    }

    pub async fn set_pool_size(&self, num: Option<&str>) -> Result<PoolSizeChange, ControlError> {
        let target = parse_pool_size(num)?;
        Ok(self.pool.resize(target).await)
    }

    pub fn pool_size(&self) -> usize {
        self.pool.size()
    }
}
