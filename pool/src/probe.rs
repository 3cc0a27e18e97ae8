use crate::{
    registry::EndpointRegistry,
    stream::{
        StreamConnector,
        StreamHandle,
    },
};
use futures::future::join_all;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeFailure {
    pub url: String,
    pub error: String,
}

/// Outcome of trying every registered endpoint once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeSummary {
    pub total: usize,
    pub failures: Vec<ProbeFailure>,
}

impl ProbeSummary {
    pub fn succeeded(&self) -> usize {
        self.total - self.failures.len()
    }
}

impl fmt::Display for ProbeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Successfully connected to {} / {} endpoints", self.succeeded(), self.total)
    }
}

/// Open and immediately close every endpoint of `registry`, concurrently.
pub async fn probe_endpoints<C: StreamConnector>(connector: &C, registry: &EndpointRegistry) -> ProbeSummary {
    let endpoints = registry
        .hosts()
        .into_iter()
        .flat_map(|host| host.endpoints)
        .collect::<Vec<_>>();

    let results = join_all(endpoints.iter().map(|endpoint| async move {
        let result = connector.open(endpoint).await;
        match result {
            Ok(handle) => {
                handle.close().await;
                Ok(())
            }
            Err(err) => Err(ProbeFailure {
                url: endpoint.url().to_string(),
                error: format!("{err:#}"),
            }),
        }
    }))
    .await;

    let summary = ProbeSummary {
        total: endpoints.len(),
        failures: results.into_iter().filter_map(Result::err).collect(),
    };
    for failure in &summary.failures {
        warn!(url = %failure.url, "Failed to connect: {}", failure.error);
    }
    info!("{summary}");
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        endpoint::parse_endpoint_spec,
        testing::{
            Script,
            ScriptedConnector,
            StreamEnd,
        },
    };
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn reports_successes_and_failures() {
        let registry = EndpointRegistry::new();
        registry.add_endpoints(parse_endpoint_spec("tcp://a:1/app/{{1 3}}").unwrap());
        let ok = Script::Stream {
            packets: 0,
            size: 0,
            end: StreamEnd::Eof,
        };
        let connector = ScriptedConnector::with_scripts([ok, Script::FailOpen, ok]);

        let summary = probe_endpoints(&connector, &registry).await;
        assert_eq!(summary.total, 3);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.to_string(), "Successfully connected to 2 / 3 endpoints");
        assert_eq!(connector.opened(), 2);
        assert_eq!(connector.closed(), 2);
    }

    #[tokio::test]
    async fn empty_registry() {
        let summary = probe_endpoints(&ScriptedConnector::default(), &EndpointRegistry::new()).await;
        assert_eq!(summary, ProbeSummary::default());
        assert_eq!(summary.to_string(), "Successfully connected to 0 / 0 endpoints");
    }
}
