#[macro_use]
extern crate tracing;
#[macro_use]
extern crate scopeguard;

pub mod control;
pub mod counters;
pub mod endpoint;
mod pool;
pub mod probe;
pub mod registry;
pub mod sink;
pub mod stats;
pub mod stream;
#[cfg(test)]
mod testing;
mod worker;

pub use control::{
    Control,
    ControlError,
    EndpointReport,
    UpdateMode,
};
pub use endpoint::{
    parse_endpoint_spec,
    Endpoint,
    EndpointBatch,
    EndpointError,
};
pub use pool::{
    Pool,
    PoolSettings,
    PoolSizeChange,
};
pub use probe::{
    probe_endpoints,
    ProbeSummary,
};
pub use registry::{
    EndpointRegistry,
    Host,
};
pub use sink::{
    SampleSink,
    WriterSink,
};
pub use stats::{
    Sample,
    StreamStatistics,
};
pub use stream::{
    Received,
    StreamConnector,
    StreamHandle,
    UrlConnector,
};
