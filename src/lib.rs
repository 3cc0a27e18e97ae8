#[macro_use]
extern crate tracing;

mod app;
mod logging;

pub use app::{
    load_endpoints,
    App,
};
pub use logging::{
    init_errors,
    init_logging,
};
pub use stream_harvester_config::Args;
