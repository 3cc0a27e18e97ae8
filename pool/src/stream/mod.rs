mod connector;

pub use self::connector::{
    UrlConnector,
    UrlStream,
};
use crate::endpoint::Endpoint;
use eyre::Result;
use std::future::Future;

/// Outcome of one successful receive call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Received {
    /// A packet of the given size arrived.
    Data(usize),
    /// The stream ended cleanly, or went silent for longer than the receive timeout.
    EndOfStream,
}

/// Opens streams for endpoints.
pub trait StreamConnector: Send + Sync + 'static {
    type Handle: StreamHandle;

    fn open(&self, endpoint: &Endpoint) -> impl Future<Output = Result<Self::Handle>> + Send;
}

/// One open stream.
pub trait StreamHandle: Send + 'static {
    fn receive(&mut self) -> impl Future<Output = Result<Received>> + Send;

    /// Release the underlying connection. Called exactly once per opened handle, also when the
    /// worker is stopped in the middle of a receive.
    fn close(self) -> impl Future<Output = ()> + Send;
}
