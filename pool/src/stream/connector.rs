use super::{
    Received,
    StreamConnector,
    StreamHandle,
};
use crate::endpoint::Endpoint;
use eyre::{
    bail,
    eyre,
    Context as _,
    Result,
};
use futures::{
    stream::BoxStream,
    StreamExt as _,
};
use std::time::Duration;
use tokio::{
    io::{
        AsyncReadExt as _,
        AsyncWriteExt as _,
    },
    net::TcpStream,
};

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Opens byte streams based on the endpoint's URL scheme: `http`/`https` response bodies and raw
/// `tcp` connections.
#[derive(Debug, Clone)]
pub struct UrlConnector {
    client: reqwest::Client,
    timeout: Duration,
}

impl UrlConnector {
    /// `timeout` bounds connecting as well as every single receive.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .wrap_err("Failed to build HTTP client")?;
        Ok(Self { client, timeout })
    }

    async fn open_http(&self, endpoint: &Endpoint) -> Result<UrlStream> {
        let response = tokio::time::timeout(self.timeout, self.client.get(endpoint.url().clone()).send())
            .await
            .map_err(|_| eyre!("Timed out requesting {}", endpoint.url()))??
            .error_for_status()?;
        let chunks = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.len()))
            .boxed();
        Ok(UrlStream::Http {
            chunks,
            timeout: self.timeout,
        })
    }

    async fn open_tcp(&self, endpoint: &Endpoint) -> Result<UrlStream> {
        let url = endpoint.url();
        let host = url.host_str().ok_or_else(|| eyre!("{url} has no host"))?;
        let port = url.port().ok_or_else(|| eyre!("{url} has no port"))?;
        let socket = tokio::time::timeout(self.timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| eyre!("Timed out connecting to {host}:{port}"))??;
        Ok(UrlStream::Tcp {
            socket,
            buffer: vec![0; READ_BUFFER_SIZE],
            timeout: self.timeout,
        })
    }
}

impl StreamConnector for UrlConnector {
    type Handle = UrlStream;

    async fn open(&self, endpoint: &Endpoint) -> Result<UrlStream> {
        match endpoint.url().scheme() {
            "http" | "https" => self.open_http(endpoint).await,
            "tcp" => self.open_tcp(endpoint).await,
            other => bail!("Unsupported stream scheme {other:?} in {}", endpoint.url()),
        }
    }
}

/// A stream opened by [`UrlConnector`].
pub enum UrlStream {
    /// Every body chunk counts as one packet.
    Http {
        chunks: BoxStream<'static, reqwest::Result<usize>>,
        timeout: Duration,
    },
    /// Every successful socket read counts as one packet.
    Tcp {
        socket: TcpStream,
        buffer: Vec<u8>,
        timeout: Duration,
    },
}

impl std::fmt::Debug for UrlStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UrlStream::Http { .. } => f.write_str("UrlStream::Http"),
            UrlStream::Tcp { socket, .. } => f.debug_tuple("UrlStream::Tcp").field(&socket.peer_addr().ok()).finish(),
        }
    }
}

impl StreamHandle for UrlStream {
    async fn receive(&mut self) -> Result<Received> {
        let received = match self {
            UrlStream::Http { chunks, timeout } => match tokio::time::timeout(*timeout, chunks.next()).await {
                Ok(Some(chunk)) => Some(Received::Data(chunk?)),
                Ok(None) => Some(Received::EndOfStream),
                Err(_) => None,
            },
            UrlStream::Tcp {
                socket,
                buffer,
                timeout,
            } => match tokio::time::timeout(*timeout, socket.read(buffer)).await {
                Ok(Ok(0)) => Some(Received::EndOfStream),
                Ok(Ok(read)) => Some(Received::Data(read)),
                Ok(Err(err)) => return Err(err.into()),
                Err(_) => None,
            },
        };
        Ok(received.unwrap_or_else(|| {
            debug!("no data within the receive timeout, treating as end of stream");
            Received::EndOfStream
        }))
    }

    async fn close(self) {
        if let UrlStream::Tcp { mut socket, .. } = self {
            if let Err(err) = socket.shutdown().await {
                trace!(?err, "failed to shut down socket");
            }
        }
    }
}
