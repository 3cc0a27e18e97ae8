use crate::{
    endpoint::Endpoint,
    pool::Shared,
    stream::{
        Received,
        StreamConnector,
        StreamHandle,
    },
};
use std::{
    sync::Arc,
    time::Duration,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// How one open/receive/close cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleEnd {
    /// The stream ended cleanly or went silent.
    Closed,
    /// Opening or receiving failed.
    Failed,
    /// The worker was told to stop.
    Stopped,
}

/// Sleep for `duration` unless `token` is cancelled first. Returns `false` when cancelled.
async fn sleep_or_cancel(token: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        biased;
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

/// Body of one worker task: delay, open, receive until the stream ends, close, repeat until
/// `token` is cancelled. Every failure is absorbed into the shared statistics.
pub(crate) async fn run<C: StreamConnector>(id: usize, shared: Arc<Shared<C>>, token: CancellationToken) {
    debug!(worker = id, "worker started");
    loop {
        if !sleep_or_cancel(&token, shared.settings.restart_delay.sample()).await {
            break;
        }

        let Some(endpoint) = shared.registry.select_next() else {
            info!(
                worker = id,
                backoff = ?shared.settings.no_endpoints_backoff,
                "no endpoints available, waiting"
            );
            if !sleep_or_cancel(&token, shared.settings.no_endpoints_backoff).await {
                break;
            }
            continue;
        };

        let end = run_cycle(id, &shared, &token, &endpoint).await;
        trace!(worker = id, ?end, "stream cycle ended");
        if end == CycleEnd::Stopped {
            break;
        }
    }
    debug!(worker = id, "worker stopped");
}

async fn run_cycle<C: StreamConnector>(
    id: usize,
    shared: &Shared<C>,
    token: &CancellationToken,
    endpoint: &Endpoint,
) -> CycleEnd {
    let stats = &shared.stats;

    let opened = tokio::select! {
        biased;
        _ = token.cancelled() => return CycleEnd::Stopped,
        opened = shared.connector.open(endpoint) => opened,
    };
    let mut handle = match opened {
        Ok(handle) => handle,
        Err(err) => {
            error!(worker = id, %endpoint, "Failed to open stream: {err:#}");
            stats.errors.add(1);
            return CycleEnd::Failed;
        }
    };
    debug!(worker = id, %endpoint, "opened stream");

    stats.opened.add(1);
    stats.open_connections.add(1);
    let end = {
        defer! {
            stats.open_connections.add(-1);
        }
        let end = receive_until_end(id, shared, token, endpoint, &mut handle).await;
        handle.close().await;
        end
    };
    debug!(worker = id, %endpoint, ?end, "closed stream");
    end
}

async fn receive_until_end<C: StreamConnector>(
    id: usize,
    shared: &Shared<C>,
    token: &CancellationToken,
    endpoint: &Endpoint,
    handle: &mut C::Handle,
) -> CycleEnd {
    let stats = &shared.stats;
    let pixels = endpoint.pixels().map_or(0, |pixels| i64::try_from(pixels).unwrap_or(i64::MAX));

    let mut last_packet: Option<Instant> = None;
    // Undoes the receiving/pixels gauges on every exit once the first packet arrived.
    let mut _receiving = None;

    loop {
        let received = tokio::select! {
            biased;
            _ = token.cancelled() => return CycleEnd::Stopped,
            received = handle.receive() => received,
        };

        match received {
            Ok(Received::Data(0)) => {}
            Ok(Received::Data(size)) => {
                let now = Instant::now();
                stats.bytes.add(size as u64);
                stats.packets.add(1);
                match last_packet.replace(now) {
                    Some(previous) => stats.packet_delay.add((now - previous).as_secs_f64()),
                    None => {
                        stats.receiving_connections.add(1);
                        stats.pixels.add(pixels);
                        _receiving = Some(scopeguard::guard(pixels, |pixels| {
                            stats.receiving_connections.add(-1);
                            stats.pixels.add(-pixels);
                        }));
                    }
                }
            }
            Ok(Received::EndOfStream) => {
                stats.closed.add(1);
                return CycleEnd::Closed;
            }
            Err(err) => {
                warn!(worker = id, %endpoint, "Failed to receive: {err:#}");
                stats.errors.add(1);
                stats.closed.add(1);
                return CycleEnd::Failed;
            }
        }
    }
}
