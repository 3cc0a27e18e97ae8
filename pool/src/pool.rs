use crate::{
    registry::EndpointRegistry,
    sink::SampleSink,
    stats::{
        Sample,
        StreamStatistics,
    },
    stream::StreamConnector,
    worker,
};
use serde::Serialize;
use std::{
    sync::{
        atomic::{
            AtomicUsize,
            Ordering,
        },
        Arc,
        Mutex,
        PoisonError,
    },
    time::Duration,
};
use stream_harvester_config::{
    Config,
    DelayDistribution,
};
use tokio::{
    sync::{
        mpsc,
        OwnedMutexGuard,
    },
    task::JoinHandle,
    time::{
        Instant,
        MissedTickBehavior,
    },
};
use tokio_util::sync::{
    CancellationToken,
    DropGuard,
};

/// Samples queued for a slow sink before the emitter waits for it.
const SAMPLE_BACKLOG: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    pub restart_delay: DelayDistribution,
    pub no_endpoints_backoff: Duration,
    pub sink_interval: Duration,
}

impl From<&Config> for PoolSettings {
    fn from(config: &Config) -> Self {
        Self {
            restart_delay: config.restart_delay,
            no_endpoints_backoff: config.no_endpoints_backoff,
            sink_interval: config.sink_interval,
        }
    }
}

/// Result of a resize: worker count before and after.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolSizeChange {
    pub previous: usize,
    pub current: usize,
}

/// State shared between the pool, its workers and the statistics emitter.
#[derive(Debug)]
pub(crate) struct Shared<C> {
    pub(crate) registry: EndpointRegistry,
    pub(crate) connector: C,
    pub(crate) stats: Arc<StreamStatistics>,
    pub(crate) settings: PoolSettings,
    active: AtomicUsize,
}

#[derive(Debug)]
struct WorkerHandle {
    id: usize,
    token: CancellationToken,
    task: JoinHandle<()>,
}

/// Runtime-resizable set of stream workers plus the periodic statistics emitter.
///
/// Resizes are serialized. Once [`Pool::stop`] was called the pool never grows again.
#[derive(Debug)]
pub struct Pool<C: StreamConnector> {
    shared: Arc<Shared<C>>,
    workers: Arc<tokio::sync::Mutex<Vec<WorkerHandle>>>,
    next_worker_id: AtomicUsize,
    emitter: Mutex<Option<JoinHandle<()>>>,
    token: CancellationToken,
    _cancel_on_drop: DropGuard,
}

impl<C: StreamConnector> Pool<C> {
    pub fn new(registry: EndpointRegistry, connector: C, settings: PoolSettings) -> Self {
        let token = CancellationToken::new();
        Self {
            shared: Arc::new(Shared {
                registry,
                connector,
                stats: Arc::new(StreamStatistics::default()),
                settings,
                active: AtomicUsize::new(0),
            }),
            workers: Arc::new(tokio::sync::Mutex::new(Vec::new())),
            next_worker_id: AtomicUsize::new(0),
            emitter: Mutex::new(None),
            _cancel_on_drop: token.clone().drop_guard(),
            token,
        }
    }

    /// Start emitting samples to `sink` and grow to `initial` workers.
    pub async fn start(&self, initial: i64, sink: Box<dyn SampleSink>) -> PoolSizeChange {
        {
            let mut emitter = self.emitter.lock().unwrap_or_else(PoisonError::into_inner);
            if emitter.is_some() {
                warn!("statistics emitter already running, ignoring additional sink");
            } else {
                *emitter = Some(tokio::spawn(emit_statistics(
                    self.shared.clone(),
                    sink,
                    self.token.clone(),
                )));
            }
        }
        self.resize(initial).await
    }

    /// Converge to `target` workers (negative means zero). Removed workers are stopped and joined
    /// before this returns. Growing a stopped pool does nothing.
    ///
    /// Dropping the returned future does not release the resize lock early: it stays held until
    /// every removed worker has finished.
    pub async fn resize(&self, target: i64) -> PoolSizeChange {
        let target = usize::try_from(target).unwrap_or(0);
        let mut workers = self.workers.clone().lock_owned().await;
        let previous = workers.len();

        let mut excess = Vec::new();
        if target < previous {
            excess = workers.split_off(target);
            for worker in &excess {
                worker.token.cancel();
            }
        } else if target > previous {
            if self.token.is_cancelled() {
                warn!(target, "pool is stopped, not starting new workers");
            } else {
                for _ in previous..target {
                    let id = self.next_worker_id.fetch_add(1, Ordering::Relaxed);
                    let token = self.token.child_token();
                    let task = tokio::spawn(worker::run(id, self.shared.clone(), token.clone()));
                    workers.push(WorkerHandle { id, token, task });
                }
            }
        }

        let current = workers.len();
        self.shared.active.store(current, Ordering::Relaxed);
        if current != previous {
            info!(previous, current, "resized pool");
        }

        if !excess.is_empty() {
            if let Err(err) = tokio::spawn(join_workers(excess, workers)).await {
                error!("joining removed workers failed: {err}");
            }
        }
        PoolSizeChange { previous, current }
    }

    /// Stop every worker and the emitter, waiting for all of them. The sink is closed afterwards.
    pub async fn stop(&self) {
        info!("stopping pool");
        self.token.cancel();
        self.resize(0).await;

        let emitter = self.emitter.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(emitter) = emitter {
            if let Err(err) = emitter.await {
                error!("statistics emitter failed: {err}");
            }
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Number of running workers as of the last completed resize.
    pub fn size(&self) -> usize {
        self.shared.active.load(Ordering::Relaxed)
    }

    pub fn registry(&self) -> &EndpointRegistry {
        &self.shared.registry
    }

    pub fn statistics(&self) -> Arc<StreamStatistics> {
        self.shared.stats.clone()
    }
}

async fn join_workers(excess: Vec<WorkerHandle>, _workers: OwnedMutexGuard<Vec<WorkerHandle>>) {
    for worker in excess {
        if let Err(err) = worker.task.await {
            error!(worker = worker.id, "worker task failed: {err}");
        }
    }
}

/// Samples the statistics every interval. Writing happens on a blocking thread that owns `sink`.
async fn emit_statistics<C>(shared: Arc<Shared<C>>, sink: Box<dyn SampleSink>, token: CancellationToken) {
    let (samples, received) = mpsc::channel(SAMPLE_BACKLOG);
    let writer = tokio::task::spawn_blocking(move || write_samples(sink, received));

    let interval = shared.settings.sink_interval;
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_tick = Instant::now();

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let now = Instant::now();
        let elapsed = now - last_tick;
        last_tick = now;

        let sample = shared.stats.sample(shared.active.load(Ordering::Relaxed), elapsed);
        if samples.send(sample).await.is_err() {
            break;
        }
    }

    drop(samples);
    if let Err(err) = writer.await {
        error!("statistics writer failed: {err}");
    }
    debug!("statistics emitter stopped");
}

fn write_samples(mut sink: Box<dyn SampleSink>, mut samples: mpsc::Receiver<Sample>) {
    while let Some(sample) = samples.blocking_recv() {
        if let Err(err) = sink.publish(&sample) {
            error!("Failed to publish statistics sample: {err:#}");
        }
    }
    if let Err(err) = sink.close() {
        error!("Failed to close statistics sink: {err:#}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        endpoint::parse_endpoint_spec,
        stats::SAMPLE_FIELDS,
        testing::{
            eventually,
            MemorySink,
            Script,
            ScriptedConnector,
            StreamEnd,
        },
    };
    use futures::FutureExt as _;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicBool;

    fn settings() -> PoolSettings {
        PoolSettings {
            restart_delay: DelayDistribution::Const(Duration::from_millis(1)),
            no_endpoints_backoff: Duration::from_millis(10),
            sink_interval: Duration::from_secs(3600),
        }
    }

    fn registry(specs: &[&str]) -> EndpointRegistry {
        let registry = EndpointRegistry::new();
        for spec in specs {
            registry.add_endpoints(parse_endpoint_spec(spec).unwrap());
        }
        registry
    }

    fn pool(connector: ScriptedConnector, settings: PoolSettings) -> Pool<ScriptedConnector> {
        Pool::new(registry(&["tcp://a:1/app/s?pixels=10", "tcp://b:1/app/s"]), connector, settings)
    }

    #[tokio::test]
    async fn resize_converges_to_target() {
        let pool = pool(ScriptedConnector::default(), settings());
        let change = pool.start(3, Box::new(MemorySink::default())).await;
        assert_eq!(change, PoolSizeChange { previous: 0, current: 3 });

        for (target, expected) in [(5, 5), (2, 2), (2, 2), (0, 0), (4, 4), (-3, 0), (1, 1)] {
            let change = pool.resize(target).await;
            assert_eq!(change.current, expected);
            assert_eq!(pool.size(), expected);
        }
        pool.stop().await;
        assert_eq!(pool.size(), 0);
    }

    #[tokio::test]
    async fn shrinking_joins_and_closes_removed_workers() {
        let connector = ScriptedConnector::default();
        let pool = pool(connector.clone(), settings());
        pool.resize(4).await;
        eventually(|| connector.opened() == 4).await;

        pool.resize(1).await;
        // Join completed inside resize, so the handles are already closed.
        assert_eq!(connector.closed(), 3);
        assert_eq!(pool.statistics().open_connections.get(), 1);
        pool.stop().await;
    }

    #[tokio::test]
    async fn stop_closes_every_stream_and_blocks_growth() {
        let connector = ScriptedConnector::with_scripts([Script::Stream {
            packets: 2,
            size: 10,
            end: StreamEnd::Hang,
        }]);
        let pool = pool(connector.clone(), settings());
        pool.start(3, Box::new(MemorySink::default())).await;
        eventually(|| connector.opened() == 3).await;
        let stats = pool.statistics();
        eventually(|| stats.receiving_connections.get() == 1).await;

        tokio::time::timeout(Duration::from_secs(5), pool.stop())
            .await
            .expect("stop must not block on hanging streams");
        assert!(pool.is_stopped());
        assert_eq!(connector.closed(), 3);
        assert_eq!(stats.open_connections.get(), 0);
        assert_eq!(stats.receiving_connections.get(), 0);
        assert_eq!(stats.pixels.get(), 0);

        assert_eq!(pool.resize(5).await, PoolSizeChange { previous: 0, current: 0 });
        assert_eq!(connector.opened(), 3);
    }

    #[tokio::test]
    async fn counters_follow_stream_lifecycle() {
        let connector = ScriptedConnector::with_scripts([
            Script::Stream {
                packets: 3,
                size: 100,
                end: StreamEnd::Eof,
            },
            Script::FailOpen,
            Script::Stream {
                packets: 2,
                size: 50,
                end: StreamEnd::Error,
            },
        ]);
        let pool = Pool::new(registry(&["tcp://a:1/app/s?pixels=10"]), connector.clone(), settings());
        pool.resize(1).await;
        // The fourth open gets the default script, which hangs without data.
        eventually(|| connector.opened() == 3).await;
        let stats = pool.statistics();
        eventually(|| stats.errors.get() == 2 && stats.open_connections.get() == 1).await;

        assert_eq!(stats.opened.get(), 3);
        assert_eq!(stats.closed.get(), 2);
        assert_eq!(stats.bytes.get(), 400);
        assert_eq!(stats.packets.get(), 5);
        assert_eq!(stats.open_connections.get(), 1);
        assert_eq!(stats.receiving_connections.get(), 0);
        assert_eq!(stats.pixels.get(), 0);

        pool.stop().await;
        assert_eq!(stats.open_connections.get(), 0);
        assert_eq!(connector.closed(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn receiving_stream_tracks_pixels_and_packet_delay() {
        let connector = ScriptedConnector::with_scripts([Script::Stream {
            packets: 3,
            size: 1,
            end: StreamEnd::Hang,
        }])
        .with_packet_gap(Duration::from_millis(250));
        let pool = Pool::new(registry(&["tcp://a:1/app/s?pixels=10"]), connector.clone(), settings());
        pool.resize(1).await;
        let stats = pool.statistics();
        eventually(|| stats.packets.get() == 3).await;
        assert_eq!(stats.receiving_connections.get(), 1);
        assert_eq!(stats.pixels.get(), 10);
        // Three packets, two inter-arrival times.
        let average = stats.packet_delay.compute_average();
        assert!((average - 0.25).abs() < 1e-9, "average packet delay {average}");

        pool.stop().await;
        assert_eq!(stats.receiving_connections.get(), 0);
        assert_eq!(stats.pixels.get(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn first_packet_feeds_no_packet_delay() {
        let connector = ScriptedConnector::with_scripts([Script::Stream {
            packets: 1,
            size: 1,
            end: StreamEnd::Hang,
        }])
        .with_packet_gap(Duration::from_millis(250));
        let pool = Pool::new(registry(&["tcp://a:1/app/s"]), connector.clone(), settings());
        pool.resize(1).await;
        let stats = pool.statistics();
        eventually(|| stats.packets.get() == 1).await;
        assert_eq!(stats.receiving_connections.get(), 1);
        assert_eq!(stats.packet_delay.compute_average(), 0.0);
        pool.stop().await;
    }

    #[tokio::test]
    async fn waiting_for_endpoints_is_interruptible() {
        let connector = ScriptedConnector::default();
        let pool = Pool::new(
            EndpointRegistry::new(),
            connector.clone(),
            PoolSettings {
                no_endpoints_backoff: Duration::from_secs(3600),
                ..settings()
            },
        );
        pool.resize(2).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Endpoints added later are not picked up before the back-off ends.
        pool.registry().add_endpoints(parse_endpoint_spec("tcp://a:1/app/s").unwrap());
        tokio::time::timeout(Duration::from_secs(5), pool.stop())
            .await
            .expect("stop must interrupt the back-off");
        assert_eq!(connector.opened(), 0);
        assert_eq!(pool.statistics().errors.get(), 0);
    }

    #[tokio::test]
    async fn restart_delay_is_interruptible() {
        let connector = ScriptedConnector::default();
        let pool = pool(
            connector.clone(),
            PoolSettings {
                restart_delay: DelayDistribution::Const(Duration::from_secs(3600)),
                ..settings()
            },
        );
        pool.resize(3).await;
        tokio::time::timeout(Duration::from_secs(5), pool.stop())
            .await
            .expect("stop must interrupt the restart delay");
        assert_eq!(connector.opened(), 0);
    }

    #[tokio::test]
    async fn emitter_publishes_samples_and_closes_sink() {
        let sink = MemorySink::default();
        let pool = pool(
            ScriptedConnector::default(),
            PoolSettings {
                sink_interval: Duration::from_millis(20),
                ..settings()
            },
        );
        pool.start(2, Box::new(sink.clone())).await;
        eventually(|| sink.samples().len() >= 2).await;
        pool.stop().await;
        assert!(sink.is_closed());

        let samples = sink.samples();
        for sample in &samples {
            let names = sample.fields.iter().map(|(name, _)| *name).collect::<Vec<_>>();
            assert_eq!(names, SAMPLE_FIELDS.to_vec());
        }
        assert!(samples.windows(2).all(|pair| pair[0].time <= pair[1].time));
        assert_eq!(samples.first().and_then(|sample| sample.get("streams")), Some(2.0));
    }

    #[tokio::test]
    async fn abandoned_shrink_finishes_before_the_next_resize() {
        let connector = ScriptedConnector::default();
        let pool = pool(connector.clone(), settings());
        pool.resize(4).await;
        eventually(|| connector.opened() == 4).await;

        // Polled once and dropped while the removed workers are still being joined.
        assert!(pool.resize(1).now_or_never().is_none());
        assert_eq!(pool.size(), 1);

        assert_eq!(pool.resize(1).await, PoolSizeChange { previous: 1, current: 1 });
        assert_eq!(connector.closed(), 3);
        pool.stop().await;
    }

    struct GatedSink {
        entered: Arc<AtomicBool>,
        gate: std::sync::mpsc::Receiver<()>,
    }

    impl SampleSink for GatedSink {
        fn publish(&mut self, _sample: &Sample) -> eyre::Result<()> {
            self.entered.store(true, Ordering::SeqCst);
            // Returns once the sender is dropped.
            let _ = self.gate.recv_timeout(Duration::from_secs(2));
            Ok(())
        }
    }

    #[tokio::test]
    async fn slow_sink_does_not_block_the_runtime() {
        let entered = Arc::new(AtomicBool::new(false));
        let (release, gate) = std::sync::mpsc::channel::<()>();
        let pool = pool(
            ScriptedConnector::default(),
            PoolSettings {
                sink_interval: Duration::from_millis(10),
                ..settings()
            },
        );
        pool.start(1, Box::new(GatedSink {
            entered: entered.clone(),
            gate,
        }))
        .await;
        eventually(|| entered.load(Ordering::SeqCst)).await;

        let started = std::time::Instant::now();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(started.elapsed() < Duration::from_secs(1), "runtime stalled for {:?}", started.elapsed());

        drop(release);
        pool.stop().await;
    }
}
