//! In-memory doubles for driving the pool without network access.

use crate::{
    endpoint::Endpoint,
    sink::SampleSink,
    stats::Sample,
    stream::{
        Received,
        StreamConnector,
        StreamHandle,
    },
};
use eyre::{
    bail,
    Result,
};
use std::{
    collections::VecDeque,
    sync::{
        atomic::{
            AtomicBool,
            AtomicUsize,
            Ordering,
        },
        Arc,
        Mutex,
    },
    time::Duration,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamEnd {
    Eof,
    Error,
    /// Never returns from `receive` again.
    Hang,
}

/// What the next `open` call does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Script {
    FailOpen,
    Stream { packets: usize, size: usize, end: StreamEnd },
}

/// Plays the queued scripts in order, one per `open`. Once the queue is empty every open
/// succeeds with a stream that hangs without data.
#[derive(Debug, Clone, Default)]
pub(crate) struct ScriptedConnector {
    scripts: Arc<Mutex<VecDeque<Script>>>,
    packet_gap: Duration,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

impl ScriptedConnector {
    pub(crate) fn with_scripts(scripts: impl IntoIterator<Item = Script>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts.into_iter().collect())),
            ..Self::default()
        }
    }

    /// Every scripted packet is delivered `gap` after the previous one, or after the open.
    pub(crate) fn with_packet_gap(self, gap: Duration) -> Self {
        Self {
            packet_gap: gap,
            ..self
        }
    }

    /// Number of successfully opened handles.
    pub(crate) fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub(crate) fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

impl StreamConnector for ScriptedConnector {
    type Handle = ScriptedHandle;

    async fn open(&self, endpoint: &Endpoint) -> Result<ScriptedHandle> {
        let script = self.scripts.lock().unwrap().pop_front().unwrap_or(Script::Stream {
            packets: 0,
            size: 0,
            end: StreamEnd::Hang,
        });
        match script {
            Script::FailOpen => bail!("scripted open failure for {endpoint}"),
            Script::Stream { packets, size, end } => {
                self.opened.fetch_add(1, Ordering::SeqCst);
                Ok(ScriptedHandle {
                    packets,
                    size,
                    gap: self.packet_gap,
                    end,
                    closed: self.closed.clone(),
                })
            }
        }
    }
}

#[derive(Debug)]
pub(crate) struct ScriptedHandle {
    packets: usize,
    size: usize,
    gap: Duration,
    end: StreamEnd,
    closed: Arc<AtomicUsize>,
}

impl StreamHandle for ScriptedHandle {
    async fn receive(&mut self) -> Result<Received> {
        if self.packets > 0 {
            if !self.gap.is_zero() {
                tokio::time::sleep(self.gap).await;
            }
            self.packets -= 1;
            return Ok(Received::Data(self.size));
        }
        match self.end {
            StreamEnd::Eof => Ok(Received::EndOfStream),
            StreamEnd::Error => bail!("scripted receive failure"),
            StreamEnd::Hang => std::future::pending().await,
        }
    }

    async fn close(self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Collects published samples.
#[derive(Debug, Clone, Default)]
pub(crate) struct MemorySink {
    samples: Arc<Mutex<Vec<Sample>>>,
    closed: Arc<AtomicBool>,
}

impl MemorySink {
    pub(crate) fn samples(&self) -> Vec<Sample> {
        self.samples.lock().unwrap().clone()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl SampleSink for MemorySink {
    fn publish(&mut self, sample: &Sample) -> Result<()> {
        self.samples.lock().unwrap().push(sample.clone());
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Poll `condition` until it holds, panicking after a few seconds.
pub(crate) async fn eventually(condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "condition not met in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
