use crate::counters::{
    AveragingCounter,
    BidirectionalCounter,
    CumulativeCounter,
};
use chrono::{
    DateTime,
    Utc,
};
use serde::{
    ser::SerializeMap,
    Serialize,
};
use std::time::Duration;

/// Names of the fields of every [`Sample`], in emission order.
pub const SAMPLE_FIELDS: [&str; 19] = [
    "streams",
    "openConnections",
    "receivingConnections",
    "opened",
    "closed",
    "errors",
    "bytes",
    "packets",
    "opened/s",
    "closed/s",
    "errors/s",
    "bytes/s",
    "packets/s",
    "packetDelay",
    "pixels",
    "bytes/pixel",
    "packets/pixel",
    "bytes/connection",
    "packets/connection",
];

/// Counters shared by all workers of a pool.
#[derive(Debug, Default)]
pub struct StreamStatistics {
    pub open_connections: BidirectionalCounter,
    pub receiving_connections: BidirectionalCounter,
    pub pixels: BidirectionalCounter,
    pub opened: CumulativeCounter,
    pub closed: CumulativeCounter,
    pub errors: CumulativeCounter,
    pub bytes: CumulativeCounter,
    pub packets: CumulativeCounter,
    /// Seconds between two consecutive packets of the same stream.
    pub packet_delay: AveragingCounter,
}

impl StreamStatistics {
    /// Read every counter once and build a sample for the interval that just ended.
    ///
    /// Each counter is read independently, so values are not a consistent snapshot across
    /// counters. Ratios with a zero denominator are `NaN`.
    pub fn sample(&self, streams: usize, elapsed: Duration) -> Sample {
        let opened = self.opened.compute_delta(elapsed);
        let closed = self.closed.compute_delta(elapsed);
        let errors = self.errors.compute_delta(elapsed);
        let bytes = self.bytes.compute_delta(elapsed);
        let packets = self.packets.compute_delta(elapsed);
        let packet_delay = self.packet_delay.compute_average();
        let pixels = self.pixels.get() as f64;
        let receiving = self.receiving_connections.get() as f64;

        let values = [
            streams as f64,
            self.open_connections.get() as f64,
            receiving,
            opened.total as f64,
            closed.total as f64,
            errors.total as f64,
            bytes.total as f64,
            packets.total as f64,
            opened.rate,
            closed.rate,
            errors.rate,
            bytes.rate,
            packets.rate,
            packet_delay,
            pixels,
            ratio(bytes.rate, pixels),
            ratio(packets.rate, pixels),
            ratio(bytes.rate, receiving),
            ratio(packets.rate, receiving),
        ];

        Sample {
            time: Utc::now(),
            fields: SAMPLE_FIELDS.into_iter().zip(values).collect(),
        }
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        f64::NAN
    } else {
        numerator / denominator
    }
}

/// One timestamped set of named values.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub time: DateTime<Utc>,
    pub fields: Vec<(&'static str, f64)>,
}

impl Sample {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.fields
            .iter()
            .find_map(|(field, value)| (*field == name).then_some(*value))
    }
}

/// Serializes as a flat map `{"time": ..., "<field>": <value>, ...}` preserving field order.
/// Non-finite values become `null` in JSON.
impl Serialize for Sample {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.fields.len() + 1))?;
        map.serialize_entry("time", &self.time.to_rfc3339())?;
        for (name, value) in &self.fields {
            if value.is_finite() {
                map.serialize_entry(name, value)?;
            } else {
                map.serialize_entry(name, &None::<f64>)?;
            }
        }
        map.end()
    }
}
