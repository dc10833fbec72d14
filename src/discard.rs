use std::fmt;

use time;

use msg::Msg;
use protocol::Timestamp;

/// How many leading value bytes are kept in a discard record so the
/// external logger can identify the lost message.
pub const MSG_IDENTITY_LIMIT: usize = 128;

/// Why a message was dropped instead of delivered.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DiscardReason {
    /// No routable partition existed for the topic.
    NoAvailablePartition,
    /// Topic auto-creation was attempted but no leader appeared within
    /// the delivery attempt limit.
    NoLeaderAvailable,
    /// The topic name exceeds what the wire format can carry.
    TopicTooLarge,
    /// The message exceeds the configured single-message size limit.
    MsgTooLarge,
    /// The topic's rate limit was exceeded.
    RateLimit,
    /// The broker acknowledged the produce request with a permanent
    /// error for this message's partition.
    KafkaErrorAck(i16),
    /// The message failed delivery too many times.
    FailedDeliveryAttemptLimit,
    /// An internal inconsistency made the message undeliverable.
    Bug,
    /// The message was still queued or unacknowledged when shutdown
    /// completed.
    ServerShutdown,
    /// The buffer pool was exhausted at admission.
    NoBufferSpace,
    /// The ingest frame failed to decode.
    MalformedMsg,
    /// The ingest frame carried an unknown api key.
    UnsupportedApiKey,
    /// The ingest frame carried an unknown api version.
    UnsupportedMsgVersion,
}

impl fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            DiscardReason::KafkaErrorAck(code) => write!(f, "kafka error ack (code {})", code),
            reason => write!(f, "{:?}", reason),
        }
    }
}

/// One discard event, as handed to the external anomaly logger.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscardRecord {
    pub topic: String,
    pub reason: DiscardReason,
    pub timestamp: Timestamp,
    pub msg_identity: Vec<u8>,
}

/// Seam to the external anomaly/discard logger.  Implementations must be
/// cheap and non-blocking; every pipeline stage reports through this.
pub trait DiscardSink: Send + Sync {
    fn discard(&self, record: DiscardRecord);
}

/// Default sink: one warning log line per discard.
pub struct LoggingDiscardSink;

impl DiscardSink for LoggingDiscardSink {
    fn discard(&self, record: DiscardRecord) {
        warn!("discarding message for topic `{}`: {} ({} identity bytes)",
              record.topic,
              record.reason,
              record.msg_identity.len());
    }
}

pub fn wall_clock_ms() -> Timestamp {
    let now = time::now_utc().to_timespec();

    now.sec * 1000 + i64::from(now.nsec) / 1_000_000
}

/// Report `msg` to the sink and release it.  Consuming the message here
/// keeps the single-owner discipline: a discarded message cannot also be
/// queued or in flight.
pub fn discard_msg(sink: &DiscardSink, msg: Msg, reason: DiscardReason) {
    let mut identity = msg.value();

    if identity.len() > MSG_IDENTITY_LIMIT {
        identity = &identity[..MSG_IDENTITY_LIMIT];
    }

    sink.discard(DiscardRecord {
                     topic: msg.topic().to_owned(),
                     reason: reason,
                     timestamp: wall_clock_ms(),
                     msg_identity: identity.to_vec(),
                 });
}

pub fn discard_all(sink: &DiscardSink, msgs: Vec<Msg>, reason: DiscardReason) {
    for msg in msgs {
        discard_msg(sink, msg, reason);
    }
}

/// Discard sink that records everything it sees; test support.
#[derive(Default)]
pub struct CapturingDiscardSink {
    records: ::std::sync::Mutex<Vec<DiscardRecord>>,
}

impl CapturingDiscardSink {
    pub fn records(&self) -> Vec<DiscardRecord> {
        self.records
            .lock()
            .expect("discard sink lock poisoned")
            .clone()
    }
}

impl DiscardSink for CapturingDiscardSink {
    fn discard(&self, record: DiscardRecord) {
        self.records
            .lock()
            .expect("discard sink lock poisoned")
            .push(record);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use msg::MsgRouting;
    use pool::BufferPool;

    #[test]
    fn test_discard_msg_reports_and_releases() {
        let pool = BufferPool::new(64, 1);
        let sink = Arc::new(CapturingDiscardSink::default());

        let msg = ::msg::Msg::new(&pool, "t", 5, MsgRouting::AnyPartition, b"k", b"hello")
            .unwrap();

        discard_msg(&*sink, msg, DiscardReason::RateLimit);

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].topic, "t");
        assert_eq!(records[0].reason, DiscardReason::RateLimit);
        assert_eq!(records[0].msg_identity, b"hello".to_vec());

        // the pool block came back
        assert_eq!(pool.blocks_in_use(), 0);
    }

    #[test]
    fn test_identity_bytes_are_capped() {
        let pool = BufferPool::new(1024, 2);
        let sink = CapturingDiscardSink::default();

        let value = vec![7u8; 500];
        let msg = ::msg::Msg::new(&pool, "t", 0, MsgRouting::AnyPartition, b"", &value)
            .unwrap();

        discard_msg(&sink, msg, DiscardReason::MsgTooLarge);

        assert_eq!(sink.records()[0].msg_identity.len(), MSG_IDENTITY_LIMIT);
    }
}
