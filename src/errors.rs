use compression::Compression;

/// Error codes reported by a Kafka broker in a produce or metadata
/// response.
///
/// Only the codes the forwarding engine reacts to are spelled out; every
/// other value decodes to `Unknown`, which the dispatcher treats as
/// retriable up to the delivery attempt limit.
///
/// See also [Kafka Errors](http://kafka.apache.org/protocol.html)
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum KafkaCode {
    /// The server experienced an unexpected error when processing the
    /// request, or returned a code this client does not know about.
    Unknown,
    None,
    /// This indicates that a message contents does not match its CRC
    CorruptMessage,
    /// This request is for a topic or partition that does not exist
    /// on this broker.
    UnknownTopicOrPartition,
    /// The message has a negative size
    InvalidMessageSize,
    /// This error is thrown if we are in the middle of a leadership
    /// election and there is currently no leader for this partition
    /// and hence it is unavailable for writes.
    LeaderNotAvailable,
    /// This error is thrown if the client attempts to send messages
    /// to a replica that is not the leader for some partition. It
    /// indicates that the clients metadata is out of date.
    NotLeaderForPartition,
    /// This error is thrown if the request exceeds the user-specified
    /// time limit in the request.
    RequestTimedOut,
    /// This is not a client facing error and is used mostly by tools
    /// when a broker is not alive.
    BrokerNotAvailable,
    /// If replica is expected on a broker, but is not (this can be
    /// safely ignored).
    ReplicaNotAvailable,
    /// The server has a configurable maximum message size to avoid
    /// unbounded memory allocation. This error is thrown if the
    /// client attempt to produce a message larger than this maximum.
    MessageSizeTooLarge,
    /// The server disconnected before a response was received.
    NetworkException,
    /// For a request which attempts to access an invalid topic
    /// (e.g. one which has an illegal name), or if an attempt is made
    /// to write to an internal topic (such as the consumer offsets
    /// topic).
    InvalidTopic,
    /// If a message batch in a produce request exceeds the maximum
    /// configured segment size.
    RecordListTooLarge,
    /// Returned from a produce request when the number of in-sync
    /// replicas is lower than the configured minimum and requiredAcks is
    /// -1.
    NotEnoughReplicas,
    /// Returned from a produce request when the message was written
    /// to the log, but with fewer in-sync replicas than required.
    NotEnoughReplicasAfterAppend,
    /// Returned from a produce request if the requested requiredAcks is
    /// invalid (anything other than -1, 1, or 0).
    InvalidRequiredAcks,
    /// Returned by the broker when the client is not authorized to access
    /// the requested topic.
    TopicAuthorizationFailed,
    /// The version of API is not supported.
    UnsupportedVersion,
}

impl KafkaCode {
    pub fn from_wire(v: i16) -> KafkaCode {
        match v {
            0 => KafkaCode::None,
            2 => KafkaCode::CorruptMessage,
            3 => KafkaCode::UnknownTopicOrPartition,
            4 => KafkaCode::InvalidMessageSize,
            5 => KafkaCode::LeaderNotAvailable,
            6 => KafkaCode::NotLeaderForPartition,
            7 => KafkaCode::RequestTimedOut,
            8 => KafkaCode::BrokerNotAvailable,
            9 => KafkaCode::ReplicaNotAvailable,
            10 => KafkaCode::MessageSizeTooLarge,
            13 => KafkaCode::NetworkException,
            17 => KafkaCode::InvalidTopic,
            18 => KafkaCode::RecordListTooLarge,
            19 => KafkaCode::NotEnoughReplicas,
            20 => KafkaCode::NotEnoughReplicasAfterAppend,
            21 => KafkaCode::InvalidRequiredAcks,
            29 => KafkaCode::TopicAuthorizationFailed,
            35 => KafkaCode::UnsupportedVersion,
            _ => KafkaCode::Unknown,
        }
    }

    /// True for codes that acknowledge delivery even though they report a
    /// condition (`ReplicaNotAvailable` does not affect the write).
    pub fn is_ack(self) -> bool {
        self == KafkaCode::None || self == KafkaCode::ReplicaNotAvailable
    }

    /// True for codes indicating the partition moved or the broker is in
    /// trouble; the affected messages must be re-routed through fresh
    /// metadata.
    pub fn requires_reroute(self) -> bool {
        match self {
            KafkaCode::NotLeaderForPartition
            | KafkaCode::LeaderNotAvailable
            | KafkaCode::UnknownTopicOrPartition
            | KafkaCode::BrokerNotAvailable
            | KafkaCode::NetworkException
            | KafkaCode::RequestTimedOut => true,
            _ => false,
        }
    }

    /// True for codes that will keep failing no matter how often the
    /// messages are resent.
    pub fn is_permanent(self) -> bool {
        match self {
            KafkaCode::MessageSizeTooLarge
            | KafkaCode::InvalidTopic
            | KafkaCode::TopicAuthorizationFailed
            | KafkaCode::RecordListTooLarge => true,
            _ => false,
        }
    }
}

error_chain! {
    foreign_links {
        IoError(::std::io::Error);
    }

    errors {
        /// A parser combinator failed to match the input.
        ParseError(kind: ::nom::ErrorKind) {
            description("parse error")
            display("parse error: {:?}", kind)
        }

        /// A frame ended before its advertised content did.
        TruncatedFrame {
            description("truncated frame")
        }
        BadApiKey(api_key: i16) {
            description("unsupported api key")
            display("unsupported api key: {}", api_key)
        }
        BadApiVersion(api_version: i16) {
            description("unsupported api version")
            display("unsupported api version: {}", api_version)
        }
        /// A count field was negative or inconsistent with the frame size.
        BadCount(count: i32) {
            description("bad element count in frame")
            display("bad element count in frame: {}", count)
        }
        /// A size or length field was out of range for its frame.
        BadLength(len: i64) {
            description("bad length field in frame")
            display("bad length field in frame: {}", len)
        }
        CrcMismatch(expected: u32, computed: u32) {
            description("message CRC mismatch")
            display("message CRC mismatch: expected {:#010x}, computed {:#010x}",
                expected, computed)
        }
        UnknownCompression(attributes: u8) {
            description("unknown compression codec in message attributes")
            display("unknown compression codec in message attributes: {:#04x}",
                attributes)
        }
        CompressionUnavailable(compression: Compression) {
            description("compression codec not built in")
            display("compression codec not built in: {:?}", compression)
        }
        InvalidCompressionLevel(compression: Compression, level: i32) {
            description("invalid compression level")
            display("invalid level {} for {:?} compression", level, compression)
        }
        CodecError(reason: &'static str) {
            description("codec error")
            display("codec error: {}", reason)
        }
        KafkaError(code: KafkaCode) {
            description("kafka error")
            display("kafka error: {:?}", code)
        }
        /// A metadata response failed the structural checks the cache
        /// builder enforces (unknown leader id, duplicate partition, ...).
        InvalidMetadata(reason: String) {
            description("invalid metadata")
            display("invalid metadata: {}", reason)
        }
        ConfigError(reason: String) {
            description("configuration error")
            display("configuration error: {}", reason)
        }
        /// The connection closed (or timed out) with requests in flight.
        ConnectionLost(broker: String) {
            description("broker connection lost")
            display("connection to broker {} lost", broker)
        }
        Canceled(reason: &'static str) {
            description("operation canceled")
            display("operation canceled: {}", reason)
        }
    }
}
