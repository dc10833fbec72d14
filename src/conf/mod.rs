mod compression;
mod document;

pub use self::compression::{CompressionConf, TopicCompression};
pub use self::document::{Conf, ResolvedConf};

use std::time::Duration;

use protocol::RequiredAcks;

pub const DEFAULT_CLIENT_ID: &'static str = "dory";
pub const DEFAULT_KAFKA_SOCKET_TIMEOUT_MILLIS: u64 = 60_000;
pub const DEFAULT_METADATA_REFRESH_INTERVAL_MILLIS: u64 = 15 * 60_000;
pub const DEFAULT_REPLICATION_TIMEOUT_MILLIS: u64 = 10_000;
pub const DEFAULT_MAX_FAILED_DELIVERY_ATTEMPTS: u32 = 5;
pub const DEFAULT_MIN_PAUSE_DELAY_MILLIS: u64 = 5_000;
pub const DEFAULT_PAUSE_RATE_LIMIT_INITIAL_MILLIS: u64 = 5_000;
pub const DEFAULT_PAUSE_RATE_LIMIT_MAX_DOUBLE: u32 = 4;
pub const DEFAULT_SHUTDOWN_MAX_DELAY_MILLIS: u64 = 30_000;
pub const DEFAULT_DISPATCHER_RESTART_MAX_DELAY_MILLIS: u64 = 5_000;
pub const DEFAULT_POOL_BLOCK_SIZE: usize = 4 * 1024;
pub const DEFAULT_POOL_BLOCK_COUNT: usize = 16 * 1024;
pub const DEFAULT_INGEST_QUEUE_CAPACITY: usize = 1024;
pub const DEFAULT_DISPATCHER_QUEUE_CAPACITY: usize = 64;
pub const DEFAULT_MAX_KAFKA_RESPONSE_SIZE: usize = 16 * 1024 * 1024;

/// Daemon-level knobs, taken from the command line rather than the
/// structured config document.
#[derive(Debug, Clone)]
pub struct Settings {
    pub client_id: String,
    pub required_acks: RequiredAcks,
    /// Replication timeout carried inside every produce request.
    pub replication_timeout: Duration,
    /// Deadline for every blocking broker socket operation.
    pub kafka_socket_timeout: Duration,
    pub metadata_refresh_interval: Duration,
    /// Skip the snapshot swap when a refresh returns identical content.
    pub compare_metadata_on_refresh: bool,
    /// Issue a single-topic metadata request for unknown topics, which
    /// creates them on brokers configured for auto-creation.
    pub topic_autocreate: bool,
    pub max_failed_delivery_attempts: u32,
    pub min_pause_delay: Duration,
    pub pause_rate_limit_initial: Duration,
    pub pause_rate_limit_max_double: u32,
    pub shutdown_max_delay: Duration,
    pub dispatcher_restart_max_delay: Duration,
    pub pool_block_size: usize,
    pub pool_block_count: usize,
    pub ingest_queue_capacity: usize,
    pub dispatcher_queue_capacity: usize,
    pub max_kafka_response_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            client_id: DEFAULT_CLIENT_ID.to_owned(),
            required_acks: RequiredAcks::default(),
            replication_timeout: Duration::from_millis(DEFAULT_REPLICATION_TIMEOUT_MILLIS),
            kafka_socket_timeout: Duration::from_millis(DEFAULT_KAFKA_SOCKET_TIMEOUT_MILLIS),
            metadata_refresh_interval:
                Duration::from_millis(DEFAULT_METADATA_REFRESH_INTERVAL_MILLIS),
            compare_metadata_on_refresh: true,
            topic_autocreate: false,
            max_failed_delivery_attempts: DEFAULT_MAX_FAILED_DELIVERY_ATTEMPTS,
            min_pause_delay: Duration::from_millis(DEFAULT_MIN_PAUSE_DELAY_MILLIS),
            pause_rate_limit_initial:
                Duration::from_millis(DEFAULT_PAUSE_RATE_LIMIT_INITIAL_MILLIS),
            pause_rate_limit_max_double: DEFAULT_PAUSE_RATE_LIMIT_MAX_DOUBLE,
            shutdown_max_delay: Duration::from_millis(DEFAULT_SHUTDOWN_MAX_DELAY_MILLIS),
            dispatcher_restart_max_delay:
                Duration::from_millis(DEFAULT_DISPATCHER_RESTART_MAX_DELAY_MILLIS),
            pool_block_size: DEFAULT_POOL_BLOCK_SIZE,
            pool_block_count: DEFAULT_POOL_BLOCK_COUNT,
            ingest_queue_capacity: DEFAULT_INGEST_QUEUE_CAPACITY,
            dispatcher_queue_capacity: DEFAULT_DISPATCHER_QUEUE_CAPACITY,
            max_kafka_response_size: DEFAULT_MAX_KAFKA_RESPONSE_SIZE,
        }
    }
}
