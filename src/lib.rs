//! Host-resident Kafka producer daemon engine.
//!
//! Applications hand messages to a local IPC listener; this crate
//! batches them per topic, routes each batch to the broker leading its
//! partition, frames compressed produce requests, and correlates broker
//! responses back to the messages they acknowledge.  Broker outages are
//! absorbed by bounded in-memory buffering with explicit discard
//! reporting.

#![recursion_limit = "128"]

#[macro_use]
extern crate log;
#[macro_use]
extern crate error_chain;
#[macro_use]
extern crate lazy_static;
extern crate bytes;
#[macro_use]
extern crate nom;
extern crate byteorder;
extern crate crc;
extern crate hexplay;
extern crate rand;
extern crate serde;
#[macro_use]
extern crate serde_derive;
extern crate serde_json;
extern crate time;
#[macro_use]
extern crate prometheus;

#[cfg(feature = "gzip")]
extern crate flate2;
#[cfg(feature = "lz4")]
extern crate lz4_compress;
#[cfg(feature = "snappy")]
extern crate snap;

#[cfg(test)]
extern crate pretty_env_logger;

#[macro_use]
pub mod errors;
mod compression;
#[macro_use]
mod protocol;
mod pool;
mod msg;
mod discard;
mod debug;
mod metrics;
mod ratelimit;
mod batch;
mod cluster;
mod conf;
mod ingest;
mod net;
mod dispatch;
mod router;
mod server;

pub mod consts {
    pub use conf::{DEFAULT_DISPATCHER_QUEUE_CAPACITY, DEFAULT_INGEST_QUEUE_CAPACITY,
                   DEFAULT_KAFKA_SOCKET_TIMEOUT_MILLIS, DEFAULT_MAX_FAILED_DELIVERY_ATTEMPTS,
                   DEFAULT_METADATA_REFRESH_INTERVAL_MILLIS, DEFAULT_SHUTDOWN_MAX_DELAY_MILLIS};
}

pub use batch::{BatchConfig, CombinedTopicsBatcher, GlobalBatchConfig, PerTopicBatcher,
                SingleTopicBatcher, TopicAction, TopicFilter};
pub use cluster::{Broker, BrokerIndex, Metadata, MetadataBuilder, MetadataFetcher, MetadataRef,
                  Partition};
pub use compression::Compression;
pub use conf::{CompressionConf, Conf, ResolvedConf, Settings, TopicCompression};
pub use debug::{DebugSink, LoggingDebugSink, NoopDebugSink};
pub use discard::{DiscardReason, DiscardRecord, DiscardSink, LoggingDiscardSink};
pub use dispatch::{AnyPartitionChooser, BuiltRequest, Connector, ConnectorEvent,
                   ConnectorHandle, ConnectorState, CorrelatedOutcome, InFlightRequest,
                   InFlightTable, MsgSetGroup, PauseRateLimiter, ProduceRequestFactory,
                   correlate_response};
pub use errors::{Error, ErrorKind, KafkaCode, Result};
pub use ingest::{InputFrame, decode_frame, write_frame};
pub use metrics::Metrics;
pub use msg::{Msg, MsgRouting};
pub use net::{KafkaConnection, MsgDisposition, MsgReadProtocol, ReaderState,
              SizePrefixedProtocol, SizePrefixedReader, StreamMsgReader};
pub use pool::{BufferPool, PoolBuf};
pub use protocol::{ApiKeys, CorrelationId, PartitionId, RequiredAcks, Timestamp};
pub use ratelimit::{TopicRateConf, TopicRateLimit, TopicRateLimiter};
pub use router::{Router, RouterEvent, RouterHandle, ShutdownMode};
pub use server::DoryServer;
