mod metadata;
mod fetcher;

pub use self::fetcher::{MetadataFetcher, metadata_from_response};
pub use self::metadata::{Broker, BrokerIndex, Metadata, MetadataBuilder, MetadataRef, Partition};
