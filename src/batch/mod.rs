mod config;
mod single_topic;
mod per_topic;
mod combined;

pub use self::config::{BatchConfig, GlobalBatchConfig, PerTopicConfig, TopicAction, TopicFilter};
pub use self::single_topic::SingleTopicBatcher;
pub use self::per_topic::PerTopicBatcher;
pub use self::combined::CombinedTopicsBatcher;
