use std::time::Instant;

use batch::{BatchConfig, SingleTopicBatcher, TopicFilter};
use msg::Msg;

/// The combined-topics batch: one queue mixing every participating
/// topic, governed by a single global limit triple.
pub struct CombinedTopicsBatcher {
    batcher: SingleTopicBatcher,
    filter: TopicFilter,
    enabled: bool,
}

impl CombinedTopicsBatcher {
    pub fn new(config: Option<BatchConfig>, filter: TopicFilter) -> CombinedTopicsBatcher {
        let enabled = config.is_some();

        CombinedTopicsBatcher {
            batcher: SingleTopicBatcher::new(config.unwrap_or_else(BatchConfig::disabled)),
            filter: filter,
            enabled: enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn filter_passes(&self, topic: &str) -> bool {
        self.filter.passes(topic)
    }

    pub fn is_empty(&self) -> bool {
        self.batcher.is_empty()
    }

    pub fn add(&mut self, msg: Msg, now: Instant) -> Option<Vec<Msg>> {
        self.batcher.add(msg, now)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.batcher.deadline()
    }

    pub fn time_expired(&self, now: Instant) -> bool {
        self.batcher.time_expired(now)
    }

    pub fn take_batch(&mut self) -> Vec<Msg> {
        self.batcher.take_batch()
    }
}
