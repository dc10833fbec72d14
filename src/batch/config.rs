use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Limits governing one batch.  Any limit being reached releases the
/// batch; a limit of `None` means that dimension never triggers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchConfig {
    pub time_limit: Option<Duration>,
    pub msg_count: Option<usize>,
    pub byte_count: Option<usize>,
}

impl BatchConfig {
    pub fn disabled() -> BatchConfig {
        BatchConfig::default()
    }

    /// With no limit configured, batching is pass-through: every message
    /// is released immediately as its own batch.
    pub fn is_enabled(&self) -> bool {
        self.time_limit.is_some() || self.msg_count.is_some() || self.byte_count.is_some()
    }
}

/// What the batcher does with messages of a given topic.
#[derive(Debug, Clone, PartialEq)]
pub enum TopicAction {
    /// Batch per topic under the given limits.
    PerTopic(BatchConfig),
    /// Feed into the combined-topics batch.
    CombinedTopics,
    /// No batching: straight to routing.
    Disable,
}

/// Membership test for the combined-topics batch.  Depending on the
/// default-topic policy this is an allow-list (only the listed topics
/// participate) or a deny-list (every topic but the listed ones does).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TopicFilter {
    pub listed: HashSet<String>,
    pub include_listed: bool,
}

impl TopicFilter {
    pub fn passes(&self, topic: &str) -> bool {
        self.listed.contains(topic) == self.include_listed
    }
}

/// Per-topic batching configuration after named-config resolution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PerTopicConfig {
    pub default_topic: BatchConfig,
    pub per_topic: HashMap<String, BatchConfig>,
}

impl PerTopicConfig {
    pub fn get(&self, topic: &str) -> &BatchConfig {
        self.per_topic.get(topic).unwrap_or(&self.default_topic)
    }
}

/// The complete resolved batching plan the router runs with.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalBatchConfig {
    pub produce_request_data_limit: usize,
    pub message_max_bytes: usize,
    /// `None` when combined-topics batching is disabled.
    pub combined_config: Option<BatchConfig>,
    pub combined_filter: TopicFilter,
    pub per_topic: PerTopicConfig,
    pub default_action: TopicAction,
    pub topic_actions: HashMap<String, TopicAction>,
}

impl GlobalBatchConfig {
    pub fn action_for(&self, topic: &str) -> &TopicAction {
        self.topic_actions
            .get(topic)
            .unwrap_or(&self.default_action)
    }
}

impl Default for GlobalBatchConfig {
    fn default() -> Self {
        GlobalBatchConfig {
            produce_request_data_limit: 1024 * 1024,
            message_max_bytes: 1024 * 1024,
            combined_config: None,
            combined_filter: TopicFilter::default(),
            per_topic: PerTopicConfig::default(),
            default_action: TopicAction::Disable,
            topic_actions: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enabled() {
        assert!(!BatchConfig::disabled().is_enabled());
        assert!(BatchConfig {
                        msg_count: Some(10),
                        ..BatchConfig::default()
                    }
                    .is_enabled());
    }

    #[test]
    fn test_filter() {
        let mut allow = TopicFilter::default();
        allow.include_listed = true;
        allow.listed.insert("a".to_owned());

        assert!(allow.passes("a"));
        assert!(!allow.passes("b"));

        let mut deny = TopicFilter::default();
        deny.listed.insert("a".to_owned());

        assert!(!deny.passes("a"));
        assert!(deny.passes("b"));
    }

    #[test]
    fn test_action_lookup_falls_back_to_default() {
        let mut config = GlobalBatchConfig::default();
        config.default_action = TopicAction::CombinedTopics;
        config.topic_actions
            .insert("special".to_owned(), TopicAction::Disable);

        assert_eq!(*config.action_for("special"), TopicAction::Disable);
        assert_eq!(*config.action_for("other"), TopicAction::CombinedTopics);
    }
}
