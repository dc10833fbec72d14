use std::collections::HashMap;

use compression::Compression;

/// Resolved compression policy for one topic.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicCompression {
    pub codec: Compression,
    /// Below this many uncompressed body bytes the message-set is sent
    /// as-is.
    pub min_size: usize,
    pub level: Option<i32>,
}

impl Default for TopicCompression {
    fn default() -> Self {
        TopicCompression {
            codec: Compression::None,
            min_size: 0,
            level: None,
        }
    }
}

/// Compression configuration after named-config resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressionConf {
    /// If `compressed size / uncompressed size` exceeds this percentage,
    /// the set is sent uncompressed so the broker spends no CPU undoing
    /// a poor trade.
    pub size_threshold_percent: u32,
    pub default_topic: TopicCompression,
    pub per_topic: HashMap<String, TopicCompression>,
}

impl Default for CompressionConf {
    fn default() -> Self {
        CompressionConf {
            size_threshold_percent: 100,
            default_topic: TopicCompression::default(),
            per_topic: HashMap::new(),
        }
    }
}

impl CompressionConf {
    pub fn get(&self, topic: &str) -> &TopicCompression {
        self.per_topic.get(topic).unwrap_or(&self.default_topic)
    }

    pub fn max_ratio(&self) -> f64 {
        f64::from(self.size_threshold_percent) / 100.0
    }
}
