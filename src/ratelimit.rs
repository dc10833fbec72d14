use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Resolved rate limit for one topic: at most `max_count` messages per
/// `interval` window, or unlimited when `max_count` is `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicRateLimit {
    pub interval: Duration,
    pub max_count: Option<u64>,
}

impl Default for TopicRateLimit {
    fn default() -> Self {
        TopicRateLimit {
            interval: Duration::from_secs(1),
            max_count: None,
        }
    }
}

/// Per-topic rate limiting configuration after named-config resolution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TopicRateConf {
    pub default_topic: TopicRateLimit,
    pub per_topic: HashMap<String, TopicRateLimit>,
}

impl TopicRateConf {
    fn get(&self, topic: &str) -> &TopicRateLimit {
        self.per_topic.get(topic).unwrap_or(&self.default_topic)
    }
}

struct Window {
    start: Instant,
    count: u64,
}

/// Tracks fixed windows per topic; consulted by the router before a
/// message enters the pipeline.
pub struct TopicRateLimiter {
    conf: TopicRateConf,
    windows: HashMap<String, Window>,
}

impl TopicRateLimiter {
    pub fn new(conf: TopicRateConf) -> TopicRateLimiter {
        TopicRateLimiter {
            conf: conf,
            windows: HashMap::new(),
        }
    }

    /// Count one message against `topic`'s window.  Returns `false` when
    /// the window's budget is already spent, in which case the message
    /// must be discarded with reason `RateLimit`.
    pub fn try_admit(&mut self, topic: &str, now: Instant) -> bool {
        let limit = match self.conf.get(topic).max_count {
            Some(limit) => limit,
            None => return true,
        };

        let interval = self.conf.get(topic).interval;
        let window = self.windows
            .entry(topic.to_owned())
            .or_insert_with(|| {
                                Window {
                                    start: now,
                                    count: 0,
                                }
                            });

        if now.duration_since(window.start) >= interval {
            window.start = now;
            window.count = 0;
        }

        if window.count >= limit {
            false
        } else {
            window.count += 1;
            true
        }
    }
}
