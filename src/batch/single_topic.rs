use std::time::Instant;

use batch::BatchConfig;
use msg::Msg;

/// Accumulates messages for one batch slot under a three-limit policy.
///
/// Count and byte limits are checked as messages arrive; the time limit
/// is the caller's job, via `deadline()` and `time_expired()`, so the
/// owning scheduler can sleep until the earliest deadline instead of
/// polling.
pub struct SingleTopicBatcher {
    config: BatchConfig,
    msgs: Vec<Msg>,
    first_time: Option<Instant>,
    total_bytes: usize,
}

impl SingleTopicBatcher {
    pub fn new(config: BatchConfig) -> SingleTopicBatcher {
        SingleTopicBatcher {
            config: config,
            msgs: Vec::new(),
            first_time: None,
            total_bytes: 0,
        }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn is_empty(&self) -> bool {
        self.msgs.is_empty()
    }

    pub fn msg_count(&self) -> usize {
        self.msgs.len()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Append a message.  The slot's start time is recorded in the same
    /// step as the first append so a concurrent deadline computation can
    /// never observe a non-empty slot without one.  Returns the full
    /// batch when a count or byte limit is now reached.
    pub fn add(&mut self, msg: Msg, now: Instant) -> Option<Vec<Msg>> {
        if !self.config.is_enabled() {
            return Some(vec![msg]);
        }

        if self.msgs.is_empty() {
            self.first_time = Some(now);
        }

        self.total_bytes += msg.batching_size();
        self.msgs.push(msg);

        let count_reached = self.config
            .msg_count
            .map_or(false, |limit| self.msgs.len() >= limit);
        let bytes_reached = self.config
            .byte_count
            .map_or(false, |limit| self.total_bytes >= limit);

        if count_reached || bytes_reached {
            Some(self.take_batch())
        } else {
            None
        }
    }

    /// Absolute release deadline, present only while the slot is
    /// non-empty and has a time limit.
    pub fn deadline(&self) -> Option<Instant> {
        match (self.first_time, self.config.time_limit) {
            (Some(first_time), Some(time_limit)) => Some(first_time + time_limit),
            _ => None,
        }
    }

    pub fn time_expired(&self, now: Instant) -> bool {
        self.deadline().map_or(false, |deadline| deadline <= now)
    }

    pub fn take_batch(&mut self) -> Vec<Msg> {
        self.first_time = None;
        self.total_bytes = 0;

        ::std::mem::replace(&mut self.msgs, Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use msg::MsgRouting;
    use pool::BufferPool;

    fn make_msg(pool: &Arc<BufferPool>, value: &[u8]) -> Msg {
        Msg::new(pool, "t", 0, MsgRouting::AnyPartition, b"", value).unwrap()
    }

    #[test]
    fn test_disabled_is_pass_through() {
        let pool = BufferPool::new(64, 16);
        let mut batcher = SingleTopicBatcher::new(BatchConfig::disabled());

        let batch = batcher.add(make_msg(&pool, b"x"), Instant::now()).unwrap();

        assert_eq!(batch.len(), 1);
        assert!(batcher.is_empty());
    }

    #[test]
    fn test_count_limit() {
        let pool = BufferPool::new(64, 16);
        let mut batcher = SingleTopicBatcher::new(BatchConfig {
                                                      msg_count: Some(3),
                                                      ..BatchConfig::default()
                                                  });
        let now = Instant::now();

        assert!(batcher.add(make_msg(&pool, b"a"), now).is_none());
        assert!(batcher.add(make_msg(&pool, b"b"), now).is_none());

        let batch = batcher.add(make_msg(&pool, b"c"), now).unwrap();

        assert_eq!(batch.len(), 3);
        assert!(batcher.is_empty());
        assert_eq!(batcher.total_bytes(), 0);
    }

    #[test]
    fn test_byte_limit() {
        let pool = BufferPool::new(64, 16);
        let mut batcher = SingleTopicBatcher::new(BatchConfig {
                                                      byte_count: Some(10),
                                                      ..BatchConfig::default()
                                                  });
        let now = Instant::now();

        assert!(batcher.add(make_msg(&pool, b"aaaa"), now).is_none());

        let batch = batcher.add(make_msg(&pool, b"bbbbbb"), now).unwrap();

        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn test_empty_msgs_count_at_least_one_byte() {
        let pool = BufferPool::new(64, 16);
        let mut batcher = SingleTopicBatcher::new(BatchConfig {
                                                      byte_count: Some(4),
                                                      ..BatchConfig::default()
                                                  });
        let now = Instant::now();

        for _ in 0..3 {
            assert!(batcher.add(make_msg(&pool, b""), now).is_none());
        }

        // the fourth empty message reaches the four-byte floor
        assert!(batcher.add(make_msg(&pool, b""), now).is_some());
    }

    #[test]
    fn test_oversized_single_msg_released_alone() {
        let pool = BufferPool::new(64, 16);
        let mut batcher = SingleTopicBatcher::new(BatchConfig {
                                                      byte_count: Some(4),
                                                      ..BatchConfig::default()
                                                  });

        let batch = batcher
            .add(make_msg(&pool, b"oversized"), Instant::now())
            .unwrap();

        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn test_time_limit_via_deadline() {
        let pool = BufferPool::new(64, 16);
        let mut batcher = SingleTopicBatcher::new(BatchConfig {
                                                      time_limit: Some(Duration::from_millis(50)),
                                                      ..BatchConfig::default()
                                                  });
        let now = Instant::now();

        assert!(batcher.deadline().is_none());
        assert!(batcher.add(make_msg(&pool, b"x"), now).is_none());
        assert_eq!(batcher.deadline(),
                   Some(now + Duration::from_millis(50)));
        assert!(!batcher.time_expired(now));
        assert!(batcher.time_expired(now + Duration::from_millis(50)));

        let batch = batcher.take_batch();

        assert_eq!(batch.len(), 1);
        assert!(batcher.deadline().is_none());
    }

    #[test]
    fn test_no_limits_never_time_releases() {
        let pool = BufferPool::new(64, 16);
        let mut batcher = SingleTopicBatcher::new(BatchConfig {
                                                      msg_count: Some(100),
                                                      ..BatchConfig::default()
                                                  });
        let now = Instant::now();

        batcher.add(make_msg(&pool, b"x"), now);

        assert!(batcher.deadline().is_none());
        assert!(!batcher.time_expired(now + Duration::from_secs(3600)));
    }
}
