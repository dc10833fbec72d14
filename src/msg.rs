use std::fmt;
use std::sync::Arc;

use pool::{BufferPool, PoolBuf};
use protocol::{PartitionId, Timestamp};

/// How a message picks its partition.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MsgRouting {
    /// The dispatcher chooses, round-robin, once per produce request.
    AnyPartition,
    /// The producer supplied a key; the router maps it onto the topic's
    /// routable partitions by modulus.
    PartitionKey(u32),
}

/// A locally-submitted message.  Immutable once admitted: the key and
/// value live in pool-owned storage and are released when the message is
/// dropped (on ACK, discard, or shutdown).
pub struct Msg {
    topic: String,
    timestamp: Timestamp,
    routing: MsgRouting,
    assigned_partition: Option<PartitionId>,
    body: PoolBuf,
    key_size: usize,
    failed_attempts: u32,
}

impl Msg {
    /// Admit a message, copying key and value into pool storage.
    /// Returns `None` when the pool is exhausted; the caller turns that
    /// into a `NoBufferSpace` discard.
    pub fn new(pool: &Arc<BufferPool>,
               topic: &str,
               timestamp: Timestamp,
               routing: MsgRouting,
               key: &[u8],
               value: &[u8])
               -> Option<Msg> {
        let mut body = BufferPool::acquire(pool, key.len() + value.len())?;

        body.extend_from_slice(key);
        body.extend_from_slice(value);

        Some(Msg {
                 topic: topic.to_owned(),
                 timestamp: timestamp,
                 routing: routing,
                 assigned_partition: None,
                 body: body,
                 key_size: key.len(),
                 failed_attempts: 0,
             })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn routing(&self) -> MsgRouting {
        self.routing
    }

    pub fn key(&self) -> &[u8] {
        &self.body[..self.key_size]
    }

    pub fn value(&self) -> &[u8] {
        &self.body[self.key_size..]
    }

    /// Combined key and value size in bytes.
    pub fn body_size(&self) -> usize {
        self.body.len()
    }

    /// Size for batch byte accounting.  Floored at one so a flood of
    /// empty messages still trips count limits through the byte limit.
    pub fn batching_size(&self) -> usize {
        ::std::cmp::max(1, self.body_size())
    }

    /// The partition the router resolved for a `PartitionKey` message.
    /// `AnyPartition` messages stay unassigned until the produce-request
    /// factory serializes them.
    pub fn assigned_partition(&self) -> Option<PartitionId> {
        self.assigned_partition
    }

    pub fn assign_partition(&mut self, partition: PartitionId) {
        self.assigned_partition = Some(partition);
    }

    /// Drop the partition assignment; called when a message is re-queued
    /// for re-routing under fresh metadata.
    pub fn clear_partition(&mut self) {
        self.assigned_partition = None;
    }

    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    pub fn bump_failed_attempts(&mut self) -> u32 {
        self.failed_attempts += 1;
        self.failed_attempts
    }
}

impl fmt::Debug for Msg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Msg")
            .field("topic", &self.topic)
            .field("timestamp", &self.timestamp)
            .field("routing", &self.routing)
            .field("assigned_partition", &self.assigned_partition)
            .field("key_size", &self.key_size)
            .field("value_size", &(self.body.len() - self.key_size))
            .field("failed_attempts", &self.failed_attempts)
            .finish()
    }
}
