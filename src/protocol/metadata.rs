use std::str;

use bytes::{ByteOrder, BytesMut};
use nom::{IResult, be_i16, be_i32};

use errors::{ErrorKind, Result};
use protocol::{CorrelationId, ErrorCode, NodeId, PartitionId, RequestHeader, WriteExt};

/// A metadata request.  An empty topic list asks for every topic the
/// cluster knows; a single-topic request against a broker configured for
/// auto-creation also creates the topic.
#[derive(Clone, Debug, PartialEq)]
pub struct MetadataRequest<'a> {
    pub header: RequestHeader<'a>,
    pub topic_names: Vec<String>,
}

impl<'a> MetadataRequest<'a> {
    pub fn encode<T: ByteOrder>(self, dst: &mut BytesMut) -> Result<()> {
        self.header.encode::<T>(dst)?;

        dst.put_array::<T, _, _>(self.topic_names,
                                 |buf, topic_name| buf.put_str::<T, _>(Some(topic_name)))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct BrokerMetadata {
    pub node_id: NodeId,
    pub host: String,
    pub port: i32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TopicMetadataHeader {
    pub error_code: ErrorCode,
    pub topic_name: String,
    pub partition_count: i32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PartitionMetadata {
    pub error_code: ErrorCode,
    pub partition_id: PartitionId,
    pub leader_id: NodeId,
    pub replica_count: i32,
}

/// Pull-style cursor over a metadata response body (the frame contents
/// after the size field).
///
/// ```text
/// MetadataResponse => CorrelationId [Broker] [TopicMetadata]
///   Broker => NodeId Host Port
///   TopicMetadata => ErrorCode TopicName [PartitionMetadata]
///   PartitionMetadata => ErrorCode PartitionId Leader [Replica] [Isr]
/// ```
///
/// Each advance validates the remaining length, so truncated frames and
/// negative counts surface as typed errors at the element where they
/// occur.  Advancing to the next level implicitly drains whatever remains
/// of the previous one: calling `next_topic` while replicas of the
/// current partition are unread skips them.
pub struct MetadataResponseReader<'a> {
    remaining: &'a [u8],
    correlation_id: CorrelationId,
    brokers_left: i32,
    topics_left: Option<i32>,
    partitions_left: i32,
    replicas_left: i32,
    isr_left: Option<i32>,
}

impl<'a> MetadataResponseReader<'a> {
    pub fn new(body: &'a [u8]) -> Result<MetadataResponseReader<'a>> {
        let mut reader = MetadataResponseReader {
            remaining: body,
            correlation_id: 0,
            brokers_left: 0,
            topics_left: None,
            partitions_left: 0,
            replicas_left: 0,
            isr_left: Some(0),
        };

        reader.correlation_id = reader.take_i32()?;
        reader.brokers_left = reader.take_count()?;

        Ok(reader)
    }

    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    pub fn next_broker(&mut self) -> Result<Option<BrokerMetadata>> {
        if self.brokers_left == 0 {
            return Ok(None);
        }

        self.brokers_left -= 1;

        let node_id = self.take_i32()?;
        let host = self.take_string()?;
        let port = self.take_i32()?;

        Ok(Some(BrokerMetadata {
                    node_id: node_id,
                    host: host,
                    port: port,
                }))
    }

    pub fn next_topic(&mut self) -> Result<Option<TopicMetadataHeader>> {
        while self.next_broker()?.is_some() {}
        while self.next_partition_in_topic()?.is_some() {}

        let topics_left = match self.topics_left {
            Some(topics_left) => topics_left,
            None => {
                let count = self.take_count()?;
                self.topics_left = Some(count);
                count
            }
        };

        if topics_left == 0 {
            return Ok(None);
        }

        self.topics_left = Some(topics_left - 1);

        let error_code = self.take_i16()?;
        let topic_name = self.take_string()?;
        let partition_count = self.take_count()?;

        self.partitions_left = partition_count;

        Ok(Some(TopicMetadataHeader {
                    error_code: error_code,
                    topic_name: topic_name,
                    partition_count: partition_count,
                }))
    }

    pub fn next_partition_in_topic(&mut self) -> Result<Option<PartitionMetadata>> {
        while self.next_replica_in_partition()?.is_some() {}
        while self.next_caught_up_replica_in_partition()?.is_some() {}

        if self.partitions_left == 0 {
            return Ok(None);
        }

        self.partitions_left -= 1;

        let error_code = self.take_i16()?;
        let partition_id = self.take_i32()?;
        let leader_id = self.take_i32()?;
        let replica_count = self.take_count()?;

        self.replicas_left = replica_count;
        self.isr_left = None;

        Ok(Some(PartitionMetadata {
                    error_code: error_code,
                    partition_id: partition_id,
                    leader_id: leader_id,
                    replica_count: replica_count,
                }))
    }

    /// Replica node ids of the partition most recently returned by
    /// `next_partition_in_topic`.
    pub fn next_replica_in_partition(&mut self) -> Result<Option<NodeId>> {
        if self.replicas_left == 0 {
            return Ok(None);
        }

        self.replicas_left -= 1;

        Ok(Some(self.take_i32()?))
    }

    /// In-sync (caught up) replica node ids of the current partition;
    /// positioned after the replica list, which is drained on first call.
    pub fn next_caught_up_replica_in_partition(&mut self) -> Result<Option<NodeId>> {
        while self.next_replica_in_partition()?.is_some() {}

        let isr_left = match self.isr_left {
            Some(isr_left) => isr_left,
            None => {
                let count = self.take_count()?;
                self.isr_left = Some(count);
                count
            }
        };

        if isr_left == 0 {
            return Ok(None);
        }

        self.isr_left = Some(isr_left - 1);

        Ok(Some(self.take_i32()?))
    }

    fn take_i16(&mut self) -> Result<i16> {
        match be_i16(self.remaining) {
            IResult::Done(rest, v) => {
                self.remaining = rest;
                Ok(v)
            }
            IResult::Incomplete(_) => bail!(ErrorKind::TruncatedFrame),
            IResult::Error(err) => bail!(ErrorKind::ParseError(err.into_error_kind())),
        }
    }

    fn take_i32(&mut self) -> Result<i32> {
        match be_i32(self.remaining) {
            IResult::Done(rest, v) => {
                self.remaining = rest;
                Ok(v)
            }
            IResult::Incomplete(_) => bail!(ErrorKind::TruncatedFrame),
            IResult::Error(err) => bail!(ErrorKind::ParseError(err.into_error_kind())),
        }
    }

    fn take_count(&mut self) -> Result<i32> {
        let count = self.take_i32()?;

        if count < 0 {
            bail!(ErrorKind::BadCount(count));
        }

        // Even one-byte elements of a `count`-element array would overrun
        // what is left of the frame.
        if count as usize > self.remaining.len() {
            bail!(ErrorKind::BadCount(count));
        }

        Ok(count)
    }

    fn take_string(&mut self) -> Result<String> {
        let len = self.take_i16()?;

        if len < 0 {
            bail!(ErrorKind::BadLength(len as i64));
        }

        let len = len as usize;

        if len > self.remaining.len() {
            bail!(ErrorKind::TruncatedFrame);
        }

        let (bytes, rest) = self.remaining.split_at(len);
        self.remaining = rest;

        str::from_utf8(bytes)
            .map(ToOwned::to_owned)
            .map_err(|_| ErrorKind::CodecError("invalid utf-8 in string").into())
    }
}
