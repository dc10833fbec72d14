use bytes::{BufMut, ByteOrder, Bytes, BytesMut};
use nom::{be_i16, be_i32, be_i64};

use errors::Result;
use protocol::{ErrorCode, Offset, ParseTag, PartitionId, RequestHeader, ResponseHeader,
               WriteExt, parse_opt_string, parse_response_header};

/// A complete produce request ready for serialization.
///
/// ```text
/// ProduceRequest => RequiredAcks Timeout [TopicName [Partition MessageSetSize MessageSet]]
///   RequiredAcks => int16
///   Timeout => int32
///   Partition => int32
///   MessageSetSize => int32
/// ```
///
/// Each message-set arrives here already serialized (and possibly
/// compressed) by the produce-request factory; every `(topic, partition)`
/// pair appears at most once so the response acks map back
/// unambiguously.
#[derive(Clone, Debug, PartialEq)]
pub struct ProduceRequest<'a> {
    pub header: RequestHeader<'a>,
    pub required_acks: i16,
    pub ack_timeout: i32,
    pub topics: Vec<ProduceTopicData>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProduceTopicData {
    pub topic_name: String,
    pub partitions: Vec<ProducePartitionData>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProducePartitionData {
    pub partition: PartitionId,
    pub message_set: Bytes,
}

impl<'a> ProduceRequest<'a> {
    pub fn encode<T: ByteOrder>(self, dst: &mut BytesMut) -> Result<()> {
        self.header.encode::<T>(dst)?;

        dst.put_i16::<T>(self.required_acks);
        dst.put_i32::<T>(self.ack_timeout);
        dst.put_array::<T, _, _>(self.topics, |buf, topic| {
            buf.put_str::<T, _>(Some(topic.topic_name))?;
            buf.put_array::<T, _, _>(topic.partitions, |buf, partition| {
                buf.put_i32::<T>(partition.partition);
                buf.put_bytes::<T, _>(Some(partition.message_set))
            })
        })
    }
}

/// One partition's outcome inside a produce response; outcomes are
/// independent across partitions of the same response.
#[derive(Clone, Debug, PartialEq)]
pub struct PartitionAck {
    pub partition: PartitionId,
    pub error_code: ErrorCode,
    pub offset: Offset,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TopicAck {
    pub topic_name: String,
    pub partitions: Vec<PartitionAck>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProduceResponse {
    pub header: ResponseHeader,
    pub topics: Vec<TopicAck>,
}

named!(pub parse_produce_response<ProduceResponse>,
    parse_tag!(ParseTag::ProduceResponse,
        do_parse!(
            header: parse_response_header
         >> topics: parse_tag!(ParseTag::ProduceTopics,
                length_count!(verify!(be_i32, |count: i32| count >= 0), parse_topic_ack))
         >> (ProduceResponse {
                header: header,
                topics: topics,
            })
        )
    )
);

named!(parse_topic_ack<TopicAck>,
    do_parse!(
        topic_name: parse_opt_string
     >> partitions: parse_tag!(ParseTag::ProducePartitions,
            length_count!(verify!(be_i32, |count: i32| count >= 0), parse_partition_ack))
     >> (TopicAck {
            topic_name: topic_name,
            partitions: partitions,
        })
    )
);

named!(parse_partition_ack<PartitionAck>,
    do_parse!(
        partition: be_i32
     >> error_code: be_i16
     >> offset: be_i64
     >> (PartitionAck {
            partition: partition,
            error_code: error_code,
            offset: offset,
        })
    )
);
