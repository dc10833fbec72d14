use std::collections::{HashMap, VecDeque};

use bytes::{BigEndian, Bytes, BytesMut};

use cluster::{BrokerIndex, MetadataRef};
use compression::Compression;
use conf::CompressionConf;
use dispatch::{AnyPartitionChooser, MsgSetGroup};
use errors::Result;
use msg::{Msg, MsgRouting};
use protocol::{ApiKeys, CorrelationId, MSG_OVERHEAD, MessageSetEncoder, Offset, PartitionId,
               ProducePartitionData, ProduceRequest, ProduceTopicData, RequestHeader,
               frame_request, message_wire_size};

/// A produce request the factory serialized, with the groups it was
/// built from kept aside for response correlation.
#[derive(Debug)]
pub struct BuiltRequest {
    pub correlation_id: CorrelationId,
    pub groups: Vec<MsgSetGroup>,
}

/// Serializes produce requests for one broker.
///
/// Partitions are assigned here only for `AnyPartition` messages (the
/// router already resolved `PartitionKey` ones); for each topic, every
/// any-partition message in one request lands on the same partition,
/// chosen round-robin across requests.
///
/// Messages are grouped first by topic, then by partition, so each
/// message-set has a unique `(topic, partition)` combination; response
/// topics may arrive permuted, and the unique pairing keeps the inverse
/// mapping unambiguous.
pub struct ProduceRequestFactory {
    client_id: String,
    broker_index: BrokerIndex,
    required_acks: i16,
    ack_timeout: i32,
    data_limit: usize,
    compression: CompressionConf,
    max_ratio: f64,
    metadata: MetadataRef,
    correlation_id: CorrelationId,
    input: VecDeque<Vec<Msg>>,
    choosers: HashMap<String, AnyPartitionChooser>,
    unplaced: Vec<Msg>,
}

struct RequestContents {
    topics: Vec<(String, Vec<(PartitionId, Vec<Msg>)>)>,
}

impl RequestContents {
    fn new() -> RequestContents {
        RequestContents { topics: Vec::new() }
    }

    fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// Wire bytes a message adds on top of its record: entries for a
    /// topic or partition seen for the first time in this request.
    fn overhead_for(&self, topic: &str, partition: PartitionId) -> usize {
        const TOPIC_OVERHEAD: usize = 2 + 4;
        const PARTITION_OVERHEAD: usize = 4 + 4;

        match self.topics.iter().find(|&&(ref name, _)| name == topic) {
            None => TOPIC_OVERHEAD + topic.len() + PARTITION_OVERHEAD,
            Some(&(_, ref partitions)) => {
                if partitions.iter().any(|&(id, _)| id == partition) {
                    0
                } else {
                    PARTITION_OVERHEAD
                }
            }
        }
    }

    fn place(&mut self, topic: &str, partition: PartitionId, msg: Msg) {
        let topic_slot = match self.topics
                  .iter()
                  .position(|&(ref name, _)| name == topic) {
            Some(idx) => idx,
            None => {
                self.topics.push((topic.to_owned(), Vec::new()));
                self.topics.len() - 1
            }
        };

        let partitions = &mut self.topics[topic_slot].1;

        match partitions.iter().position(|&(id, _)| id == partition) {
            Some(idx) => partitions[idx].1.push(msg),
            None => partitions.push((partition, vec![msg])),
        }
    }
}

impl ProduceRequestFactory {
    pub fn new(client_id: &str,
               broker_index: BrokerIndex,
               required_acks: i16,
               ack_timeout: i32,
               data_limit: usize,
               compression: CompressionConf,
               metadata: MetadataRef)
               -> ProduceRequestFactory {
        let max_ratio = compression.max_ratio();

        ProduceRequestFactory {
            client_id: client_id.to_owned(),
            broker_index: broker_index,
            required_acks: required_acks,
            ack_timeout: ack_timeout,
            data_limit: data_limit,
            compression: compression,
            max_ratio: max_ratio,
            metadata: metadata,
            correlation_id: 0,
            input: VecDeque::new(),
            choosers: HashMap::new(),
            unplaced: Vec::new(),
        }
    }

    /// Adopt a new metadata snapshot.  Any-partition rotation state is
    /// tied to the old snapshot's partition lists, so it starts over.
    pub fn update_metadata(&mut self, metadata: MetadataRef) {
        self.metadata = metadata;

        for chooser in self.choosers.values_mut() {
            chooser.reset();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.input.is_empty()
    }

    pub fn put(&mut self, batch: Vec<Msg>) {
        if !batch.is_empty() {
            self.input.push_back(batch);
        }
    }

    /// Re-queue a batch ahead of everything pending; used when messages
    /// come back from a failed request.
    pub fn put_front(&mut self, batch: Vec<Msg>) {
        if !batch.is_empty() {
            self.input.push_front(batch);
        }
    }

    /// Give back every queued batch; used at retirement and shutdown.
    pub fn take_all(&mut self) -> Vec<Vec<Msg>> {
        self.input.drain(..).collect()
    }

    /// Messages the factory could not place on this broker (no routable
    /// partition here); the caller sends them back to the router.
    pub fn take_unplaced(&mut self) -> Vec<Msg> {
        ::std::mem::replace(&mut self.unplaced, Vec::new())
    }

    /// Build and serialize at most one produce request into `dst`,
    /// bounded by the request data limit.  Batches that do not fit stay
    /// queued.  Returns `None` when there is nothing to send.
    pub fn build_request(&mut self, dst: &mut BytesMut) -> Result<Option<BuiltRequest>> {
        let contents = self.gather();

        if contents.is_empty() {
            return Ok(None);
        }

        let correlation_id = self.next_correlation_id();
        let mut topics = Vec::with_capacity(contents.topics.len());
        let mut groups = Vec::new();

        for (topic, partitions) in contents.topics {
            let mut partition_data = Vec::with_capacity(partitions.len());

            for (partition, msgs) in partitions {
                let message_set = self.encode_message_set(&topic, &msgs)?;

                partition_data.push(ProducePartitionData {
                                        partition: partition,
                                        message_set: message_set,
                                    });
                groups.push(MsgSetGroup {
                                topic: topic.clone(),
                                partition: partition,
                                msgs: msgs,
                            });
            }

            topics.push(ProduceTopicData {
                            topic_name: topic,
                            partitions: partition_data,
                        });
        }

        let request = ProduceRequest {
            header: RequestHeader {
                api_key: ApiKeys::Produce as i16,
                api_version: 0,
                correlation_id: correlation_id,
                client_id: Some(self.client_id.clone().into()),
            },
            required_acks: self.required_acks,
            ack_timeout: self.ack_timeout,
            topics: topics,
        };

        frame_request::<BigEndian, _>(dst, |buf| request.encode::<BigEndian>(buf))?;

        for chooser in self.choosers.values_mut() {
            chooser.advance();
        }

        Ok(Some(BuiltRequest {
                    correlation_id: correlation_id,
                    groups: groups,
                }))
    }

    fn next_correlation_id(&mut self) -> CorrelationId {
        self.correlation_id = self.correlation_id.wrapping_add(1);
        self.correlation_id - 1
    }

    fn base_overhead(&self) -> usize {
        // frame size, api key, api version, correlation id, client id,
        // required acks, timeout, topic count
        4 + 2 + 2 + 4 + 2 + self.client_id.len() + 2 + 4 + 4
    }

    fn partition_for(&mut self, msg: &Msg) -> Option<PartitionId> {
        match msg.routing() {
            MsgRouting::PartitionKey(_) => msg.assigned_partition(),
            MsgRouting::AnyPartition => {
                let metadata = &self.metadata;
                let broker_index = self.broker_index;

                self.choosers
                    .entry(msg.topic().to_owned())
                    .or_insert_with(AnyPartitionChooser::new)
                    .choose(metadata, msg.topic(), broker_index)
            }
        }
    }

    /// Pull queued batches into `(topic, partition)` groups until the
    /// serialized size would exceed the data limit.  At least one message
    /// is always taken so an oversized message still makes progress.
    fn gather(&mut self) -> RequestContents {
        let mut contents = RequestContents::new();
        let mut total = self.base_overhead();

        'outer: while let Some(batch) = self.input.pop_front() {
            let mut batch: VecDeque<Msg> = batch.into_iter().collect();

            while let Some(msg) = batch.pop_front() {
                let partition = match self.partition_for(&msg) {
                    Some(partition) => partition,
                    None => {
                        self.unplaced.push(msg);
                        continue;
                    }
                };

                let needed = message_wire_size(msg.key().len(), msg.value().len()) +
                             contents.overhead_for(msg.topic(), partition);

                if total + needed > self.data_limit && !contents.is_empty() {
                    batch.push_front(msg);
                    self.input.push_front(batch.into_iter().collect());
                    break 'outer;
                }

                total += needed;

                let topic = msg.topic().to_owned();
                contents.place(&topic, partition, msg);
            }
        }

        contents
    }

    /// Serialize one `(topic, partition)` message-set, compressing when
    /// the topic's policy and the size threshold call for it.  A codec
    /// that fails to beat the configured ratio is skipped: the broker
    /// should not burn CPU undoing a poor trade.
    fn encode_message_set(&mut self, topic: &str, msgs: &[Msg]) -> Result<Bytes> {
        let conf = self.compression.get(topic).clone();

        let mut set = BytesMut::with_capacity(msgs.iter()
                                                  .map(|msg| {
                                                           message_wire_size(msg.key().len(),
                                                                             msg.value().len())
                                                       })
                                                  .sum());

        for (idx, msg) in msgs.iter().enumerate() {
            MessageSetEncoder::encode_record::<BigEndian>(&mut set,
                                                          idx as Offset,
                                                          Compression::None,
                                                          msg.key(),
                                                          msg.value());
        }

        let total_body: usize = msgs.iter().map(Msg::body_size).sum();

        if conf.codec == Compression::None || total_body < conf.min_size {
            return Ok(set.freeze());
        }

        let compressed = conf.codec.compress(conf.level, &set)?;

        if compressed.len() as f64 / set.len() as f64 > self.max_ratio {
            return Ok(set.freeze());
        }

        let mut outer = BytesMut::with_capacity(compressed.len() + MSG_OVERHEAD);

        MessageSetEncoder::encode_record::<BigEndian>(&mut outer,
                                                      0,
                                                      conf.codec,
                                                      b"",
                                                      &compressed);

        Ok(outer.freeze())
    }
}
