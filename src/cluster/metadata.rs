use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use errors::{ErrorKind, Result};
use protocol::{ErrorCode, NodeId, PartitionId};

/// Dense 0-based broker identifier; the dispatcher table is keyed by it.
/// Distinct from the Kafka-assigned node id.
pub type BrokerIndex = usize;

#[derive(Debug, Clone, PartialEq)]
pub struct Broker {
    node_id: NodeId,
    host: String,
    port: u16,
    in_service: bool,
}

impl Broker {
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// A broker is in service iff it currently leads at least one
    /// in-service partition; the router runs one dispatcher per
    /// in-service broker.
    pub fn is_in_service(&self) -> bool {
        self.in_service
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    id: PartitionId,
    leader: Option<BrokerIndex>,
    in_service: bool,
    error_code: ErrorCode,
}

impl Partition {
    pub fn id(&self) -> PartitionId {
        self.id
    }

    pub fn leader(&self) -> Option<BrokerIndex> {
        self.leader
    }

    pub fn is_in_service(&self) -> bool {
        self.in_service
    }

    pub fn error_code(&self) -> ErrorCode {
        self.error_code
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
struct TopicEntry {
    /// All partitions, sorted by id.
    partitions: Vec<Partition>,
    /// Ids of in-service partitions, sorted; the modulus base for
    /// partition-key routing.
    ok_partitions: Vec<PartitionId>,
    /// In-service partition ids grouped by leader broker index.
    choices: HashMap<BrokerIndex, Vec<PartitionId>>,
}

/// An immutable view of cluster shape: brokers, topics, partitions and
/// leadership.  Snapshots are never mutated after publication; the
/// router builds a new one on every accepted refresh and swaps it in by
/// pointer.
#[derive(Debug)]
pub struct Metadata {
    brokers: Vec<Broker>,
    topics: HashMap<String, TopicEntry>,
    generation: u64,
}

impl Metadata {
    pub fn builder(generation: u64) -> MetadataBuilder {
        MetadataBuilder::new(generation)
    }

    /// An empty snapshot, used before the first successful fetch.
    pub fn empty() -> Metadata {
        Metadata {
            brokers: Vec::new(),
            topics: HashMap::new(),
            generation: 0,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn brokers(&self) -> &[Broker] {
        &self.brokers
    }

    pub fn broker(&self, index: BrokerIndex) -> Option<&Broker> {
        self.brokers.get(index)
    }

    pub fn in_service_broker_indexes(&self) -> Vec<BrokerIndex> {
        self.brokers
            .iter()
            .enumerate()
            .filter(|&(_, broker)| broker.is_in_service())
            .map(|(index, _)| index)
            .collect()
    }

    pub fn num_in_service_brokers(&self) -> usize {
        self.brokers
            .iter()
            .filter(|broker| broker.is_in_service())
            .count()
    }

    pub fn has_topic(&self, topic: &str) -> bool {
        self.topics.contains_key(topic)
    }

    pub fn topic_names(&self) -> Vec<&str> {
        self.topics.keys().map(String::as_str).collect()
    }

    /// A topic is routable iff it has at least one in-service partition.
    pub fn is_topic_routable(&self, topic: &str) -> bool {
        self.topics
            .get(topic)
            .map_or(false, |entry| !entry.ok_partitions.is_empty())
    }

    pub fn partitions_for_topic(&self, topic: &str) -> Option<&[Partition]> {
        self.topics.get(topic).map(|entry| &entry.partitions[..])
    }

    /// Brokers leading at least one in-service partition of `topic`,
    /// ascending by index.
    pub fn brokers_for_topic(&self, topic: &str) -> Option<Vec<BrokerIndex>> {
        self.topics
            .get(topic)
            .map(|entry| {
                     let mut indexes: Vec<BrokerIndex> = entry.choices.keys().cloned().collect();
                     indexes.sort();
                     indexes
                 })
    }

    /// In-service partition ids of `topic` led by the given broker.
    pub fn partitions_for_topic_on_broker(&self,
                                          topic: &str,
                                          broker_index: BrokerIndex)
                                          -> &[PartitionId] {
        self.topics
            .get(topic)
            .and_then(|entry| entry.choices.get(&broker_index))
            .map_or(&[], |ids| &ids[..])
    }

    pub fn leader_of(&self, topic: &str, partition: PartitionId) -> Option<BrokerIndex> {
        self.topics
            .get(topic)
            .and_then(|entry| {
                          entry
                              .partitions
                              .binary_search_by_key(&partition, Partition::id)
                              .ok()
                              .and_then(|idx| entry.partitions[idx].leader())
                      })
    }

    /// Deterministic partition choice for a `PartitionKey` message:
    /// `key mod |routable partitions|` into the sorted in-service
    /// partition list.
    pub fn choose_partition_by_key(&self,
                                   topic: &str,
                                   partition_key: u32)
                                   -> Option<(PartitionId, BrokerIndex)> {
        self.topics
            .get(topic)
            .and_then(|entry| {
                if entry.ok_partitions.is_empty() {
                    return None;
                }

                let partition =
                    entry.ok_partitions[partition_key as usize % entry.ok_partitions.len()];

                self.leader_of(topic, partition)
                    .map(|leader| (partition, leader))
            })
    }

    /// Structural comparison ignoring the generation counter, used to
    /// skip no-op snapshot swaps on refresh.
    pub fn content_eq(&self, other: &Metadata) -> bool {
        self.brokers == other.brokers && self.topics == other.topics
    }
}

/// Builds a snapshot from a metadata response, enforcing the structural
/// invariants the router relies on: unique broker ids, unique partition
/// ids per topic, leaders resolving to known brokers.
///
/// Duplicate topics are dropped with a logged warning, keeping the first
/// occurrence.
pub struct MetadataBuilder {
    generation: u64,
    brokers: Vec<Broker>,
    node_index: HashMap<NodeId, BrokerIndex>,
    topics: HashMap<String, TopicEntry>,
    current_topic: Option<(String, Vec<Partition>, HashSet<PartitionId>)>,
    brokers_closed: bool,
}

impl MetadataBuilder {
    pub fn new(generation: u64) -> MetadataBuilder {
        MetadataBuilder {
            generation: generation,
            brokers: Vec::new(),
            node_index: HashMap::new(),
            topics: HashMap::new(),
            current_topic: None,
            brokers_closed: false,
        }
    }

    pub fn add_broker(&mut self, node_id: NodeId, host: &str, port: i32) -> Result<()> {
        if self.brokers_closed {
            bail!(ErrorKind::InvalidMetadata("broker added after broker list closed".to_owned()));
        }

        if self.node_index.contains_key(&node_id) {
            bail!(ErrorKind::InvalidMetadata(format!("duplicate broker id {}", node_id)));
        }

        if port <= 0 || port > i32::from(u16::max_value()) {
            bail!(ErrorKind::InvalidMetadata(format!("broker id {} has bad port {}",
                                                     node_id,
                                                     port)));
        }

        self.node_index.insert(node_id, self.brokers.len());
        self.brokers
            .push(Broker {
                      node_id: node_id,
                      host: host.to_owned(),
                      port: port as u16,
                      in_service: false,
                  });

        Ok(())
    }

    pub fn close_broker_list(&mut self) {
        self.brokers_closed = true;
    }

    pub fn open_topic(&mut self, topic: &str) -> Result<()> {
        self.brokers_closed = true;

        if self.current_topic.is_some() {
            bail!(ErrorKind::InvalidMetadata("topic opened before previous one closed"
                                                 .to_owned()));
        }

        self.current_topic = Some((topic.to_owned(), Vec::new(), HashSet::new()));

        Ok(())
    }

    pub fn add_partition(&mut self,
                         id: PartitionId,
                         leader_id: NodeId,
                         in_service: bool,
                         error_code: ErrorCode)
                         -> Result<()> {
        let leader = match self.node_index.get(&leader_id) {
            Some(&index) => Some(index),
            None if !in_service => None,
            None => {
                bail!(ErrorKind::InvalidMetadata(format!("partition {} leader {} is not a \
                                                          known broker",
                                                         id,
                                                         leader_id)))
            }
        };

        match self.current_topic {
            Some((_, ref mut partitions, ref mut seen)) => {
                if !seen.insert(id) {
                    bail!(ErrorKind::InvalidMetadata(format!("duplicate partition id {}", id)));
                }

                partitions.push(Partition {
                                    id: id,
                                    leader: leader,
                                    in_service: in_service,
                                    error_code: error_code,
                                });

                Ok(())
            }
            None => bail!(ErrorKind::InvalidMetadata("partition added outside a topic"
                                                         .to_owned())),
        }
    }

    pub fn close_topic(&mut self) -> Result<()> {
        let (topic, mut partitions, _) = match self.current_topic.take() {
            Some(current) => current,
            None => {
                bail!(ErrorKind::InvalidMetadata("close_topic without open_topic".to_owned()))
            }
        };

        if self.topics.contains_key(&topic) {
            warn!("metadata response contains duplicate topic `{}`; keeping first occurrence",
                  topic);
            return Ok(());
        }

        partitions.sort_by_key(Partition::id);

        let mut entry = TopicEntry::default();

        for partition in &partitions {
            if partition.in_service {
                entry.ok_partitions.push(partition.id);

                if let Some(leader) = partition.leader {
                    entry
                        .choices
                        .entry(leader)
                        .or_insert_with(Vec::new)
                        .push(partition.id);
                }
            }
        }

        entry.partitions = partitions;
        self.topics.insert(topic, entry);

        Ok(())
    }

    pub fn build(mut self) -> Result<Metadata> {
        if self.current_topic.is_some() {
            bail!(ErrorKind::InvalidMetadata("build with unclosed topic".to_owned()));
        }

        let mut leading: HashSet<BrokerIndex> = HashSet::new();

        for entry in self.topics.values() {
            leading.extend(entry.choices.keys().cloned());
        }

        for (index, broker) in self.brokers.iter_mut().enumerate() {
            broker.in_service = leading.contains(&index);
        }

        Ok(Metadata {
               brokers: self.brokers,
               topics: self.topics,
               generation: self.generation,
           })
    }
}

/// Convenience alias: every reader holds the snapshot behind an `Arc` so
/// a swap never invalidates an operation in progress.
pub type MetadataRef = Arc<Metadata>;

#[cfg(test)]
mod tests {
    use super::*;

    fn two_broker_metadata() -> Metadata {
        let mut builder = Metadata::builder(1);

        builder.add_broker(11, "b1", 9092).unwrap();
        builder.add_broker(22, "b2", 9093).unwrap();
        builder.close_broker_list();

        builder.open_topic("t").unwrap();
        builder.add_partition(0, 11, true, 0).unwrap();
        builder.add_partition(1, 22, true, 0).unwrap();
        builder.add_partition(2, 11, true, 0).unwrap();
        builder.close_topic().unwrap();

        builder.open_topic("dead").unwrap();
        builder.add_partition(0, -1, false, 5).unwrap();
        builder.close_topic().unwrap();

        builder.build().unwrap()
    }

    #[test]
    fn test_lookups() {
        let metadata = two_broker_metadata();

        assert_eq!(metadata.brokers().len(), 2);
        assert_eq!(metadata.num_in_service_brokers(), 2);
        assert!(metadata.is_topic_routable("t"));
        assert!(!metadata.is_topic_routable("dead"));
        assert!(!metadata.is_topic_routable("absent"));

        assert_eq!(metadata.brokers_for_topic("t"), Some(vec![0, 1]));
        assert_eq!(metadata.partitions_for_topic_on_broker("t", 0), &[0, 2]);
        assert_eq!(metadata.partitions_for_topic_on_broker("t", 1), &[1]);
        assert_eq!(metadata.partitions_for_topic_on_broker("absent", 0),
                   &[] as &[i32]);

        assert_eq!(metadata.leader_of("t", 1), Some(1));
        assert_eq!(metadata.leader_of("t", 9), None);
        assert_eq!(metadata.leader_of("dead", 0), None);
    }

    #[test]
    fn test_key_choice_is_deterministic() {
        let metadata = two_broker_metadata();

        let first = metadata.choose_partition_by_key("t", 7);
        for _ in 0..10 {
            assert_eq!(metadata.choose_partition_by_key("t", 7), first);
        }

        // key modulus over the three routable partitions
        assert_eq!(metadata.choose_partition_by_key("t", 0), Some((0, 0)));
        assert_eq!(metadata.choose_partition_by_key("t", 1), Some((1, 1)));
        assert_eq!(metadata.choose_partition_by_key("t", 2), Some((2, 0)));
        assert_eq!(metadata.choose_partition_by_key("t", 3), Some((0, 0)));

        assert_eq!(metadata.choose_partition_by_key("dead", 1), None);
    }

    #[test]
    fn test_duplicate_broker_rejected() {
        let mut builder = Metadata::builder(1);

        builder.add_broker(11, "b1", 9092).unwrap();
        assert!(builder.add_broker(11, "b1-again", 9092).is_err());
    }

    #[test]
    fn test_bad_port_rejected() {
        let mut builder = Metadata::builder(1);

        assert!(builder.add_broker(11, "b1", 0).is_err());
        assert!(builder.add_broker(11, "b1", 70000).is_err());
    }

    #[test]
    fn test_duplicate_partition_rejected() {
        let mut builder = Metadata::builder(1);

        builder.add_broker(11, "b1", 9092).unwrap();
        builder.open_topic("t").unwrap();
        builder.add_partition(0, 11, true, 0).unwrap();
        assert!(builder.add_partition(0, 11, true, 0).is_err());
    }

    #[test]
    fn test_unknown_leader_rejected_for_in_service_partition() {
        let mut builder = Metadata::builder(1);

        builder.add_broker(11, "b1", 9092).unwrap();
        builder.open_topic("t").unwrap();
        assert!(builder.add_partition(0, 99, true, 0).is_err());
        // an out-of-service partition may have no resolvable leader
        assert!(builder.add_partition(1, 99, false, 5).is_ok());
    }

    #[test]
    fn test_duplicate_topic_keeps_first() {
        let mut builder = Metadata::builder(1);

        builder.add_broker(11, "b1", 9092).unwrap();
        builder.open_topic("t").unwrap();
        builder.add_partition(0, 11, true, 0).unwrap();
        builder.close_topic().unwrap();

        builder.open_topic("t").unwrap();
        builder.add_partition(0, 11, true, 0).unwrap();
        builder.add_partition(1, 11, true, 0).unwrap();
        builder.close_topic().unwrap();

        let metadata = builder.build().unwrap();

        assert_eq!(metadata.partitions_for_topic("t").unwrap().len(), 1);
    }

    #[test]
    fn test_broker_without_leadership_is_out_of_service() {
        let mut builder = Metadata::builder(1);

        builder.add_broker(11, "b1", 9092).unwrap();
        builder.add_broker(22, "idle", 9093).unwrap();
        builder.open_topic("t").unwrap();
        builder.add_partition(0, 11, true, 0).unwrap();
        builder.close_topic().unwrap();

        let metadata = builder.build().unwrap();

        assert!(metadata.broker(0).unwrap().is_in_service());
        assert!(!metadata.broker(1).unwrap().is_in_service());
        assert_eq!(metadata.in_service_broker_indexes(), vec![0]);
    }

    #[test]
    fn test_content_eq_ignores_generation() {
        let a = two_broker_metadata();
        let mut builder = Metadata::builder(42);

        builder.add_broker(11, "b1", 9092).unwrap();
        builder.add_broker(22, "b2", 9093).unwrap();
        builder.open_topic("t").unwrap();
        builder.add_partition(0, 11, true, 0).unwrap();
        builder.add_partition(1, 22, true, 0).unwrap();
        builder.add_partition(2, 11, true, 0).unwrap();
        builder.close_topic().unwrap();
        builder.open_topic("dead").unwrap();
        builder.add_partition(0, -1, false, 5).unwrap();
        builder.close_topic().unwrap();

        let b = builder.build().unwrap();

        assert!(a.content_eq(&b));
        assert_ne!(a.generation(), b.generation());
    }
}
