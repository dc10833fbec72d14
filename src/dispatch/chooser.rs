use cluster::{BrokerIndex, Metadata};
use protocol::PartitionId;

/// Round-robin partition choice for `AnyPartition` messages of one topic
/// on one broker.
///
/// The choice is sticky for the duration of a produce request, so every
/// any-partition message of a topic within one request lands on the same
/// partition; `advance()` moves to the next partition once the request is
/// built.  State survives across requests but is reset on metadata
/// change.
#[derive(Debug, Default)]
pub struct AnyPartitionChooser {
    counter: usize,
    choice: Option<PartitionId>,
}

impl AnyPartitionChooser {
    pub fn new() -> AnyPartitionChooser {
        AnyPartitionChooser::default()
    }

    pub fn choose(&mut self,
                  metadata: &Metadata,
                  topic: &str,
                  broker_index: BrokerIndex)
                  -> Option<PartitionId> {
        if let Some(choice) = self.choice {
            return Some(choice);
        }

        let choices = metadata.partitions_for_topic_on_broker(topic, broker_index);

        if choices.is_empty() {
            return None;
        }

        let choice = choices[self.counter % choices.len()];
        self.choice = Some(choice);

        Some(choice)
    }

    /// Rotate to the next partition; called once per produce request
    /// that used the current choice.
    pub fn advance(&mut self) {
        if self.choice.take().is_some() {
            self.counter = self.counter.wrapping_add(1);
        }
    }

    pub fn reset(&mut self) {
        self.counter = 0;
        self.choice = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cluster::Metadata;

    fn metadata() -> Metadata {
        let mut builder = Metadata::builder(1);

        builder.add_broker(1, "b1", 9092).unwrap();
        builder.open_topic("t").unwrap();
        builder.add_partition(3, 1, true, 0).unwrap();
        builder.add_partition(5, 1, true, 0).unwrap();
        builder.add_partition(9, 1, true, 0).unwrap();
        builder.close_topic().unwrap();

        builder.build().unwrap()
    }

    #[test]
    fn test_choice_is_sticky_until_advance() {
        let metadata = metadata();
        let mut chooser = AnyPartitionChooser::new();

        let first = chooser.choose(&metadata, "t", 0).unwrap();

        assert_eq!(chooser.choose(&metadata, "t", 0).unwrap(), first);
        assert_eq!(chooser.choose(&metadata, "t", 0).unwrap(), first);

        chooser.advance();

        let second = chooser.choose(&metadata, "t", 0).unwrap();

        assert_ne!(second, first);
    }

    #[test]
    fn test_rotation_covers_all_partitions() {
        let metadata = metadata();
        let mut chooser = AnyPartitionChooser::new();
        let mut seen = Vec::new();

        for _ in 0..3 {
            seen.push(chooser.choose(&metadata, "t", 0).unwrap());
            chooser.advance();
        }

        seen.sort();

        assert_eq!(seen, vec![3, 5, 9]);

        // wraps around
        assert_eq!(chooser.choose(&metadata, "t", 0).unwrap(), 3);
    }

    #[test]
    fn test_no_partitions_on_broker() {
        let metadata = metadata();
        let mut chooser = AnyPartitionChooser::new();

        assert_eq!(chooser.choose(&metadata, "absent", 0), None);
        assert_eq!(chooser.choose(&metadata, "t", 7), None);
    }

    #[test]
    fn test_advance_without_choice_keeps_counter() {
        let metadata = metadata();
        let mut chooser = AnyPartitionChooser::new();

        chooser.advance();
        chooser.advance();

        assert_eq!(chooser.choose(&metadata, "t", 0).unwrap(), 3);
    }
}
