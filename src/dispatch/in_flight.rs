use std::collections::HashMap;
use std::time::Instant;

use dispatch::MsgSetGroup;
use protocol::CorrelationId;

/// One sent-but-unanswered produce request.
#[derive(Debug)]
pub struct InFlightRequest {
    pub groups: Vec<MsgSetGroup>,
    pub sent_at: Instant,
}

/// Maps correlation ids to the requests awaiting their response.  An
/// entry exists exactly from send until its response is correlated or
/// the connection is observed lost.
#[derive(Debug, Default)]
pub struct InFlightTable {
    entries: HashMap<CorrelationId, InFlightRequest>,
}

impl InFlightTable {
    pub fn new() -> InFlightTable {
        InFlightTable::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn insert(&mut self, correlation_id: CorrelationId, request: InFlightRequest) {
        let duplicate = self.entries.insert(correlation_id, request).is_some();

        assert!(!duplicate,
                "correlation id {} already in flight",
                correlation_id);
    }

    pub fn remove(&mut self, correlation_id: CorrelationId) -> Option<InFlightRequest> {
        self.entries.remove(&correlation_id)
    }

    /// Empty the table, returning every pending group; used when the
    /// connection is lost and everything must be re-routed.
    pub fn drain_all(&mut self) -> Vec<MsgSetGroup> {
        self.entries
            .drain()
            .flat_map(|(_, request)| request.groups)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(topic: &str) -> MsgSetGroup {
        MsgSetGroup {
            topic: topic.to_owned(),
            partition: 0,
            msgs: Vec::new(),
        }
    }

    #[test]
    fn test_insert_remove() {
        let mut table = InFlightTable::new();

        table.insert(1,
                     InFlightRequest {
                         groups: vec![group("a")],
                         sent_at: Instant::now(),
                     });

        assert_eq!(table.len(), 1);

        let request = table.remove(1).unwrap();

        assert_eq!(request.groups[0].topic, "a");
        assert!(table.remove(1).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_drain_all() {
        let mut table = InFlightTable::new();

        table.insert(1,
                     InFlightRequest {
                         groups: vec![group("a"), group("b")],
                         sent_at: Instant::now(),
                     });
        table.insert(2,
                     InFlightRequest {
                         groups: vec![group("c")],
                         sent_at: Instant::now(),
                     });

        let mut topics: Vec<String> = table
            .drain_all()
            .into_iter()
            .map(|group| group.topic)
            .collect();

        topics.sort();

        assert_eq!(topics, vec!["a", "b", "c"]);
        assert!(table.is_empty());
    }

    #[test]
    #[should_panic(expected = "already in flight")]
    fn test_duplicate_correlation_id_is_a_bug() {
        let mut table = InFlightTable::new();

        table.insert(1,
                     InFlightRequest {
                         groups: Vec::new(),
                         sent_at: Instant::now(),
                     });
        table.insert(1,
                     InFlightRequest {
                         groups: Vec::new(),
                         sent_at: Instant::now(),
                     });
    }
}
