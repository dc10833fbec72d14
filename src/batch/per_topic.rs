use std::collections::{BTreeSet, HashMap};
use std::time::Instant;

use batch::{PerTopicConfig, SingleTopicBatcher};
use msg::Msg;

/// Per-topic message batcher.
///
/// One `SingleTopicBatcher` slot per topic seen, plus an expiry tracker
/// ordered by deadline so the earliest time-limit release is cheap to
/// find.  The tracker holds at most one entry per topic, present exactly
/// when that topic's slot is non-empty and has a time limit.
pub struct PerTopicBatcher {
    config: PerTopicConfig,
    slots: HashMap<String, SingleTopicBatcher>,
    expiry: BTreeSet<(Instant, String)>,
}

impl PerTopicBatcher {
    pub fn new(config: PerTopicConfig) -> PerTopicBatcher {
        PerTopicBatcher {
            config: config,
            slots: HashMap::new(),
            expiry: BTreeSet::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.slots.values().all(SingleTopicBatcher::is_empty)
    }

    /// Add a message to its topic's slot.  Returns every batch that
    /// became complete: batches of other topics whose deadline has
    /// passed, plus this topic's batch if a limit was just reached.
    pub fn add(&mut self, msg: Msg, now: Instant) -> Vec<Vec<Msg>> {
        let mut complete = self.get_complete_batches(now);
        let topic = msg.topic().to_owned();

        let released = {
            let config = &self.config;
            let slot = self.slots
                .entry(topic.clone())
                .or_insert_with(|| SingleTopicBatcher::new(config.get(&topic).clone()));

            let was_empty = slot.is_empty();
            let released = slot.add(msg, now);

            if released.is_none() && was_empty {
                if let Some(deadline) = slot.deadline() {
                    self.expiry.insert((deadline, topic.clone()));
                }
            }

            released
        };

        if let Some(batch) = released {
            self.expiry_remove(&topic);
            complete.push(batch);
        }

        complete
    }

    /// Drain every batch whose deadline has passed.
    pub fn get_complete_batches(&mut self, now: Instant) -> Vec<Vec<Msg>> {
        let mut complete = Vec::new();

        loop {
            let expired = match self.expiry.iter().next() {
                Some(&(deadline, ref topic)) if deadline <= now => {
                    (deadline, topic.clone())
                }
                _ => break,
            };

            self.expiry.remove(&expired);

            if let Some(slot) = self.slots.get_mut(&expired.1) {
                let batch = slot.take_batch();

                if !batch.is_empty() {
                    complete.push(batch);
                }
            }
        }

        complete
    }

    /// The earliest deadline across all pending time-limited batches.
    pub fn next_complete_time(&self) -> Option<Instant> {
        self.expiry.iter().next().map(|&(deadline, _)| deadline)
    }

    /// Drain everything regardless of limits; used only at shutdown.
    pub fn get_all_batches(&mut self) -> Vec<Vec<Msg>> {
        self.expiry.clear();

        self.slots
            .values_mut()
            .map(SingleTopicBatcher::take_batch)
            .filter(|batch| !batch.is_empty())
            .collect()
    }

    /// Remove all batch state for `topic`, returning whatever messages
    /// were pending for it.
    pub fn delete_topic(&mut self, topic: &str) -> Vec<Msg> {
        self.expiry_remove(topic);

        match self.slots.remove(topic) {
            Some(mut slot) => slot.take_batch(),
            None => Vec::new(),
        }
    }

    /// Consistency check between the slot map and the expiry tracker;
    /// test support.
    pub fn sanity_check(&self) -> bool {
        self.expiry
            .iter()
            .all(|&(deadline, ref topic)| {
                self.slots
                    .get(topic)
                    .map_or(false,
                            |slot| !slot.is_empty() && slot.deadline() == Some(deadline))
            })
    }

    fn expiry_remove(&mut self, topic: &str) {
        let entry = self.expiry
            .iter()
            .find(|&&(_, ref t)| t == topic)
            .cloned();

        if let Some(entry) = entry {
            self.expiry.remove(&entry);
        }
    }
}
