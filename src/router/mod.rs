use std::collections::HashMap;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender, TryRecvError, TrySendError,
                      sync_channel};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rand::{self, Rng};

use batch::{CombinedTopicsBatcher, GlobalBatchConfig, PerTopicBatcher, TopicAction};
use cluster::{BrokerIndex, Metadata, MetadataFetcher, MetadataRef};
use conf::{ResolvedConf, Settings};
use debug::DebugSink;
use discard::{DiscardReason, DiscardSink, discard_msg};
use dispatch::{ConnectorEvent, ConnectorHandle};
use metrics::Metrics;
use msg::{Msg, MsgRouting};
use protocol::MAX_TOPIC_NAME_LEN;
use ratelimit::TopicRateLimiter;

/// How the process is asked to come down.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Flush batches, drain dispatchers, await acks up to the shutdown
    /// delay; whatever remains is reported as `ServerShutdown`.
    Graceful,
    /// Dispatchers stop after the current in-flight request resolves;
    /// everything else is reported immediately.
    Fast,
}

/// Events arriving on the router's input queue, from ingest listeners,
/// dispatchers and the shutdown orchestrator alike.
pub enum RouterEvent {
    /// A newly admitted local message.
    Ingest(Msg),
    /// Messages a dispatcher sent back for re-routing.
    Requeue(Vec<Msg>),
    /// A dispatcher saw an error suggesting the routing table is stale.
    MetadataStale,
    StartShutdown(ShutdownMode),
}

/// The owning side of the router thread.
pub struct RouterHandle {
    tx: SyncSender<RouterEvent>,
    thread: JoinHandle<()>,
}

impl RouterHandle {
    /// Queue handle for ingest listeners and the shutdown orchestrator.
    pub fn sender(&self) -> SyncSender<RouterEvent> {
        self.tx.clone()
    }

    pub fn request_shutdown(&self, mode: ShutdownMode) {
        let _ = self.tx.send(RouterEvent::StartShutdown(mode));
    }

    pub fn join(self) {
        if self.thread.join().is_err() {
            error!("router thread panicked");
        }
    }
}

const EMPTY_METADATA_RETRY: Duration = Duration::from_millis(1000);
const EVENT_DRAIN_BOUND: usize = 256;

pub struct Router {
    settings: Settings,
    batch_config: GlobalBatchConfig,
    compression: ::conf::CompressionConf,
    rx: Receiver<RouterEvent>,
    tx: SyncSender<RouterEvent>,
    per_topic_batcher: PerTopicBatcher,
    combined_batcher: CombinedTopicsBatcher,
    rate_limiter: TopicRateLimiter,
    fetcher: MetadataFetcher,
    metadata: MetadataRef,
    generation: u64,
    connectors: HashMap<BrokerIndex, ConnectorHandle>,
    retired: Vec<ConnectorHandle>,
    initial_brokers: Vec<String>,
    fetch_rotor: usize,
    broker_rotors: HashMap<String, usize>,
    refresh_deadline: Instant,
    refresh_requested: bool,
    /// Unroutable-topic messages parked while auto-creation is pending,
    /// with the number of routing attempts made so far.
    autocreate_parked: HashMap<String, (u32, Vec<Msg>)>,
    discard_sink: Arc<DiscardSink>,
    debug_sink: Arc<DebugSink>,
    metrics: Option<Arc<Metrics>>,
    shutdown: Option<ShutdownMode>,
}

impl Router {
    /// Start the router thread.  The returned handle's sender is the
    /// pipeline's front door.
    pub fn spawn(settings: Settings,
                 conf: ResolvedConf,
                 discard_sink: Arc<DiscardSink>,
                 debug_sink: Arc<DebugSink>,
                 metrics: Option<Arc<Metrics>>)
                 -> ::errors::Result<RouterHandle> {
        let (tx, rx) = sync_channel(settings.ingest_queue_capacity);

        let fetcher = MetadataFetcher::new(&settings.client_id,
                                           settings.kafka_socket_timeout,
                                           settings.max_kafka_response_size);
        let refresh_deadline = Instant::now() + settings.metadata_refresh_interval;

        let router = Router {
            per_topic_batcher: PerTopicBatcher::new(conf.batch.per_topic.clone()),
            combined_batcher: CombinedTopicsBatcher::new(conf.batch.combined_config.clone(),
                                                         conf.batch.combined_filter.clone()),
            rate_limiter: TopicRateLimiter::new(conf.rate),
            batch_config: conf.batch,
            compression: conf.compression,
            rx: rx,
            tx: tx.clone(),
            fetcher: fetcher,
            metadata: Arc::new(Metadata::empty()),
            generation: 0,
            connectors: HashMap::new(),
            retired: Vec::new(),
            initial_brokers: conf.initial_brokers,
            fetch_rotor: rand::thread_rng().gen_range(0, 1024),
            broker_rotors: HashMap::new(),
            refresh_deadline: refresh_deadline,
            refresh_requested: false,
            autocreate_parked: HashMap::new(),
            discard_sink: discard_sink,
            debug_sink: debug_sink,
            metrics: metrics,
            shutdown: None,
            settings: settings,
        };

        let thread = thread::Builder::new()
            .name("dory-router".to_owned())
            .spawn(move || router.run())?;

        Ok(RouterHandle {
               tx: tx,
               thread: thread,
           })
    }

    fn run(mut self) {
        info!("router starting");

        while self.metadata.brokers().is_empty() && self.shutdown.is_none() {
            self.refresh_metadata();

            if self.metadata.brokers().is_empty() {
                self.wait_for_events(EMPTY_METADATA_RETRY);
            }
        }

        loop {
            if let Some(mode) = self.shutdown {
                self.run_shutdown(mode);
                return;
            }

            let wait = self.next_wakeup();

            self.wait_for_events(wait);

            if self.shutdown.is_some() {
                continue;
            }

            if self.refresh_requested || Instant::now() >= self.refresh_deadline {
                self.refresh_metadata();
            }

            let now = Instant::now();
            let mut ready = self.per_topic_batcher.get_complete_batches(now);

            ready = self.through_combined(ready, now);

            if self.combined_batcher.time_expired(now) {
                let batch = self.combined_batcher.take_batch();

                if !batch.is_empty() {
                    ready.push(batch);
                }
            }

            self.route_batches(ready);
        }
    }

    /// Block up to `wait` for the first event, then drain a bounded
    /// number more without blocking.
    fn wait_for_events(&mut self, wait: Duration) {
        match self.rx.recv_timeout(wait) {
            Ok(event) => self.handle_event(event),
            Err(RecvTimeoutError::Timeout) => return,
            Err(RecvTimeoutError::Disconnected) => {
                self.shutdown = Some(ShutdownMode::Fast);
                return;
            }
        }

        for _ in 0..EVENT_DRAIN_BOUND {
            match self.rx.try_recv() {
                Ok(event) => self.handle_event(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.shutdown = Some(ShutdownMode::Fast);
                    break;
                }
            }
        }
    }

    fn handle_event(&mut self, event: RouterEvent) {
        match event {
            RouterEvent::Ingest(msg) => self.on_ingest(msg),
            RouterEvent::Requeue(msgs) => {
                // dispatched once already; skip batching on the way back
                self.route_batches(vec![msgs]);
            }
            RouterEvent::MetadataStale => {
                self.refresh_requested = true;
            }
            RouterEvent::StartShutdown(mode) => {
                self.shutdown = Some(mode);
            }
        }
    }

    fn on_ingest(&mut self, msg: Msg) {
        self.debug_sink.on_receive(&msg);
        self.bump_counter(|metrics| &metrics.msgs_received);

        if msg.topic().len() > MAX_TOPIC_NAME_LEN {
            self.report_discard(msg, DiscardReason::TopicTooLarge);
            return;
        }

        if msg.body_size() > self.batch_config.message_max_bytes {
            self.report_discard(msg, DiscardReason::MsgTooLarge);
            return;
        }

        if !self.rate_limiter.try_admit(msg.topic(), Instant::now()) {
            self.report_discard(msg, DiscardReason::RateLimit);
            return;
        }

        let now = Instant::now();
        let mut ready = Vec::new();

        match *self.batch_config.action_for(msg.topic()) {
            TopicAction::PerTopic(_) => {
                ready.extend(self.per_topic_batcher.add(msg, now));
                ready = self.through_combined(ready, now);
            }
            TopicAction::CombinedTopics => {
                if self.combined_batcher.is_enabled() {
                    if let Some(batch) = self.combined_batcher.add(msg, now) {
                        ready.push(batch);
                    }
                } else {
                    ready.push(vec![msg]);
                }
            }
            TopicAction::Disable => {
                ready.push(vec![msg]);
            }
        }

        self.route_batches(ready);
    }

    /// Batches released from per-topic batching pass through the
    /// combined batch when both disciplines are enabled and the topic
    /// participates.
    fn through_combined(&mut self, batches: Vec<Vec<Msg>>, now: Instant) -> Vec<Vec<Msg>> {
        if !self.combined_batcher.is_enabled() {
            return batches;
        }

        let mut out = Vec::new();

        for batch in batches {
            let mut passthrough = Vec::new();

            for msg in batch {
                if self.combined_batcher.filter_passes(msg.topic()) {
                    if let Some(combined) = self.combined_batcher.add(msg, now) {
                        out.push(combined);
                    }
                } else {
                    passthrough.push(msg);
                }
            }

            if !passthrough.is_empty() {
                out.push(passthrough);
            }
        }

        out
    }

    /// Assign every message of every batch to the broker leading its
    /// partition and hand the per-broker groups to the dispatchers.
    fn route_batches(&mut self, batches: Vec<Vec<Msg>>) {
        if batches.is_empty() {
            return;
        }

        let mut per_broker: HashMap<BrokerIndex, HashMap<String, Vec<Msg>>> = HashMap::new();
        let mut unroutable = Vec::new();

        {
            let metadata = self.metadata.clone();

            for batch in batches {
                for mut msg in batch {
                    match assign_broker(&metadata, &mut msg, &mut self.broker_rotors) {
                        Some(broker_index) => {
                            per_broker
                                .entry(broker_index)
                                .or_insert_with(HashMap::new)
                                .entry(msg.topic().to_owned())
                                .or_insert_with(Vec::new)
                                .push(msg);
                        }
                        None => unroutable.push(msg),
                    }
                }
            }
        }

        for (broker_index, topics) in per_broker {
            let batches: Vec<Vec<Msg>> = topics.into_iter().map(|(_, msgs)| msgs).collect();

            let shed = match self.connectors.get(&broker_index) {
                Some(connector) => {
                    match connector.try_send(ConnectorEvent::Batches(batches)) {
                        Ok(()) => continue,
                        Err(TrySendError::Full(ConnectorEvent::Batches(batches))) |
                        Err(TrySendError::Disconnected(ConnectorEvent::Batches(batches))) => {
                            // sustained backpressure: shed instead of
                            // blocking the whole pipeline
                            warn!("dispatcher queue for broker {} is unavailable; discarding",
                                  broker_index);
                            batches
                        }
                        Err(_) => continue,
                    }
                }
                None => {
                    error!("no dispatcher for broker index {}", broker_index);
                    batches
                }
            };

            for batch in shed {
                for msg in batch {
                    self.report_discard(msg, DiscardReason::NoAvailablePartition);
                }
            }
        }

        for msg in unroutable {
            self.on_unroutable(msg);
        }
    }

    fn on_unroutable(&mut self, msg: Msg) {
        if !self.settings.topic_autocreate {
            self.report_discard(msg, DiscardReason::NoAvailablePartition);
            return;
        }

        let entry = self.autocreate_parked
            .entry(msg.topic().to_owned())
            .or_insert_with(|| (0, Vec::new()));

        entry.1.push(msg);
        self.refresh_requested = true;
    }

    /// Give parked messages another routing pass after a metadata
    /// change; topics still unroutable past the attempt limit discard
    /// with `NoLeaderAvailable`.
    fn retry_parked(&mut self) {
        if self.autocreate_parked.is_empty() {
            return;
        }

        let parked = ::std::mem::replace(&mut self.autocreate_parked, HashMap::new());
        let max_attempts = self.settings.max_failed_delivery_attempts;

        for (topic, (attempts, msgs)) in parked {
            if self.metadata.is_topic_routable(&topic) {
                self.route_batches(vec![msgs]);
            } else if attempts + 1 >= max_attempts {
                info!("giving up on topic `{}` after {} auto-create attempts",
                      topic,
                      attempts + 1);

                for msg in msgs {
                    self.report_discard(msg, DiscardReason::NoLeaderAvailable);
                }
            } else {
                self.refresh_requested = true;
                self.autocreate_parked
                    .insert(topic, (attempts + 1, msgs));
            }
        }
    }

    fn refresh_metadata(&mut self) {
        self.refresh_requested = false;
        self.refresh_deadline = Instant::now() + self.settings.metadata_refresh_interval;

        // a single-topic request against an auto-create broker creates
        // the topic as a side effect
        let autocreate_topics: Vec<String> = self.autocreate_parked.keys().cloned().collect();

        for topic in &autocreate_topics {
            if let Some(addr) = self.pick_fetch_addr() {
                if let Err(err) = self.fetcher
                       .fetch(&addr, &[topic.clone()], self.generation) {
                    debug!("auto-create metadata request for `{}` to {} failed: {}",
                           topic,
                           addr,
                           err);
                }
            }
        }

        let candidates = self.fetch_candidates();
        let mut fetched = None;

        for _ in 0..candidates.len() {
            let addr = candidates[self.fetch_rotor % candidates.len()].clone();
            self.fetch_rotor = self.fetch_rotor.wrapping_add(1);

            match self.fetcher.fetch(&addr, &[], self.generation + 1) {
                Ok(metadata) => {
                    fetched = Some(metadata);
                    break;
                }
                Err(err) => {
                    warn!("metadata fetch from {} failed: {}", addr, err);
                }
            }
        }

        let metadata = match fetched {
            Some(metadata) => metadata,
            None => {
                warn!("metadata refresh failed against every known broker");
                return;
            }
        };

        if self.settings.compare_metadata_on_refresh &&
           self.metadata.content_eq(&metadata) {
            debug!("metadata unchanged; keeping current snapshot");
            self.retry_parked();
            return;
        }

        self.generation += 1;
        self.metadata = Arc::new(metadata);
        self.broker_rotors.clear();
        self.bump_counter(|metrics| &metrics.metadata_updates);

        info!("metadata snapshot {} installed: {} brokers ({} in service), {} topics",
              self.generation,
              self.metadata.brokers().len(),
              self.metadata.num_in_service_brokers(),
              self.metadata.topic_names().len());

        self.reconcile_connectors();
        self.retry_parked();
    }

    fn fetch_candidates(&self) -> Vec<String> {
        let known: Vec<String> = self.metadata
            .brokers()
            .iter()
            .map(|broker| broker.addr())
            .collect();

        if known.is_empty() {
            self.initial_brokers.clone()
        } else {
            known
        }
    }

    fn pick_fetch_addr(&mut self) -> Option<String> {
        let candidates = self.fetch_candidates();

        if candidates.is_empty() {
            return None;
        }

        let addr = candidates[self.fetch_rotor % candidates.len()].clone();
        self.fetch_rotor = self.fetch_rotor.wrapping_add(1);

        Some(addr)
    }

    /// Bring the dispatcher set in line with the new snapshot: retire
    /// workers for brokers that left (or moved), spawn workers for
    /// brokers that appeared, and push the snapshot to survivors.
    fn reconcile_connectors(&mut self) {
        let in_service = self.metadata.in_service_broker_indexes();

        let doomed: Vec<BrokerIndex> = {
            let metadata = &self.metadata;

            self.connectors
                .iter()
                .filter_map(|(&index, connector)| {
                    let keep = metadata
                        .broker(index)
                        .map_or(false, |broker| {
                                    broker.is_in_service() && broker.addr() == connector.addr()
                                });

                    if keep { None } else { Some(index) }
                })
                .collect()
        };

        for index in doomed {
            if let Some(connector) = self.connectors.remove(&index) {
                info!("retiring dispatcher for broker index {} ({})",
                      index,
                      connector.addr());
                connector.send(ConnectorEvent::Retire);
                self.retired.push(connector);
            }
        }

        for &index in &in_service {
            if self.connectors.contains_key(&index) {
                continue;
            }

            let broker = match self.metadata.broker(index) {
                Some(broker) => broker,
                None => continue,
            };

            match ConnectorHandle::spawn(index,
                                         broker.addr(),
                                         &self.settings,
                                         self.batch_config.produce_request_data_limit,
                                         self.compression.clone(),
                                         self.metadata.clone(),
                                         self.tx.clone(),
                                         self.discard_sink.clone(),
                                         self.debug_sink.clone(),
                                         self.metrics.clone()) {
                Ok(connector) => {
                    self.connectors.insert(index, connector);
                }
                Err(err) => {
                    error!("cannot spawn dispatcher for broker {} ({}): {}",
                           index,
                           broker.addr(),
                           err);
                }
            }
        }

        for connector in self.connectors.values() {
            connector.send(ConnectorEvent::UpdateMetadata(self.metadata.clone()));
        }
    }

    fn next_wakeup(&self) -> Duration {
        let now = Instant::now();
        let mut deadline = self.refresh_deadline;

        if let Some(batch_deadline) = self.per_topic_batcher.next_complete_time() {
            if batch_deadline < deadline {
                deadline = batch_deadline;
            }
        }

        if let Some(combined_deadline) = self.combined_batcher.deadline() {
            if combined_deadline < deadline {
                deadline = combined_deadline;
            }
        }

        if deadline <= now {
            Duration::from_millis(0)
        } else {
            deadline - now
        }
    }

    fn run_shutdown(&mut self, mode: ShutdownMode) {
        info!("router shutting down ({:?})", mode);

        let deadline = Instant::now() + self.settings.shutdown_max_delay;

        if mode == ShutdownMode::Graceful {
            // flush every batch, route the results, then let the
            // dispatchers drain
            let mut ready = self.per_topic_batcher.get_all_batches();
            let combined = self.combined_batcher.take_batch();

            if !combined.is_empty() {
                ready.push(combined);
            }

            self.route_batches(ready);

            for connector in self.connectors.values() {
                connector.send(ConnectorEvent::StartSlowShutdown(deadline));
            }
        } else {
            for connector in self.connectors.values() {
                connector.send(ConnectorEvent::StartFastShutdown);
            }
        }

        // park everything still unrouted
        let parked = ::std::mem::replace(&mut self.autocreate_parked, HashMap::new());

        for (_, (_, msgs)) in parked {
            for msg in msgs {
                self.report_discard(msg, DiscardReason::ServerShutdown);
            }
        }

        // keep the queue draining while the dispatchers wind down, so a
        // blocked worker can never wedge the drain
        while mode == ShutdownMode::Graceful {
            let now = Instant::now();

            if now >= deadline {
                break;
            }

            match self.rx.recv_timeout(deadline - now) {
                Ok(event) => self.discard_shutdown_event(event),
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        for (_, connector) in self.connectors.drain() {
            connector.join();
        }

        for connector in self.retired.drain(..) {
            connector.join();
        }

        while let Ok(event) = self.rx.try_recv() {
            self.discard_shutdown_event(event);
        }

        info!("router stopped");
    }

    fn discard_shutdown_event(&self, event: RouterEvent) {
        match event {
            RouterEvent::Ingest(msg) => {
                self.report_discard(msg, DiscardReason::ServerShutdown);
            }
            RouterEvent::Requeue(msgs) => {
                for msg in msgs {
                    self.report_discard(msg, DiscardReason::ServerShutdown);
                }
            }
            RouterEvent::MetadataStale |
            RouterEvent::StartShutdown(_) => {}
        }
    }

    fn report_discard(&self, msg: Msg, reason: DiscardReason) {
        self.bump_counter(|metrics| &metrics.msgs_discarded);
        discard_msg(&*self.discard_sink, msg, reason);
    }

    fn bump_counter<F>(&self, select: F)
        where F: FnOnce(&Metrics) -> &::prometheus::Counter
    {
        if let Some(ref metrics) = self.metrics {
            select(metrics).inc();
        }
    }
}

/// Resolve the broker a message must be sent to under `metadata`.
///
/// `PartitionKey` messages hash onto the topic's routable partitions and
/// record the choice; `AnyPartition` messages only pick a broker here
/// (round-robin per topic), leaving the partition to the dispatcher.
fn assign_broker(metadata: &Metadata,
                 msg: &mut Msg,
                 broker_rotors: &mut HashMap<String, usize>)
                 -> Option<BrokerIndex> {
    match msg.routing() {
        MsgRouting::PartitionKey(partition_key) => {
            metadata
                .choose_partition_by_key(msg.topic(), partition_key)
                .map(|(partition, broker_index)| {
                         msg.assign_partition(partition);
                         broker_index
                     })
        }
        MsgRouting::AnyPartition => {
            let brokers = match metadata.brokers_for_topic(msg.topic()) {
                Some(brokers) => brokers,
                None => return None,
            };

            if brokers.is_empty() {
                return None;
            }

            let rotor = broker_rotors
                .entry(msg.topic().to_owned())
                .or_insert(0);
            let broker_index = brokers[*rotor % brokers.len()];

            *rotor = rotor.wrapping_add(1);

            Some(broker_index)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use pool::BufferPool;

    fn metadata() -> Metadata {
        let mut builder = Metadata::builder(1);

        builder.add_broker(11, "b1", 9092).unwrap();
        builder.add_broker(22, "b2", 9093).unwrap();
        builder.open_topic("t").unwrap();
        builder.add_partition(0, 11, true, 0).unwrap();
        builder.add_partition(1, 22, true, 0).unwrap();
        builder.add_partition(2, 11, true, 0).unwrap();
        builder.close_topic().unwrap();

        builder.build().unwrap()
    }

    #[test]
    fn test_partition_key_routing_is_deterministic() {
        let metadata = metadata();
        let pool = BufferPool::new(64, 32);
        let mut rotors = HashMap::new();

        for _ in 0..5 {
            let mut msg =
                Msg::new(&pool, "t", 0, MsgRouting::PartitionKey(4), b"", b"v").unwrap();

            // key 4 mod 3 routable partitions -> partition 1 on broker 1
            assert_eq!(assign_broker(&metadata, &mut msg, &mut rotors), Some(1));
            assert_eq!(msg.assigned_partition(), Some(1));
        }
    }

    #[test]
    fn test_any_partition_rotates_across_brokers() {
        let metadata = metadata();
        let pool = BufferPool::new(64, 32);
        let mut rotors = HashMap::new();
        let mut seen = Vec::new();

        for _ in 0..4 {
            let mut msg = Msg::new(&pool, "t", 0, MsgRouting::AnyPartition, b"", b"v").unwrap();

            seen.push(assign_broker(&metadata, &mut msg, &mut rotors).unwrap());
            assert_eq!(msg.assigned_partition(), None);
        }

        assert_eq!(seen, vec![0, 1, 0, 1]);
    }

    /// Leadership moves between snapshots: everything a broker answers
    /// with NotLeaderForPartition must surface in the new leader's next
    /// request, exactly once.
    #[test]
    fn test_leader_reassignment_reroutes_without_duplicates() {
        use bytes::BytesMut;
        use dispatch::{ProduceRequestFactory, correlate_response};
        use protocol::{PartitionAck, ProduceResponse, ResponseHeader, TopicAck};

        let pool = BufferPool::new(64, 64);

        let metadata_a = {
            let mut builder = Metadata::builder(1);
            builder.add_broker(11, "a", 9092).unwrap();
            builder.add_broker(22, "b", 9092).unwrap();
            builder.open_topic("x").unwrap();
            builder.add_partition(0, 11, true, 0).unwrap();
            builder.close_topic().unwrap();
            Arc::new(builder.build().unwrap())
        };

        let metadata_b = {
            let mut builder = Metadata::builder(2);
            builder.add_broker(11, "a", 9092).unwrap();
            builder.add_broker(22, "b", 9092).unwrap();
            builder.open_topic("x").unwrap();
            builder.add_partition(0, 22, true, 0).unwrap();
            builder.close_topic().unwrap();
            Arc::new(builder.build().unwrap())
        };

        let mut rotors = HashMap::new();
        let mut batch = Vec::new();

        for i in 0..5 {
            let mut msg = Msg::new(&pool,
                                   "x",
                                   0,
                                   MsgRouting::PartitionKey(0),
                                   b"",
                                   format!("m{}", i).as_bytes())
                    .unwrap();

            assert_eq!(assign_broker(&metadata_a, &mut msg, &mut rotors), Some(0));
            batch.push(msg);
        }

        let mut factory_a = ProduceRequestFactory::new("dory",
                                                       0,
                                                       1,
                                                       10_000,
                                                       1 << 20,
                                                       ::conf::CompressionConf::default(),
                                                       metadata_a.clone());

        factory_a.put(batch);

        let mut frame = BytesMut::with_capacity(1024);
        let built = factory_a.build_request(&mut frame).unwrap().unwrap();

        // the old leader rejects the whole slot
        let response = ProduceResponse {
            header: ResponseHeader { correlation_id: built.correlation_id },
            topics: vec![TopicAck {
                             topic_name: "x".to_owned(),
                             partitions: vec![PartitionAck {
                                                  partition: 0,
                                                  error_code: 6,
                                                  offset: -1,
                                              }],
                         }],
        };

        let outcome = correlate_response(&response, built.groups, 5);

        assert!(outcome.metadata_stale);
        assert!(outcome.acked.is_empty());
        assert_eq!(outcome.requeue.len(), 5);

        // the router re-routes the survivors under the new snapshot
        let mut factory_b = ProduceRequestFactory::new("dory",
                                                       1,
                                                       1,
                                                       10_000,
                                                       1 << 20,
                                                       ::conf::CompressionConf::default(),
                                                       metadata_b.clone());
        let mut rerouted = Vec::new();

        for mut msg in outcome.requeue {
            assert_eq!(assign_broker(&metadata_b, &mut msg, &mut rotors), Some(1));
            rerouted.push(msg);
        }

        factory_b.put(rerouted);

        let mut frame = BytesMut::with_capacity(1024);
        let built = factory_b.build_request(&mut frame).unwrap().unwrap();

        assert_eq!(built.groups.len(), 1);
        assert_eq!(built.groups[0].partition, 0);

        let values: Vec<&[u8]> = built.groups[0]
            .msgs
            .iter()
            .map(Msg::value)
            .collect();

        assert_eq!(values,
                   vec![&b"m0"[..], &b"m1"[..], &b"m2"[..], &b"m3"[..], &b"m4"[..]]);
    }

    #[test]
    fn test_unroutable_topic_yields_no_broker() {
        let metadata = metadata();
        let pool = BufferPool::new(64, 32);
        let mut rotors = HashMap::new();

        let mut msg =
            Msg::new(&pool, "absent", 0, MsgRouting::AnyPartition, b"", b"v").unwrap();

        assert_eq!(assign_broker(&metadata, &mut msg, &mut rotors), None);

        let mut msg =
            Msg::new(&pool, "absent", 0, MsgRouting::PartitionKey(1), b"", b"v").unwrap();

        assert_eq!(assign_broker(&metadata, &mut msg, &mut rotors), None);
    }
}
