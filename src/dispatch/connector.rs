use std::cmp;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender, TryRecvError, TrySendError,
                      sync_channel};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::BytesMut;

use cluster::{BrokerIndex, MetadataRef};
use conf::{CompressionConf, Settings};
use debug::DebugSink;
use discard::{DiscardReason, DiscardSink, discard_msg};
use dispatch::{InFlightRequest, InFlightTable, MsgSetGroup, PauseRateLimiter,
               ProduceRequestFactory};
use errors::{ErrorKind, KafkaCode, Result};
use metrics::Metrics;
use msg::Msg;
use net::KafkaConnection;
use protocol::{ProduceResponse, RequiredAcks, check_complete, parse_produce_response};
use router::RouterEvent;

const RECONNECT_BASE_DELAY: Duration = Duration::from_millis(100);
const IDLE_WAIT: Duration = Duration::from_millis(1000);

/// Events a connector receives on its input queue.  Everything the
/// router wants from a connector travels this way; neither side holds a
/// pointer to the other.
pub enum ConnectorEvent {
    /// Per-topic batches routed to this broker.
    Batches(Vec<Vec<Msg>>),
    /// A new metadata snapshot was published.
    UpdateMetadata(MetadataRef),
    /// This broker left the in-service set; give everything back and
    /// stop.
    Retire,
    /// Drain queued and in-flight messages until the deadline, then
    /// stop.
    StartSlowShutdown(Instant),
    /// Stop after the current in-flight request resolves.
    StartFastShutdown,
}

/// Dispatcher state machine.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConnectorState {
    Connecting,
    Ready,
    Draining,
    Broken,
    Stopping,
}

enum ServeEnd {
    /// The connection failed; reconnect after a backoff.
    ConnectionLost,
    /// Shutdown, retirement or drain completion; stop the worker.
    Stopped,
}

/// The per-broker worker.  Owns the TCP connection, the produce-request
/// factory, and the in-flight table; at most one request is outstanding
/// at a time, so responses correlate in order.
pub struct Connector {
    broker_index: BrokerIndex,
    addr: String,
    state: ConnectorState,
    socket_timeout: Duration,
    restart_max_delay: Duration,
    max_response_size: usize,
    required_acks: i16,
    max_failed_attempts: u32,
    factory: ProduceRequestFactory,
    in_flight: InFlightTable,
    pause: PauseRateLimiter,
    pending_pause: Option<Duration>,
    rx: Receiver<ConnectorEvent>,
    router_tx: SyncSender<RouterEvent>,
    discard_sink: Arc<DiscardSink>,
    debug_sink: Arc<DebugSink>,
    metrics: Option<Arc<Metrics>>,
    drain_deadline: Option<Instant>,
    fast_stop: bool,
    retiring: bool,
}

/// The owning side of a connector: its queue and its thread.
pub struct ConnectorHandle {
    broker_index: BrokerIndex,
    addr: String,
    tx: SyncSender<ConnectorEvent>,
    thread: JoinHandle<()>,
}

impl ConnectorHandle {
    pub fn spawn(broker_index: BrokerIndex,
                 addr: String,
                 settings: &Settings,
                 produce_request_data_limit: usize,
                 compression: CompressionConf,
                 metadata: MetadataRef,
                 router_tx: SyncSender<RouterEvent>,
                 discard_sink: Arc<DiscardSink>,
                 debug_sink: Arc<DebugSink>,
                 metrics: Option<Arc<Metrics>>)
                 -> Result<ConnectorHandle> {
        let (tx, rx) = sync_channel(settings.dispatcher_queue_capacity);

        let factory = ProduceRequestFactory::new(&settings.client_id,
                                                 broker_index,
                                                 settings.required_acks as i16,
                                                 settings.replication_timeout.as_secs() as i32 *
                                                 1000 +
                                                 settings.replication_timeout.subsec_nanos() as
                                                 i32 / 1_000_000,
                                                 produce_request_data_limit,
                                                 compression,
                                                 metadata);

        let connector = Connector {
            broker_index: broker_index,
            addr: addr.clone(),
            state: ConnectorState::Connecting,
            socket_timeout: settings.kafka_socket_timeout,
            restart_max_delay: settings.dispatcher_restart_max_delay,
            max_response_size: settings.max_kafka_response_size,
            required_acks: settings.required_acks as i16,
            max_failed_attempts: settings.max_failed_delivery_attempts,
            factory: factory,
            in_flight: InFlightTable::new(),
            pause: PauseRateLimiter::new(settings.min_pause_delay,
                                         settings.pause_rate_limit_initial,
                                         settings.pause_rate_limit_max_double),
            pending_pause: None,
            rx: rx,
            router_tx: router_tx,
            discard_sink: discard_sink,
            debug_sink: debug_sink,
            metrics: metrics,
            drain_deadline: None,
            fast_stop: false,
            retiring: false,
        };

        let thread = thread::Builder::new()
            .name(format!("dory-connector-{}", broker_index))
            .spawn(move || connector.run())?;

        Ok(ConnectorHandle {
               broker_index: broker_index,
               addr: addr,
               tx: tx,
               thread: thread,
           })
    }

    pub fn broker_index(&self) -> BrokerIndex {
        self.broker_index
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Non-blocking send; a full queue is the backpressure signal the
    /// router acts on.
    pub fn try_send(&self,
                    event: ConnectorEvent)
                    -> ::std::result::Result<(), TrySendError<ConnectorEvent>> {
        self.tx.try_send(event)
    }

    /// Blocking send for control events, which must not be dropped.
    pub fn send(&self, event: ConnectorEvent) {
        // a send error means the worker is already gone, which the
        // subsequent join handles
        let _ = self.tx.send(event);
    }

    pub fn join(self) {
        if self.thread.join().is_err() {
            error!("connector thread for broker {} panicked", self.broker_index);
        }
    }
}

impl Connector {
    fn run(mut self) {
        info!("connector for broker {} ({}) starting",
              self.broker_index,
              self.addr);

        let mut backoff = RECONNECT_BASE_DELAY;

        loop {
            if self.fast_stop || self.retiring {
                break;
            }

            self.set_state(ConnectorState::Connecting);

            match KafkaConnection::connect(&self.addr,
                                           self.socket_timeout,
                                           self.max_response_size) {
                Ok(connection) => {
                    backoff = RECONNECT_BASE_DELAY;

                    match self.serve(connection) {
                        ServeEnd::Stopped => break,
                        ServeEnd::ConnectionLost => {
                            self.bump_counter(|metrics| &metrics.produce_request_failures);
                            self.on_connection_lost();
                        }
                    }
                }
                Err(err) => {
                    warn!("connector for broker {} cannot connect to {}: {}",
                          self.broker_index,
                          self.addr,
                          err);
                }
            }

            if self.drain_expired() {
                break;
            }

            self.set_state(ConnectorState::Broken);
            self.bump_counter(|metrics| &metrics.broker_reconnects);

            if !self.buffer_during(backoff) {
                break;
            }

            backoff = cmp::min(backoff * 2, self.restart_max_delay);
        }

        self.set_state(ConnectorState::Stopping);
        self.emit_leftovers();

        info!("connector for broker {} stopped", self.broker_index);
    }

    fn serve(&mut self, mut connection: KafkaConnection) -> ServeEnd {
        if self.drain_deadline.is_some() {
            self.set_state(ConnectorState::Draining);
        } else {
            self.set_state(ConnectorState::Ready);
        }

        loop {
            if let Some(pause) = self.pending_pause.take() {
                debug!("connector for broker {} pausing {:?} after repeated errors",
                       self.broker_index,
                       pause);

                if !self.buffer_during(pause) {
                    return ServeEnd::Stopped;
                }
            }

            let wait = if self.factory.is_empty() && self.in_flight.is_empty() {
                Some(self.event_wait())
            } else {
                None
            };

            if !self.drain_events(wait) {
                return ServeEnd::Stopped;
            }

            if self.drain_expired() || self.fast_stop {
                return ServeEnd::Stopped;
            }

            let mut frame = BytesMut::with_capacity(4096);

            let built = match self.factory.build_request(&mut frame) {
                Ok(built) => built,
                Err(err) => {
                    error!("connector for broker {} failed to serialize request: {}",
                           self.broker_index,
                           err);
                    self.discard_bug_msgs();
                    continue;
                }
            };

            self.return_unplaced();

            let built = match built {
                Some(built) => built,
                None => {
                    if self.drain_deadline.is_some() && self.in_flight.is_empty() &&
                       self.factory.is_empty() {
                        return ServeEnd::Stopped;
                    }

                    continue;
                }
            };

            if let Err(err) = connection.send_frame(&frame) {
                warn!("connector for broker {} failed to send request: {}",
                      self.broker_index,
                      err);
                self.requeue_groups(built.groups);
                return ServeEnd::ConnectionLost;
            }

            self.bump_counter(|metrics| &metrics.produce_requests);

            for group in &built.groups {
                for msg in &group.msgs {
                    self.debug_sink.on_send(msg);
                }
            }

            if self.required_acks == RequiredAcks::None as i16 {
                // fire-and-forget: the broker sends no response
                for group in built.groups {
                    self.ack_msgs(group.msgs);
                }

                continue;
            }

            self.in_flight
                .insert(built.correlation_id,
                        InFlightRequest {
                            groups: built.groups,
                            sent_at: Instant::now(),
                        });

            let body = match connection.recv_frame() {
                Ok(body) => body,
                Err(err) => {
                    warn!("connector for broker {} lost connection awaiting response: {}",
                          self.broker_index,
                          err);
                    return ServeEnd::ConnectionLost;
                }
            };

            if let Err(err) = self.handle_response(&body) {
                warn!("connector for broker {} received bad response: {}",
                      self.broker_index,
                      err);
                return ServeEnd::ConnectionLost;
            }
        }
    }

    fn handle_response(&mut self, body: &[u8]) -> Result<()> {
        let response = check_complete(parse_produce_response(body))?;

        let entry = match self.in_flight.remove(response.header.correlation_id) {
            Some(entry) => entry,
            None => {
                bail!(ErrorKind::CodecError("response correlation id matches no in-flight \
                                             request"))
            }
        };

        let outcome =
            correlate_response(&response, entry.groups, self.max_failed_attempts);

        for msg in outcome.acked {
            self.debug_sink.on_ack(&msg);
            self.bump_counter(|metrics| &metrics.msgs_delivered);
        }

        for (msg, reason) in outcome.discards {
            self.report_discard(msg, reason);
        }

        if !outcome.requeue.is_empty() {
            self.send_back(outcome.requeue);
        }

        if outcome.metadata_stale {
            let _ = self.router_tx.send(RouterEvent::MetadataStale);
        }

        if outcome.errors_seen {
            self.pending_pause = Some(self.pause.next_pause(Instant::now()));
        }

        Ok(())
    }

    /// Everything in flight when the connection drops gets one more
    /// failed attempt and goes back through the router.
    fn on_connection_lost(&mut self) {
        let groups = self.in_flight.drain_all();

        if !groups.is_empty() {
            let mut requeue = Vec::new();

            for group in groups {
                for mut msg in group.msgs {
                    if msg.bump_failed_attempts() >= self.max_failed_attempts {
                        self.report_discard(msg, DiscardReason::FailedDeliveryAttemptLimit);
                    } else {
                        msg.clear_partition();
                        requeue.push(msg);
                    }
                }
            }

            if !requeue.is_empty() {
                self.send_back(requeue);
            }

            let _ = self.router_tx.send(RouterEvent::MetadataStale);
        }
    }

    fn requeue_groups(&mut self, groups: Vec<MsgSetGroup>) {
        let mut requeue = Vec::new();

        for group in groups {
            for mut msg in group.msgs {
                if msg.bump_failed_attempts() >= self.max_failed_attempts {
                    self.report_discard(msg, DiscardReason::FailedDeliveryAttemptLimit);
                } else {
                    msg.clear_partition();
                    requeue.push(msg);
                }
            }
        }

        if !requeue.is_empty() {
            self.send_back(requeue);
        }
    }

    fn return_unplaced(&mut self) {
        let unplaced = self.factory.take_unplaced();

        if !unplaced.is_empty() {
            let mut requeue = Vec::new();

            for mut msg in unplaced {
                if msg.bump_failed_attempts() >= self.max_failed_attempts {
                    self.report_discard(msg, DiscardReason::NoAvailablePartition);
                } else {
                    msg.clear_partition();
                    requeue.push(msg);
                }
            }

            if !requeue.is_empty() {
                self.send_back(requeue);
            }

            let _ = self.router_tx.send(RouterEvent::MetadataStale);
        }
    }

    fn send_back(&self, msgs: Vec<Msg>) {
        if self.router_tx.send(RouterEvent::Requeue(msgs)).is_err() {
            warn!("connector for broker {} cannot requeue: router is gone",
                  self.broker_index);
        }
    }

    /// Process queued events; optionally block up to `wait` for the
    /// first one.  Returns `false` when the worker must stop serving.
    fn drain_events(&mut self, mut wait: Option<Duration>) -> bool {
        loop {
            let event = match wait.take() {
                Some(wait) => {
                    match self.rx.recv_timeout(wait) {
                        Ok(event) => event,
                        Err(RecvTimeoutError::Timeout) => return true,
                        Err(RecvTimeoutError::Disconnected) => {
                            self.fast_stop = true;
                            return false;
                        }
                    }
                }
                None => {
                    match self.rx.try_recv() {
                        Ok(event) => event,
                        Err(TryRecvError::Empty) => return true,
                        Err(TryRecvError::Disconnected) => {
                            self.fast_stop = true;
                            return false;
                        }
                    }
                }
            };

            match event {
                ConnectorEvent::Batches(batches) => {
                    if self.drain_deadline.is_some() || self.fast_stop {
                        for batch in batches {
                            for msg in batch {
                                self.report_discard(msg, DiscardReason::ServerShutdown);
                            }
                        }
                    } else {
                        for batch in batches {
                            self.factory.put(batch);
                        }
                    }
                }
                ConnectorEvent::UpdateMetadata(metadata) => {
                    self.factory.update_metadata(metadata);
                }
                ConnectorEvent::Retire => {
                    self.retiring = true;
                    return false;
                }
                ConnectorEvent::StartSlowShutdown(deadline) => {
                    self.drain_deadline = Some(deadline);
                    self.set_state(ConnectorState::Draining);
                }
                ConnectorEvent::StartFastShutdown => {
                    self.fast_stop = true;
                    return false;
                }
            }
        }
    }

    /// Sleep for `delay` while still accepting (and buffering) events.
    /// Returns `false` when the worker must stop.
    fn buffer_during(&mut self, delay: Duration) -> bool {
        let deadline = Instant::now() + delay;

        loop {
            let now = Instant::now();

            if now >= deadline {
                return true;
            }

            if !self.drain_events(Some(deadline - now)) {
                return false;
            }

            if self.fast_stop {
                return false;
            }
        }
    }

    fn event_wait(&self) -> Duration {
        match self.drain_deadline {
            Some(deadline) => {
                let now = Instant::now();

                if deadline <= now {
                    Duration::from_millis(0)
                } else {
                    cmp::min(IDLE_WAIT, deadline - now)
                }
            }
            None => IDLE_WAIT,
        }
    }

    fn drain_expired(&self) -> bool {
        self.drain_deadline
            .map_or(false, |deadline| Instant::now() >= deadline)
    }

    /// Final accounting once the worker stops.  A retiring connector
    /// hands everything back for re-routing; a shutting-down one reports
    /// the loss.
    fn emit_leftovers(&mut self) {
        let mut leftovers: Vec<Msg> = Vec::new();

        for group in self.in_flight.drain_all() {
            leftovers.extend(group.msgs);
        }

        for batch in self.factory.take_all() {
            leftovers.extend(batch);
        }

        leftovers.extend(self.factory.take_unplaced());

        while let Ok(event) = self.rx.try_recv() {
            if let ConnectorEvent::Batches(batches) = event {
                for batch in batches {
                    leftovers.extend(batch);
                }
            }
        }

        if leftovers.is_empty() {
            return;
        }

        if self.retiring {
            for msg in &mut leftovers {
                msg.clear_partition();
            }

            self.send_back(leftovers);
        } else {
            for msg in leftovers {
                self.report_discard(msg, DiscardReason::ServerShutdown);
            }
        }
    }

    fn ack_msgs(&self, msgs: Vec<Msg>) {
        for msg in msgs {
            self.debug_sink.on_ack(&msg);
            self.bump_counter(|metrics| &metrics.msgs_delivered);
        }
    }

    fn discard_bug_msgs(&mut self) {
        for batch in self.factory.take_all() {
            for msg in batch {
                self.report_discard(msg, DiscardReason::Bug);
            }
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

    fn set_state(&mut self, state: ConnectorState) {
        if self.state != state {
            debug!("connector for broker {}: {:?} -> {:?}",
                   self.broker_index,
                   self.state,
                   state);
            self.state = state;
        }
    }
}

/// The result of matching one produce response against the request's
/// message-set groups.  Outcomes are independent per partition: one
/// response can simultaneously ack, re-route and discard.
#[derive(Debug, Default)]
pub struct CorrelatedOutcome {
    pub acked: Vec<Msg>,
    pub requeue: Vec<Msg>,
    pub discards: Vec<(Msg, DiscardReason)>,
    pub metadata_stale: bool,
    pub errors_seen: bool,
}

/// Match per-partition outcomes to the groups of the request they answer.
///
/// Because every `(topic, partition)` pair occurs at most once per
/// request, a permuted response still maps back unambiguously.  Groups
/// the response never mentions are treated as retriable, as is any code
/// without explicit handling.
pub fn correlate_response(response: &ProduceResponse,
                          groups: Vec<MsgSetGroup>,
                          max_failed_attempts: u32)
                          -> CorrelatedOutcome {
    let mut outcome = CorrelatedOutcome::default();
    let mut pending: Vec<Option<MsgSetGroup>> = groups.into_iter().map(Some).collect();

    for topic in &response.topics {
        for partition in &topic.partitions {
            let slot = pending
                .iter()
                .position(|group| {
                              group
                                  .as_ref()
                                  .map_or(false, |group| {
                                              group.topic == topic.topic_name &&
                                              group.partition == partition.partition
                                          })
                          });

            let group = match slot {
                Some(slot) => pending[slot].take().expect("group vanished"),
                None => {
                    warn!("produce response names unknown slot `{}`/{}",
                          topic.topic_name,
                          partition.partition);
                    continue;
                }
            };

            let code = KafkaCode::from_wire(partition.error_code);

            if code.is_ack() {
                outcome.acked.extend(group.msgs);
                continue;
            }

            outcome.errors_seen = true;

            if code.requires_reroute() {
                outcome.metadata_stale = true;
            }

            if code.is_permanent() {
                for msg in group.msgs {
                    outcome
                        .discards
                        .push((msg, DiscardReason::KafkaErrorAck(partition.error_code)));
                }

                continue;
            }

            // retriable (leadership moved, transient broker trouble, or
            // a code this client does not know)
            for mut msg in group.msgs {
                if msg.bump_failed_attempts() >= max_failed_attempts {
                    outcome
                        .discards
                        .push((msg, DiscardReason::FailedDeliveryAttemptLimit));
                } else {
                    msg.clear_partition();
                    outcome.requeue.push(msg);
                }
            }
        }
    }

    // slots the response skipped entirely: retry rather than lose
    for group in pending.into_iter().filter_map(|group| group) {
        warn!("produce response omitted slot `{}`/{}",
              group.topic,
              group.partition);
        outcome.errors_seen = true;

        for mut msg in group.msgs {
            if msg.bump_failed_attempts() >= max_failed_attempts {
                outcome
                    .discards
                    .push((msg, DiscardReason::FailedDeliveryAttemptLimit));
            } else {
                msg.clear_partition();
                outcome.requeue.push(msg);
            }
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use msg::MsgRouting;
    use pool::BufferPool;
    use protocol::{PartitionAck, ResponseHeader, TopicAck};

    fn group(pool: &Arc<BufferPool>, topic: &str, partition: i32, count: usize) -> MsgSetGroup {
        MsgSetGroup {
            topic: topic.to_owned(),
            partition: partition,
            msgs: (0..count)
                .map(|_| {
                         Msg::new(pool, topic, 0, MsgRouting::AnyPartition, b"", b"v").unwrap()
                     })
                .collect(),
        }
    }

    fn response(acks: Vec<(&str, Vec<(i32, i16)>)>) -> ProduceResponse {
        ProduceResponse {
            header: ResponseHeader { correlation_id: 1 },
            topics: acks.into_iter()
                .map(|(topic, partitions)| {
                    TopicAck {
                        topic_name: topic.to_owned(),
                        partitions: partitions
                            .into_iter()
                            .map(|(partition, error_code)| {
                                     PartitionAck {
                                         partition: partition,
                                         error_code: error_code,
                                         offset: 42,
                                     }
                                 })
                            .collect(),
                    }
                })
                .collect(),
        }
    }

    #[test]
    fn test_success_acks_everything() {
        let pool = BufferPool::new(64, 32);
        let groups = vec![group(&pool, "t", 0, 3)];

        let outcome = correlate_response(&response(vec![("t", vec![(0, 0)])]), groups, 5);

        assert_eq!(outcome.acked.len(), 3);
        assert!(outcome.requeue.is_empty());
        assert!(outcome.discards.is_empty());
        assert!(!outcome.metadata_stale);
        assert!(!outcome.errors_seen);
    }

    #[test]
    fn test_replica_not_available_still_acks() {
        let pool = BufferPool::new(64, 32);
        let groups = vec![group(&pool, "t", 0, 2)];

        let outcome = correlate_response(&response(vec![("t", vec![(0, 9)])]), groups, 5);

        assert_eq!(outcome.acked.len(), 2);
        assert!(!outcome.errors_seen);
    }

    #[test]
    fn test_partial_failure_splits_outcomes() {
        let pool = BufferPool::new(64, 64);
        let groups = vec![group(&pool, "x", 0, 2),
                          group(&pool, "x", 1, 3),
                          group(&pool, "y", 0, 1)];

        // partition x/0 acked, x/1 lost leadership, y/0 unauthorized;
        // the response permutes topic order
        let outcome = correlate_response(&response(vec![("y", vec![(0, 29)]),
                                                        ("x", vec![(1, 6), (0, 0)])]),
                                         groups,
                                         5);

        assert_eq!(outcome.acked.len(), 2);
        assert_eq!(outcome.requeue.len(), 3);
        assert_eq!(outcome.discards.len(), 1);
        assert_eq!(outcome.discards[0].1, DiscardReason::KafkaErrorAck(29));
        assert!(outcome.metadata_stale);
        assert!(outcome.errors_seen);
    }

    #[test]
    fn test_requeued_msgs_lose_partition_assignment() {
        let pool = BufferPool::new(64, 32);
        let mut msg = Msg::new(&pool, "t", 0, MsgRouting::PartitionKey(1), b"", b"v").unwrap();
        msg.assign_partition(0);

        let groups = vec![MsgSetGroup {
                              topic: "t".to_owned(),
                              partition: 0,
                              msgs: vec![msg],
                          }];

        let outcome = correlate_response(&response(vec![("t", vec![(0, 6)])]), groups, 5);

        assert_eq!(outcome.requeue.len(), 1);
        assert_eq!(outcome.requeue[0].assigned_partition(), None);
        assert_eq!(outcome.requeue[0].failed_attempts(), 1);
    }

    #[test]
    fn test_attempt_limit_turns_retry_into_discard() {
        let pool = BufferPool::new(64, 32);
        let mut msg = Msg::new(&pool, "t", 0, MsgRouting::AnyPartition, b"", b"v").unwrap();

        for _ in 0..4 {
            msg.bump_failed_attempts();
        }

        let groups = vec![MsgSetGroup {
                              topic: "t".to_owned(),
                              partition: 0,
                              msgs: vec![msg],
                          }];

        let outcome = correlate_response(&response(vec![("t", vec![(0, 6)])]), groups, 5);

        assert!(outcome.requeue.is_empty());
        assert_eq!(outcome.discards.len(), 1);
        assert_eq!(outcome.discards[0].1, DiscardReason::FailedDeliveryAttemptLimit);
    }

    #[test]
    fn test_unknown_code_is_retriable() {
        let pool = BufferPool::new(64, 32);
        let groups = vec![group(&pool, "t", 0, 1)];

        let outcome = correlate_response(&response(vec![("t", vec![(0, 77)])]), groups, 5);

        assert_eq!(outcome.requeue.len(), 1);
        assert!(outcome.errors_seen);
        assert!(!outcome.metadata_stale);
    }

    #[test]
    fn test_omitted_slot_is_retried() {
        let pool = BufferPool::new(64, 32);
        let groups = vec![group(&pool, "t", 0, 1), group(&pool, "t", 1, 2)];

        let outcome = correlate_response(&response(vec![("t", vec![(0, 0)])]), groups, 5);

        assert_eq!(outcome.acked.len(), 1);
        assert_eq!(outcome.requeue.len(), 2);
    }
}
