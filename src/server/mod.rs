use std::sync::Arc;
use std::sync::mpsc::{SyncSender, TrySendError};

use conf::{ResolvedConf, Settings};
use debug::DebugSink;
use discard::{DiscardReason, DiscardRecord, DiscardSink, discard_msg, wall_clock_ms};
use errors::Result;
use ingest::{decode_frame, discard_reason_for};
use metrics::Metrics;
use msg::Msg;
use pool::BufferPool;
use router::{Router, RouterEvent, RouterHandle, ShutdownMode};

/// The assembled forwarding engine: buffer pool, router thread, and the
/// dispatchers the router manages.  Local IPC listeners hand frames (or
/// already-admitted messages) in through this; the shutdown orchestrator
/// lives here too.
pub struct DoryServer {
    settings: Settings,
    pool: Arc<BufferPool>,
    router: RouterHandle,
    ingest_tx: SyncSender<RouterEvent>,
    discard_sink: Arc<DiscardSink>,
}

impl DoryServer {
    pub fn start(settings: Settings,
                 conf: ResolvedConf,
                 discard_sink: Arc<DiscardSink>,
                 debug_sink: Arc<DebugSink>,
                 metrics: Option<Arc<Metrics>>)
                 -> Result<DoryServer> {
        let pool = BufferPool::new(settings.pool_block_size, settings.pool_block_count);

        let router = Router::spawn(settings.clone(),
                                   conf,
                                   discard_sink.clone(),
                                   debug_sink,
                                   metrics)?;
        let ingest_tx = router.sender();

        Ok(DoryServer {
               settings: settings,
               pool: pool,
               router: router,
               ingest_tx: ingest_tx,
               discard_sink: discard_sink,
           })
    }

    /// The pool local listeners draw message storage from.
    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    /// Queue handle for listeners that build messages themselves.
    pub fn ingest_sender(&self) -> SyncSender<RouterEvent> {
        self.ingest_tx.clone()
    }

    /// Admit one local datagram frame.
    ///
    /// Decode failures and pool exhaustion each produce exactly one
    /// discard record and never disturb the pipeline; a full ingest
    /// queue is admission-controlled the same way.
    pub fn ingest_frame(&self, frame: &[u8]) {
        let decoded = match decode_frame(frame) {
            Ok(decoded) => decoded,
            Err(err) => {
                debug!("rejecting local frame: {}", err);
                self.discard_sink
                    .discard(DiscardRecord {
                                 topic: String::new(),
                                 reason: discard_reason_for(&err),
                                 timestamp: wall_clock_ms(),
                                 msg_identity: Vec::new(),
                             });
                return;
            }
        };

        let msg = match decoded.to_msg(&self.pool) {
            Some(msg) => msg,
            None => {
                self.discard_sink
                    .discard(DiscardRecord {
                                 topic: decoded.topic.to_owned(),
                                 reason: DiscardReason::NoBufferSpace,
                                 timestamp: wall_clock_ms(),
                                 msg_identity: Vec::new(),
                             });
                return;
            }
        };

        self.submit(msg);
    }

    /// Queue an already-admitted message, shedding on backpressure.
    pub fn submit(&self, msg: Msg) {
        match self.ingest_tx.try_send(RouterEvent::Ingest(msg)) {
            Ok(()) => {}
            Err(TrySendError::Full(RouterEvent::Ingest(msg))) |
            Err(TrySendError::Disconnected(RouterEvent::Ingest(msg))) => {
                discard_msg(&*self.discard_sink, msg, DiscardReason::NoBufferSpace);
            }
            Err(_) => {}
        }
    }

    /// Stop the engine.  Graceful mode drains the batchers and waits for
    /// outstanding acks up to the configured shutdown delay; fast mode
    /// stops after in-flight resolution.  Either way every remaining
    /// message gets its terminal discard record before this returns.
    pub fn shutdown(self, mode: ShutdownMode) {
        info!("shutdown requested ({:?}), draining up to {:?}",
              mode,
              self.settings.shutdown_max_delay);

        self.router.request_shutdown(mode);
        self.router.join();
    }
}

#[cfg(test)]
mod tests {
    use bytes::{BigEndian, BytesMut};

    use super::*;
    use discard::CapturingDiscardSink;
    use ingest::write_frame;
    use msg::MsgRouting;

    fn tiny_settings() -> Settings {
        Settings {
            pool_block_size: 256,
            pool_block_count: 4,
            // park unroutable messages instead of discarding them, so
            // pool accounting in these tests is deterministic
            topic_autocreate: true,
            kafka_socket_timeout: ::std::time::Duration::from_millis(200),
            ..Settings::default()
        }
    }

    fn resolved_conf() -> ResolvedConf {
        ::conf::Conf::from_str(r#"{"initialBrokers": [{"host": "127.0.0.1", "port": 1}]}"#)
            .unwrap()
            .resolve()
            .unwrap()
    }

    fn make_frame(value: &[u8]) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(value.len() + 64);

        write_frame::<BigEndian>(&mut buf, MsgRouting::AnyPartition, "t", 0, b"", value)
            .unwrap();

        buf.to_vec()
    }

    #[test]
    fn test_malformed_frame_is_discarded_and_listener_survives() {
        let _ = ::pretty_env_logger::init();

        let sink = Arc::new(CapturingDiscardSink::default());
        let server = DoryServer::start(tiny_settings(),
                                       resolved_conf(),
                                       sink.clone(),
                                       Arc::new(::debug::NoopDebugSink),
                                       None)
                .unwrap();

        let mut bad = make_frame(b"v");
        let actual = bad.len() as i32 - 1;
        bad[0] = (actual >> 24) as u8;
        bad[1] = (actual >> 16) as u8;
        bad[2] = (actual >> 8) as u8;
        bad[3] = actual as u8;

        server.ingest_frame(&bad);

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].reason, DiscardReason::MalformedMsg);

        // subsequent well-formed frames still go through admission
        server.ingest_frame(&make_frame(b"v"));
        assert_eq!(sink.records().len(), 1);

        server.shutdown(ShutdownMode::Fast);
    }

    #[test]
    fn test_pool_exhaustion_discards_with_no_buffer_space() {
        let sink = Arc::new(CapturingDiscardSink::default());
        let server = DoryServer::start(tiny_settings(),
                                       resolved_conf(),
                                       sink.clone(),
                                       Arc::new(::debug::NoopDebugSink),
                                       None)
                .unwrap();

        // each frame takes one 256-byte block; the pool holds four
        let frame = make_frame(&[b'x'; 200]);

        for _ in 0..5 {
            server.ingest_frame(&frame);
        }

        let reasons: Vec<DiscardReason> =
            sink.records().iter().map(|record| record.reason).collect();

        assert_eq!(reasons
                       .iter()
                       .filter(|&&reason| reason == DiscardReason::NoBufferSpace)
                       .count(),
                   1);

        server.shutdown(ShutdownMode::Fast);
    }
}
