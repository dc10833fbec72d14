use msg::Msg;

/// Seam to the debug-trace subsystem.  The engine reports at exactly
/// three points in a message's life; what happens with the events (file
/// capture, counters, nothing) is the implementation's business.
pub trait DebugSink: Send + Sync {
    /// The router accepted the message from an ingest listener.
    fn on_receive(&self, msg: &Msg);

    /// A dispatcher wrote the message into a produce request.
    fn on_send(&self, msg: &Msg);

    /// The broker acknowledged the message.
    fn on_ack(&self, msg: &Msg);
}

/// Sink used when tracing is disabled.
pub struct NoopDebugSink;

impl DebugSink for NoopDebugSink {
    fn on_receive(&self, _msg: &Msg) {}

    fn on_send(&self, _msg: &Msg) {}

    fn on_ack(&self, _msg: &Msg) {}
}

/// Sink that emits one trace line per event.
pub struct LoggingDebugSink;

impl DebugSink for LoggingDebugSink {
    fn on_receive(&self, msg: &Msg) {
        trace!("received: {:?}", msg);
    }

    fn on_send(&self, msg: &Msg) {
        trace!("sending: {:?}", msg);
    }

    fn on_ack(&self, msg: &Msg) {
        trace!("acked: {:?}", msg);
    }
}
