use prometheus::Counter;

/// Process counters, registered with the default prometheus registry.
/// Constructed once at startup and passed to the subsystems that bump
/// them; tests substitute `None`.
pub struct Metrics {
    pub msgs_received: Counter,
    pub msgs_delivered: Counter,
    pub msgs_discarded: Counter,
    pub produce_requests: Counter,
    pub produce_request_failures: Counter,
    pub metadata_updates: Counter,
    pub broker_reconnects: Counter,
}

impl Metrics {
    pub fn new() -> ::prometheus::Result<Metrics> {
        Ok(Metrics {
               msgs_received: register_counter!("dory_msgs_received",
                                                "Messages accepted from local producers")?,
               msgs_delivered: register_counter!("dory_msgs_delivered",
                                                 "Messages acknowledged by a broker")?,
               msgs_discarded: register_counter!("dory_msgs_discarded",
                                                 "Messages discarded for any reason")?,
               produce_requests: register_counter!("dory_produce_requests",
                                                   "Produce requests sent to brokers")?,
               produce_request_failures:
                   register_counter!("dory_produce_request_failures",
                                     "Produce requests that failed or timed out")?,
               metadata_updates: register_counter!("dory_metadata_updates",
                                                   "Metadata snapshot replacements")?,
               broker_reconnects: register_counter!("dory_broker_reconnects",
                                                    "Broker reconnect attempts")?,
           })
    }
}
