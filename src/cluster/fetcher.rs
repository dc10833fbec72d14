use std::time::Duration;

use bytes::{BigEndian, BytesMut};

use cluster::Metadata;
use errors::{KafkaCode, Result};
use net::KafkaConnection;
use protocol::{ApiKeys, CorrelationId, MetadataRequest, MetadataResponseReader, RequestHeader,
               frame_request};

/// Fetches a fresh metadata snapshot from one broker over a short-lived
/// connection.  Owned by the router thread, which decides when to
/// refresh and which broker to ask.
pub struct MetadataFetcher {
    client_id: String,
    socket_timeout: Duration,
    max_response_size: usize,
    correlation_id: CorrelationId,
}

impl MetadataFetcher {
    pub fn new(client_id: &str,
               socket_timeout: Duration,
               max_response_size: usize)
               -> MetadataFetcher {
        MetadataFetcher {
            client_id: client_id.to_owned(),
            socket_timeout: socket_timeout,
            max_response_size: max_response_size,
            correlation_id: 0,
        }
    }

    /// Request metadata from the broker at `addr`.  An empty
    /// `topic_names` list asks for all topics; a single-topic list is
    /// how topic auto-creation is triggered.
    pub fn fetch(&mut self,
                 addr: &str,
                 topic_names: &[String],
                 generation: u64)
                 -> Result<Metadata> {
        debug!("fetching metadata from {} for topics {:?}", addr, topic_names);

        let mut connection =
            KafkaConnection::connect(addr, self.socket_timeout, self.max_response_size)?;

        let request = MetadataRequest {
            header: RequestHeader {
                api_key: ApiKeys::Metadata as i16,
                api_version: 0,
                correlation_id: self.next_correlation_id(),
                client_id: Some(self.client_id.clone().into()),
            },
            topic_names: topic_names.to_vec(),
        };

        let mut buf = BytesMut::with_capacity(64);

        frame_request::<BigEndian, _>(&mut buf, |buf| request.encode::<BigEndian>(buf))?;

        connection.send_frame(&buf)?;

        let body = connection.recv_frame()?;

        metadata_from_response(&body, generation)
    }

    fn next_correlation_id(&mut self) -> CorrelationId {
        self.correlation_id = self.correlation_id.wrapping_add(1);
        self.correlation_id - 1
    }
}

/// Walk a metadata response body and build the immutable snapshot.
///
/// A partition counts as in service when its error code still
/// acknowledges writes and it has a resolvable leader; everything else
/// stays visible but unroutable.
pub fn metadata_from_response(body: &[u8], generation: u64) -> Result<Metadata> {
    let mut reader = MetadataResponseReader::new(body)?;
    let mut builder = Metadata::builder(generation);

    while let Some(broker) = reader.next_broker()? {
        builder.add_broker(broker.node_id, &broker.host, broker.port)?;
    }

    builder.close_broker_list();

    while let Some(topic) = reader.next_topic()? {
        if KafkaCode::from_wire(topic.error_code) != KafkaCode::None {
            debug!("metadata reports error code {} for topic `{}`",
                   topic.error_code,
                   topic.topic_name);
        }

        builder.open_topic(&topic.topic_name)?;

        while let Some(partition) = reader.next_partition_in_topic()? {
            let code = KafkaCode::from_wire(partition.error_code);
            let in_service = code.is_ack() && partition.leader_id >= 0;

            builder.add_partition(partition.partition_id,
                                  partition.leader_id,
                                  in_service,
                                  partition.error_code)?;
        }

        builder.close_topic()?;
    }

    builder.build()
}
