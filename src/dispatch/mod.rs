mod chooser;
mod pause;
mod in_flight;
mod factory;
mod connector;

pub use self::chooser::AnyPartitionChooser;
pub use self::connector::{Connector, ConnectorEvent, ConnectorHandle, ConnectorState,
                          CorrelatedOutcome, correlate_response};
pub use self::factory::{BuiltRequest, ProduceRequestFactory};
pub use self::in_flight::{InFlightRequest, InFlightTable};
pub use self::pause::PauseRateLimiter;

use msg::Msg;
use protocol::PartitionId;

/// Messages destined for one `(topic, partition)` slot of a produce
/// request.  Kept from serialization until the response is correlated so
/// a failed slot can be re-queued or discarded as a unit.
#[derive(Debug)]
pub struct MsgSetGroup {
    pub topic: String,
    pub partition: PartitionId,
    pub msgs: Vec<Msg>,
}
