use tracing::{error, warn};

use beamwire_schema::{MessageBuffer, SchemaError};
use beamwire_transport::{Channel, TransportError};

/// Outcome of the last `write`/`read` cycle.
///
/// A value, not an exception: `Error` leaves the connection usable for a
/// caller-level retry. An errored cycle may leave the in-flight message
/// half-written; discard it. The consumer's materialized schema is never
/// corrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    Finished,
    Error,
}

/// What went wrong in an errored cycle.
#[derive(Debug, thiserror::Error)]
pub enum LinkFault {
    /// Operational: peer down, partition, short read. Retry or reconnect.
    #[error("transport fault: {0}")]
    Transport(#[from] TransportError),

    /// Programmer error: schema or protocol-version skew between the two
    /// ends. Retrying will not help.
    #[error("schema fault: {0}")]
    Schema(#[from] SchemaError),
}

/// One pipeline edge: a producer buffer, a consumer buffer, and the
/// channel between them.
///
/// The connection is driven synchronously by whichever thread calls
/// `write`/`read`; it never retries on its own. The channel backend owns
/// connect-retry policy, the caller owns message-retry policy.
pub struct Connection {
    producer: MessageBuffer,
    consumer: MessageBuffer,
    channel: Box<dyn Channel>,
    last_status: Status,
    last_fault: Option<LinkFault>,
}

impl Connection {
    /// Bind one producer/consumer pair to a channel.
    pub fn new(producer: MessageBuffer, consumer: MessageBuffer, channel: Box<dyn Channel>) -> Self {
        Self {
            producer,
            consumer,
            channel,
            last_status: Status::Finished,
            last_fault: None,
        }
    }

    /// Run the channel's handshake. Exhaustion of a bounded retry window
    /// propagates as a hard error, by contract.
    pub fn connect(&mut self) -> beamwire_transport::Result<()> {
        self.channel.connect()
    }

    /// The producer-side buffer (fill fields, then `write`).
    pub fn producer(&mut self) -> &mut MessageBuffer {
        &mut self.producer
    }

    /// The consumer-side buffer (read fields after a `read`).
    pub fn consumer(&self) -> &MessageBuffer {
        &self.consumer
    }

    /// Mutable consumer access (e.g. pre-sizing a variable field).
    pub fn consumer_mut(&mut self) -> &mut MessageBuffer {
        &mut self.consumer
    }

    /// The underlying channel.
    pub fn channel(&self) -> &dyn Channel {
        self.channel.as_ref()
    }

    /// Serialize the producer buffer and send it. Never throws; `Error`
    /// leaves the connection intact for the caller to decide.
    pub fn write(&mut self) -> Status {
        let result = self
            .producer
            .serialize()
            .map_err(LinkFault::from)
            .and_then(|bytes| {
                self.channel
                    .send_blocking(&bytes)
                    .map_err(LinkFault::from)
            });
        self.settle("write", result)
    }

    /// Receive one variable-length message and deserialize it into the
    /// consumer buffer.
    pub fn read(&mut self) -> Status {
        let result = self
            .channel
            .recv_variable_blocking()
            .map_err(LinkFault::from)
            .and_then(|bytes| self.consumer.deserialize(&bytes).map_err(LinkFault::from));
        self.settle("read", result)
    }

    /// Outcome of the most recent cycle.
    pub fn last_status(&self) -> Status {
        self.last_status
    }

    /// The fault behind the most recent `Error` status.
    pub fn last_fault(&self) -> Option<&LinkFault> {
        self.last_fault.as_ref()
    }

    fn settle(&mut self, op: &'static str, result: Result<(), LinkFault>) -> Status {
        self.last_status = match result {
            Ok(()) => {
                self.last_fault = None;
                Status::Finished
            }
            Err(fault) => {
                match &fault {
                    // Schema skew means the two ends disagree on the
                    // protocol; log loudly, it will not go away.
                    LinkFault::Schema(cause) => error!(op, %cause, "connection cycle failed"),
                    LinkFault::Transport(cause) => warn!(op, %cause, "connection cycle failed"),
                }
                self.last_fault = Some(fault);
                Status::Error
            }
        };
        self.last_status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beamwire_schema::{FieldDescriptor, PrimitiveKind, Schema};
    use beamwire_transport::{ChannelState, MemoryChannel};

    fn counter_schema() -> Schema {
        Schema::define(
            "tick",
            1,
            vec![FieldDescriptor::scalar("seq", PrimitiveKind::Uint64)],
        )
        .unwrap()
    }

    fn edge(schema: &Schema) -> (Connection, Connection) {
        let (left, right) = MemoryChannel::pair();
        let tx = Connection::new(
            MessageBuffer::materialize(schema.clone()),
            MessageBuffer::materialize(schema.clone()),
            Box::new(left),
        );
        let rx = Connection::new(
            MessageBuffer::materialize(schema.clone()),
            MessageBuffer::materialize(schema.clone()),
            Box::new(right),
        );
        (tx, rx)
    }

    #[test]
    fn write_read_cycle_finishes() {
        let schema = counter_schema();
        let (mut tx, mut rx) = edge(&schema);

        tx.producer().set("seq", 7u64).unwrap();
        assert_eq!(tx.write(), Status::Finished);
        assert_eq!(rx.read(), Status::Finished);
        assert_eq!(rx.consumer().get::<u64>("seq").unwrap(), 7);
        assert_eq!(rx.last_status(), Status::Finished);
        assert!(rx.last_fault().is_none());
    }

    #[test]
    fn transport_fault_reports_error_without_panicking() {
        let schema = counter_schema();
        let (left, _right) = MemoryChannel::pair();
        let mut closed = left;
        closed.close();

        let mut tx = Connection::new(
            MessageBuffer::materialize(schema.clone()),
            MessageBuffer::materialize(schema),
            Box::new(closed),
        );

        assert_eq!(tx.write(), Status::Error);
        assert!(matches!(
            tx.last_fault(),
            Some(LinkFault::Transport(_))
        ));
        // Connection stays usable; status is sticky until the next cycle.
        assert_eq!(tx.last_status(), Status::Error);
    }

    #[test]
    fn schema_skew_reports_error_and_preserves_consumer_schema() {
        let produce = counter_schema();
        let consume = Schema::define(
            "tick",
            2,
            vec![FieldDescriptor::scalar("seq", PrimitiveKind::Uint64)],
        )
        .unwrap();

        let (left, right) = MemoryChannel::pair();
        let mut tx = Connection::new(
            MessageBuffer::materialize(produce.clone()),
            MessageBuffer::materialize(produce),
            Box::new(left),
        );
        let mut rx = Connection::new(
            MessageBuffer::materialize(consume.clone()),
            MessageBuffer::materialize(consume.clone()),
            Box::new(right),
        );

        tx.producer().set("seq", 1u64).unwrap();
        assert_eq!(tx.write(), Status::Finished);
        assert_eq!(rx.read(), Status::Error);
        assert!(matches!(rx.last_fault(), Some(LinkFault::Schema(_))));
        // The consumer's materialized schema survives the skew.
        assert_eq!(rx.consumer().schema(), &consume);
    }

    #[test]
    fn channel_state_is_observable_through_the_connection() {
        let schema = counter_schema();
        let (tx, _rx) = edge(&schema);
        assert_eq!(tx.channel().state(), ChannelState::Connected);
    }
}
