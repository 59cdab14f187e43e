//! Minimal pipeline edge: a producer and consumer exchange typed
//! messages over the in-process memory backend.
//!
//! Run with:
//!   cargo run --example memory-edge

use beamwire_link::{Connection, Status};
use beamwire_schema::{FieldDescriptor, MessageBuffer, PrimitiveKind, Schema};
use beamwire_transport::MemoryChannel;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let schema = Schema::define(
        "demo.sample",
        1,
        vec![
            FieldDescriptor::scalar("seq", PrimitiveKind::Uint32),
            FieldDescriptor::variable("samples", PrimitiveKind::Float32, 4),
        ],
    )?;

    let (left, right) = MemoryChannel::pair();
    let mut tx = Connection::new(
        MessageBuffer::materialize(schema.clone()),
        MessageBuffer::materialize(schema.clone()),
        Box::new(left),
    );
    let mut rx = Connection::new(
        MessageBuffer::materialize(schema.clone()),
        MessageBuffer::materialize(schema),
        Box::new(right),
    );

    for seq in 0..4u32 {
        let samples: Vec<f32> = (0..=seq).map(|i| i as f32 * 0.5).collect();
        tx.producer().set("seq", seq)?;
        tx.producer().set_slice("samples", &samples)?;

        assert_eq!(tx.write(), Status::Finished);
        assert_eq!(rx.read(), Status::Finished);

        eprintln!(
            "received seq={} samples={:?}",
            rx.consumer().get::<u32>("seq")?,
            rx.consumer().get_vec::<f32>("samples")?
        );
    }

    Ok(())
}
