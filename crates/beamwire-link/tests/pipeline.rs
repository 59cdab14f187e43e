//! End-to-end edge tests over the in-process memory backend.

use beamwire_link::{Connection, Status};
use beamwire_schema::{
    Complex32, ExtraStatus, FieldDescriptor, MessageBuffer, PrimitiveKind, Schema,
};
use beamwire_transport::MemoryChannel;

fn vis_schema() -> Schema {
    Schema::define(
        "vis.block",
        1,
        vec![
            FieldDescriptor::scalar("id", PrimitiveKind::Int32),
            FieldDescriptor::scalar("timestamp", PrimitiveKind::Float64),
            FieldDescriptor::array("vis", PrimitiveKind::Complex32, 4),
            FieldDescriptor::variable("payload", PrimitiveKind::Char, 3),
        ],
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
fn typed_fields_cross_the_edge() {
    let schema = vis_schema();
    let (mut tx, mut rx) = edge(&schema);

    tx.producer().set("id", 42i32).unwrap();
    tx.producer().set("timestamp", 60123.5f64).unwrap();
    tx.producer()
        .set_slice(
            "vis",
            &[
                Complex32::new(0.1, 0.2),
                Complex32::new(0.3, 0.4),
                Complex32::new(0.5, 0.6),
                Complex32::new(0.7, 0.8),
            ],
        )
        .unwrap();
    tx.producer().set_slice("payload", &[1u8, 2, 3]).unwrap();

    assert_eq!(tx.write(), Status::Finished);
    assert_eq!(rx.read(), Status::Finished);

    let consumer = rx.consumer();
    assert_eq!(consumer.get::<i32>("id").unwrap(), 42);
    assert_eq!(consumer.get::<f64>("timestamp").unwrap(), 60123.5);
    assert_eq!(consumer.get_vec::<u8>("payload").unwrap(), vec![1, 2, 3]);
}

#[test]
fn repeated_messages_reuse_the_materialized_buffer() {
    let schema = vis_schema();
    let (mut tx, mut rx) = edge(&schema);

    for seq in 0..16i32 {
        tx.producer().set("id", seq).unwrap();
        assert_eq!(tx.write(), Status::Finished);
        assert_eq!(rx.read(), Status::Finished);
        assert_eq!(rx.consumer().get::<i32>("id").unwrap(), seq);
    }
}

#[test]
fn variable_field_growth_crosses_the_edge() {
    let schema = vis_schema();
    let (mut tx, mut rx) = edge(&schema);

    // Consumer starts with the 3-byte hint; producer grows mid-stream.
    let big: Vec<u8> = (0..=255).collect();
    tx.producer().set_slice("payload", big.as_slice()).unwrap();
    assert_eq!(tx.write(), Status::Finished);
    assert_eq!(rx.read(), Status::Finished);
    assert_eq!(rx.consumer().get_vec::<u8>("payload").unwrap(), big);

    // And shrinks again.
    tx.producer().set_slice("payload", &[9u8]).unwrap();
    assert_eq!(tx.write(), Status::Finished);
    assert_eq!(rx.read(), Status::Finished);
    assert_eq!(rx.consumer().get_vec::<u8>("payload").unwrap(), vec![9]);
}

#[test]
fn extra_blob_omission_protocol_over_the_wire() {
    let schema = vis_schema();
    let (mut tx, mut rx) = edge(&schema);

    let annotate = |writer: &mut beamwire_blob::BlobWriter<beamwire_blob::MemSink>| {
        writer.put_start("annotation", 1)?;
        writer.put_string("ionosphere flagged")?;
        writer.put_end()?;
        Ok(())
    };

    // First send carries the extra.
    tx.producer().set_extra(annotate).unwrap();
    assert_eq!(tx.write(), Status::Finished);
    assert_eq!(rx.read(), Status::Finished);
    assert_eq!(rx.consumer().extra_status(), ExtraStatus::New);
    let (version, mut reader) = rx.consumer().extra().unwrap();
    assert_eq!(version, 1);
    reader.get_start("annotation").unwrap();
    assert_eq!(reader.get_string().unwrap(), "ionosphere flagged");

    // Identical extra content: second receive reports "unchanged".
    tx.producer().set_extra(annotate).unwrap();
    assert_eq!(tx.write(), Status::Finished);
    assert_eq!(rx.read(), Status::Finished);
    assert_eq!(rx.consumer().extra_status(), ExtraStatus::Unchanged);
    assert!(rx.consumer().extra().is_none());

    // Cleared extra: third receive reports "absent".
    tx.producer().clear_extra();
    assert_eq!(tx.write(), Status::Finished);
    assert_eq!(rx.read(), Status::Finished);
    assert_eq!(rx.consumer().extra_status(), ExtraStatus::Absent);
}

#[test]
fn length_header_matches_rescanned_bytes() {
    // Re-scan the raw wire bytes of a serialized message and confirm the
    // declared byte_length covers header plus body exactly.
    let schema = vis_schema();
    let mut buffer = MessageBuffer::materialize(schema);
    buffer.set("id", 5i32).unwrap();
    let wire = buffer.serialize().unwrap();

    let head =
        beamwire_blob::header::parse_header(beamwire_blob::LengthMode::Natural, &wire).unwrap();
    assert_eq!(head.tag, "vis.block");
    assert_eq!(head.byte_length, wire.len() as u64);
}
