//! Edge tests over the TCP socket backend.

use std::time::{Duration, Instant};

use beamwire_link::{Connection, Status};
use beamwire_schema::{FieldDescriptor, MessageBuffer, PrimitiveKind, Schema};
use beamwire_transport::{Role, SocketChannel, SocketConfig, TransportError};

fn sample_schema() -> Schema {
    Schema::define(
        "cal.sample",
        1,
        vec![
            FieldDescriptor::scalar("antenna", PrimitiveKind::Uint32),
            FieldDescriptor::variable("spectrum", PrimitiveKind::Float32, 8),
        ],
    )
    .unwrap()
}

fn connection(schema: &Schema, channel: SocketChannel) -> Connection {
    Connection::new(
        MessageBuffer::materialize(schema.clone()),
        MessageBuffer::materialize(schema.clone()),
        Box::new(channel),
    )
}

#[test]
fn edge_over_tcp_loopback() {
    let schema = sample_schema();
    let config = SocketConfig::new("127.0.0.1", "127.0.0.1", 40950, Role::Receiver);

    let server_schema = schema.clone();
    let server_config = config.clone();
    let server = std::thread::spawn(move || {
        let mut rx = connection(&server_schema, SocketChannel::receiver(server_config));
        rx.connect().unwrap();

        assert_eq!(rx.read(), Status::Finished);
        let antenna = rx.consumer().get::<u32>("antenna").unwrap();
        let spectrum = rx.consumer().get_vec::<f32>("spectrum").unwrap();
        (antenna, spectrum)
    });

    let mut tx = connection(&schema, SocketChannel::sender(config));
    tx.connect().unwrap();
    tx.producer().set("antenna", 33u32).unwrap();
    tx.producer()
        .set_slice("spectrum", &[0.5f32, 1.5, 2.5])
        .unwrap();
    assert_eq!(tx.write(), Status::Finished);

    let (antenna, spectrum) = server.join().unwrap();
    assert_eq!(antenna, 33);
    assert_eq!(spectrum, vec![0.5, 1.5, 2.5]);
}

#[test]
fn connect_exhaustion_is_fatal_and_bounded() {
    let schema = sample_schema();
    let mut config = SocketConfig::new("127.0.0.1", "127.0.0.1", 40951, Role::Receiver);
    config.connect_attempts = 4;
    config.connect_retry = Duration::from_millis(5);

    // The sender dials the receiver side; nothing listens there.
    let mut tx = connection(&schema, SocketChannel::sender(config));
    let started = Instant::now();
    let err = tx.connect().unwrap_err();

    assert!(matches!(
        err,
        TransportError::ConnectExhausted { attempts: 4, .. }
    ));
    // attempts x fixed sleep, with generous headroom.
    assert!(started.elapsed() < Duration::from_secs(2));
}
