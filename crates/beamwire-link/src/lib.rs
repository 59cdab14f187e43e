//! Producer/consumer connections over one transport channel.
//!
//! A [`Connection`] binds exactly one producer [`MessageBuffer`], one
//! consumer [`MessageBuffer`], and one [`Channel`] instance, one per
//! pipeline edge. `write` and `read` drive blocking transfer cycles and
//! report a [`Status`] instead of propagating operational failures, so
//! the caller's pipeline logic decides whether to retry, reconnect, or
//! tear the edge down.
//!
//! [`MessageBuffer`]: beamwire_schema::MessageBuffer
//! [`Channel`]: beamwire_transport::Channel

pub mod connection;

pub use connection::{Connection, LinkFault, Status};
