use tracing::warn;

use beamwire_blob::{probe, BlobError, LengthMode};

use crate::error::{Result, TransportError};

/// Connection lifecycle of one channel endpoint. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
    Closed,
}

/// One directed or duplex raw-byte transport endpoint.
///
/// A channel is created per pipeline edge and is not shared across edges.
/// The blocking variants are the semantically real contract; the
/// non-blocking defaults degrade to them and emit a compatibility notice
/// so callers (and tests) can detect that a supposedly non-blocking path
/// actually blocked.
pub trait Channel: Send {
    /// Backend-specific handshake. Exhausting a bounded retry window is a
    /// hard error; the caller must not retry `connect` itself.
    fn connect(&mut self) -> Result<()>;

    /// Transfer the whole message.
    fn send_blocking(&mut self, bytes: &[u8]) -> Result<()>;

    /// Fill `buf` exactly; `ShortRead` if the backend cannot block for more.
    fn recv_blocking(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Receive a message whose size is not known in advance: read the
    /// fixed-size length prefix, size the destination, read the remainder.
    fn recv_variable_blocking(&mut self) -> Result<Vec<u8>>;

    /// Current connection state.
    fn state(&self) -> ChannelState;

    /// Tear down the endpoint. Terminal.
    fn close(&mut self);

    /// Backend name for diagnostics.
    fn backend_name(&self) -> &'static str;

    /// Default: degrades to [`send_blocking`](Channel::send_blocking).
    fn send_non_blocking(&mut self, bytes: &[u8]) -> Result<()> {
        warn!(
            backend = self.backend_name(),
            "send_non_blocking degrades to the blocking variant on this backend"
        );
        self.send_blocking(bytes)
    }

    /// Default: degrades to [`recv_blocking`](Channel::recv_blocking).
    fn recv_non_blocking(&mut self, buf: &mut [u8]) -> Result<()> {
        warn!(
            backend = self.backend_name(),
            "recv_non_blocking degrades to the blocking variant on this backend"
        );
        self.recv_blocking(buf)
    }
}

/// Shared variable-receive driver for stream-shaped backends: probe the
/// tag-length prefix, complete the header, size the message buffer from
/// the header's `byte_length`, then read the body.
pub(crate) fn recv_variable_over<F>(mode: LengthMode, mut recv_exact: F) -> Result<Vec<u8>>
where
    F: FnMut(&mut [u8]) -> Result<()>,
{
    let mut prefix = [0u8; probe::PREFIX_LEN];
    recv_exact(&mut prefix)?;

    let rest = probe::rest_len(mode, prefix)?;
    let mut head = vec![0u8; probe::PREFIX_LEN + rest];
    head[..probe::PREFIX_LEN].copy_from_slice(&prefix);
    recv_exact(&mut head[probe::PREFIX_LEN..])?;

    let total = probe::total_len(mode, &head)? as usize;
    if total < head.len() {
        return Err(TransportError::Probe(BlobError::LengthMismatch {
            declared: total as u64,
            consumed: head.len() as u64,
        }));
    }

    let mut message = vec![0u8; total];
    message[..head.len()].copy_from_slice(&head);
    recv_exact(&mut message[head.len()..])?;
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variable_receive_sizes_destination_from_header() {
        use beamwire_blob::{BlobWriter, MemSink};

        let mut writer = BlobWriter::new(MemSink::default(), LengthMode::Natural);
        writer.put_start("probe.test", 1).unwrap();
        writer.put_slice(&[9u32, 8, 7, 6]).unwrap();
        writer.put_end().unwrap();
        let wire = writer.finish().unwrap().into_bytes();

        let mut cursor = 0usize;
        let out = recv_variable_over(LengthMode::Natural, |buf: &mut [u8]| {
            buf.copy_from_slice(&wire[cursor..cursor + buf.len()]);
            cursor += buf.len();
            Ok(())
        })
        .unwrap();

        assert_eq!(out.len(), wire.len());
        assert_eq!(out.as_slice(), wire.as_ref());
    }

    #[test]
    fn variable_receive_rejects_an_undersized_length() {
        // A header whose byte_length is smaller than the header itself.
        let mut head = Vec::new();
        head.extend_from_slice(&2u32.to_ne_bytes());
        head.extend_from_slice(b"ab");
        head.extend_from_slice(&1i32.to_ne_bytes());
        head.extend_from_slice(&3u32.to_ne_bytes());

        let mut cursor = 0usize;
        let result = recv_variable_over(LengthMode::Natural, |buf: &mut [u8]| {
            buf.copy_from_slice(&head[cursor..cursor + buf.len()]);
            cursor += buf.len();
            Ok(())
        });
        assert!(matches!(result, Err(TransportError::Probe(_))));
    }
}
