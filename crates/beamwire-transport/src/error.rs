/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The bounded client connect-retry window ran out. Fatal by contract.
    #[error("connect to {addr} exhausted after {attempts} attempts")]
    ConnectExhausted { attempts: u32, addr: String },

    /// Fewer bytes were available than requested and the backend has no
    /// way to block further.
    #[error("short read ({got} of {wanted} bytes)")]
    ShortRead { wanted: usize, got: usize },

    /// The backend failed to transmit.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Failed to bind the listening endpoint.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to establish the outgoing connection.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// The channel is not in the `Connected` state.
    #[error("channel is not connected")]
    NotConnected,

    /// The operation is not available on this backend.
    #[error("unsupported by this backend: {0}")]
    Unsupported(&'static str),

    /// A message does not divide into whole raw frames.
    #[error("message size {size} is not a whole multiple of the frame payload ({frame} bytes)")]
    FrameGranularity { size: usize, frame: usize },

    /// The peer sent a malformed length prefix.
    #[error("malformed length prefix: {0}")]
    Probe(#[from] beamwire_blob::BlobError),

    /// An I/O error occurred on the transport.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
