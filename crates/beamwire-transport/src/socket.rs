use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::time::Duration;

use tracing::{debug, info};

use beamwire_blob::LengthMode;

use crate::channel::{recv_variable_over, Channel, ChannelState};
use crate::error::{Result, TransportError};

/// Which endpoint of the edge acts as the TCP server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Sender,
    Receiver,
}

/// Configuration for the TCP socket backend.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// Host the sending endpoint lives on.
    pub send_host: String,
    /// Host the receiving endpoint lives on.
    pub recv_host: String,
    pub port: u16,
    /// Which side binds and accepts; the other side dials.
    pub server_side: Role,
    /// Bounded attempt count for the dialing side.
    pub connect_attempts: u32,
    /// Fixed sleep between dial attempts.
    pub connect_retry: Duration,
    /// Shorter sleep between accept polls. The accept side has no bound.
    pub accept_poll: Duration,
}

impl SocketConfig {
    /// Config for one edge between two hosts.
    pub fn new(send_host: &str, recv_host: &str, port: u16, server_side: Role) -> Self {
        Self {
            send_host: send_host.to_string(),
            recv_host: recv_host.to_string(),
            port,
            server_side,
            connect_attempts: 60,
            connect_retry: Duration::from_millis(500),
            accept_poll: Duration::from_millis(50),
        }
    }

    /// Address the server side listens on, which the client side dials.
    fn server_addr(&self) -> String {
        let host = match self.server_side {
            Role::Sender => &self.send_host,
            Role::Receiver => &self.recv_host,
        };
        format!("{host}:{}", self.port)
    }
}

/// TCP point-to-point backend.
///
/// One side is the server (binds and accepts), the other the client
/// (dials). The retry policy is asymmetric by design: the client gives up
/// after a bounded attempt count (a hard, fatal error) while the server
/// polls accept forever with a shorter sleep.
pub struct SocketChannel {
    config: SocketConfig,
    role: Role,
    mode: LengthMode,
    state: ChannelState,
    stream: Option<TcpStream>,
}

impl SocketChannel {
    /// The sending endpoint of an edge.
    pub fn sender(config: SocketConfig) -> Self {
        Self::endpoint(config, Role::Sender)
    }

    /// The receiving endpoint of an edge.
    pub fn receiver(config: SocketConfig) -> Self {
        Self::endpoint(config, Role::Receiver)
    }

    fn endpoint(config: SocketConfig, role: Role) -> Self {
        Self {
            config,
            role,
            mode: LengthMode::Natural,
            state: ChannelState::Disconnected,
            stream: None,
        }
    }

    /// Override the length-header mode (must match the peer's).
    pub fn with_mode(mut self, mode: LengthMode) -> Self {
        self.mode = mode;
        self
    }

    fn is_server(&self) -> bool {
        self.role == self.config.server_side
    }

    /// Bind and poll accept until a peer arrives. No bound, by contract.
    fn accept_peer(&self) -> Result<TcpStream> {
        let addr = self.config.server_addr();
        let listener = TcpListener::bind(&addr).map_err(|source| TransportError::Bind {
            addr: addr.clone(),
            source,
        })?;
        listener.set_nonblocking(true)?;
        info!(%addr, "listening for peer");

        loop {
            match listener.accept() {
                Ok((stream, peer)) => {
                    debug!(%peer, "accepted peer connection");
                    stream.set_nonblocking(false)?;
                    return Ok(stream);
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    std::thread::sleep(self.config.accept_poll);
                }
                Err(err) => return Err(TransportError::Accept(err)),
            }
        }
    }

    /// Dial with a bounded attempt count and a fixed sleep between tries.
    fn dial_peer(&self) -> Result<TcpStream> {
        let addr = self.config.server_addr();
        for attempt in 1..=self.config.connect_attempts {
            match TcpStream::connect(&addr) {
                Ok(stream) => {
                    debug!(%addr, attempt, "connected to peer");
                    return Ok(stream);
                }
                Err(err) => {
                    debug!(%addr, attempt, %err, "connect attempt failed");
                    if attempt < self.config.connect_attempts {
                        std::thread::sleep(self.config.connect_retry);
                    }
                }
            }
        }
        Err(TransportError::ConnectExhausted {
            attempts: self.config.connect_attempts,
            addr,
        })
    }

    fn stream_mut(&mut self) -> Result<&mut TcpStream> {
        self.stream.as_mut().ok_or(TransportError::NotConnected)
    }

    fn recv_exact(stream: &mut TcpStream, buf: &mut [u8]) -> Result<()> {
        let mut got = 0usize;
        while got < buf.len() {
            match stream.read(&mut buf[got..]) {
                Ok(0) => {
                    return Err(TransportError::ShortRead {
                        wanted: buf.len(),
                        got,
                    })
                }
                Ok(n) => got += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
        Ok(())
    }
}

impl Channel for SocketChannel {
    fn connect(&mut self) -> Result<()> {
        if self.state == ChannelState::Connected {
            return Ok(());
        }
        self.state = ChannelState::Connecting;

        let result = if self.is_server() {
            self.accept_peer()
        } else {
            self.dial_peer()
        };

        match result {
            Ok(stream) => {
                stream.set_nodelay(true).ok();
                self.stream = Some(stream);
                self.state = ChannelState::Connected;
                info!(
                    addr = %self.config.server_addr(),
                    server = self.is_server(),
                    "socket channel connected"
                );
                Ok(())
            }
            Err(err) => {
                self.state = ChannelState::Disconnected;
                Err(err)
            }
        }
    }

    fn send_blocking(&mut self, bytes: &[u8]) -> Result<()> {
        let stream = self.stream_mut()?;
        stream
            .write_all(bytes)
            .and_then(|()| stream.flush())
            .map_err(TransportError::SendFailed)
    }

    fn recv_blocking(&mut self, buf: &mut [u8]) -> Result<()> {
        let stream = self.stream_mut()?;
        Self::recv_exact(stream, buf)
    }

    fn recv_variable_blocking(&mut self) -> Result<Vec<u8>> {
        let mode = self.mode;
        let stream = self.stream_mut()?;
        recv_variable_over(mode, |buf| Self::recv_exact(stream, buf))
    }

    fn state(&self) -> ChannelState {
        self.state
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
        self.state = ChannelState::Closed;
    }

    fn backend_name(&self) -> &'static str {
        "socket"
    }
}
