use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};

use beamwire_blob::LengthMode;

use crate::channel::{recv_variable_over, Channel, ChannelState};
use crate::error::{Result, TransportError};

/// Configuration for the in-process memory backend.
#[derive(Debug, Clone, Copy)]
pub struct MemoryConfig {
    /// When false, a starved receive reports `ShortRead` instead of waiting.
    pub blocking: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self { blocking: true }
    }
}

#[derive(Default)]
struct Queue {
    state: Mutex<QueueState>,
    ready: Condvar,
}

#[derive(Default)]
struct QueueState {
    bytes: VecDeque<u8>,
    closed: bool,
}

/// In-process hand-off between two pipeline stages. No OS boundary is
/// crossed; ordering is whatever the caller's own scheduling provides.
///
/// Always connected; `connect` is a no-op.
pub struct MemoryChannel {
    tx: Arc<Queue>,
    rx: Arc<Queue>,
    config: MemoryConfig,
    mode: LengthMode,
    state: ChannelState,
}

impl MemoryChannel {
    /// Create a connected duplex pair with default config.
    pub fn pair() -> (Self, Self) {
        Self::pair_with(MemoryConfig::default(), LengthMode::Natural)
    }

    /// Create a connected duplex pair with explicit config and length mode.
    pub fn pair_with(config: MemoryConfig, mode: LengthMode) -> (Self, Self) {
        let a = Arc::new(Queue::default());
        let b = Arc::new(Queue::default());
        let left = Self {
            tx: Arc::clone(&a),
            rx: Arc::clone(&b),
            config,
            mode,
            state: ChannelState::Connected,
        };
        let right = Self {
            tx: b,
            rx: a,
            config,
            mode,
            state: ChannelState::Connected,
        };
        (left, right)
    }

    fn drain(&self, buf: &mut [u8], wait: bool) -> Result<()> {
        let mut got = 0usize;
        let mut state = self.lock_queue(&self.rx);
        while got < buf.len() {
            while let Some(byte) = state.bytes.pop_front() {
                buf[got] = byte;
                got += 1;
                if got == buf.len() {
                    return Ok(());
                }
            }
            if state.closed || !wait {
                return Err(TransportError::ShortRead {
                    wanted: buf.len(),
                    got,
                });
            }
            state = self
                .rx
                .ready
                .wait(state)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
        Ok(())
    }

    fn lock_queue<'a>(&self, queue: &'a Queue) -> std::sync::MutexGuard<'a, QueueState> {
        queue
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Channel for MemoryChannel {
    fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    fn send_blocking(&mut self, bytes: &[u8]) -> Result<()> {
        if self.state != ChannelState::Connected {
            return Err(TransportError::NotConnected);
        }
        let mut state = self.lock_queue(&self.tx);
        if state.closed {
            return Err(TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "peer closed",
            )));
        }
        state.bytes.extend(bytes);
        self.tx.ready.notify_all();
        Ok(())
    }

    fn recv_blocking(&mut self, buf: &mut [u8]) -> Result<()> {
        if self.state != ChannelState::Connected {
            return Err(TransportError::NotConnected);
        }
        self.drain(buf, self.config.blocking)
    }

    fn recv_variable_blocking(&mut self) -> Result<Vec<u8>> {
        if self.state != ChannelState::Connected {
            return Err(TransportError::NotConnected);
        }
        let mode = self.mode;
        let blocking = self.config.blocking;
        recv_variable_over(mode, |buf| self.drain(buf, blocking))
    }

    fn state(&self) -> ChannelState {
        self.state
    }

    fn close(&mut self) {
        self.state = ChannelState::Closed;
        self.lock_queue(&self.tx).closed = true;
        self.tx.ready.notify_all();
        self.lock_queue(&self.rx).closed = true;
        self.rx.ready.notify_all();
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }

    /// True non-blocking receive: drains what is available and reports
    /// `ShortRead` instead of waiting. No degrade notice.
    fn recv_non_blocking(&mut self, buf: &mut [u8]) -> Result<()> {
        if self.state != ChannelState::Connected {
            return Err(TransportError::NotConnected);
        }
        self.drain(buf, false)
    }
}
