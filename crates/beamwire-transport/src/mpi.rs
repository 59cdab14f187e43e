use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::channel::{Channel, ChannelState};
use crate::error::{Result, TransportError};

/// An MPI rank.
pub type Rank = i32;

/// Point-to-point binding to whatever MPI library the deployment links.
///
/// The channel layer owns the messaging semantics (serialized sends,
/// probe-then-receive); this trait is only the rank-to-rank byte plumbing.
/// Tests substitute instrumented fakes; single-process bring-up uses
/// [`LoopbackMpiRuntime`].
pub trait MpiRuntime: Send + Sync {
    /// Send one message from `source` to `target`.
    fn send(&self, source: Rank, target: Rank, tag: i32, bytes: &[u8]) -> Result<()>;

    /// Block until a message from `source` to `target` is available and
    /// return its size, without consuming it.
    fn probe(&self, source: Rank, target: Rank, tag: i32) -> Result<usize>;

    /// Receive the probed message into `buf` (sized by a prior `probe`).
    fn recv(&self, source: Rank, target: Rank, tag: i32, buf: &mut [u8]) -> Result<()>;
}

/// The process-wide send lock shared by every [`MpiChannel`].
///
/// The underlying MPI runtime is not assumed thread-safe, so all sends in
/// one process serialize through one of these. It is an explicit,
/// reference-counted object injected at channel construction rather than a
/// hidden global, so tests can hand every channel the same instance and
/// assert contention behavior.
#[derive(Clone, Default)]
pub struct MpiSendLock {
    inner: Arc<Mutex<()>>,
}

impl MpiSendLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter the send critical section.
    pub fn acquire(&self) -> MutexGuard<'_, ()> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Configuration for one rank-to-rank edge.
#[derive(Debug, Clone, Copy)]
pub struct MpiConfig {
    pub source_rank: Rank,
    pub target_rank: Rank,
    /// MPI message tag; one tag per edge keeps edges independent.
    pub tag: i32,
}

/// MPI point-to-point backend.
///
/// Sends serialize through the shared [`MpiSendLock`]; receives probe for
/// the incoming message size first, so the destination buffer never
/// under-allocates.
pub struct MpiChannel {
    runtime: Arc<dyn MpiRuntime>,
    lock: MpiSendLock,
    config: MpiConfig,
    state: ChannelState,
}

impl MpiChannel {
    /// Bind an edge to a runtime. Every channel in the process must share
    /// the same `lock`.
    pub fn new(runtime: Arc<dyn MpiRuntime>, lock: MpiSendLock, config: MpiConfig) -> Self {
        Self {
            runtime,
            lock,
            config,
            state: ChannelState::Disconnected,
        }
    }
}

impl Channel for MpiChannel {
    /// Rank wiring is established by the MPI launcher; nothing to do here
    /// beyond marking the endpoint live.
    fn connect(&mut self) -> Result<()> {
        if self.state == ChannelState::Closed {
            return Err(TransportError::NotConnected);
        }
        self.state = ChannelState::Connected;
        Ok(())
    }

    fn send_blocking(&mut self, bytes: &[u8]) -> Result<()> {
        if self.state != ChannelState::Connected {
            return Err(TransportError::NotConnected);
        }
        let _serialized = self.lock.acquire();
        self.runtime.send(
            self.config.source_rank,
            self.config.target_rank,
            self.config.tag,
            bytes,
        )
    }

    fn recv_blocking(&mut self, buf: &mut [u8]) -> Result<()> {
        if self.state != ChannelState::Connected {
            return Err(TransportError::NotConnected);
        }
        let incoming = self.runtime.probe(
            self.config.source_rank,
            self.config.target_rank,
            self.config.tag,
        )?;
        if incoming != buf.len() {
            return Err(TransportError::ShortRead {
                wanted: buf.len(),
                got: incoming,
            });
        }
        self.runtime.recv(
            self.config.source_rank,
            self.config.target_rank,
            self.config.tag,
            buf,
        )
    }

    /// Probe-then-receive discovers the size, so no header parsing is
    /// needed on this backend.
    fn recv_variable_blocking(&mut self) -> Result<Vec<u8>> {
        if self.state != ChannelState::Connected {
            return Err(TransportError::NotConnected);
        }
        let incoming = self.runtime.probe(
            self.config.source_rank,
            self.config.target_rank,
            self.config.tag,
        )?;
        debug!(size = incoming, "probed incoming mpi message");
        let mut buf = vec![0u8; incoming];
        self.runtime.recv(
            self.config.source_rank,
            self.config.target_rank,
            self.config.tag,
            &mut buf,
        )?;
        Ok(buf)
    }

    fn state(&self) -> ChannelState {
        self.state
    }

    fn close(&mut self) {
        self.state = ChannelState::Closed;
    }

    fn backend_name(&self) -> &'static str {
        "mpi"
    }
}

type EdgeKey = (Rank, Rank, i32);

#[derive(Default)]
struct Mailboxes {
    queues: HashMap<EdgeKey, VecDeque<Vec<u8>>>,
}

/// In-process stand-in for an MPI library: per-edge mailboxes with
/// blocking probe. Used for single-process bring-up and tests.
#[derive(Default)]
pub struct LoopbackMpiRuntime {
    boxes: Mutex<Mailboxes>,
    delivered: Condvar,
}

impl LoopbackMpiRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, Mailboxes> {
        self.boxes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MpiRuntime for LoopbackMpiRuntime {
    fn send(&self, source: Rank, target: Rank, tag: i32, bytes: &[u8]) -> Result<()> {
        let mut boxes = self.lock();
        boxes
            .queues
            .entry((source, target, tag))
            .or_default()
            .push_back(bytes.to_vec());
        self.delivered.notify_all();
        Ok(())
    }

    fn probe(&self, source: Rank, target: Rank, tag: i32) -> Result<usize> {
        let mut boxes = self.lock();
        loop {
            if let Some(front) = boxes
                .queues
                .get(&(source, target, tag))
                .and_then(VecDeque::front)
            {
                return Ok(front.len());
            }
            boxes = self
                .delivered
                .wait(boxes)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn recv(&self, source: Rank, target: Rank, tag: i32, buf: &mut [u8]) -> Result<()> {
        let mut boxes = self.lock();
        loop {
            if let Some(queue) = boxes.queues.get_mut(&(source, target, tag)) {
                if let Some(message) = queue.pop_front() {
                    if message.len() != buf.len() {
                        return Err(TransportError::ShortRead {
                            wanted: buf.len(),
                            got: message.len(),
                        });
                    }
                    buf.copy_from_slice(&message);
                    return Ok(());
                }
            }
            boxes = self
                .delivered
                .wait(boxes)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::*;

    fn edge(source: Rank, target: Rank) -> MpiConfig {
        MpiConfig {
            source_rank: source,
            target_rank: target,
            tag: 17,
        }
    }

    #[test]
    fn loopback_roundtrip_fixed_and_variable() {
        let runtime = LoopbackMpiRuntime::new();
        let lock = MpiSendLock::new();

        let mut tx = MpiChannel::new(runtime.clone(), lock.clone(), edge(0, 1));
        let mut rx = MpiChannel::new(runtime, lock, edge(0, 1));
        tx.connect().unwrap();
        rx.connect().unwrap();

        tx.send_blocking(b"fringe-stopping").unwrap();
        let mut buf = [0u8; 15];
        rx.recv_blocking(&mut buf).unwrap();
        assert_eq!(&buf, b"fringe-stopping");

        tx.send_blocking(b"a message of unannounced size").unwrap();
        let received = rx.recv_variable_blocking().unwrap();
        assert_eq!(received.as_slice(), b"a message of unannounced size");
    }

    #[test]
    fn recv_blocking_rejects_size_mismatch() {
        let runtime = LoopbackMpiRuntime::new();
        let lock = MpiSendLock::new();

        let mut tx = MpiChannel::new(runtime.clone(), lock.clone(), edge(2, 3));
        let mut rx = MpiChannel::new(runtime, lock, edge(2, 3));
        tx.connect().unwrap();
        rx.connect().unwrap();

        tx.send_blocking(b"seven!!").unwrap();
        let mut buf = [0u8; 32];
        assert!(matches!(
            rx.recv_blocking(&mut buf),
            Err(TransportError::ShortRead { wanted: 32, got: 7 })
        ));
    }

    /// A runtime whose `send` asserts it is never entered concurrently.
    #[derive(Default)]
    struct ExclusionProbeRuntime {
        in_send: AtomicBool,
        overlaps: AtomicUsize,
        entries: AtomicUsize,
    }

    impl MpiRuntime for ExclusionProbeRuntime {
        fn send(&self, _source: Rank, _target: Rank, _tag: i32, _bytes: &[u8]) -> Result<()> {
            if self.in_send.swap(true, Ordering::SeqCst) {
                self.overlaps.fetch_add(1, Ordering::SeqCst);
            }
            self.entries.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(2));
            self.in_send.store(false, Ordering::SeqCst);
            Ok(())
        }

        fn probe(&self, _source: Rank, _target: Rank, _tag: i32) -> Result<usize> {
            Ok(0)
        }

        fn recv(&self, _source: Rank, _target: Rank, _tag: i32, _buf: &mut [u8]) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn sends_across_channels_are_mutually_exclusive() {
        let runtime = Arc::new(ExclusionProbeRuntime::default());
        let lock = MpiSendLock::new();

        let mut handles = Vec::new();
        for target in 1..=4 {
            let mut channel = MpiChannel::new(runtime.clone(), lock.clone(), edge(0, target));
            channel.connect().unwrap();
            handles.push(std::thread::spawn(move || {
                for _ in 0..8 {
                    channel.send_blocking(b"burst").unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(runtime.entries.load(Ordering::SeqCst), 32);
        assert_eq!(
            runtime.overlaps.load(Ordering::SeqCst),
            0,
            "sends on different channels interleaved inside the runtime"
        );
    }

    #[test]
    fn closed_channel_refuses_traffic() {
        let runtime = LoopbackMpiRuntime::new();
        let mut channel = MpiChannel::new(runtime, MpiSendLock::new(), edge(0, 1));
        channel.connect().unwrap();
        channel.close();

        assert!(matches!(
            channel.send_blocking(b"x"),
            Err(TransportError::NotConnected)
        ));
        assert!(matches!(channel.connect(), Err(TransportError::NotConnected)));
    }
}
