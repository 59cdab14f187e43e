use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

use tracing::{debug, info};

use crate::channel::{Channel, ChannelState};
use crate::error::{Result, TransportError};

/// Ethernet II header: destination MAC + source MAC + ethertype.
pub const ETH_HEADER_LEN: usize = 14;

/// Configuration for the raw Ethernet backend.
#[derive(Debug, Clone)]
pub struct EthernetConfig {
    pub interface_name: String,
    pub local_mac: [u8; 6],
    pub remote_mac: [u8; 6],
    /// EtherType identifying this traffic; the socket only sees frames
    /// carrying it.
    pub ethertype: u16,
    /// Payload bytes carried per raw frame. Messages must be whole
    /// multiples of this.
    pub frame_payload: usize,
}

impl EthernetConfig {
    pub fn new(
        interface_name: &str,
        local_mac: [u8; 6],
        remote_mac: [u8; 6],
        ethertype: u16,
    ) -> Self {
        Self {
            interface_name: interface_name.to_string(),
            local_mac,
            remote_mac,
            ethertype,
            frame_payload: 1500,
        }
    }
}

/// Raw Ethernet frame backend (Linux `AF_PACKET`).
///
/// Frame-level transport with a fixed MTU-bounded payload: a message must
/// be a whole number of frames, and there is no variable-length receive:
/// both ends must agree on message sizes out-of-band. Oversize or ragged
/// messages are a caller error, not something this backend fragments.
pub struct EthernetChannel {
    config: EthernetConfig,
    state: ChannelState,
    fd: Option<OwnedFd>,
    ifindex: i32,
}

impl EthernetChannel {
    pub fn new(config: EthernetConfig) -> Self {
        Self {
            config,
            state: ChannelState::Disconnected,
            fd: None,
            ifindex: 0,
        }
    }

    fn check_granularity(&self, size: usize) -> Result<()> {
        if size % self.config.frame_payload != 0 {
            return Err(TransportError::FrameGranularity {
                size,
                frame: self.config.frame_payload,
            });
        }
        Ok(())
    }

    fn frame_header(&self) -> [u8; ETH_HEADER_LEN] {
        let mut header = [0u8; ETH_HEADER_LEN];
        header[..6].copy_from_slice(&self.config.remote_mac);
        header[6..12].copy_from_slice(&self.config.local_mac);
        header[12..14].copy_from_slice(&self.config.ethertype.to_be_bytes());
        header
    }

    fn destination(&self) -> libc::sockaddr_ll {
        // SAFETY: sockaddr_ll is a plain C struct; all-zero is a valid
        // initial state for the fields we do not set.
        let mut addr: libc::sockaddr_ll = unsafe { std::mem::zeroed() };
        addr.sll_family = libc::AF_PACKET as u16;
        addr.sll_protocol = self.config.ethertype.to_be();
        addr.sll_ifindex = self.ifindex;
        addr.sll_halen = 6;
        addr.sll_addr[..6].copy_from_slice(&self.config.remote_mac);
        addr
    }

    fn fd(&self) -> Result<i32> {
        self.fd
            .as_ref()
            .map(AsRawFd::as_raw_fd)
            .ok_or(TransportError::NotConnected)
    }

    /// Receive one raw frame from the peer into `scratch`, skipping frames
    /// that are not addressed local-MAC <- remote-MAC.
    fn recv_frame(&self, scratch: &mut [u8]) -> Result<usize> {
        let fd = self.fd()?;
        loop {
            // SAFETY: `scratch` is a valid writable buffer of the given
            // length for the lifetime of the call; `fd` is an open socket
            // owned by this channel.
            let n = unsafe {
                libc::recvfrom(
                    fd,
                    scratch.as_mut_ptr().cast(),
                    scratch.len(),
                    0,
                    std::ptr::null_mut(),
                    std::ptr::null_mut(),
                )
            };
            if n < 0 {
                let err = std::io::Error::last_os_error();
                if err.kind() == std::io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(TransportError::Io(err));
            }

            let n = n as usize;
            if n < ETH_HEADER_LEN {
                continue;
            }
            if scratch[..6] != self.config.local_mac || scratch[6..12] != self.config.remote_mac {
                continue;
            }
            return Ok(n - ETH_HEADER_LEN);
        }
    }
}

impl Channel for EthernetChannel {
    fn connect(&mut self) -> Result<()> {
        if self.state == ChannelState::Connected {
            return Ok(());
        }
        self.state = ChannelState::Connecting;

        let interface = std::ffi::CString::new(self.config.interface_name.as_str())
            .map_err(|_| TransportError::Unsupported("interface name with NUL byte"))?;

        // SAFETY: plain socket(2) call; the result is checked before use.
        let raw_fd = unsafe {
            libc::socket(
                libc::AF_PACKET,
                libc::SOCK_RAW,
                i32::from(self.config.ethertype.to_be()),
            )
        };
        if raw_fd < 0 {
            self.state = ChannelState::Disconnected;
            return Err(TransportError::Connect {
                addr: self.config.interface_name.clone(),
                source: std::io::Error::last_os_error(),
            });
        }
        // SAFETY: `raw_fd` was just returned by socket(2) and is owned
        // exclusively from here on.
        let fd = unsafe { OwnedFd::from_raw_fd(raw_fd) };

        // SAFETY: `interface` is a valid NUL-terminated string.
        let ifindex = unsafe { libc::if_nametoindex(interface.as_ptr()) };
        if ifindex == 0 {
            self.state = ChannelState::Disconnected;
            return Err(TransportError::Connect {
                addr: self.config.interface_name.clone(),
                source: std::io::Error::last_os_error(),
            });
        }
        self.ifindex = ifindex as i32;

        let bind_addr = self.destination();
        // SAFETY: `bind_addr` is a fully initialized sockaddr_ll and the
        // length matches its size.
        let rc = unsafe {
            libc::bind(
                fd.as_raw_fd(),
                (&bind_addr as *const libc::sockaddr_ll).cast(),
                std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        };
        if rc != 0 {
            self.state = ChannelState::Disconnected;
            return Err(TransportError::Bind {
                addr: self.config.interface_name.clone(),
                source: std::io::Error::last_os_error(),
            });
        }

        self.fd = Some(fd);
        self.state = ChannelState::Connected;
        info!(
            interface = %self.config.interface_name,
            ethertype = format_args!("{:#06x}", self.config.ethertype),
            "raw ethernet channel up"
        );
        Ok(())
    }

    fn send_blocking(&mut self, bytes: &[u8]) -> Result<()> {
        self.check_granularity(bytes.len())?;
        let fd = self.fd()?;

        let header = self.frame_header();
        let dest = self.destination();
        let mut frame = vec![0u8; ETH_HEADER_LEN + self.config.frame_payload];
        frame[..ETH_HEADER_LEN].copy_from_slice(&header);

        for chunk in bytes.chunks(self.config.frame_payload) {
            frame[ETH_HEADER_LEN..].copy_from_slice(chunk);
            // SAFETY: `frame` and `dest` are valid for the given lengths;
            // `fd` is an open socket owned by this channel.
            let sent = unsafe {
                libc::sendto(
                    fd,
                    frame.as_ptr().cast(),
                    frame.len(),
                    0,
                    (&dest as *const libc::sockaddr_ll).cast(),
                    std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
                )
            };
            if sent != frame.len() as isize {
                return Err(TransportError::SendFailed(std::io::Error::last_os_error()));
            }
            debug!(frame_len = frame.len(), "sent raw frame");
        }
        Ok(())
    }

    fn recv_blocking(&mut self, buf: &mut [u8]) -> Result<()> {
        self.check_granularity(buf.len())?;
        let frame_payload = self.config.frame_payload;
        let mut scratch = vec![0u8; ETH_HEADER_LEN + frame_payload];

        let mut filled = 0usize;
        while filled < buf.len() {
            let payload_len = self.recv_frame(&mut scratch)?;
            if payload_len < frame_payload {
                return Err(TransportError::ShortRead {
                    wanted: buf.len(),
                    got: filled + payload_len,
                });
            }
            buf[filled..filled + frame_payload]
                .copy_from_slice(&scratch[ETH_HEADER_LEN..ETH_HEADER_LEN + frame_payload]);
            filled += frame_payload;
        }
        Ok(())
    }

    /// Frame-level transport: message sizes are fixed by agreement, there
    /// is no length prefix to probe.
    fn recv_variable_blocking(&mut self) -> Result<Vec<u8>> {
        Err(TransportError::Unsupported("variable-length receive"))
    }

    fn state(&self) -> ChannelState {
        self.state
    }

    fn close(&mut self) {
        self.fd = None;
        self.state = ChannelState::Closed;
    }

    fn backend_name(&self) -> &'static str {
        "ethernet"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCAL: [u8; 6] = [0x02, 0, 0, 0, 0, 0x01];
    const REMOTE: [u8; 6] = [0x02, 0, 0, 0, 0, 0x02];

    fn test_channel() -> EthernetChannel {
        EthernetChannel::new(EthernetConfig::new("eth0", LOCAL, REMOTE, 0x88B5))
    }

    #[test]
    fn frame_header_layout() {
        let channel = test_channel();
        let header = channel.frame_header();
        assert_eq!(&header[..6], &REMOTE);
        assert_eq!(&header[6..12], &LOCAL);
        assert_eq!(&header[12..14], &0x88B5u16.to_be_bytes());
    }

    #[test]
    fn ragged_message_is_a_caller_error() {
        let mut channel = test_channel();
        assert!(matches!(
            channel.send_blocking(&[0u8; 100]),
            Err(TransportError::FrameGranularity { size: 100, frame: 1500 })
        ));

        let mut buf = [0u8; 10];
        assert!(matches!(
            channel.recv_blocking(&mut buf),
            Err(TransportError::FrameGranularity { .. })
        ));
    }

    #[test]
    fn whole_frame_message_requires_connection() {
        let mut channel = test_channel();
        assert!(matches!(
            channel.send_blocking(&[0u8; 1500]),
            Err(TransportError::NotConnected)
        ));
    }

    #[test]
    fn variable_receive_is_unsupported() {
        let mut channel = test_channel();
        assert!(matches!(
            channel.recv_variable_blocking(),
            Err(TransportError::Unsupported(_))
        ));
    }
}
