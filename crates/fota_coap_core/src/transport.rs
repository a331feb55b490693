//! Datagram transport seam.
//!
//! The protocol core only needs `send` and a receive that distinguishes
//! "no data yet" from failure, so both the real UDP session and the test
//! doubles implement [`Transport`]. A DTLS-backed session would plug in at
//! the same seam.

use std::net::{ToSocketAddrs, UdpSocket};
use std::time::Duration;

use crate::error::FotaError;

pub trait Transport {
    /// Sends the whole buffer as one datagram.
    fn send(&mut self, datagram: &[u8]) -> Result<usize, FotaError>;

    /// Waits up to `timeout` for one datagram. `Ok(None)` means no data yet;
    /// the caller decides whether to poll again. A zero `timeout` blocks
    /// indefinitely.
    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> Result<Option<usize>, FotaError>;
}

/// Polls `recv` until a datagram arrives.
///
/// The reference behavior is to poll forever on would-block; `max_rounds`
/// optionally caps that and fails with `Timeout`.
pub fn recv_blocking<T: Transport + ?Sized>(
    transport: &mut T,
    buf: &mut [u8],
    timeout: Duration,
    max_rounds: Option<u32>,
) -> Result<usize, FotaError> {
    let mut rounds = 0u32;
    loop {
        if let Some(received) = transport.recv(buf, timeout)? {
            return Ok(received);
        }
        tracing::debug!("no data yet, polling again");
        rounds += 1;
        if let Some(max) = max_rounds {
            if rounds >= max {
                return Err(FotaError::Timeout);
            }
        }
    }
}

/// One connected UDP socket talking to a single peer.
///
/// Dropping the session releases the socket; move semantics rule out use
/// after close.
#[derive(Debug)]
pub struct UdpSession {
    socket: UdpSocket,
}

impl UdpSession {
    pub fn open(host: &str, port: u16) -> Result<Self, FotaError> {
        let remote = (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| FotaError::UnresolvedHost(format!("{host}:{port}")))?;
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect(remote)?;
        tracing::info!(%remote, "session opened");
        Ok(Self { socket })
    }

    pub fn close(self) {
        tracing::debug!("session closed");
    }
}

impl Transport for UdpSession {
    fn send(&mut self, datagram: &[u8]) -> Result<usize, FotaError> {
        let sent = self.socket.send(datagram)?;
        tracing::debug!(bytes = sent, "datagram sent");
        Ok(sent)
    }

    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> Result<Option<usize>, FotaError> {
        let timeout = if timeout.is_zero() { None } else { Some(timeout) };
        self.socket.set_read_timeout(timeout)?;
        match self.socket.recv(buf) {
            Ok(0) => Err(FotaError::ConnectionClosed),
            Ok(received) => Ok(Some(received)),
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> (UdpSocket, u16) {
        let socket = UdpSocket::bind("127.0.0.1:0").expect("bind peer");
        let port = socket.local_addr().expect("addr").port();
        (socket, port)
    }

    #[test]
    fn send_and_receive_round_trip() {
        let (peer, port) = peer();
        let mut session = UdpSession::open("127.0.0.1", port).expect("open");

        session.send(b"ping").expect("send");
        let mut buf = [0u8; 16];
        let (len, from) = peer.recv_from(&mut buf).expect("peer recv");
        assert_eq!(&buf[..len], b"ping");

        peer.send_to(b"pong", from).expect("peer send");
        let received = session
            .recv(&mut buf, Duration::from_secs(2))
            .expect("recv")
            .expect("datagram");
        assert_eq!(&buf[..received], b"pong");
    }

    #[test]
    fn timeout_is_not_an_error() {
        let (_peer, port) = peer();
        let mut session = UdpSession::open("127.0.0.1", port).expect("open");
        let mut buf = [0u8; 16];
        let result = session
            .recv(&mut buf, Duration::from_millis(50))
            .expect("recv");
        assert!(result.is_none());
    }

    #[test]
    fn zero_length_datagram_is_connection_closed() {
        let (peer, port) = peer();
        let mut session = UdpSession::open("127.0.0.1", port).expect("open");

        session.send(b"hello").expect("send");
        let mut buf = [0u8; 16];
        let (_, from) = peer.recv_from(&mut buf).expect("peer recv");
        peer.send_to(&[], from).expect("peer send empty");

        let err = session.recv(&mut buf, Duration::from_secs(2)).unwrap_err();
        assert!(matches!(err, FotaError::ConnectionClosed));
    }

    #[test]
    fn capped_polling_times_out() {
        let (_peer, port) = peer();
        let mut session = UdpSession::open("127.0.0.1", port).expect("open");
        let mut buf = [0u8; 16];
        let err =
            recv_blocking(&mut session, &mut buf, Duration::from_millis(20), Some(2)).unwrap_err();
        assert!(matches!(err, FotaError::Timeout));
    }
}
