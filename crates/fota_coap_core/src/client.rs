//! High-level FOTA client: report the device state, fetch the firmware
//! image blockwise.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::block::{fetch_blockwise, BlockControl, TransferStats};
use crate::error::FotaError;
use crate::message::{self, MessageWriter, Method, TokenSource, MAX_MSG_LEN};
use crate::report::{decode_directive, encode_report, DeviceReport, ServerDirective};
use crate::transport::{recv_blocking, Transport, UdpSession};

/// Receive policy for one client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Per-poll socket timeout. Zero blocks indefinitely.
    pub recv_timeout: Duration,
    /// Cap on would-block polls per exchange. `None` keeps the reference
    /// behavior of polling forever.
    pub max_poll_rounds: Option<u32>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            recv_timeout: Duration::from_secs(1),
            max_poll_rounds: None,
        }
    }
}

/// One UDP session, one reusable wire buffer, one id/token stream.
pub struct FotaClient {
    session: UdpSession,
    tokens: TokenSource,
    config: ClientConfig,
    buf: [u8; MAX_MSG_LEN],
}

impl FotaClient {
    pub fn connect(host: &str, port: u16, config: ClientConfig) -> Result<Self, FotaError> {
        let session = UdpSession::open(host, port)?;
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        Ok(Self {
            session,
            tokens: TokenSource::new(seed),
            config,
            buf: [0; MAX_MSG_LEN],
        })
    }

    /// POSTs the device report to `path` and decodes the reply into
    /// `directive`. Fields absent from the reply keep whatever defaults the
    /// caller put in `directive`.
    pub fn send_report(
        &mut self,
        path: &str,
        report: &DeviceReport,
        directive: &mut ServerDirective,
    ) -> Result<(), FotaError> {
        let payload = encode_report(report)?;
        tracing::info!(bytes = payload.len(), "encoded device report");

        let len = {
            let mut writer = MessageWriter::new(
                &mut self.buf,
                Method::Post,
                self.tokens.next_id(),
                &self.tokens.next_token(),
            )?;
            writer.append_path(path)?;
            writer.append_payload(&payload)?;
            writer.finish()
        };
        self.session.send(&self.buf[..len])?;

        let received = recv_blocking(
            &mut self.session,
            &mut self.buf,
            self.config.recv_timeout,
            self.config.max_poll_rounds,
        )?;
        let reply = message::decode(&self.buf[..received])?;
        if !message::is_success(reply.code) {
            return Err(FotaError::ErrorResponse(reply.code));
        }
        decode_directive(directive, reply.payload)
    }

    /// Downloads `path` block by block, handing each chunk to `on_block`.
    pub fn download<F>(&mut self, path: &str, on_block: F) -> Result<TransferStats, FotaError>
    where
        F: FnMut(bool, usize, &[u8]) -> BlockControl,
    {
        fetch_blockwise(
            &mut self.session,
            &mut self.tokens,
            &mut self.buf,
            path,
            &self.config,
            on_block,
        )
    }

    /// Releases the socket.
    pub fn close(self) {
        self.session.close();
    }
}
