//! Blockwise download of a large resource.
//!
//! The engine issues one GET per block, lets the server-echoed Block2 option
//! drive the window, and hands every chunk to a caller-supplied callback.
//! Rounds are strictly sequential; there is no pipelining and no retry at
//! this layer.

use crate::client::ClientConfig;
use crate::error::FotaError;
use crate::message::{self, MessageWriter, Method, TokenSource};
use crate::transport::{recv_blocking, Transport};

/// Which chunk of the resource a request targets or a reply carries.
///
/// `index` occupies at most 20 bits in the Block2 option; `size` must be a
/// power of two between 16 and 1024.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockDescriptor {
    pub index: u32,
    pub more: bool,
    pub size: u16,
}

impl BlockDescriptor {
    /// Descriptor for the first block of a fresh transfer.
    pub fn first() -> Self {
        Self {
            index: 0,
            more: true,
            size: message::BLOCK_SIZE as u16,
        }
    }

    /// Packs `num << 4 | more << 3 | szx` as a minimal-length big-endian
    /// uint (zero encodes as zero bytes).
    pub fn encode_option_value(&self) -> Result<([u8; 3], usize), FotaError> {
        if self.index >= 1 << 20 {
            return Err(FotaError::BlockIndexTooLarge(self.index));
        }
        let raw = (self.index << 4) | u32::from(self.more) << 3 | u32::from(self.szx()?);
        let n = match raw {
            0 => 0,
            1..=0xff => 1,
            0x100..=0xffff => 2,
            _ => 3,
        };
        let mut out = [0u8; 3];
        out[..n].copy_from_slice(&raw.to_be_bytes()[4 - n..]);
        Ok((out, n))
    }

    pub fn from_option_value(value: &[u8]) -> Result<Self, FotaError> {
        if value.len() > 3 {
            return Err(FotaError::InvalidBlockOption);
        }
        let raw = value.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b));
        let szx = (raw & 0x7) as u8;
        if szx == 7 {
            return Err(FotaError::InvalidBlockOption);
        }
        Ok(Self {
            index: raw >> 4,
            more: raw & 0x8 != 0,
            size: 1u16 << (szx + 4),
        })
    }

    fn szx(&self) -> Result<u8, FotaError> {
        if !self.size.is_power_of_two() || !(16..=1024).contains(&self.size) {
            return Err(FotaError::UnsupportedBlockSize(self.size));
        }
        Ok((self.size.trailing_zeros() - 4) as u8)
    }
}

/// Callback verdict after each delivered block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockControl {
    Continue,
    /// Stop the transfer; the signal is surfaced as `FotaError::Cancelled`.
    Abort(i32),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    pub blocks: u32,
    pub bytes: usize,
}

/// Fetches `path` block by block, invoking `on_block(is_last, offset, chunk)`
/// once per chunk. `offset` is the byte position of the chunk's start within
/// the resource.
///
/// The server is authoritative for windowing: the echoed block index and
/// more-flag override the locally tracked descriptor. A reply without a
/// Block2 option is a protocol violation.
pub fn fetch_blockwise<T, F>(
    transport: &mut T,
    tokens: &mut TokenSource,
    buf: &mut [u8],
    path: &str,
    config: &ClientConfig,
    mut on_block: F,
) -> Result<TransferStats, FotaError>
where
    T: Transport + ?Sized,
    F: FnMut(bool, usize, &[u8]) -> BlockControl,
{
    let mut descriptor = BlockDescriptor::first();
    let mut stats = TransferStats::default();
    loop {
        let len = {
            let mut writer =
                MessageWriter::new(buf, Method::Get, tokens.next_id(), &tokens.next_token())?;
            writer.append_path(path)?;
            writer.append_block2(&descriptor)?;
            writer.finish()
        };
        tracing::debug!(block = descriptor.index, bytes = len, "requesting block");
        transport.send(&buf[..len])?;

        let received = recv_blocking(transport, buf, config.recv_timeout, config.max_poll_rounds)?;
        let reply = message::decode(&buf[..received])?;
        if !message::is_success(reply.code) {
            return Err(FotaError::ErrorResponse(reply.code));
        }
        let echoed = reply.block2.ok_or(FotaError::MissingBlockDescriptor)?;

        let is_last = !echoed.more;
        let offset = stats.bytes;
        if let BlockControl::Abort(signal) = on_block(is_last, offset, reply.payload) {
            tracing::info!(signal, "blockwise transfer aborted by caller");
            return Err(FotaError::Cancelled(signal));
        }
        stats.blocks += 1;
        stats.bytes += reply.payload.len();
        if is_last {
            tracing::info!(
                blocks = stats.blocks,
                bytes = stats.bytes,
                "blockwise transfer complete"
            );
            return Ok(stats);
        }
        descriptor = BlockDescriptor {
            index: echoed.index + 1,
            more: true,
            size: echoed.size,
        };
    }
}
