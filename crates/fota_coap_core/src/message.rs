//! CoAP message writer and parser.
//!
//! Covers exactly what the client needs: confirmable GET/POST requests with
//! Uri-Path and Block2 options, and replies with a response code, an optional
//! echoed Block2 option and a payload. Options use the standard delta/length
//! nibble encoding with 13/14 extension bytes.

use crate::block::BlockDescriptor;
use crate::error::FotaError;

pub const COAP_VERSION: u8 = 1;
pub const TYPE_CONFIRMABLE: u8 = 0;
pub const TOKEN_LEN: usize = 8;
pub const OPTION_URI_PATH: u16 = 11;
pub const OPTION_BLOCK2: u16 = 23;
pub const PAYLOAD_MARKER: u8 = 0xff;

/// Largest chunk the server may hand back in one block.
pub const BLOCK_SIZE: usize = 256;
/// One block plus header/token/option allowance.
pub const MAX_MSG_LEN: usize = BLOCK_SIZE + 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get = 0x01,
    Post = 0x02,
}

impl From<Method> for u8 {
    fn from(value: Method) -> Self {
        value as u8
    }
}

/// True for 2.xx response codes.
pub const fn is_success(code: u8) -> bool {
    code >> 5 == 2
}

/// Message id and token generator, one per session.
///
/// Ids are sequential so retransmitted replies are recognizable; tokens come
/// from a xorshift stream seeded by the session.
#[derive(Debug)]
pub struct TokenSource {
    id: u16,
    state: u64,
}

impl TokenSource {
    pub fn new(seed: u64) -> Self {
        let state = if seed == 0 { 0x9e37_79b9_7f4a_7c15 } else { seed };
        Self {
            id: (state >> 48) as u16,
            state,
        }
    }

    pub fn next_id(&mut self) -> u16 {
        let id = self.id;
        self.id = self.id.wrapping_add(1);
        id
    }

    pub fn next_token(&mut self) -> [u8; TOKEN_LEN] {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x.to_be_bytes()
    }
}

/// Serializes one request into a caller-owned wire buffer.
///
/// Options must be appended in ascending option-number order; the request
/// flow here is always Uri-Path (11) then Block2 (23), then the payload.
/// No write ever lands past the buffer bound.
pub struct MessageWriter<'a> {
    buf: &'a mut [u8],
    len: usize,
    last_option: u16,
}

impl<'a> MessageWriter<'a> {
    pub fn new(
        buf: &'a mut [u8],
        method: Method,
        message_id: u16,
        token: &[u8; TOKEN_LEN],
    ) -> Result<Self, FotaError> {
        let header_len = 4 + TOKEN_LEN;
        if buf.len() < header_len {
            return Err(FotaError::BufferTooSmall(buf.len()));
        }
        // The buffer is reused across exchanges; stale bytes must not leak.
        buf.fill(0);
        buf[0] = (COAP_VERSION << 6) | (TYPE_CONFIRMABLE << 4) | TOKEN_LEN as u8;
        buf[1] = u8::from(method);
        buf[2..4].copy_from_slice(&message_id.to_be_bytes());
        buf[4..header_len].copy_from_slice(token);
        Ok(Self {
            buf,
            len: header_len,
            last_option: 0,
        })
    }

    /// Appends one Uri-Path option per `/`-delimited segment.
    ///
    /// Empty segments are dropped (POSIX path semantics, so `a/b/` is two
    /// segments); a path with no segments at all is rejected.
    pub fn append_path(&mut self, path: &str) -> Result<(), FotaError> {
        let mut appended = false;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            if segment.len() > u8::MAX as usize {
                return Err(FotaError::PathSegmentTooLong(segment.len()));
            }
            self.append_option(OPTION_URI_PATH, segment.as_bytes())?;
            appended = true;
        }
        if !appended {
            return Err(FotaError::EmptyPath);
        }
        Ok(())
    }

    pub fn append_block2(&mut self, block: &BlockDescriptor) -> Result<(), FotaError> {
        let (value, n) = block.encode_option_value()?;
        self.append_option(OPTION_BLOCK2, &value[..n])
    }

    pub fn append_payload(&mut self, payload: &[u8]) -> Result<(), FotaError> {
        self.push(PAYLOAD_MARKER)?;
        if self.len + payload.len() > self.buf.len() {
            return Err(FotaError::BufferTooSmall(self.buf.len()));
        }
        self.buf[self.len..self.len + payload.len()].copy_from_slice(payload);
        self.len += payload.len();
        Ok(())
    }

    /// Number of bytes written; the datagram is `buf[..finish()]`.
    pub fn finish(self) -> usize {
        self.len
    }

    fn append_option(&mut self, number: u16, value: &[u8]) -> Result<(), FotaError> {
        let delta = (number - self.last_option) as usize;
        let header = self.len;
        self.push(0)?;
        let delta_nibble = self.push_extended(delta)?;
        let len_nibble = self.push_extended(value.len())?;
        self.buf[header] = (delta_nibble << 4) | len_nibble;
        if self.len + value.len() > self.buf.len() {
            return Err(FotaError::BufferTooSmall(self.buf.len()));
        }
        self.buf[self.len..self.len + value.len()].copy_from_slice(value);
        self.len += value.len();
        self.last_option = number;
        Ok(())
    }

    /// Emits the extension bytes for a delta or length field and returns the
    /// nibble to place in the option header.
    fn push_extended(&mut self, value: usize) -> Result<u8, FotaError> {
        if value < 13 {
            Ok(value as u8)
        } else if value < 269 {
            self.push((value - 13) as u8)?;
            Ok(13)
        } else {
            let ext = (value - 269) as u16;
            self.push((ext >> 8) as u8)?;
            self.push(ext as u8)?;
            Ok(14)
        }
    }

    fn push(&mut self, byte: u8) -> Result<(), FotaError> {
        if self.len == self.buf.len() {
            return Err(FotaError::BufferTooSmall(self.buf.len()));
        }
        self.buf[self.len] = byte;
        self.len += 1;
        Ok(())
    }
}

/// Header, block metadata and a zero-copy payload view of one datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedMessage<'a> {
    pub code: u8,
    pub message_id: u16,
    pub payload: &'a [u8],
    pub block2: Option<BlockDescriptor>,
}

pub fn decode(buf: &[u8]) -> Result<ParsedMessage<'_>, FotaError> {
    if buf.len() < 4 {
        return Err(FotaError::TruncatedHeader);
    }
    let version = buf[0] >> 6;
    if version != COAP_VERSION {
        return Err(FotaError::UnsupportedVersion(version));
    }
    let token_len = (buf[0] & 0x0f) as usize;
    if token_len > TOKEN_LEN {
        return Err(FotaError::InvalidTokenLength(token_len as u8));
    }
    if buf.len() < 4 + token_len {
        return Err(FotaError::TruncatedHeader);
    }
    let code = buf[1];
    let message_id = u16::from_be_bytes([buf[2], buf[3]]);

    let mut walker = OptionWalker::new(buf, 4 + token_len);
    let mut block2 = None;
    while let Some((number, value)) = walker.next_option()? {
        if number == OPTION_BLOCK2 {
            block2 = Some(BlockDescriptor::from_option_value(value)?);
        }
    }
    Ok(ParsedMessage {
        code,
        message_id,
        payload: walker.payload(),
        block2,
    })
}

/// Walks the option list of a datagram, stopping at the payload marker.
struct OptionWalker<'a> {
    buf: &'a [u8],
    pos: usize,
    number: u16,
    payload_start: usize,
}

impl<'a> OptionWalker<'a> {
    fn new(buf: &'a [u8], pos: usize) -> Self {
        Self {
            buf,
            pos,
            number: 0,
            payload_start: buf.len(),
        }
    }

    fn next_option(&mut self) -> Result<Option<(u16, &'a [u8])>, FotaError> {
        if self.pos >= self.buf.len() {
            return Ok(None);
        }
        if self.buf[self.pos] == PAYLOAD_MARKER {
            // A marker followed by nothing is a format error.
            if self.pos + 1 == self.buf.len() {
                return Err(FotaError::InvalidOption(self.pos));
            }
            self.payload_start = self.pos + 1;
            self.pos = self.buf.len();
            return Ok(None);
        }
        let first = self.buf[self.pos];
        self.pos += 1;
        let delta = self.read_extended(first >> 4)?;
        let value_len = self.read_extended(first & 0x0f)?;
        self.number = u16::try_from(delta)
            .ok()
            .and_then(|d| self.number.checked_add(d))
            .ok_or(FotaError::InvalidOption(self.pos))?;
        if self.pos + value_len > self.buf.len() {
            return Err(FotaError::InvalidOption(self.pos));
        }
        let value = &self.buf[self.pos..self.pos + value_len];
        self.pos += value_len;
        Ok(Some((self.number, value)))
    }

    fn read_extended(&mut self, nibble: u8) -> Result<usize, FotaError> {
        match nibble {
            n @ 0..=12 => Ok(n as usize),
            13 => Ok(13 + self.take()? as usize),
            14 => {
                let hi = self.take()?;
                let lo = self.take()?;
                Ok(269 + u16::from_be_bytes([hi, lo]) as usize)
            }
            // Nibble 15 is only valid as part of the 0xff payload marker.
            _ => Err(FotaError::InvalidOption(self.pos)),
        }
    }

    fn take(&mut self) -> Result<u8, FotaError> {
        if self.pos >= self.buf.len() {
            return Err(FotaError::InvalidOption(self.pos));
        }
        let byte = self.buf[self.pos];
        self.pos += 1;
        Ok(byte)
    }

    fn payload(&self) -> &'a [u8] {
        &self.buf[self.payload_start..]
    }
}
