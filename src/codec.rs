//! Record-marked framing of protobuf messages.
//!
//! Each record is one or more fragments. A fragment starts with a 4-byte
//! big-endian header: the high bit marks the last fragment of the record and
//! the low 31 bits hold the fragment length. Writers always emit a single
//! fragment per record; readers accept any fragmentation.

use std::io::Write;

use bytes::{BufMut, BytesMut};
use prost::Message;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const LAST_FRAGMENT: u32 = 0x8000_0000;
const LENGTH_MASK: u32 = 0x7fff_ffff;

/// Default upper bound for one record.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("Truncated frame: expected {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },

    #[error("Frame of {len} bytes exceeds limit of {max}")]
    TooLarge { len: usize, max: usize },
}

pub type Result<T> = std::result::Result<T, FrameError>;

/// Encode `msg` as a single-fragment record.
pub fn encode_framed<M: Message>(msg: &M) -> Vec<u8> {
    let len = msg.encoded_len();
    let mut buf = Vec::with_capacity(4 + len);
    buf.put_u32(LAST_FRAGMENT | (len as u32 & LENGTH_MASK));
    buf.extend_from_slice(&msg.encode_to_vec());
    buf
}

/// Write `msg` as a single-fragment record to a blocking writer.
pub fn write_framed<W: Write, M: Message>(writer: &mut W, msg: &M) -> Result<()> {
    writer.write_all(&encode_framed(msg))?;
    Ok(())
}

/// Write `msg` as a single-fragment record to an async writer.
pub async fn write_framed_async<W, M>(writer: &mut W, msg: &M) -> Result<()>
where
    W: AsyncWrite + Unpin,
    M: Message,
{
    writer.write_all(&encode_framed(msg)).await?;
    Ok(())
}

/// Sequential reader of framed records.
pub struct FrameReader<R> {
    inner: R,
    max_frame_size: usize,
    frames_read: u64,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_max_frame_size(inner, DEFAULT_MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(inner: R, max_frame_size: usize) -> Self {
        Self {
            inner,
            max_frame_size,
            frames_read: 0,
        }
    }

    /// Number of complete records returned so far.
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Read the next record's payload.
    ///
    /// Returns `Ok(None)` on a clean end of stream at a record boundary.
    /// End of stream anywhere else is [`FrameError::Truncated`].
    pub async fn read_frame(&mut self) -> Result<Option<BytesMut>> {
        let mut payload = BytesMut::new();
        let mut first = true;

        loop {
            let mut header = [0u8; 4];
            let got = self.fill(&mut header).await?;
            if got == 0 && first {
                return Ok(None);
            }
            if got < header.len() {
                return Err(FrameError::Truncated {
                    expected: header.len(),
                    got,
                });
            }
            first = false;

            let word = u32::from_be_bytes(header);
            let len = (word & LENGTH_MASK) as usize;
            if payload.len() + len > self.max_frame_size {
                return Err(FrameError::TooLarge {
                    len: payload.len() + len,
                    max: self.max_frame_size,
                });
            }

            let start = payload.len();
            payload.resize(start + len, 0);
            let got = self.fill(&mut payload[start..]).await?;
            if got < len {
                return Err(FrameError::Truncated { expected: len, got });
            }

            if word & LAST_FRAGMENT != 0 {
                self.frames_read += 1;
                return Ok(Some(payload));
            }
        }
    }

    /// Read and decode the next record.
    pub async fn read_message<M: Message + Default>(&mut self) -> Result<Option<M>> {
        match self.read_frame().await? {
            Some(payload) => Ok(Some(M::decode(payload.freeze())?)),
            None => Ok(None),
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Read until `buf` is full or the stream ends, returning the byte count.
    async fn fill(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.inner.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }
}
