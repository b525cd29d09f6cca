//! Body stream: "give me the next N uncompressed bytes" over an optionally
//! compressed byte sequence.
//!
//! # Framing
//! With the identity method the body is the raw byte sequence.  With any
//! real codec the body is a sequence of frames:
//!
//! ```text
//! uncompressed_len: u32   (body byte order)
//! compressed_len:   u32   (body byte order)
//! payload:          compressed_len bytes
//! ```
//!
//! Record boundaries and frame boundaries are unrelated: one frame usually
//! carries many records and a record may straddle two frames.
//!
//! # End-of-stream
//! EOF is clean only before the first byte of a would-be frame (or record,
//! for the identity method).  EOF inside a frame header, inside a payload,
//! or inside a requested span is [`SilkError::Truncated`].  A frame that is
//! fully present but does not inflate to its declared length is
//! [`SilkError::CompressionCorrupt`].

use std::io::{self, Read, Write};

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::compress::{CodecError, CompressionMethod};
use crate::error::{Result, SilkError};

/// Target uncompressed bytes per frame.
pub const DEFAULT_FRAME_SIZE: usize = 64 * 1024;
/// Upper bound on either frame length; a header past this is treated as
/// corruption rather than an allocation request.
const FRAME_LEN_CAP: u32 = 16 * 1024 * 1024;

// ── Reader ──────────────────────────────────────────────────────────────────

pub struct BodyReader<R: Read> {
    inner: R,
    method: CompressionMethod,
    big_endian: bool,
    /// Inflated bytes not yet handed out; `pos..` is live.
    buf: Vec<u8>,
    pos: usize,
    scratch: Vec<u8>,
    /// Compressed bytes consumed from `inner` (offsets in diagnostics are
    /// relative to the first body byte).
    raw_offset: u64,
    uncompressed_total: u64,
}

impl<R: Read> BodyReader<R> {
    /// `method` must be concrete and available; the open path resolves
    /// pseudo values and rejects unlinked codecs before a body exists.
    pub fn new(inner: R, method: CompressionMethod, big_endian: bool) -> Self {
        BodyReader {
            inner,
            method,
            big_endian,
            buf: Vec::new(),
            pos: 0,
            scratch: Vec::new(),
            raw_offset: 0,
            uncompressed_total: 0,
        }
    }

    pub fn bytes_read_compressed(&self) -> u64 {
        self.raw_offset
    }

    pub fn bytes_read_uncompressed(&self) -> u64 {
        self.uncompressed_total
    }

    /// Returns the next `n` uncompressed bytes, or `None` at a clean
    /// end-of-stream.
    ///
    /// The returned slice borrows an internal buffer and is invalidated by
    /// the next call; copy it out if it must outlive the call.
    pub fn read_exact(&mut self, n: usize) -> Result<Option<&[u8]>> {
        if n == 0 {
            return Ok(Some(&[]));
        }
        if self.method == CompressionMethod::None {
            return self.read_identity(n);
        }

        self.buf.drain(..self.pos);
        self.pos = 0;
        while self.buf.len() < n {
            if !self.load_frame()? {
                return if self.buf.is_empty() {
                    Ok(None)
                } else {
                    Err(SilkError::Truncated {
                        offset: self.raw_offset,
                    })
                };
            }
        }
        self.pos = n;
        self.uncompressed_total += n as u64;
        Ok(Some(&self.buf[..n]))
    }

    fn read_identity(&mut self, n: usize) -> Result<Option<&[u8]>> {
        self.buf.clear();
        self.buf.resize(n, 0);
        let mut got = 0usize;
        while got < n {
            match self.inner.read(&mut self.buf[got..]) {
                Ok(0) => {
                    return if got == 0 {
                        Ok(None)
                    } else {
                        Err(SilkError::Truncated {
                            offset: self.raw_offset + got as u64,
                        })
                    };
                }
                Ok(r) => got += r,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(SilkError::Io(e)),
            }
        }
        self.raw_offset += n as u64;
        self.uncompressed_total += n as u64;
        Ok(Some(&self.buf[..n]))
    }

    /// Inflates one frame onto the end of `buf`.  Returns false on clean EOF.
    fn load_frame(&mut self) -> Result<bool> {
        let frame_start = self.raw_offset;

        let mut head = [0u8; 8];
        let mut got = 0usize;
        while got < 8 {
            match self.inner.read(&mut head[got..]) {
                Ok(0) => {
                    return if got == 0 {
                        Ok(false)
                    } else {
                        Err(SilkError::Truncated {
                            offset: frame_start + got as u64,
                        })
                    };
                }
                Ok(r) => got += r,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(SilkError::Io(e)),
            }
        }
        let (uncompressed_len, compressed_len) = if self.big_endian {
            (
                BigEndian::read_u32(&head[0..4]),
                BigEndian::read_u32(&head[4..8]),
            )
        } else {
            (
                LittleEndian::read_u32(&head[0..4]),
                LittleEndian::read_u32(&head[4..8]),
            )
        };
        if uncompressed_len > FRAME_LEN_CAP || compressed_len > FRAME_LEN_CAP {
            return Err(SilkError::CompressionCorrupt {
                offset: frame_start,
                detail: format!(
                    "frame declares {uncompressed_len}/{compressed_len} bytes, cap is {FRAME_LEN_CAP}"
                ),
            });
        }
        self.raw_offset += 8;

        self.scratch.clear();
        self.scratch.resize(compressed_len as usize, 0);
        let mut got = 0usize;
        while got < self.scratch.len() {
            match self.inner.read(&mut self.scratch[got..]) {
                Ok(0) => {
                    return Err(SilkError::Truncated {
                        offset: self.raw_offset + got as u64,
                    })
                }
                Ok(r) => got += r,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(SilkError::Io(e)),
            }
        }
        self.raw_offset += compressed_len as u64;

        let start = self.buf.len();
        self.buf.resize(start + uncompressed_len as usize, 0);
        self.method
            .decode_block(&self.scratch, &mut self.buf[start..])
            .map_err(|e| SilkError::CompressionCorrupt {
                offset: frame_start,
                detail: e.to_string(),
            })?;
        Ok(true)
    }
}

// ── Writer ──────────────────────────────────────────────────────────────────

pub struct BodyWriter<W: Write> {
    inner: W,
    method: CompressionMethod,
    big_endian: bool,
    frame_size: usize,
    buf: Vec<u8>,
    scratch: Vec<u8>,
    raw_written: u64,
    uncompressed_total: u64,
}

impl<W: Write> BodyWriter<W> {
    /// `method` must be concrete and available.
    pub fn new(inner: W, method: CompressionMethod, big_endian: bool, frame_size: usize) -> Self {
        BodyWriter {
            inner,
            method,
            big_endian,
            frame_size: frame_size.max(1),
            buf: Vec::new(),
            scratch: Vec::new(),
            raw_written: 0,
            uncompressed_total: 0,
        }
    }

    pub fn bytes_written_compressed(&self) -> u64 {
        self.raw_written
    }

    pub fn bytes_written_uncompressed(&self) -> u64 {
        self.uncompressed_total
    }

    pub fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.uncompressed_total += data.len() as u64;
        if self.method == CompressionMethod::None {
            self.inner.write_all(data)?;
            self.raw_written += data.len() as u64;
            return Ok(());
        }
        self.buf.extend_from_slice(data);
        while self.buf.len() >= self.frame_size {
            self.emit_frame(self.frame_size)?;
        }
        Ok(())
    }

    /// Emits the buffered partial frame, if any.
    pub fn flush_frame(&mut self) -> Result<()> {
        if !self.buf.is_empty() {
            self.emit_frame(self.buf.len())?;
        }
        Ok(())
    }

    /// Flushes the tail frame and the underlying writer.  Must run before
    /// the stream is considered complete.
    pub fn finish(&mut self) -> Result<()> {
        self.flush_frame()?;
        self.inner.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    fn emit_frame(&mut self, len: usize) -> Result<()> {
        self.scratch.clear();
        let compressed_len = self
            .method
            .encode_block(&self.buf[..len], &mut self.scratch)
            .map_err(|e| match e {
                CodecError::Unavailable(m) => SilkError::CompressionUnavailable(m),
                other => SilkError::CompressionCorrupt {
                    offset: self.raw_written,
                    detail: other.to_string(),
                },
            })?;

        let mut head = [0u8; 8];
        if self.big_endian {
            BigEndian::write_u32(&mut head[0..4], len as u32);
            BigEndian::write_u32(&mut head[4..8], compressed_len as u32);
        } else {
            LittleEndian::write_u32(&mut head[0..4], len as u32);
            LittleEndian::write_u32(&mut head[4..8], compressed_len as u32);
        }
        self.inner.write_all(&head)?;
        self.inner.write_all(&self.scratch)?;
        self.raw_written += 8 + compressed_len as u64;
        self.buf.drain(..len);
        Ok(())
    }
}
