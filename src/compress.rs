//! Body compression codecs: frozen method ids + availability probing.
//!
//! # Identity rules
//! Every codec is identified by a one-byte method id.  That id is:
//!   - Written into byte 7 of every stream prolog.
//!   - The dispatch key for body frame encode/decode.
//!
//! Ids are permanent and never reused.  Two pseudo-values, `default` (255)
//! and `best` (254), exist only on the API surface: they resolve to a
//! concrete id at open time and are never written to disk.
//!
//! # Availability
//! A build does not necessarily link every codec it knows about.  `lzo1x`
//! is a valid method id in this build but has no backing library, so a
//! stream compressed with it opens with a hard "cannot decompress" error
//! rather than being misparsed.  `best` only ever selects from the methods
//! the running build can actually decode.

use std::io::{Read, Write};
use thiserror::Error;

/// Resolution order for `best`: strongest preference first.
const BEST_ORDER: [CompressionMethod; 4] = [
    CompressionMethod::Lzo1x,
    CompressionMethod::Snappy,
    CompressionMethod::Zlib,
    CompressionMethod::None,
];

// ── Method ids ──────────────────────────────────────────────────────────────

/// Body compression method.  The discriminants are the on-disk ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CompressionMethod {
    /// Payload stored verbatim, no frame layer.
    None = 0,
    /// Deflate stream with zlib wrapper.
    Zlib = 1,
    /// LZO1X, a recognized id that is not linked in this build.
    Lzo1x = 2,
    /// Raw (unframed) snappy blocks.
    Snappy = 3,
    /// Pseudo: strongest available method, resolved at open time.
    Best = 254,
    /// Pseudo: the `EngineConfig` default, resolved at open time.
    Default = 255,
}

/// Whether a method id can be decoded by the running build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    /// This build can encode and decode the method.
    Available,
    /// The id is part of the closed set but its backing library is not
    /// compiled in.
    ValidButUnlinked,
    /// The id is not part of the closed set at all.
    Unknown,
}

/// Availability of an arbitrary id, including ones outside the closed set.
pub fn availability_of(id: u8) -> Availability {
    match CompressionMethod::from_u8(id) {
        Some(m) => m.availability(),
        None => Availability::Unknown,
    }
}

impl CompressionMethod {
    pub fn from_u8(id: u8) -> Option<Self> {
        match id {
            0 => Some(CompressionMethod::None),
            1 => Some(CompressionMethod::Zlib),
            2 => Some(CompressionMethod::Lzo1x),
            3 => Some(CompressionMethod::Snappy),
            254 => Some(CompressionMethod::Best),
            255 => Some(CompressionMethod::Default),
            _ => None,
        }
    }

    /// Parse from a CLI or environment string.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none" => Some(CompressionMethod::None),
            "zlib" => Some(CompressionMethod::Zlib),
            "lzo1x" => Some(CompressionMethod::Lzo1x),
            "snappy" => Some(CompressionMethod::Snappy),
            "best" => Some(CompressionMethod::Best),
            "default" => Some(CompressionMethod::Default),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CompressionMethod::None => "none",
            CompressionMethod::Zlib => "zlib",
            CompressionMethod::Lzo1x => "lzo1x",
            CompressionMethod::Snappy => "snappy",
            CompressionMethod::Best => "best",
            CompressionMethod::Default => "default",
        }
    }

    pub fn is_pseudo(self) -> bool {
        matches!(self, CompressionMethod::Best | CompressionMethod::Default)
    }

    pub fn availability(self) -> Availability {
        match self {
            CompressionMethod::None
            | CompressionMethod::Zlib
            | CompressionMethod::Snappy => Availability::Available,
            CompressionMethod::Lzo1x => Availability::ValidButUnlinked,
            // Pseudo values always resolve to something available.
            CompressionMethod::Best | CompressionMethod::Default => Availability::Available,
        }
    }

    /// Resolve a possibly-pseudo method to a concrete, available one.
    ///
    /// `config_default` is the concrete method `default` stands for; it comes
    /// from `EngineConfig` and must not itself be a pseudo value.
    pub fn resolve(self, config_default: CompressionMethod) -> Result<Self, CodecError> {
        match self {
            CompressionMethod::Default => {
                if config_default.is_pseudo() {
                    // A config that says "default = best" is resolved in one
                    // more step; "default = default" would never terminate.
                    CompressionMethod::Best.resolve(CompressionMethod::None)
                } else {
                    config_default.resolve(config_default)
                }
            }
            CompressionMethod::Best => Ok(*BEST_ORDER
                .iter()
                .find(|m| m.availability() == Availability::Available)
                .unwrap_or(&CompressionMethod::None)),
            m => match m.availability() {
                Availability::Available => Ok(m),
                Availability::ValidButUnlinked => Err(CodecError::Unavailable(m)),
                Availability::Unknown => Err(CodecError::UnknownMethod(m as u8)),
            },
        }
    }

    // ── Block operations ────────────────────────────────────────────────────

    /// Compress one block, appending to `output`.  Returns the number of
    /// bytes written.  Pseudo methods must be resolved first.
    pub fn encode_block(self, input: &[u8], output: &mut Vec<u8>) -> Result<usize, CodecError> {
        let before = output.len();
        match self {
            CompressionMethod::None => output.extend_from_slice(input),
            CompressionMethod::Zlib => {
                let mut enc =
                    flate2::write::ZlibEncoder::new(&mut *output, flate2::Compression::default());
                enc.write_all(input)
                    .and_then(|_| enc.finish().map(|_| ()))
                    .map_err(|e| CodecError::Corrupt(e.to_string()))?;
            }
            CompressionMethod::Snappy => {
                let compressed = snap::raw::Encoder::new()
                    .compress_vec(input)
                    .map_err(|e| CodecError::Corrupt(e.to_string()))?;
                output.extend_from_slice(&compressed);
            }
            CompressionMethod::Lzo1x => return Err(CodecError::Unavailable(self)),
            CompressionMethod::Best | CompressionMethod::Default => {
                return Err(CodecError::Unavailable(self))
            }
        }
        Ok(output.len() - before)
    }

    /// Decompress one block into `output`, which the caller sizes to the
    /// frame's declared uncompressed length.  A payload that inflates to any
    /// other length is a corrupt frame.
    pub fn decode_block(self, input: &[u8], output: &mut [u8]) -> Result<(), CodecError> {
        match self {
            CompressionMethod::None => {
                if input.len() != output.len() {
                    return Err(CodecError::BufferTooSmall {
                        needed: input.len(),
                        have: output.len(),
                    });
                }
                output.copy_from_slice(input);
                Ok(())
            }
            CompressionMethod::Zlib => {
                let mut dec = flate2::read::ZlibDecoder::new(input);
                dec.read_exact(output)
                    .map_err(|e| CodecError::Corrupt(format!("zlib: {e}")))?;
                // The frame must inflate to exactly the declared length.
                let mut probe = [0u8; 1];
                match dec.read(&mut probe) {
                    Ok(0) => Ok(()),
                    Ok(_) => Err(CodecError::Corrupt(
                        "zlib payload longer than declared length".into(),
                    )),
                    Err(e) => Err(CodecError::Corrupt(format!("zlib: {e}"))),
                }
            }
            CompressionMethod::Snappy => {
                let n = snap::raw::Decoder::new()
                    .decompress(input, output)
                    .map_err(|e| CodecError::Corrupt(format!("snappy: {e}")))?;
                if n != output.len() {
                    return Err(CodecError::Corrupt(format!(
                        "snappy payload inflated to {n} bytes, frame declared {}",
                        output.len()
                    )));
                }
                Ok(())
            }
            CompressionMethod::Lzo1x => Err(CodecError::Unavailable(self)),
            CompressionMethod::Best | CompressionMethod::Default => {
                Err(CodecError::Unavailable(self))
            }
        }
    }
}

impl std::fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ── Error type ──────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("unknown compression method id {0}")]
    UnknownMethod(u8),
    #[error("compression method {0} is not available in this build")]
    Unavailable(CompressionMethod),
    #[error("corrupt frame: {0}")]
    Corrupt(String),
    #[error("output buffer too small: need {needed} bytes, have {have}")]
    BufferTooSmall { needed: usize, have: usize },
}
