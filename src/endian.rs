//! Byte-order selection and swap primitives.
//!
//! Every multi-byte field in a stream body travels in the order declared by
//! the header's flag byte.  All slice access goes through the `byteorder`
//! crate so aligned and unaligned reads are indistinguishable to callers;
//! nothing in this crate casts raw pointers to integers.

/// Requested byte order for a stream body.
///
/// `Native` and `Swap` are resolved to a concrete order before the header is
/// written; only big/little ever appear on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Native,
    Little,
    Big,
    /// Opposite of a reference stream; used when rewriting an input.
    Swap,
}

impl Endianness {
    /// Resolve to a concrete `true = big-endian` choice.  `reference` is the
    /// order of the input stream and is only consulted for `Swap`.
    pub fn resolve(self, reference: bool) -> bool {
        match self {
            Endianness::Native => cfg!(target_endian = "big"),
            Endianness::Little => false,
            Endianness::Big => true,
            Endianness::Swap => !reference,
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "native" => Some(Endianness::Native),
            "little" => Some(Endianness::Little),
            "big" => Some(Endianness::Big),
            "swap" => Some(Endianness::Swap),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Endianness::Native => "native",
            Endianness::Little => "little",
            Endianness::Big => "big",
            Endianness::Swap => "swap",
        }
    }
}

#[inline]
pub fn swap16(v: u16) -> u16 {
    v.swap_bytes()
}

#[inline]
pub fn swap32(v: u32) -> u32 {
    v.swap_bytes()
}

#[inline]
pub fn swap64(v: u64) -> u64 {
    v.swap_bytes()
}

/// Swap `v` when the stream order differs from the native order.
#[inline]
pub fn swap_if_needed(v: u32, stream_is_big: bool) -> u32 {
    if stream_is_big == cfg!(target_endian = "big") {
        v
    } else {
        v.swap_bytes()
    }
}
