use crate::compress::CompressionMethod;
use thiserror::Error;

/// Engine-wide error taxonomy.
///
/// Codec and I/O failures surface immediately and are never retried here.
/// A decode failure is fatal to its stream but carries no process-global
/// state, so other streams keep working.
#[derive(Error, Debug)]
pub enum SilkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended mid-prolog, mid-header-entry, mid-frame, or
    /// mid-record. `offset` is the byte position where data ran out.
    #[error("stream truncated at byte offset {offset}")]
    Truncated { offset: u64 },

    #[error("not a SiLK stream (bad magic {0:02x?})")]
    NotASilkStream([u8; 4]),

    /// Prolog rejected: reserved flag bits must be zero.
    #[error("unsupported stream prolog (flags byte {flags:#04x})")]
    UnsupportedVersion { flags: u8 },

    #[error("unknown file format {0:#04x}")]
    UnknownFormat(u8),

    #[error("unknown record version {version} for file format {format:#04x}")]
    UnknownVersion { format: u8, version: u8 },

    #[error(
        "declared record length {declared} does not match \
         format {format:#04x} v{version} record length {expected}"
    )]
    FormatRecordLenMismatch {
        format: u8,
        version: u8,
        declared: u16,
        expected: u16,
    },

    #[error("declared header length {declared} is shorter than the {parsed} bytes parsed")]
    BadHeaderLength { declared: u32, parsed: u32 },

    #[error("unknown compression method {0}")]
    UnknownCompression(u8),

    #[error("compression method {0} is not available in this build")]
    CompressionUnavailable(CompressionMethod),

    /// A complete frame was read but its payload did not decompress to the
    /// declared length (or the codec rejected it outright).
    #[error("corrupt compressed frame at byte offset {offset}: {detail}")]
    CompressionCorrupt { offset: u64, detail: String },

    /// Encode-side narrowing refusal: the canonical value does not fit the
    /// on-disk field of the target format.
    #[error("value of field `{field}` ({value}) does not fit the on-disk layout")]
    ValueOverflow { field: &'static str, value: u64 },

    #[error("IPv6 record cannot be represented in an IPv4-only format")]
    Ipv6NotRepresentable,

    #[error("record violates the stream's IPv6 policy: {0}")]
    PolicyViolation(&'static str),

    #[error("stream is not open")]
    NotOpen,

    #[error("stream header has already been written")]
    AlreadyOpen,

    #[error("operation does not match the stream direction")]
    WrongDirection,
}

pub type Result<T> = std::result::Result<T, SilkError>;

impl SilkError {
    /// True for the errors a reader can hit only through damaged input, as
    /// opposed to caller mistakes.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            SilkError::Truncated { .. }
                | SilkError::NotASilkStream(_)
                | SilkError::BadHeaderLength { .. }
                | SilkError::CompressionCorrupt { .. }
        )
    }
}
