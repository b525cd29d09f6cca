//! Container header: fixed prolog + typed trailing entries.
//!
//! Every stream begins with a 16-byte prolog:
//!
//! ```text
//! offset  size  field
//!      0     4  magic  DE AD BE EF
//!      4     1  flags  (bit 0 = big-endian body; other bits reserved zero)
//!      5     1  file_format
//!      6     1  record_version
//!      7     1  compression_method
//!      8     4  header_length   (prolog + entries + sentinel, body order)
//!     12     2  record_length   (body order)
//!     14     2  silk_version    (body order)
//! ```
//!
//! The prolog is followed by trailing entries, each
//! `(entry_id: u32, entry_length: u32, payload)` with `entry_length`
//! counting its own 8 bytes, terminated by the id-0 sentinel (length 8).
//! Multi-byte integers everywhere after byte 7 are in the body byte order
//! named by flag bit 0.
//!
//! Entry ids are a closed set.  Unknown ids are preserved verbatim so a
//! writer can copy a header through; known entries are re-encoded, which
//! rewrites their integers into the output byte order.

use std::io::{self, Read, Write};

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::compress::CompressionMethod;
use crate::error::{Result, SilkError};
use crate::formats;

pub const MAGIC: [u8; 4] = [0xDE, 0xAD, 0xBE, 0xEF];
pub const PROLOG_LEN: u32 = 16;
/// Version stamp written into byte 14..16 of new streams.
pub const LIB_VERSION: u16 = 0x0100;

const FLAG_BIG_ENDIAN: u8 = 0x01;
const SENTINEL_LEN: u32 = 8;

// ── Entry ids ───────────────────────────────────────────────────────────────
//
// Frozen values.  An id is never reused, even for a retired entry kind.

pub const ENTRY_SENTINEL: u32 = 0;
pub const ENTRY_PACKED_FILE: u32 = 1;
pub const ENTRY_INVOCATION: u32 = 2;
pub const ENTRY_ANNOTATION: u32 = 3;
pub const ENTRY_PROBE_NAME: u32 = 4;
pub const ENTRY_PREFIX_MAP: u32 = 5;
pub const ENTRY_BAG_DESC: u32 = 6;
pub const ENTRY_IPSET_DESC: u32 = 7;

// ── File formats ────────────────────────────────────────────────────────────

/// Container file format.  The discriminants are the on-disk ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FileFormat {
    Tempfile = 0x08,
    RwIpv6 = 0x0B,
    RwRouted = 0x0F,
    RwNotRouted = 0x10,
    RwSplit = 0x11,
    RwAugmented = 0x13,
    RwGeneric = 0x15,
    RwBag = 0x19,
    PrefixMap = 0x1D,
    IpSet = 0x1E,
}

impl FileFormat {
    pub fn from_u8(id: u8) -> Option<Self> {
        match id {
            0x08 => Some(FileFormat::Tempfile),
            0x0B => Some(FileFormat::RwIpv6),
            0x0F => Some(FileFormat::RwRouted),
            0x10 => Some(FileFormat::RwNotRouted),
            0x11 => Some(FileFormat::RwSplit),
            0x13 => Some(FileFormat::RwAugmented),
            0x15 => Some(FileFormat::RwGeneric),
            0x19 => Some(FileFormat::RwBag),
            0x1D => Some(FileFormat::PrefixMap),
            0x1E => Some(FileFormat::IpSet),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FileFormat::Tempfile => "FT_TEMPFILE",
            FileFormat::RwIpv6 => "FT_RWIPV6",
            FileFormat::RwRouted => "FT_RWROUTED",
            FileFormat::RwNotRouted => "FT_RWNOTROUTED",
            FileFormat::RwSplit => "FT_RWSPLIT",
            FileFormat::RwAugmented => "FT_RWAUGMENTED",
            FileFormat::RwGeneric => "FT_RWGENERIC",
            FileFormat::RwBag => "FT_RWBAG",
            FileFormat::PrefixMap => "FT_PREFIXMAP",
            FileFormat::IpSet => "FT_IPSET",
        }
    }

    /// Whether the body is a flow-record sequence (as opposed to a bag,
    /// prefix map, or ipset body, which only the header layer understands).
    pub fn is_flow(self) -> bool {
        !matches!(
            self,
            FileFormat::RwBag | FileFormat::PrefixMap | FileFormat::IpSet
        )
    }
}

// ── Header entries ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderEntry {
    /// Hourly packed-file metadata: the repository slot this file was
    /// packed into.  Formats without in-record site ids rely on it.
    PackedFile {
        start_hour_epoch: u32,
        flowtype_id: u32,
        sensor_id: u32,
    },
    /// Command line that produced the stream.
    Invocation(String),
    /// Free-text annotation.
    Annotation(String),
    /// Collection probe the records came from.
    ProbeName(String),
    /// Name of the prefix map carried in the body.
    PrefixMapName(String),
    /// Bag body layout: key/counter type and width.
    BagDescriptor {
        key_type: u16,
        key_length: u16,
        counter_type: u16,
        counter_length: u16,
    },
    /// IPset body tree shape.
    IpsetDescriptor {
        child_count: u32,
        leaf_count: u32,
        leaf_size: u32,
        node_count: u32,
        node_size: u32,
        root_index: u32,
    },
    /// Entry id outside the closed set, preserved byte-for-byte.
    Unknown { id: u32, bytes: Vec<u8> },
}

impl HeaderEntry {
    pub fn id(&self) -> u32 {
        match self {
            HeaderEntry::PackedFile { .. } => ENTRY_PACKED_FILE,
            HeaderEntry::Invocation(_) => ENTRY_INVOCATION,
            HeaderEntry::Annotation(_) => ENTRY_ANNOTATION,
            HeaderEntry::ProbeName(_) => ENTRY_PROBE_NAME,
            HeaderEntry::PrefixMapName(_) => ENTRY_PREFIX_MAP,
            HeaderEntry::BagDescriptor { .. } => ENTRY_BAG_DESC,
            HeaderEntry::IpsetDescriptor { .. } => ENTRY_IPSET_DESC,
            HeaderEntry::Unknown { id, .. } => *id,
        }
    }

    pub fn payload_len(&self) -> usize {
        match self {
            HeaderEntry::PackedFile { .. } => 12,
            HeaderEntry::Invocation(s)
            | HeaderEntry::Annotation(s)
            | HeaderEntry::ProbeName(s)
            | HeaderEntry::PrefixMapName(s) => s.len(),
            HeaderEntry::BagDescriptor { .. } => 8,
            HeaderEntry::IpsetDescriptor { .. } => 24,
            HeaderEntry::Unknown { bytes, .. } => bytes.len(),
        }
    }

    fn decode<B: ByteOrder>(id: u32, payload: Vec<u8>) -> Result<Self> {
        let fixed = |expected: usize| -> Result<()> {
            if payload.len() == expected {
                Ok(())
            } else {
                Err(SilkError::BadHeaderLength {
                    declared: payload.len() as u32 + 8,
                    parsed: expected as u32 + 8,
                })
            }
        };
        Ok(match id {
            ENTRY_PACKED_FILE => {
                fixed(12)?;
                HeaderEntry::PackedFile {
                    start_hour_epoch: B::read_u32(&payload[0..4]),
                    flowtype_id: B::read_u32(&payload[4..8]),
                    sensor_id: B::read_u32(&payload[8..12]),
                }
            }
            ENTRY_INVOCATION => HeaderEntry::Invocation(lossy(payload)),
            ENTRY_ANNOTATION => HeaderEntry::Annotation(lossy(payload)),
            ENTRY_PROBE_NAME => HeaderEntry::ProbeName(lossy(payload)),
            ENTRY_PREFIX_MAP => HeaderEntry::PrefixMapName(lossy(payload)),
            ENTRY_BAG_DESC => {
                fixed(8)?;
                HeaderEntry::BagDescriptor {
                    key_type: B::read_u16(&payload[0..2]),
                    key_length: B::read_u16(&payload[2..4]),
                    counter_type: B::read_u16(&payload[4..6]),
                    counter_length: B::read_u16(&payload[6..8]),
                }
            }
            ENTRY_IPSET_DESC => {
                fixed(24)?;
                HeaderEntry::IpsetDescriptor {
                    child_count: B::read_u32(&payload[0..4]),
                    leaf_count: B::read_u32(&payload[4..8]),
                    leaf_size: B::read_u32(&payload[8..12]),
                    node_count: B::read_u32(&payload[12..16]),
                    node_size: B::read_u32(&payload[16..20]),
                    root_index: B::read_u32(&payload[20..24]),
                }
            }
            _ => HeaderEntry::Unknown { id, bytes: payload },
        })
    }

    fn encode_payload<B: ByteOrder>(&self) -> Vec<u8> {
        match self {
            HeaderEntry::PackedFile {
                start_hour_epoch,
                flowtype_id,
                sensor_id,
            } => {
                let mut out = vec![0u8; 12];
                B::write_u32(&mut out[0..4], *start_hour_epoch);
                B::write_u32(&mut out[4..8], *flowtype_id);
                B::write_u32(&mut out[8..12], *sensor_id);
                out
            }
            HeaderEntry::Invocation(s)
            | HeaderEntry::Annotation(s)
            | HeaderEntry::ProbeName(s)
            | HeaderEntry::PrefixMapName(s) => s.as_bytes().to_vec(),
            HeaderEntry::BagDescriptor {
                key_type,
                key_length,
                counter_type,
                counter_length,
            } => {
                let mut out = vec![0u8; 8];
                B::write_u16(&mut out[0..2], *key_type);
                B::write_u16(&mut out[2..4], *key_length);
                B::write_u16(&mut out[4..6], *counter_type);
                B::write_u16(&mut out[6..8], *counter_length);
                out
            }
            HeaderEntry::IpsetDescriptor {
                child_count,
                leaf_count,
                leaf_size,
                node_count,
                node_size,
                root_index,
            } => {
                let mut out = vec![0u8; 24];
                B::write_u32(&mut out[0..4], *child_count);
                B::write_u32(&mut out[4..8], *leaf_count);
                B::write_u32(&mut out[8..12], *leaf_size);
                B::write_u32(&mut out[12..16], *node_count);
                B::write_u32(&mut out[16..20], *node_size);
                B::write_u32(&mut out[20..24], *root_index);
                out
            }
            HeaderEntry::Unknown { bytes, .. } => bytes.clone(),
        }
    }

    fn encode<B: ByteOrder, W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let payload = self.encode_payload::<B>();
        let mut head = [0u8; 8];
        B::write_u32(&mut head[0..4], self.id());
        B::write_u32(&mut head[4..8], payload.len() as u32 + 8);
        writer.write_all(&head)?;
        writer.write_all(&payload)
    }
}

fn lossy(payload: Vec<u8>) -> String {
    String::from_utf8_lossy(&payload).into_owned()
}

// ── Stream header ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHeader {
    pub format: FileFormat,
    pub record_version: u8,
    /// Always a concrete method; pseudo values are resolved before a header
    /// is built.
    pub compression: CompressionMethod,
    pub big_endian: bool,
    pub record_length: u16,
    pub silk_version: u16,
    /// Declared header length.  On a parsed header this may exceed
    /// [`computed_header_length`](Self::computed_header_length) when the
    /// producer padded the header.
    pub header_length: u32,
    pub entries: Vec<HeaderEntry>,
}

impl StreamHeader {
    pub fn new(format: FileFormat, record_version: u8, record_length: u16) -> Self {
        StreamHeader {
            format,
            record_version,
            compression: CompressionMethod::None,
            big_endian: cfg!(target_endian = "big"),
            record_length,
            silk_version: LIB_VERSION,
            header_length: 0,
            entries: Vec::new(),
        }
    }

    pub fn add_entry(&mut self, entry: HeaderEntry) {
        self.entries.push(entry);
    }

    /// The packed-file metadata entry, if present.  Returns
    /// `(start_hour_epoch, flowtype_id, sensor_id)`.
    pub fn packed_file(&self) -> Option<(u32, u32, u32)> {
        self.entries.iter().find_map(|e| match e {
            HeaderEntry::PackedFile {
                start_hour_epoch,
                flowtype_id,
                sensor_id,
            } => Some((*start_hour_epoch, *flowtype_id, *sensor_id)),
            _ => None,
        })
    }

    /// Length this header occupies when written by us (no padding).
    pub fn computed_header_length(&self) -> u32 {
        PROLOG_LEN
            + self
                .entries
                .iter()
                .map(|e| e.payload_len() as u32 + 8)
                .sum::<u32>()
            + SENTINEL_LEN
    }

    /// Parses a header from the start of `reader`, leaving the reader
    /// positioned at the first body byte.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut prolog = [0u8; PROLOG_LEN as usize];
        read_all(reader, &mut prolog, 0)?;

        if prolog[0..4] != MAGIC {
            return Err(SilkError::NotASilkStream([
                prolog[0], prolog[1], prolog[2], prolog[3],
            ]));
        }
        let flags = prolog[4];
        if flags & !FLAG_BIG_ENDIAN != 0 {
            return Err(SilkError::UnsupportedVersion { flags });
        }

        if flags & FLAG_BIG_ENDIAN != 0 {
            Self::finish_read::<BigEndian, R>(reader, &prolog, true)
        } else {
            Self::finish_read::<LittleEndian, R>(reader, &prolog, false)
        }
    }

    fn finish_read<B: ByteOrder, R: Read>(
        reader: &mut R,
        prolog: &[u8; PROLOG_LEN as usize],
        big_endian: bool,
    ) -> Result<Self> {
        let format =
            FileFormat::from_u8(prolog[5]).ok_or(SilkError::UnknownFormat(prolog[5]))?;
        let record_version = prolog[6];
        // Pseudo method ids never appear on disk.
        let compression = CompressionMethod::from_u8(prolog[7])
            .filter(|m| !m.is_pseudo())
            .ok_or(SilkError::UnknownCompression(prolog[7]))?;
        let header_length = B::read_u32(&prolog[8..12]);
        let record_length = B::read_u16(&prolog[12..14]);
        let silk_version = B::read_u16(&prolog[14..16]);

        if format.is_flow() {
            match formats::lookup(format as u8, record_version) {
                Some(def) if u16::from(def.size) == record_length => {}
                Some(def) => {
                    return Err(SilkError::FormatRecordLenMismatch {
                        format: format as u8,
                        version: record_version,
                        declared: record_length,
                        expected: u16::from(def.size),
                    })
                }
                None => {
                    return Err(SilkError::UnknownVersion {
                        format: format as u8,
                        version: record_version,
                    })
                }
            }
        }

        let mut entries = Vec::new();
        let mut parsed: u32 = PROLOG_LEN;
        loop {
            let mut head = [0u8; 8];
            read_all(reader, &mut head, u64::from(parsed))?;
            let id = B::read_u32(&head[0..4]);
            let len = B::read_u32(&head[4..8]);

            if len < 8 || parsed.checked_add(len).map_or(true, |p| p > header_length) {
                return Err(SilkError::BadHeaderLength {
                    declared: header_length,
                    parsed: parsed.saturating_add(len.max(8)),
                });
            }
            parsed += len;

            if id == ENTRY_SENTINEL {
                if len != SENTINEL_LEN {
                    return Err(SilkError::BadHeaderLength {
                        declared: len,
                        parsed: SENTINEL_LEN,
                    });
                }
                break;
            }

            let mut payload = vec![0u8; (len - 8) as usize];
            read_all(reader, &mut payload, u64::from(parsed))?;
            entries.push(HeaderEntry::decode::<B>(id, payload)?);
        }

        // Producers may pad beyond the sentinel; skip to the declared length.
        let padding = u64::from(header_length - parsed);
        if padding > 0 {
            let skipped = io::copy(&mut reader.by_ref().take(padding), &mut io::sink())?;
            if skipped != padding {
                return Err(SilkError::Truncated {
                    offset: u64::from(parsed) + skipped,
                });
            }
        }

        Ok(StreamHeader {
            format,
            record_version,
            compression,
            big_endian,
            record_length,
            silk_version,
            header_length,
            entries,
        })
    }

    /// Writes the prolog, every entry, and the sentinel.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        if self.big_endian {
            self.write_with::<BigEndian, W>(writer)
        } else {
            self.write_with::<LittleEndian, W>(writer)
        }
    }

    fn write_with<B: ByteOrder, W: Write>(&self, writer: &mut W) -> Result<()> {
        let mut prolog = [0u8; PROLOG_LEN as usize];
        prolog[0..4].copy_from_slice(&MAGIC);
        prolog[4] = if self.big_endian { FLAG_BIG_ENDIAN } else { 0 };
        prolog[5] = self.format as u8;
        prolog[6] = self.record_version;
        prolog[7] = self.compression as u8;
        B::write_u32(&mut prolog[8..12], self.computed_header_length());
        B::write_u16(&mut prolog[12..14], self.record_length);
        B::write_u16(&mut prolog[14..16], self.silk_version);
        writer.write_all(&prolog)?;

        for entry in &self.entries {
            entry.encode::<B, W>(writer)?;
        }

        let mut sentinel = [0u8; 8];
        B::write_u32(&mut sentinel[0..4], ENTRY_SENTINEL);
        B::write_u32(&mut sentinel[4..8], SENTINEL_LEN);
        writer.write_all(&sentinel)?;
        Ok(())
    }
}

fn read_all<R: Read>(reader: &mut R, buf: &mut [u8], offset: u64) -> Result<()> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => SilkError::Truncated { offset },
        _ => SilkError::Io(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header(big_endian: bool) -> StreamHeader {
        let mut h = StreamHeader::new(FileFormat::RwGeneric, 1, 52);
        h.big_endian = big_endian;
        h.compression = CompressionMethod::Zlib;
        h.add_entry(HeaderEntry::Annotation("captured at border".into()));
        h.add_entry(HeaderEntry::PackedFile {
            start_hour_epoch: 1_600_000_000 / 3600 * 3600,
            flowtype_id: 4,
            sensor_id: 11,
        });
        h.add_entry(HeaderEntry::Unknown {
            id: 0x60,
            bytes: vec![0xAA, 0xBB, 0xCC],
        });
        h
    }

    fn written(h: &StreamHeader) -> Vec<u8> {
        let mut buf = Vec::new();
        h.write(&mut buf).unwrap();
        buf
    }

    #[test]
    fn round_trip_both_orders() {
        for big in [false, true] {
            let h = sample_header(big);
            let buf = written(&h);
            let parsed = StreamHeader::read(&mut buf.as_slice()).unwrap();
            assert_eq!(parsed.format, FileFormat::RwGeneric);
            assert_eq!(parsed.record_version, 1);
            assert_eq!(parsed.compression, CompressionMethod::Zlib);
            assert_eq!(parsed.big_endian, big);
            assert_eq!(parsed.record_length, 52);
            assert_eq!(parsed.entries, h.entries);
            assert_eq!(parsed.header_length, h.computed_header_length());
        }
    }

    #[test]
    fn bad_magic_is_not_a_silk_stream() {
        let mut buf = written(&sample_header(false));
        buf[0] = 0x00;
        assert!(matches!(
            StreamHeader::read(&mut buf.as_slice()),
            Err(SilkError::NotASilkStream(_))
        ));
    }

    #[test]
    fn reserved_flag_bits_are_rejected() {
        let mut buf = written(&sample_header(false));
        buf[4] |= 0x80;
        assert!(matches!(
            StreamHeader::read(&mut buf.as_slice()),
            Err(SilkError::UnsupportedVersion { flags: 0x80 })
        ));
    }

    #[test]
    fn unknown_format_id_is_fatal() {
        let mut buf = written(&sample_header(false));
        buf[5] = 0x77;
        assert!(matches!(
            StreamHeader::read(&mut buf.as_slice()),
            Err(SilkError::UnknownFormat(0x77))
        ));
    }

    #[test]
    fn record_length_must_match_format_table() {
        let mut h = sample_header(false);
        h.record_length = 50;
        let buf = written(&h);
        assert!(matches!(
            StreamHeader::read(&mut buf.as_slice()),
            Err(SilkError::FormatRecordLenMismatch {
                declared: 50,
                expected: 52,
                ..
            })
        ));
    }

    #[test]
    fn unknown_record_version_is_fatal() {
        let mut buf = written(&sample_header(false));
        buf[6] = 9;
        assert!(matches!(
            StreamHeader::read(&mut buf.as_slice()),
            Err(SilkError::UnknownVersion {
                format: 0x15,
                version: 9
            })
        ));
    }

    #[test]
    fn envelope_formats_skip_the_length_check() {
        let mut h = StreamHeader::new(FileFormat::RwBag, 3, 0);
        h.add_entry(HeaderEntry::BagDescriptor {
            key_type: 1,
            key_length: 4,
            counter_type: 2,
            counter_length: 8,
        });
        let buf = written(&h);
        let parsed = StreamHeader::read(&mut buf.as_slice()).unwrap();
        assert_eq!(parsed.format, FileFormat::RwBag);
        assert_eq!(parsed.entries, h.entries);
    }

    #[test]
    fn pseudo_compression_on_disk_is_rejected() {
        let mut buf = written(&sample_header(false));
        buf[7] = CompressionMethod::Best as u8;
        assert!(matches!(
            StreamHeader::read(&mut buf.as_slice()),
            Err(SilkError::UnknownCompression(254))
        ));
    }

    #[test]
    fn declared_padding_is_skipped() {
        let h = sample_header(false);
        let mut buf = written(&h);
        let declared = h.computed_header_length() + 4;
        buf[8..12].copy_from_slice(&declared.to_le_bytes());
        buf.extend_from_slice(&[0, 0, 0, 0]);
        buf.extend_from_slice(b"body");

        let mut cursor = buf.as_slice();
        let parsed = StreamHeader::read(&mut cursor).unwrap();
        assert_eq!(parsed.header_length, declared);
        // The reader must now sit on the first body byte.
        assert_eq!(cursor, b"body");
    }

    #[test]
    fn declared_length_shorter_than_entries_is_an_error() {
        let h = sample_header(false);
        let mut buf = written(&h);
        let declared = PROLOG_LEN + 4; // cannot even hold the sentinel
        buf[8..12].copy_from_slice(&declared.to_le_bytes());
        assert!(matches!(
            StreamHeader::read(&mut buf.as_slice()),
            Err(SilkError::BadHeaderLength { .. })
        ));
    }

    #[test]
    fn truncated_header_reports_offset() {
        let buf = written(&sample_header(false));
        let cut = &buf[..20];
        assert!(matches!(
            StreamHeader::read(&mut &cut[..]),
            Err(SilkError::Truncated { .. })
        ));
    }

    #[test]
    fn packed_file_lookup() {
        let h = sample_header(false);
        assert_eq!(h.packed_file(), Some((1_599_998_400, 4, 11)));
        let plain = StreamHeader::new(FileFormat::RwSplit, 1, 39);
        assert_eq!(plain.packed_file(), None);
    }
}
