//! Flow streams: the reader/writer pair the tools drive.
//!
//! # Writer
//! [`FlowWriter`] owns the whole output pipeline: canonical records are
//! encoded through the format table, framed by the body layer, and preceded
//! by a header that is emitted lazily, so callers can keep adding trailing
//! entries between `create` and the first record.  `close()` flushes the
//! tail frame; without it the last records of a compressed stream never
//! reach the destination.  Dropping a writer closes it best-effort and
//! swallows errors.
//!
//! # Reader
//! [`FlowReader`] materializes the header at open and performs the codec
//! availability check up front (fail hard if the body needs an unlinked
//! codec, no negotiation), then hands out canonical records one at a
//! time.  `records()` adapts the stream to an iterator for callers that
//! want to fold, filter, or short-circuit.
//!
//! # Record flow
//! Read side: decode, packed-file overlay, IPv6 policy, caller filter.
//! Write side: IPv6 policy, then encode.  Records dropped by policy or
//! filter are counted, never errors.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::mem;

use crate::body::{BodyReader, BodyWriter};
use crate::compress::{Availability, CodecError, CompressionMethod};
use crate::config::EngineConfig;
use crate::endian::Endianness;
use crate::error::{Result, SilkError};
use crate::formats::{self, FormatDef, CAP_SITE_IDS};
use crate::header::{FileFormat, HeaderEntry, StreamHeader};
use crate::policy::Ipv6Policy;
use crate::record::{RwRec, SENSOR_UNRESOLVED};

fn resolve_compression(
    requested: CompressionMethod,
    config: &EngineConfig,
) -> Result<CompressionMethod> {
    requested
        .resolve(config.default_compression)
        .map_err(|e| match e {
            CodecError::UnknownMethod(id) => SilkError::UnknownCompression(id),
            CodecError::Unavailable(m) => SilkError::CompressionUnavailable(m),
            other => SilkError::CompressionCorrupt {
                offset: 0,
                detail: other.to_string(),
            },
        })
}

// ── Writer ──────────────────────────────────────────────────────────────────

/// Everything a writer needs to shape its output stream.
#[derive(Debug, Clone)]
pub struct WriterOptions {
    pub format: FileFormat,
    pub record_version: u8,
    /// Resolved against [`reference_big`](Self::reference_big); only a
    /// concrete order reaches the header.
    pub byte_order: Endianness,
    /// May be a pseudo value; resolved through `EngineConfig` at create.
    pub compression: CompressionMethod,
    pub policy: Ipv6Policy,
    /// Trailing entries emitted ahead of the sentinel, in order.
    pub entries: Vec<HeaderEntry>,
    /// Command line recorded in an invocation entry.  `None` suppresses it.
    pub invocation: Option<String>,
    /// Byte order of the stream being rewritten; consulted only when
    /// `byte_order` is `Swap`.
    pub reference_big: bool,
}

impl WriterOptions {
    pub fn new(format: FileFormat, record_version: u8) -> Self {
        WriterOptions {
            format,
            record_version,
            byte_order: Endianness::Native,
            compression: CompressionMethod::Default,
            policy: Ipv6Policy::Mix,
            entries: Vec::new(),
            invocation: None,
            reference_big: cfg!(target_endian = "big"),
        }
    }

    /// Copy-through constructor: keep the source header's shape so a rewrite
    /// preserves everything the caller does not override.  Unknown entries
    /// ride along verbatim; known entries are re-encoded into the output
    /// byte order when the header is written.
    pub fn from_header(header: &StreamHeader) -> Self {
        WriterOptions {
            format: header.format,
            record_version: header.record_version,
            byte_order: if header.big_endian {
                Endianness::Big
            } else {
                Endianness::Little
            },
            compression: header.compression,
            policy: Ipv6Policy::Mix,
            entries: header.entries.clone(),
            invocation: None,
            reference_big: header.big_endian,
        }
    }
}

enum WriterState<W: Write> {
    /// Header not on the wire yet; entries may still be added.
    Pending(W),
    Streaming(BodyWriter<W>),
    Closed,
}

pub struct FlowWriter<W: Write> {
    state: WriterState<W>,
    header: StreamHeader,
    def: &'static FormatDef,
    policy: Ipv6Policy,
    frame_size: usize,
    encode_buf: Vec<u8>,
    records_written: u64,
    records_skipped: u64,
    /// Body byte counts captured at close, while the body writer exists.
    final_bytes: (u64, u64),
}

impl FlowWriter<Box<dyn Write>> {
    /// Creates a stream at `path`; the literal `-` binds stdout.
    pub fn create(path: &str, options: WriterOptions, config: &EngineConfig) -> Result<Self> {
        let dest: Box<dyn Write> = if path == "-" {
            Box::new(io::stdout())
        } else {
            Box::new(BufWriter::new(File::create(path)?))
        };
        Self::from_writer(dest, options, config)
    }
}

impl<W: Write> FlowWriter<W> {
    /// Wraps any byte sink.  Pseudo compression values are resolved here;
    /// the header itself is not written until the first record (or `close`,
    /// for a stream that stays empty).
    pub fn from_writer(dest: W, options: WriterOptions, config: &EngineConfig) -> Result<Self> {
        let def = formats::lookup(options.format as u8, options.record_version).ok_or(
            SilkError::UnknownVersion {
                format: options.format as u8,
                version: options.record_version,
            },
        )?;
        let method = resolve_compression(options.compression, config)?;
        let big_endian = options.byte_order.resolve(options.reference_big);

        let mut header =
            StreamHeader::new(options.format, options.record_version, u16::from(def.size));
        header.big_endian = big_endian;
        header.compression = method;
        header.entries = options.entries;
        if let Some(cmd) = options.invocation {
            header.add_entry(HeaderEntry::Invocation(cmd));
        }

        Ok(FlowWriter {
            state: WriterState::Pending(dest),
            header,
            def,
            policy: options.policy,
            frame_size: config.block_size.max(1),
            encode_buf: vec![0u8; usize::from(def.size)],
            records_written: 0,
            records_skipped: 0,
            final_bytes: (0, 0),
        })
    }

    /// The header as it will be (or was) written.
    pub fn header(&self) -> &StreamHeader {
        &self.header
    }

    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    /// Records the IPv6 policy dropped instead of writing.
    pub fn records_skipped(&self) -> u64 {
        self.records_skipped
    }

    /// Body bytes put on the wire so far, excluding the header.
    pub fn bytes_written_compressed(&self) -> u64 {
        match &self.state {
            WriterState::Streaming(body) => body.bytes_written_compressed(),
            _ => self.final_bytes.0,
        }
    }

    pub fn bytes_written_uncompressed(&self) -> u64 {
        match &self.state {
            WriterState::Streaming(body) => body.bytes_written_uncompressed(),
            _ => self.final_bytes.1,
        }
    }

    /// Appends a trailing entry.  Legal only while the header is pending,
    /// which ends at the first `write_record` (or at `close`).
    pub fn add_entry(&mut self, entry: HeaderEntry) -> Result<()> {
        match self.state {
            WriterState::Pending(_) => {
                self.header.add_entry(entry);
                Ok(())
            }
            WriterState::Streaming(_) => Err(SilkError::AlreadyOpen),
            WriterState::Closed => Err(SilkError::NotOpen),
        }
    }

    /// Encodes one record, emitting the header first when it is still
    /// pending.  Returns `Ok(())` for a record the policy skipped; the skip
    /// shows up in [`records_skipped`](Self::records_skipped).
    pub fn write_record(&mut self, rec: &RwRec) -> Result<()> {
        if matches!(self.state, WriterState::Closed) {
            return Err(SilkError::NotOpen);
        }
        let mut rec = *rec;
        if !self.policy.apply_write(&mut rec)? {
            self.records_skipped += 1;
            return Ok(());
        }

        // Encode before touching the wire: a refused record must not leave
        // a half-written stream behind.
        let big_endian = self.header.big_endian;
        self.def.encode(&rec, &mut self.encode_buf, big_endian)?;

        self.ensure_open()?;
        match &mut self.state {
            WriterState::Streaming(body) => {
                body.write_all(&self.encode_buf)?;
                self.records_written += 1;
                Ok(())
            }
            _ => Err(SilkError::NotOpen),
        }
    }

    /// Flushes the tail frame and the destination.  An empty stream still
    /// gets its header here.  Calling `close` twice is `NotOpen`.
    pub fn close(&mut self) -> Result<()> {
        if matches!(self.state, WriterState::Closed) {
            return Err(SilkError::NotOpen);
        }
        self.ensure_open()?;
        match mem::replace(&mut self.state, WriterState::Closed) {
            WriterState::Streaming(mut body) => {
                body.finish()?;
                self.final_bytes = (
                    body.bytes_written_compressed(),
                    body.bytes_written_uncompressed(),
                );
                Ok(())
            }
            _ => Err(SilkError::NotOpen),
        }
    }

    /// Writes the header and opens the body if that has not happened yet.
    fn ensure_open(&mut self) -> Result<()> {
        match mem::replace(&mut self.state, WriterState::Closed) {
            WriterState::Pending(mut dest) => {
                self.header.write(&mut dest)?;
                self.state = WriterState::Streaming(BodyWriter::new(
                    dest,
                    self.header.compression,
                    self.header.big_endian,
                    self.frame_size,
                ));
                Ok(())
            }
            other => {
                self.state = other;
                Ok(())
            }
        }
    }
}

impl<W: Write> Drop for FlowWriter<W> {
    /// Best-effort close; errors are dropped.  Call `close` to observe them.
    fn drop(&mut self) {
        if !matches!(self.state, WriterState::Closed) {
            let _ = self.close();
        }
    }
}

// ── Reader ──────────────────────────────────────────────────────────────────

pub struct FlowReader<R: Read> {
    body: BodyReader<R>,
    header: StreamHeader,
    def: &'static FormatDef,
    policy: Ipv6Policy,
    filter: Option<Box<dyn FnMut(&RwRec) -> bool>>,
    /// `(sensor, flowtype)` injected into formats without in-record site
    /// ids, taken from the packed-file header entry.
    overlay: Option<(u16, u8)>,
    records_read: u64,
    records_skipped: u64,
}

impl FlowReader<Box<dyn Read>> {
    /// Opens `path`; the literal `-` binds stdin.
    pub fn open(path: &str) -> Result<Self> {
        let src: Box<dyn Read> = if path == "-" {
            Box::new(io::stdin())
        } else {
            Box::new(BufReader::new(File::open(path)?))
        };
        Self::from_reader(src)
    }
}

impl<R: Read> FlowReader<R> {
    /// Wraps any byte source.  The header is parsed immediately, and a
    /// stream whose body needs an unlinked codec refuses to open here
    /// rather than failing mid-body.  The stream is self-describing, so
    /// readers take no [`EngineConfig`].
    pub fn from_reader(mut src: R) -> Result<Self> {
        let header = StreamHeader::read(&mut src)?;
        if header.compression.availability() != Availability::Available {
            return Err(SilkError::CompressionUnavailable(header.compression));
        }
        let def = formats::lookup(header.format as u8, header.record_version).ok_or(
            SilkError::UnknownVersion {
                format: header.format as u8,
                version: header.record_version,
            },
        )?;

        let overlay = if def.has_cap(CAP_SITE_IDS) {
            None
        } else {
            header.packed_file().map(|(_, flowtype_id, sensor_id)| {
                (
                    u16::try_from(sensor_id).unwrap_or(SENSOR_UNRESOLVED),
                    u8::try_from(flowtype_id).unwrap_or(0),
                )
            })
        };

        let body = BodyReader::new(src, header.compression, header.big_endian);
        Ok(FlowReader {
            body,
            header,
            def,
            policy: Ipv6Policy::default(),
            filter: None,
            overlay,
            records_read: 0,
            records_skipped: 0,
        })
    }

    pub fn header(&self) -> &StreamHeader {
        &self.header
    }

    pub fn format(&self) -> FileFormat {
        self.header.format
    }

    /// Records returned to the caller so far.
    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    /// Records decoded but dropped by the policy or the filter.
    pub fn records_skipped(&self) -> u64 {
        self.records_skipped
    }

    /// Body bytes consumed from the source, before decompression.
    pub fn bytes_read_compressed(&self) -> u64 {
        self.body.bytes_read_compressed()
    }

    pub fn bytes_read_uncompressed(&self) -> u64 {
        self.body.bytes_read_uncompressed()
    }

    /// Policy applied to every record before it is returned.
    pub fn set_policy(&mut self, policy: Ipv6Policy) {
        self.policy = policy;
    }

    /// Caller predicate; records it rejects are counted as skipped and
    /// never returned.
    pub fn set_filter(&mut self, filter: impl FnMut(&RwRec) -> bool + 'static) {
        self.filter = Some(Box::new(filter));
    }

    /// Returns the next record, or `None` at a clean end-of-stream.
    ///
    /// Policy and filter drops are handled inside the loop, so a `Some` is
    /// always a record the caller wants.
    pub fn read_record(&mut self) -> Result<Option<RwRec>> {
        let size = usize::from(self.def.size);
        loop {
            let bytes = match self.body.read_exact(size)? {
                Some(b) => b,
                None => return Ok(None),
            };
            let mut rec = self.def.decode(bytes, self.header.big_endian);
            if let Some((sensor, flowtype)) = self.overlay {
                rec.sensor = sensor;
                rec.flowtype = flowtype;
            }
            if !self.policy.apply_read(&mut rec) {
                self.records_skipped += 1;
                continue;
            }
            if let Some(filter) = &mut self.filter {
                if !filter(&rec) {
                    self.records_skipped += 1;
                    continue;
                }
            }
            self.records_read += 1;
            return Ok(Some(rec));
        }
    }

    /// Iterator adapter over [`read_record`](Self::read_record).  The
    /// iterator is fused: after the first error or end-of-stream it yields
    /// nothing further.
    pub fn records(&mut self) -> Records<'_, R> {
        Records {
            reader: self,
            done: false,
        }
    }
}

/// See [`FlowReader::records`].
pub struct Records<'a, R: Read> {
    reader: &'a mut FlowReader<R>,
    done: bool,
}

impl<R: Read> Iterator for Records<'_, R> {
    type Item = Result<RwRec>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.read_record() {
            Ok(Some(rec)) => Some(Ok(rec)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(n: u16) -> RwRec {
        let mut rec = RwRec::new();
        rec.set_ipv4_addrs(0x0A00_0001, 0x0A00_0002, 0);
        rec.start_ms = 1_700_000_000_000 + u64::from(n);
        rec.dur_ms = 1000;
        rec.sport = 1024 + n;
        rec.dport = 443;
        rec.proto = 6;
        rec.pkts = 10;
        rec.bytes = 840;
        rec.flags_all = 0x1B;
        rec.sensor = 3;
        rec.flowtype = 1;
        rec
    }

    fn write_stream(options: WriterOptions, records: &[RwRec]) -> Vec<u8> {
        let config = EngineConfig::default();
        let mut bytes = Vec::new();
        {
            let mut w = FlowWriter::from_writer(&mut bytes, options, &config).unwrap();
            for rec in records {
                w.write_record(rec).unwrap();
            }
            w.close().unwrap();
        }
        bytes
    }

    #[test]
    fn round_trip_with_lazy_header() {
        let config = EngineConfig::default();
        let mut bytes = Vec::new();
        {
            let mut w = FlowWriter::from_writer(
                &mut bytes,
                WriterOptions::new(FileFormat::RwGeneric, 1),
                &config,
            )
            .unwrap();
            w.add_entry(HeaderEntry::Annotation("unit".into())).unwrap();
            for n in 0..4 {
                w.write_record(&sample(n)).unwrap();
            }
            assert_eq!(w.records_written(), 4);
            w.close().unwrap();
        }

        let mut r = FlowReader::from_reader(bytes.as_slice()).unwrap();
        assert_eq!(r.format(), FileFormat::RwGeneric);
        assert!(r
            .header()
            .entries
            .iter()
            .any(|e| matches!(e, HeaderEntry::Annotation(s) if s == "unit")));
        for n in 0..4 {
            assert_eq!(r.read_record().unwrap().unwrap(), sample(n));
        }
        assert!(r.read_record().unwrap().is_none());
        assert_eq!(r.records_read(), 4);
    }

    #[test]
    fn add_entry_after_first_record_is_rejected() {
        let config = EngineConfig::default();
        let mut bytes = Vec::new();
        let mut w = FlowWriter::from_writer(
            &mut bytes,
            WriterOptions::new(FileFormat::RwGeneric, 1),
            &config,
        )
        .unwrap();
        w.write_record(&sample(0)).unwrap();
        assert!(matches!(
            w.add_entry(HeaderEntry::Annotation("late".into())),
            Err(SilkError::AlreadyOpen)
        ));
    }

    #[test]
    fn empty_stream_still_writes_header_at_close() {
        let config = EngineConfig::default();
        let mut bytes = Vec::new();
        {
            let mut w = FlowWriter::from_writer(
                &mut bytes,
                WriterOptions::new(FileFormat::RwSplit, 1),
                &config,
            )
            .unwrap();
            w.close().unwrap();
            assert!(matches!(w.close(), Err(SilkError::NotOpen)));
            assert!(matches!(
                w.write_record(&sample(0)),
                Err(SilkError::NotOpen)
            ));
        }
        let mut r = FlowReader::from_reader(bytes.as_slice()).unwrap();
        assert!(r.read_record().unwrap().is_none());
    }

    #[test]
    fn packed_file_overlay_fills_site_ids() {
        let mut options = WriterOptions::new(FileFormat::RwSplit, 1);
        options.entries.push(HeaderEntry::PackedFile {
            start_hour_epoch: 1_600_000_000,
            flowtype_id: 2,
            sensor_id: 9,
        });
        let bytes = write_stream(options, &[sample(0)]);

        let mut r = FlowReader::from_reader(bytes.as_slice()).unwrap();
        let rec = r.read_record().unwrap().unwrap();
        assert_eq!(rec.sensor, 9);
        assert_eq!(rec.flowtype, 2);
    }

    #[test]
    fn overlay_is_ignored_when_records_carry_site_ids() {
        let mut options = WriterOptions::new(FileFormat::RwGeneric, 1);
        options.entries.push(HeaderEntry::PackedFile {
            start_hour_epoch: 1_600_000_000,
            flowtype_id: 2,
            sensor_id: 9,
        });
        let bytes = write_stream(options, &[sample(0)]);

        let mut r = FlowReader::from_reader(bytes.as_slice()).unwrap();
        let rec = r.read_record().unwrap().unwrap();
        assert_eq!(rec.sensor, 3);
        assert_eq!(rec.flowtype, 1);
    }

    #[test]
    fn write_policy_skips_and_counts() {
        let config = EngineConfig::default();
        let mut options = WriterOptions::new(FileFormat::RwIpv6, 1);
        options.policy = Ipv6Policy::AsV4;
        let mut bytes = Vec::new();
        {
            let mut w = FlowWriter::from_writer(&mut bytes, options, &config).unwrap();
            let mut v6 = sample(0);
            v6.set_sip("2001:db8::1".parse().unwrap());
            w.write_record(&v6).unwrap();
            w.write_record(&sample(1)).unwrap();
            assert_eq!(w.records_skipped(), 1);
            assert_eq!(w.records_written(), 1);
            w.close().unwrap();
        }

        let mut r = FlowReader::from_reader(bytes.as_slice()).unwrap();
        assert_eq!(r.read_record().unwrap().unwrap().sport, sample(1).sport);
        assert!(r.read_record().unwrap().is_none());
    }

    #[test]
    fn reader_filter_drops_and_counts() {
        let bytes = write_stream(
            WriterOptions::new(FileFormat::RwGeneric, 1),
            &[sample(0), sample(1), sample(2), sample(3)],
        );

        let mut r = FlowReader::from_reader(bytes.as_slice()).unwrap();
        r.set_filter(|rec| rec.sport % 2 == 0);
        let got: Vec<u16> = r.records().map(|rec| rec.unwrap().sport).collect();
        assert_eq!(got, vec![1024, 1026]);
        assert_eq!(r.records_read(), 2);
        assert_eq!(r.records_skipped(), 2);
    }

    #[test]
    fn truncated_record_is_detected() {
        let bytes = write_stream(
            WriterOptions::new(FileFormat::RwGeneric, 1),
            &[sample(0), sample(1)],
        );

        let cut = bytes.len() - 1;
        let mut r = FlowReader::from_reader(&bytes[..cut]).unwrap();
        assert!(r.read_record().unwrap().is_some());
        assert!(matches!(
            r.read_record(),
            Err(SilkError::Truncated { .. })
        ));
    }

    #[test]
    fn unlinked_codec_refused_at_open() {
        let mut header = StreamHeader::new(FileFormat::RwSplit, 1, 39);
        header.compression = CompressionMethod::Lzo1x;
        let mut bytes = Vec::new();
        header.write(&mut bytes).unwrap();

        assert!(matches!(
            FlowReader::from_reader(bytes.as_slice()),
            Err(SilkError::CompressionUnavailable(CompressionMethod::Lzo1x))
        ));
        // The header layer still accepts the stream for inspection.
        assert!(StreamHeader::read(&mut bytes.as_slice()).is_ok());
    }

    #[test]
    fn swap_order_inverts_the_reference() {
        let mut options = WriterOptions::new(FileFormat::RwGeneric, 1);
        options.byte_order = Endianness::Swap;
        options.reference_big = false;
        let bytes = write_stream(options, &[sample(7)]);

        let mut r = FlowReader::from_reader(bytes.as_slice()).unwrap();
        assert!(r.header().big_endian);
        assert_eq!(r.read_record().unwrap().unwrap(), sample(7));
    }

    #[test]
    fn compressed_stream_round_trips() {
        let mut options = WriterOptions::new(FileFormat::RwGeneric, 1);
        options.compression = CompressionMethod::Zlib;
        let config = EngineConfig::default();
        let mut bytes = Vec::new();
        {
            let mut w = FlowWriter::from_writer(&mut bytes, options, &config).unwrap();
            for n in 0..100 {
                w.write_record(&sample(n)).unwrap();
            }
            w.close().unwrap();
            assert!(w.bytes_written_compressed() < w.bytes_written_uncompressed());
        }

        let mut r = FlowReader::from_reader(bytes.as_slice()).unwrap();
        let records = r.records().collect::<Result<Vec<RwRec>>>().unwrap();
        assert_eq!(records.len(), 100);
        assert_eq!(records[99], sample(99));
    }

    #[test]
    fn copy_through_keeps_unknown_entries() {
        let mut options = WriterOptions::new(FileFormat::RwSplit, 1);
        options.entries.push(HeaderEntry::Unknown {
            id: 0x7777,
            bytes: vec![1, 2, 3],
        });
        let first = write_stream(options, &[sample(0)]);

        let config = EngineConfig::default();
        let mut src = FlowReader::from_reader(first.as_slice()).unwrap();
        let copied = WriterOptions::from_header(src.header());
        let mut second = Vec::new();
        {
            let mut w = FlowWriter::from_writer(&mut second, copied, &config).unwrap();
            while let Some(rec) = src.read_record().unwrap() {
                w.write_record(&rec).unwrap();
            }
            w.close().unwrap();
        }

        let r = FlowReader::from_reader(second.as_slice()).unwrap();
        assert!(r.header().entries.iter().any(|e| matches!(
            e,
            HeaderEntry::Unknown { id: 0x7777, bytes } if bytes == &[1, 2, 3]
        )));
    }

    #[test]
    fn invocation_is_recorded_when_supplied() {
        let mut options = WriterOptions::new(FileFormat::RwSplit, 1);
        options.invocation = Some("rwflow cat a.rw".into());
        let bytes = write_stream(options, &[]);

        let r = FlowReader::from_reader(bytes.as_slice()).unwrap();
        assert!(r.header().entries.iter().any(
            |e| matches!(e, HeaderEntry::Invocation(s) if s == "rwflow cat a.rw")
        ));
    }
}
