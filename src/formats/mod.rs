//! Fixed-size record layouts and the `(file_format, record_version)`
//! dispatch table.
//!
//! # Identity rules
//! A `(format, version)` pair keys exactly one layout.  Versions are
//! independent: nothing may assume version N+1 is a superset of version N,
//! and retiring a version never frees its key for reuse.
//!
//! # Decode / encode policy
//! Decoding zero-fills whatever the layout does not carry (site ids come
//! back as "unresolved") and tags the record's IP family: v4-only layouts
//! always produce IPv4 records, v6-capable layouts read an in-record flag.
//! Encoding never loses data silently except where documented:
//!
//! - counters or interface indices wider than the on-disk field refuse with
//!   `ValueOverflow`, as does a record whose `start + dur` would pass
//!   `u64::MAX`;
//! - a non-mapped IPv6 address refuses a v4-only layout with
//!   `Ipv6NotRepresentable`;
//! - init/session TCP flags written to a layout without the split-flags
//!   capability are OR-folded into the aggregate flag byte (the composite
//!   survives, the split does not).
//!
//! ICMP type/code stay packed in `dport` in both directions.

mod augmented;
mod generic;
mod ipv6;
mod notrouted;
mod routed;
mod split;

use byteorder::{BigEndian, LittleEndian};

use crate::error::{Result, SilkError};
use crate::header::FileFormat;
use crate::record::RwRec;

// ── Capability bits ─────────────────────────────────────────────────────────

/// Layout stores `flags_init`/`flags_session` separately from the aggregate.
pub const CAP_SPLIT_FLAGS: u32 = 1 << 0;
pub const CAP_APPLICATION: u32 = 1 << 1;
pub const CAP_MEMO: u32 = 1 << 2;
pub const CAP_NHIP: u32 = 1 << 3;
/// Layout stores an egress interface index.
pub const CAP_OUTPUT: u32 = 1 << 4;
/// Layout stores sensor and flowtype ids in each record.
pub const CAP_SITE_IDS: u32 = 1 << 5;
/// Layout can mark records IPv6.
pub const CAP_IPV6: u32 = 1 << 6;
/// Interface indices are full 32-bit fields.
pub const CAP_SNMP_32: u32 = 1 << 7;

// ── Dispatch table ──────────────────────────────────────────────────────────

type DecodeFn = fn(&[u8], &mut RwRec);
type EncodeFn = fn(&RwRec, &mut [u8]) -> Result<()>;

pub struct FormatDef {
    pub format: u8,
    pub version: u8,
    /// On-disk record size; the header's `record_length` must equal it.
    pub size: u8,
    pub caps: u32,
    decode_le: DecodeFn,
    decode_be: DecodeFn,
    encode_le: EncodeFn,
    encode_be: EncodeFn,
}

impl FormatDef {
    pub fn has_cap(&self, cap: u32) -> bool {
        self.caps & cap != 0
    }

    /// Decodes one record.  `bytes` must be exactly [`size`](Self::size)
    /// bytes; the stream layer guarantees that.
    pub fn decode(&self, bytes: &[u8], big_endian: bool) -> RwRec {
        debug_assert_eq!(bytes.len(), usize::from(self.size));
        let mut rec = RwRec::new();
        if big_endian {
            (self.decode_be)(bytes, &mut rec);
        } else {
            (self.decode_le)(bytes, &mut rec);
        }
        rec
    }

    /// Encodes one record into `out`, which must be exactly
    /// [`size`](Self::size) bytes.  Every layout stores `start_ms` and
    /// `dur_ms` separately, so a pair whose sum passes `u64::MAX` would
    /// decode to a flow that ends before it starts; such records are
    /// refused here rather than in each layout.
    pub fn encode(&self, rec: &RwRec, out: &mut [u8], big_endian: bool) -> Result<()> {
        debug_assert_eq!(out.len(), usize::from(self.size));
        if rec.start_ms.checked_add(u64::from(rec.dur_ms)).is_none() {
            return Err(SilkError::ValueOverflow {
                field: "end_ms",
                value: u64::MAX,
            });
        }
        if big_endian {
            (self.encode_be)(rec, out)
        } else {
            (self.encode_le)(rec, out)
        }
    }
}

pub static FORMAT_TABLE: [FormatDef; 8] = [
    FormatDef {
        format: FileFormat::RwGeneric as u8,
        version: 1,
        size: 52,
        caps: CAP_SPLIT_FLAGS
            | CAP_APPLICATION
            | CAP_MEMO
            | CAP_NHIP
            | CAP_OUTPUT
            | CAP_SITE_IDS,
        decode_le: generic::decode_v1::<LittleEndian>,
        decode_be: generic::decode_v1::<BigEndian>,
        encode_le: generic::encode_v1::<LittleEndian>,
        encode_be: generic::encode_v1::<BigEndian>,
    },
    FormatDef {
        format: FileFormat::RwGeneric as u8,
        version: 2,
        size: 60,
        caps: CAP_SPLIT_FLAGS
            | CAP_APPLICATION
            | CAP_MEMO
            | CAP_NHIP
            | CAP_OUTPUT
            | CAP_SITE_IDS
            | CAP_SNMP_32,
        decode_le: generic::decode_v2::<LittleEndian>,
        decode_be: generic::decode_v2::<BigEndian>,
        encode_le: generic::encode_v2::<LittleEndian>,
        encode_be: generic::encode_v2::<BigEndian>,
    },
    FormatDef {
        format: FileFormat::RwIpv6 as u8,
        version: 1,
        size: 93,
        caps: CAP_SPLIT_FLAGS
            | CAP_APPLICATION
            | CAP_MEMO
            | CAP_NHIP
            | CAP_OUTPUT
            | CAP_SITE_IDS
            | CAP_IPV6
            | CAP_SNMP_32,
        decode_le: ipv6::decode_v1::<LittleEndian>,
        decode_be: ipv6::decode_v1::<BigEndian>,
        encode_le: ipv6::encode_v1::<LittleEndian>,
        encode_be: ipv6::encode_v1::<BigEndian>,
    },
    // Spill files share the RWIPV6 layout so nothing is lost through a
    // sort/merge round trip.
    FormatDef {
        format: FileFormat::Tempfile as u8,
        version: 1,
        size: 93,
        caps: CAP_SPLIT_FLAGS
            | CAP_APPLICATION
            | CAP_MEMO
            | CAP_NHIP
            | CAP_OUTPUT
            | CAP_SITE_IDS
            | CAP_IPV6
            | CAP_SNMP_32,
        decode_le: ipv6::decode_v1::<LittleEndian>,
        decode_be: ipv6::decode_v1::<BigEndian>,
        encode_le: ipv6::encode_v1::<LittleEndian>,
        encode_be: ipv6::encode_v1::<BigEndian>,
    },
    FormatDef {
        format: FileFormat::RwRouted as u8,
        version: 1,
        size: 44,
        caps: CAP_NHIP | CAP_OUTPUT | CAP_SITE_IDS,
        decode_le: routed::decode_v1::<LittleEndian>,
        decode_be: routed::decode_v1::<BigEndian>,
        encode_le: routed::encode_v1::<LittleEndian>,
        encode_be: routed::encode_v1::<BigEndian>,
    },
    FormatDef {
        format: FileFormat::RwNotRouted as u8,
        version: 1,
        size: 39,
        caps: CAP_SITE_IDS,
        decode_le: notrouted::decode_v1::<LittleEndian>,
        decode_be: notrouted::decode_v1::<BigEndian>,
        encode_le: notrouted::encode_v1::<LittleEndian>,
        encode_be: notrouted::encode_v1::<BigEndian>,
    },
    FormatDef {
        format: FileFormat::RwSplit as u8,
        version: 1,
        size: 39,
        caps: CAP_OUTPUT,
        decode_le: split::decode_v1::<LittleEndian>,
        decode_be: split::decode_v1::<BigEndian>,
        encode_le: split::encode_v1::<LittleEndian>,
        encode_be: split::encode_v1::<BigEndian>,
    },
    FormatDef {
        format: FileFormat::RwAugmented as u8,
        version: 1,
        size: 46,
        caps: CAP_SPLIT_FLAGS | CAP_APPLICATION | CAP_OUTPUT | CAP_SITE_IDS,
        decode_le: augmented::decode_v1::<LittleEndian>,
        decode_be: augmented::decode_v1::<BigEndian>,
        encode_le: augmented::encode_v1::<LittleEndian>,
        encode_be: augmented::encode_v1::<BigEndian>,
    },
];

pub fn lookup(format: u8, version: u8) -> Option<&'static FormatDef> {
    FORMAT_TABLE
        .iter()
        .find(|d| d.format == format && d.version == version)
}

// ── Shared narrowing helpers ────────────────────────────────────────────────

pub(crate) fn require_u32(field: &'static str, value: u64) -> Result<u32> {
    u32::try_from(value).map_err(|_| SilkError::ValueOverflow { field, value })
}

pub(crate) fn require_u16(field: &'static str, value: u32) -> Result<u16> {
    u16::try_from(value).map_err(|_| SilkError::ValueOverflow {
        field,
        value: u64::from(value),
    })
}

pub(crate) fn require_u8(field: &'static str, value: u32) -> Result<u8> {
    u8::try_from(value).map_err(|_| SilkError::ValueOverflow {
        field,
        value: u64::from(value),
    })
}

pub(crate) fn require_v4(addr: Option<u32>) -> Result<u32> {
    addr.ok_or(SilkError::Ipv6NotRepresentable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{SENSOR_UNRESOLVED, TCP_STATE_EXPANDED, TCP_STATE_UNIFORM_SIZE};

    fn full_record() -> RwRec {
        let mut rec = RwRec::new();
        rec.start_ms = 1_690_000_123_456;
        rec.dur_ms = 30_000;
        rec.set_ipv4_addrs(0xC0A8_0101, 0x0A00_0002, 0xC0A8_01FE);
        rec.sport = 54_321;
        rec.dport = 443;
        rec.proto = 6;
        rec.pkts = 1_234;
        rec.bytes = 987_654;
        rec.flags_all = 0x10;
        rec.set_split_flags(0x02, 0x18);
        rec.tcp_state |= TCP_STATE_UNIFORM_SIZE;
        rec.application = 443;
        rec.input = 7;
        rec.output = 9;
        rec.sensor = 11;
        rec.flowtype = 4;
        rec.memo = 0xBEEF;
        rec
    }

    fn round_trip(def: &FormatDef, rec: &RwRec, big: bool) -> RwRec {
        let mut buf = vec![0u8; usize::from(def.size)];
        def.encode(rec, &mut buf, big).unwrap();
        def.decode(&buf, big)
    }

    #[test]
    fn table_keys_are_unique() {
        for (i, a) in FORMAT_TABLE.iter().enumerate() {
            for b in &FORMAT_TABLE[i + 1..] {
                assert!(
                    (a.format, a.version) != (b.format, b.version),
                    "duplicate key {:#04x}/{}",
                    a.format,
                    a.version
                );
            }
        }
    }

    #[test]
    fn on_disk_sizes_are_frozen() {
        let expected = [
            (0x15u8, 1u8, 52u8),
            (0x15, 2, 60),
            (0x0B, 1, 93),
            (0x08, 1, 93),
            (0x0F, 1, 44),
            (0x10, 1, 39),
            (0x11, 1, 39),
            (0x13, 1, 46),
        ];
        for (format, version, size) in expected {
            assert_eq!(lookup(format, version).unwrap().size, size);
        }
        assert!(lookup(0x15, 3).is_none());
        assert!(lookup(0x99, 1).is_none());
    }

    #[test]
    fn generic_v1_round_trips_every_field() {
        let def = lookup(0x15, 1).unwrap();
        let rec = full_record();
        for big in [false, true] {
            let back = round_trip(def, &rec, big);
            assert_eq!(back, rec);
        }
    }

    #[test]
    fn generic_v1_refuses_wide_values() {
        let def = lookup(0x15, 1).unwrap();
        let mut buf = vec![0u8; 52];

        let mut rec = full_record();
        rec.pkts = u64::from(u32::MAX) + 1;
        assert!(matches!(
            def.encode(&rec, &mut buf, false),
            Err(SilkError::ValueOverflow { field: "pkts", .. })
        ));

        let mut rec = full_record();
        rec.input = 70_000;
        assert!(matches!(
            def.encode(&rec, &mut buf, false),
            Err(SilkError::ValueOverflow { field: "input", .. })
        ));

        let mut rec = full_record();
        rec.set_sip("2001:db8::1".parse().unwrap());
        assert!(matches!(
            def.encode(&rec, &mut buf, false),
            Err(SilkError::Ipv6NotRepresentable)
        ));
    }

    #[test]
    fn every_layout_refuses_an_overflowing_end_time() {
        let mut rec = full_record();
        rec.start_ms = u64::MAX - 10;
        rec.dur_ms = 1_000;
        for def in &FORMAT_TABLE {
            let mut buf = vec![0u8; usize::from(def.size)];
            for big in [false, true] {
                assert!(
                    matches!(
                        def.encode(&rec, &mut buf, big),
                        Err(SilkError::ValueOverflow { field: "end_ms", .. })
                    ),
                    "layout {:#04x}/{} accepted end past u64::MAX",
                    def.format,
                    def.version
                );
            }
        }
        // The exact boundary still encodes.
        rec.dur_ms = 10;
        let def = lookup(0x15, 2).unwrap();
        let mut buf = vec![0u8; usize::from(def.size)];
        assert!(def.encode(&rec, &mut buf, false).is_ok());
    }

    #[test]
    fn generic_v2_carries_wide_interfaces() {
        let def = lookup(0x15, 2).unwrap();
        let mut rec = full_record();
        rec.input = 70_000;
        rec.output = 4_000_000;
        let mut buf = vec![0u8; 60];
        def.encode(&rec, &mut buf, false).unwrap();
        // Reserved tail must be written zero even over a dirty buffer.
        assert_eq!(&buf[56..60], &[0, 0, 0, 0]);
        let back = def.decode(&buf, false);
        assert_eq!(back, rec);
    }

    #[test]
    fn ipv6_flag_selects_family() {
        let def = lookup(0x0B, 1).unwrap();

        let mut rec = full_record();
        rec.set_ipv6_addrs(
            "2001:db8::1".parse::<std::net::Ipv6Addr>().unwrap().octets(),
            "2001:db8::2".parse::<std::net::Ipv6Addr>().unwrap().octets(),
            [0u8; 16],
        );
        let back = round_trip(def, &rec, false);
        assert!(back.is_ipv6());
        assert_eq!(back, rec);

        let v4 = full_record();
        let back = round_trip(def, &v4, true);
        assert!(!back.is_ipv6());
        assert_eq!(back, v4);
    }

    #[test]
    fn routed_folds_split_flags() {
        let def = lookup(0x0F, 1).unwrap();
        let rec = full_record();
        let back = round_trip(def, &rec, false);
        assert_eq!(back.flags_all, rec.folded_flags());
        assert_eq!(back.flags_init, 0);
        assert_eq!(back.flags_session, 0);
        assert_eq!(back.tcp_state & TCP_STATE_EXPANDED, 0);
        assert_eq!(back.tcp_state & TCP_STATE_UNIFORM_SIZE, TCP_STATE_UNIFORM_SIZE);
        assert_eq!(back.input, rec.input);
        assert_eq!(back.nhip(), rec.nhip());
    }

    #[test]
    fn routed_interfaces_are_eight_bit() {
        let def = lookup(0x0F, 1).unwrap();
        let mut buf = vec![0u8; 44];
        let mut rec = full_record();
        rec.input = 255;
        assert!(def.encode(&rec, &mut buf, false).is_ok());
        rec.input = 256;
        assert!(matches!(
            def.encode(&rec, &mut buf, false),
            Err(SilkError::ValueOverflow { field: "input", .. })
        ));
    }

    #[test]
    fn notrouted_drops_unrepresented_fields() {
        let def = lookup(0x10, 1).unwrap();
        let rec = full_record();
        let back = round_trip(def, &rec, false);
        assert_eq!(back.output, 0);
        assert_eq!(back.nhip_v4(), Some(0));
        assert_eq!(back.application, 0);
        assert_eq!(back.memo, 0);
        assert_eq!(back.sensor, rec.sensor);
    }

    #[test]
    fn split_leaves_site_ids_unresolved() {
        let def = lookup(0x11, 1).unwrap();
        let rec = full_record();
        let back = round_trip(def, &rec, false);
        assert_eq!(back.sensor, SENSOR_UNRESOLVED);
        assert_eq!(back.flowtype, 0);
        assert_eq!(back.input, rec.input);
        assert_eq!(back.output, rec.output);
    }

    #[test]
    fn augmented_keeps_split_flags_and_application() {
        let def = lookup(0x13, 1).unwrap();
        let rec = full_record();
        let back = round_trip(def, &rec, false);
        assert_eq!(back.flags_init, rec.flags_init);
        assert_eq!(back.flags_session, rec.flags_session);
        assert_eq!(back.application, rec.application);
        assert_eq!(back.memo, 0);
        assert_eq!(back.sensor, rec.sensor);
    }

    #[test]
    fn icmp_dport_is_passed_through_packed() {
        let def = lookup(0x15, 1).unwrap();
        let mut rec = full_record();
        rec.proto = 1;
        rec.sport = 0;
        rec.dport = (3 << 8) | 13;
        rec.fold_flags();
        let back = round_trip(def, &rec, false);
        assert_eq!(back.dport, 0x030D);
        assert_eq!(back.icmp_type(), 3);
        assert_eq!(back.icmp_code(), 13);
    }

    #[test]
    fn unexpanded_disk_records_have_no_split_flags() {
        let def = lookup(0x15, 1).unwrap();
        let mut rec = full_record();
        rec.fold_flags();
        let mut buf = vec![0u8; 52];
        def.encode(&rec, &mut buf, false).unwrap();
        // Corrupt the init/session bytes; without EXPANDED they are noise.
        buf[30] = 0xFF;
        buf[31] = 0xFF;
        let back = def.decode(&buf, false);
        assert_eq!(back.flags_init, 0);
        assert_eq!(back.flags_session, 0);
    }
}
