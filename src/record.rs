//! Canonical in-memory flow record.
//!
//! Every tool in the suite manipulates sequences of [`RwRec`].  The type is
//! endian-normalized (all integers native order) and family-tagged: a record
//! is either an IPv4 record or an IPv6 record, never a mixture.  Addresses
//! are stored as 16 bytes with IPv4 kept in `::ffff:a.b.c.d` mapped form, so
//! family changes never lose bits and the three addresses cannot disagree.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use chrono::{DateTime, Utc};

// ── tcp_state bits ──────────────────────────────────────────────────────────
//
// These values are on-disk; they are never renumbered.  Bits outside the
// mask are passed through undisturbed.

/// Init/session flag fields hold real data (the flow was "expanded").
pub const TCP_STATE_EXPANDED: u8 = 0x01;
/// Packets were seen after the FIN, other than a bare ACK.
pub const TCP_STATE_FIN_FOLLOWED: u8 = 0x08;
/// All packets in the flow had the same size.
pub const TCP_STATE_UNIFORM_SIZE: u8 = 0x10;
/// The collector killed the flow with an active timeout.
pub const TCP_STATE_TIMEOUT_KILLED: u8 = 0x20;
/// The flow continues one killed earlier by an active timeout.
pub const TCP_STATE_TIMEOUT_STARTED: u8 = 0x40;

pub const TCP_STATE_MASK: u8 = TCP_STATE_EXPANDED
    | TCP_STATE_FIN_FOLLOWED
    | TCP_STATE_UNIFORM_SIZE
    | TCP_STATE_TIMEOUT_KILLED
    | TCP_STATE_TIMEOUT_STARTED;

/// Sensor id meaning "not resolved against any site dictionary".
pub const SENSOR_UNRESOLVED: u16 = 0xFFFF;

const V4_MAPPED_PREFIX: [u8; 12] = [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xFF, 0xFF];

// ── Record type ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RwRec {
    /// Flow start, milliseconds since the Unix epoch.
    pub start_ms: u64,
    /// Flow duration in milliseconds.  `end = start + duration`, so a flow
    /// can never end before it starts.
    pub dur_ms: u32,
    pub sport: u16,
    /// For ICMP/ICMPv6 this carries `(type << 8) | code` and `sport` is zero.
    pub dport: u16,
    pub proto: u8,
    pub pkts: u64,
    pub bytes: u64,
    /// OR of TCP flags over the whole flow.
    pub flags_all: u8,
    /// Flags on the first packet; valid only when `TCP_STATE_EXPANDED` is set.
    pub flags_init: u8,
    /// Flags on every packet after the first; same validity rule.
    pub flags_session: u8,
    pub tcp_state: u8,
    pub application: u16,
    pub input: u32,
    pub output: u32,
    pub sensor: u16,
    pub flowtype: u8,
    pub memo: u16,
    sip: [u8; 16],
    dip: [u8; 16],
    nhip: [u8; 16],
    ipv6: bool,
}

impl Default for RwRec {
    fn default() -> Self {
        RwRec::new()
    }
}

impl RwRec {
    /// An all-zero IPv4 record.
    pub fn new() -> Self {
        let zero = map_v4(0);
        RwRec {
            start_ms: 0,
            dur_ms: 0,
            sport: 0,
            dport: 0,
            proto: 0,
            pkts: 0,
            bytes: 0,
            flags_all: 0,
            flags_init: 0,
            flags_session: 0,
            tcp_state: 0,
            application: 0,
            input: 0,
            output: 0,
            sensor: SENSOR_UNRESOLVED,
            flowtype: 0,
            memo: 0,
            sip: zero,
            dip: zero,
            nhip: zero,
            ipv6: false,
        }
    }

    // ── Time ────────────────────────────────────────────────────────────────

    /// Flow end in milliseconds.  Saturates at `u64::MAX` so a record
    /// assembled from hostile bytes still ends no earlier than it starts.
    pub fn end_ms(&self) -> u64 {
        self.start_ms.saturating_add(u64::from(self.dur_ms))
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(i64::try_from(self.start_ms).ok()?)
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(i64::try_from(self.end_ms()).ok()?)
    }

    // ── Addresses ───────────────────────────────────────────────────────────

    pub fn is_ipv6(&self) -> bool {
        self.ipv6
    }

    pub fn sip(&self) -> IpAddr {
        unmap(&self.sip, self.ipv6)
    }

    pub fn dip(&self) -> IpAddr {
        unmap(&self.dip, self.ipv6)
    }

    pub fn nhip(&self) -> IpAddr {
        unmap(&self.nhip, self.ipv6)
    }

    /// Sets the source address.  An IPv6 address promotes the whole record
    /// to IPv6; an IPv4 address is stored in mapped form without changing
    /// the record's family.
    pub fn set_sip(&mut self, addr: IpAddr) {
        self.ipv6 |= set_addr(&mut self.sip, addr);
    }

    pub fn set_dip(&mut self, addr: IpAddr) {
        self.ipv6 |= set_addr(&mut self.dip, addr);
    }

    pub fn set_nhip(&mut self, addr: IpAddr) {
        self.ipv6 |= set_addr(&mut self.nhip, addr);
    }

    /// Installs all three addresses from 32-bit IPv4 values and marks the
    /// record IPv4.  This is the decode path for v4-only body formats.
    pub fn set_ipv4_addrs(&mut self, sip: u32, dip: u32, nhip: u32) {
        self.sip = map_v4(sip);
        self.dip = map_v4(dip);
        self.nhip = map_v4(nhip);
        self.ipv6 = false;
    }

    /// Installs all three addresses from raw 16-byte values and marks the
    /// record IPv6.
    pub fn set_ipv6_addrs(&mut self, sip: [u8; 16], dip: [u8; 16], nhip: [u8; 16]) {
        self.sip = sip;
        self.dip = dip;
        self.nhip = nhip;
        self.ipv6 = true;
    }

    /// Marks the record IPv6.  The stored addresses are already in mapped
    /// form, so this never fails and never changes address bits.
    pub fn promote_to_v6(&mut self) {
        self.ipv6 = true;
    }

    /// Marks the record IPv4 if every address is v4-mapped.  Returns whether
    /// the demotion happened.
    pub fn try_demote_to_v4(&mut self) -> bool {
        if is_mapped(&self.sip) && is_mapped(&self.dip) && is_mapped(&self.nhip) {
            self.ipv6 = false;
            true
        } else {
            false
        }
    }

    /// The source address as a 32-bit IPv4 value, if representable.
    pub fn sip_v4(&self) -> Option<u32> {
        v4_of(&self.sip)
    }

    pub fn dip_v4(&self) -> Option<u32> {
        v4_of(&self.dip)
    }

    pub fn nhip_v4(&self) -> Option<u32> {
        v4_of(&self.nhip)
    }

    /// Raw 16-byte storage form (IPv4 comes back v4-mapped).
    pub fn sip_octets(&self) -> [u8; 16] {
        self.sip
    }

    pub fn dip_octets(&self) -> [u8; 16] {
        self.dip
    }

    pub fn nhip_octets(&self) -> [u8; 16] {
        self.nhip
    }

    // ── TCP flags ───────────────────────────────────────────────────────────

    /// Stores separate initial-packet and rest-of-session flags, keeping
    /// the aggregate field consistent.
    pub fn set_split_flags(&mut self, init: u8, session: u8) {
        self.flags_init = init;
        self.flags_session = session;
        self.flags_all |= init | session;
        self.tcp_state |= TCP_STATE_EXPANDED;
    }

    /// The aggregate flag byte a split-incapable format should carry.
    pub fn folded_flags(&self) -> u8 {
        self.flags_all | self.flags_init | self.flags_session
    }

    /// Collapses split flags into the aggregate and clears them.
    pub fn fold_flags(&mut self) {
        self.flags_all = self.folded_flags();
        self.flags_init = 0;
        self.flags_session = 0;
        self.tcp_state &= !TCP_STATE_EXPANDED;
    }

    pub fn has_split_flags(&self) -> bool {
        self.tcp_state & TCP_STATE_EXPANDED != 0
    }

    // ── Protocol helpers ────────────────────────────────────────────────────

    pub fn is_icmp(&self) -> bool {
        self.proto == 1 || (self.proto == 58 && self.ipv6)
    }

    /// ICMP message type, or zero for non-ICMP records.  The `dport` field
    /// itself is never rewritten.
    pub fn icmp_type(&self) -> u8 {
        if self.is_icmp() {
            (self.dport >> 8) as u8
        } else {
            0
        }
    }

    pub fn icmp_code(&self) -> u8 {
        if self.is_icmp() {
            (self.dport & 0xFF) as u8
        } else {
            0
        }
    }
}

// ── Address storage helpers ─────────────────────────────────────────────────

fn map_v4(addr: u32) -> [u8; 16] {
    let mut out = [0u8; 16];
    out[..12].copy_from_slice(&V4_MAPPED_PREFIX);
    out[12..].copy_from_slice(&addr.to_be_bytes());
    out
}

fn is_mapped(octets: &[u8; 16]) -> bool {
    octets[..12] == V4_MAPPED_PREFIX
}

fn v4_of(octets: &[u8; 16]) -> Option<u32> {
    if is_mapped(octets) {
        Some(u32::from_be_bytes([
            octets[12], octets[13], octets[14], octets[15],
        ]))
    } else {
        None
    }
}

fn unmap(octets: &[u8; 16], ipv6: bool) -> IpAddr {
    if ipv6 {
        IpAddr::V6(Ipv6Addr::from(*octets))
    } else {
        IpAddr::V4(Ipv4Addr::new(octets[12], octets[13], octets[14], octets[15]))
    }
}

/// Writes `addr` into storage form; returns true when the record must
/// become IPv6 to hold it.
fn set_addr(slot: &mut [u8; 16], addr: IpAddr) -> bool {
    match addr {
        IpAddr::V4(a) => {
            *slot = map_v4(u32::from(a));
            false
        }
        IpAddr::V6(a) => {
            *slot = a.octets();
            true
        }
    }
}
