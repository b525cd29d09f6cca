//! FT_RWIPV6: the family-flagged superset layout (93 bytes), shared by
//! FT_TEMPFILE so spill streams are lossless.
//!
//! ```text
//!  0  start_ms      u64      61  sport         u16
//!  8  dur_ms        u32      63  dport         u16
//! 12  family        u8       65  proto         u8
//! 13  sip           16B      66  flags_all     u8
//! 29  dip           16B      67  flags_init    u8
//! 45  nhip          16B      68  flags_session u8
//!                            69  tcp_state     u8
//!                            70  flowtype      u8
//!                            71  sensor        u16
//!                            73  pkts          u32
//!                            77  bytes         u32
//!                            81  input         u32
//!                            85  output        u32
//!                            89  application   u16
//!                            91  memo          u16
//! ```
//!
//! Addresses are always 16 bytes in network order; IPv4 records hold the
//! `::ffff:` mapped form with family byte 0.  Byte order applies to the
//! integer fields only.

use byteorder::ByteOrder;

use super::require_u32;
use crate::error::Result;
use crate::record::{RwRec, TCP_STATE_EXPANDED};

const FAMILY_V6: u8 = 0x01;

fn v4_tail(octets: &[u8; 16]) -> u32 {
    u32::from_be_bytes([octets[12], octets[13], octets[14], octets[15]])
}

pub(super) fn decode_v1<B: ByteOrder>(b: &[u8], rec: &mut RwRec) {
    rec.start_ms = B::read_u64(&b[0..8]);
    rec.dur_ms = B::read_u32(&b[8..12]);

    let mut sip = [0u8; 16];
    let mut dip = [0u8; 16];
    let mut nhip = [0u8; 16];
    sip.copy_from_slice(&b[13..29]);
    dip.copy_from_slice(&b[29..45]);
    nhip.copy_from_slice(&b[45..61]);
    if b[12] & FAMILY_V6 != 0 {
        rec.set_ipv6_addrs(sip, dip, nhip);
    } else {
        rec.set_ipv4_addrs(v4_tail(&sip), v4_tail(&dip), v4_tail(&nhip));
    }

    rec.sport = B::read_u16(&b[61..63]);
    rec.dport = B::read_u16(&b[63..65]);
    rec.proto = b[65];
    rec.flags_all = b[66];
    rec.flags_init = b[67];
    rec.flags_session = b[68];
    rec.tcp_state = b[69];
    if rec.tcp_state & TCP_STATE_EXPANDED == 0 {
        rec.flags_init = 0;
        rec.flags_session = 0;
    }
    rec.flowtype = b[70];
    rec.sensor = B::read_u16(&b[71..73]);
    rec.pkts = u64::from(B::read_u32(&b[73..77]));
    rec.bytes = u64::from(B::read_u32(&b[77..81]));
    rec.input = B::read_u32(&b[81..85]);
    rec.output = B::read_u32(&b[85..89]);
    rec.application = B::read_u16(&b[89..91]);
    rec.memo = B::read_u16(&b[91..93]);
}

pub(super) fn encode_v1<B: ByteOrder>(rec: &RwRec, out: &mut [u8]) -> Result<()> {
    B::write_u64(&mut out[0..8], rec.start_ms);
    B::write_u32(&mut out[8..12], rec.dur_ms);
    out[12] = if rec.is_ipv6() { FAMILY_V6 } else { 0 };
    out[13..29].copy_from_slice(&rec.sip_octets());
    out[29..45].copy_from_slice(&rec.dip_octets());
    out[45..61].copy_from_slice(&rec.nhip_octets());
    B::write_u16(&mut out[61..63], rec.sport);
    B::write_u16(&mut out[63..65], rec.dport);
    out[65] = rec.proto;
    out[66] = rec.flags_all;
    out[67] = rec.flags_init;
    out[68] = rec.flags_session;
    out[69] = rec.tcp_state;
    out[70] = rec.flowtype;
    B::write_u16(&mut out[71..73], rec.sensor);
    B::write_u32(&mut out[73..77], require_u32("pkts", rec.pkts)?);
    B::write_u32(&mut out[77..81], require_u32("bytes", rec.bytes)?);
    B::write_u32(&mut out[81..85], rec.input);
    B::write_u32(&mut out[85..89], rec.output);
    B::write_u16(&mut out[89..91], rec.application);
    B::write_u16(&mut out[91..93], rec.memo);
    Ok(())
}
