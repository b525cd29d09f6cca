//! FT_RWGENERIC: the everything-included IPv4 layout.
//!
//! ```text
//! v1 (52 bytes)                       v2 (60 bytes)
//!  0  start_ms      u64                same through offset 43
//!  8  dur_ms        u32               44  input        u32
//! 12  sip           u32               48  output       u32
//! 16  dip           u32               52  application  u16
//! 20  nhip          u32               54  memo         u16
//! 24  sport         u16               56  reserved     u32 (zero)
//! 26  dport         u16
//! 28  proto         u8
//! 29  flags_all     u8
//! 30  flags_init    u8
//! 31  flags_session u8
//! 32  tcp_state     u8
//! 33  flowtype      u8
//! 34  sensor        u16
//! 36  pkts          u32
//! 40  bytes         u32
//! 44  input         u16
//! 46  output        u16
//! 48  application   u16
//! 50  memo          u16
//! ```

use byteorder::ByteOrder;

use super::{require_u16, require_u32, require_v4};
use crate::error::Result;
use crate::record::{RwRec, TCP_STATE_EXPANDED};

fn decode_head<B: ByteOrder>(b: &[u8], rec: &mut RwRec) {
    rec.start_ms = B::read_u64(&b[0..8]);
    rec.dur_ms = B::read_u32(&b[8..12]);
    rec.set_ipv4_addrs(
        B::read_u32(&b[12..16]),
        B::read_u32(&b[16..20]),
        B::read_u32(&b[20..24]),
    );
    rec.sport = B::read_u16(&b[24..26]);
    rec.dport = B::read_u16(&b[26..28]);
    rec.proto = b[28];
    rec.flags_all = b[29];
    rec.flags_init = b[30];
    rec.flags_session = b[31];
    rec.tcp_state = b[32];
    if rec.tcp_state & TCP_STATE_EXPANDED == 0 {
        rec.flags_init = 0;
        rec.flags_session = 0;
    }
    rec.flowtype = b[33];
    rec.sensor = B::read_u16(&b[34..36]);
    rec.pkts = u64::from(B::read_u32(&b[36..40]));
    rec.bytes = u64::from(B::read_u32(&b[40..44]));
}

fn encode_head<B: ByteOrder>(rec: &RwRec, out: &mut [u8]) -> Result<()> {
    B::write_u64(&mut out[0..8], rec.start_ms);
    B::write_u32(&mut out[8..12], rec.dur_ms);
    B::write_u32(&mut out[12..16], require_v4(rec.sip_v4())?);
    B::write_u32(&mut out[16..20], require_v4(rec.dip_v4())?);
    B::write_u32(&mut out[20..24], require_v4(rec.nhip_v4())?);
    B::write_u16(&mut out[24..26], rec.sport);
    B::write_u16(&mut out[26..28], rec.dport);
    out[28] = rec.proto;
    out[29] = rec.flags_all;
    out[30] = rec.flags_init;
    out[31] = rec.flags_session;
    out[32] = rec.tcp_state;
    out[33] = rec.flowtype;
    B::write_u16(&mut out[34..36], rec.sensor);
    B::write_u32(&mut out[36..40], require_u32("pkts", rec.pkts)?);
    B::write_u32(&mut out[40..44], require_u32("bytes", rec.bytes)?);
    Ok(())
}

pub(super) fn decode_v1<B: ByteOrder>(b: &[u8], rec: &mut RwRec) {
    decode_head::<B>(b, rec);
    rec.input = u32::from(B::read_u16(&b[44..46]));
    rec.output = u32::from(B::read_u16(&b[46..48]));
    rec.application = B::read_u16(&b[48..50]);
    rec.memo = B::read_u16(&b[50..52]);
}

pub(super) fn encode_v1<B: ByteOrder>(rec: &RwRec, out: &mut [u8]) -> Result<()> {
    encode_head::<B>(rec, out)?;
    B::write_u16(&mut out[44..46], require_u16("input", rec.input)?);
    B::write_u16(&mut out[46..48], require_u16("output", rec.output)?);
    B::write_u16(&mut out[48..50], rec.application);
    B::write_u16(&mut out[50..52], rec.memo);
    Ok(())
}

pub(super) fn decode_v2<B: ByteOrder>(b: &[u8], rec: &mut RwRec) {
    decode_head::<B>(b, rec);
    rec.input = B::read_u32(&b[44..48]);
    rec.output = B::read_u32(&b[48..52]);
    rec.application = B::read_u16(&b[52..54]);
    rec.memo = B::read_u16(&b[54..56]);
    // 56..60 reserved
}

pub(super) fn encode_v2<B: ByteOrder>(rec: &RwRec, out: &mut [u8]) -> Result<()> {
    encode_head::<B>(rec, out)?;
    B::write_u32(&mut out[44..48], rec.input);
    B::write_u32(&mut out[48..52], rec.output);
    B::write_u16(&mut out[52..54], rec.application);
    B::write_u16(&mut out[54..56], rec.memo);
    out[56..60].fill(0);
    Ok(())
}
