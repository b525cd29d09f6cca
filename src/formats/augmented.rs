//! FT_RWAUGMENTED: FT_RWSPLIT plus split TCP flags, application label, and
//! in-record site ids (46 bytes).  Still no next hop or memo.

use byteorder::ByteOrder;

use super::{require_u16, require_u32, require_v4};
use crate::error::Result;
use crate::record::{RwRec, TCP_STATE_EXPANDED};

pub(super) fn decode_v1<B: ByteOrder>(b: &[u8], rec: &mut RwRec) {
    rec.start_ms = B::read_u64(&b[0..8]);
    rec.dur_ms = B::read_u32(&b[8..12]);
    rec.set_ipv4_addrs(B::read_u32(&b[12..16]), B::read_u32(&b[16..20]), 0);
    rec.sport = B::read_u16(&b[20..22]);
    rec.dport = B::read_u16(&b[22..24]);
    rec.proto = b[24];
    rec.flags_all = b[25];
    rec.flags_init = b[26];
    rec.flags_session = b[27];
    rec.tcp_state = b[28];
    if rec.tcp_state & TCP_STATE_EXPANDED == 0 {
        rec.flags_init = 0;
        rec.flags_session = 0;
    }
    rec.flowtype = b[29];
    rec.sensor = B::read_u16(&b[30..32]);
    rec.pkts = u64::from(B::read_u32(&b[32..36]));
    rec.bytes = u64::from(B::read_u32(&b[36..40]));
    rec.input = u32::from(B::read_u16(&b[40..42]));
    rec.output = u32::from(B::read_u16(&b[42..44]));
    rec.application = B::read_u16(&b[44..46]);
}

pub(super) fn encode_v1<B: ByteOrder>(rec: &RwRec, out: &mut [u8]) -> Result<()> {
    B::write_u64(&mut out[0..8], rec.start_ms);
    B::write_u32(&mut out[8..12], rec.dur_ms);
    B::write_u32(&mut out[12..16], require_v4(rec.sip_v4())?);
    B::write_u32(&mut out[16..20], require_v4(rec.dip_v4())?);
    B::write_u16(&mut out[20..22], rec.sport);
    B::write_u16(&mut out[22..24], rec.dport);
    out[24] = rec.proto;
    out[25] = rec.flags_all;
    out[26] = rec.flags_init;
    out[27] = rec.flags_session;
    out[28] = rec.tcp_state;
    out[29] = rec.flowtype;
    B::write_u16(&mut out[30..32], rec.sensor);
    B::write_u32(&mut out[32..36], require_u32("pkts", rec.pkts)?);
    B::write_u32(&mut out[36..40], require_u32("bytes", rec.bytes)?);
    B::write_u16(&mut out[40..42], require_u16("input", rec.input)?);
    B::write_u16(&mut out[42..44], require_u16("output", rec.output)?);
    B::write_u16(&mut out[44..46], rec.application);
    Ok(())
}
