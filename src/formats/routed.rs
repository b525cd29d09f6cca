//! FT_RWROUTED: routed IPv4 traffic with next-hop and 8-bit interface
//! indices (44 bytes).  No split flags, application, or memo.

use byteorder::ByteOrder;

use super::{require_u32, require_u8, require_v4};
use crate::error::Result;
use crate::record::{RwRec, TCP_STATE_EXPANDED};

pub(super) fn decode_v1<B: ByteOrder>(b: &[u8], rec: &mut RwRec) {
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
    rec.tcp_state = b[30] & !TCP_STATE_EXPANDED;
    rec.flowtype = b[31];
    rec.sensor = B::read_u16(&b[32..34]);
    rec.pkts = u64::from(B::read_u32(&b[34..38]));
    rec.bytes = u64::from(B::read_u32(&b[38..42]));
    rec.input = u32::from(b[42]);
    rec.output = u32::from(b[43]);
}

pub(super) fn encode_v1<B: ByteOrder>(rec: &RwRec, out: &mut [u8]) -> Result<()> {
    B::write_u64(&mut out[0..8], rec.start_ms);
    B::write_u32(&mut out[8..12], rec.dur_ms);
    B::write_u32(&mut out[12..16], require_v4(rec.sip_v4())?);
    B::write_u32(&mut out[16..20], require_v4(rec.dip_v4())?);
    B::write_u32(&mut out[20..24], require_v4(rec.nhip_v4())?);
    B::write_u16(&mut out[24..26], rec.sport);
    B::write_u16(&mut out[26..28], rec.dport);
    out[28] = rec.proto;
    out[29] = rec.folded_flags();
    out[30] = rec.tcp_state & !TCP_STATE_EXPANDED;
    out[31] = rec.flowtype;
    B::write_u16(&mut out[32..34], rec.sensor);
    B::write_u32(&mut out[34..38], require_u32("pkts", rec.pkts)?);
    B::write_u32(&mut out[38..42], require_u32("bytes", rec.bytes)?);
    out[42] = require_u8("input", rec.input)?;
    out[43] = require_u8("output", rec.output)?;
    Ok(())
}
