//! FT_RWNOTROUTED: traffic that never left the sensor's network (39 bytes).
//! There is no next hop and no egress interface to record; only the 8-bit
//! ingress index survives.

use byteorder::ByteOrder;

use super::{require_u32, require_u8, require_v4};
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
    rec.tcp_state = b[26] & !TCP_STATE_EXPANDED;
    rec.flowtype = b[27];
    rec.sensor = B::read_u16(&b[28..30]);
    rec.pkts = u64::from(B::read_u32(&b[30..34]));
    rec.bytes = u64::from(B::read_u32(&b[34..38]));
    rec.input = u32::from(b[38]);
}

pub(super) fn encode_v1<B: ByteOrder>(rec: &RwRec, out: &mut [u8]) -> Result<()> {
    B::write_u64(&mut out[0..8], rec.start_ms);
    B::write_u32(&mut out[8..12], rec.dur_ms);
    B::write_u32(&mut out[12..16], require_v4(rec.sip_v4())?);
    B::write_u32(&mut out[16..20], require_v4(rec.dip_v4())?);
    B::write_u16(&mut out[20..22], rec.sport);
    B::write_u16(&mut out[22..24], rec.dport);
    out[24] = rec.proto;
    out[25] = rec.folded_flags();
    out[26] = rec.tcp_state & !TCP_STATE_EXPANDED;
    out[27] = rec.flowtype;
    B::write_u16(&mut out[28..30], rec.sensor);
    B::write_u32(&mut out[30..34], require_u32("pkts", rec.pkts)?);
    B::write_u32(&mut out[34..38], require_u32("bytes", rec.bytes)?);
    out[38] = require_u8("input", rec.input)?;
    Ok(())
}
