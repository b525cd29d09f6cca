//! FT_RWSPLIT: the hourly-repository layout (39 bytes).  Records carry no
//! sensor or flowtype; the packed-file header entry names them for the whole
//! file, and the stream layer overlays those ids after decode.  Site ids
//! therefore come back "unresolved" from the bare codec.

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
    rec.tcp_state = b[26] & !TCP_STATE_EXPANDED;
    rec.pkts = u64::from(B::read_u32(&b[27..31]));
    rec.bytes = u64::from(B::read_u32(&b[31..35]));
    rec.input = u32::from(B::read_u16(&b[35..37]));
    rec.output = u32::from(B::read_u16(&b[37..39]));
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
    B::write_u32(&mut out[27..31], require_u32("pkts", rec.pkts)?);
    B::write_u32(&mut out[31..35], require_u32("bytes", rec.bytes)?);
    B::write_u16(&mut out[35..37], require_u16("input", rec.input)?);
    B::write_u16(&mut out[37..39], require_u16("output", rec.output)?);
    Ok(())
}
