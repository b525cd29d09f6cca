//! IPv6 handling policy, applied to every record crossing the stream
//! boundary.
//!
//! Reads apply the policy after decode; writes apply it before encode.  A
//! "skip" outcome is invisible to the caller: the reader keeps advancing
//! until a record passes or the stream ends, and both sides count what they
//! dropped.  Applying a policy twice is the same as applying it once.

use crate::error::{Result, SilkError};
use crate::record::RwRec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Ipv6Policy {
    /// Drop IPv6 records on read; refuse them on write.
    IgnoreV6,
    /// Demote v4-mapped records to IPv4; drop records that cannot demote.
    AsV4,
    /// Pass records through in whichever family they arrive.
    #[default]
    Mix,
    /// Promote IPv4 records to v4-mapped IPv6.
    ForceV6,
}

impl Ipv6Policy {
    /// Read-side rule.  Returns whether the record is visible to the caller;
    /// the record may have changed family either way.
    pub fn apply_read(self, rec: &mut RwRec) -> bool {
        match self {
            Ipv6Policy::Mix => true,
            Ipv6Policy::IgnoreV6 => !rec.is_ipv6(),
            Ipv6Policy::AsV4 => !rec.is_ipv6() || rec.try_demote_to_v4(),
            Ipv6Policy::ForceV6 => {
                rec.promote_to_v6();
                true
            }
        }
    }

    /// Write-side rule.  `Ok(false)` means "drop this record and count it";
    /// only `IgnoreV6` turns an IPv6 record into a hard error, because the
    /// caller asked for a stream that must never contain one.
    pub fn apply_write(self, rec: &mut RwRec) -> Result<bool> {
        match self {
            Ipv6Policy::Mix => Ok(true),
            Ipv6Policy::IgnoreV6 => {
                if rec.is_ipv6() {
                    Err(SilkError::PolicyViolation(
                        "IPv6 record written to an ignore_v6 stream",
                    ))
                } else {
                    Ok(true)
                }
            }
            Ipv6Policy::AsV4 => Ok(!rec.is_ipv6() || rec.try_demote_to_v4()),
            Ipv6Policy::ForceV6 => {
                rec.promote_to_v6();
                Ok(true)
            }
        }
    }
}
