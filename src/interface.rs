//! Interface Description Block contents: the fixed fields, the option list and the timestamp
//! scaling they imply.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +---------------------------------------------------------------+
//! |           LinkType            |           Reserved            |
//! +---------------------------------------------------------------+
//! |                            SnapLen                            |
//! +---------------------------------------------------------------+
//! /                      Options (variable)                       /
//! +---------------------------------------------------------------+
//! ```
//!
//! Options are `code(2) | length(2) | value` with the value padded to 32 bits. Code 0 ends the
//! list.

use crate::common::{
    capture_time,
    Endianness,
    LinkLayerType,
    PcapError,
    PcapResult,
    NANOS_PER_SEC,
};
use chrono::{
    DateTime,
    Utc,
};
use md5::{
    Digest,
    Md5,
};

pub(crate) const OPT_ENDOFOPT: u16 = 0;
pub(crate) const IF_NAME: u16 = 2;
pub(crate) const IF_TSRESOL: u16 = 9;
pub(crate) const IF_TSZONE: u16 = 10;
pub(crate) const IF_TSOFFSET: u16 = 14;

/// Resolution used when an interface carries no `if_tsresol` option: 10^-6 seconds.
pub(crate) const DEFAULT_TSRESOL: u8 = 6;

/// Integer parameters turning raw pcapng timestamp ticks into seconds and nanoseconds.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct TsParams {
    /// Ticks per second.
    pub second_mask: u64,
    pub scale_up: u64,
    pub scale_down: u64,
}

impl TsParams {
    /// Decodes an `if_tsresol` byte. With the high bit set the remaining bits are a power of two,
    /// otherwise a power of ten.
    pub fn from_resolution(resolution: u8) -> PcapResult<Self> {
        let exponent = u32::from(resolution & 0x7F);
        let second_mask = if resolution & 0x80 != 0 {
            1u64.checked_shl(exponent)
        } else {
            10u64.checked_pow(exponent)
        }
        .ok_or(PcapError::MalformedInput(
            "unrepresentable timestamp resolution",
        ))?;

        let (scale_up, scale_down) = if second_mask < NANOS_PER_SEC {
            (NANOS_PER_SEC / second_mask, 1)
        } else {
            (1, second_mask / NANOS_PER_SEC)
        };

        Ok(TsParams {
            second_mask,
            scale_up,
            scale_down,
        })
    }

    /// Converts the 64 bit tick count of an Enhanced Packet Block, `offset` is `if_tsoffset`.
    pub fn capture_time(&self, ticks: u64, offset: i64) -> PcapResult<DateTime<Utc>> {
        let secs = i64::try_from(ticks / self.second_mask)
            .ok()
            .and_then(|secs| secs.checked_add(offset))
            .ok_or(PcapError::MalformedInput("timestamp out of range"))?;
        let nanos = ticks % self.second_mask * self.scale_up / self.scale_down;
        capture_time(secs, nanos)
    }
}

impl Default for TsParams {
    fn default() -> Self {
        TsParams {
            second_mask: 1_000_000,
            scale_up: 1000,
            scale_down: 1,
        }
    }
}

fn name_digest(name: &[u8]) -> [u8; 16] {
    let mut hash = [0u8; 16];
    hash.copy_from_slice(&Md5::digest(name));
    hash
}

/// Walks a pcapng option list, yielding `(code, value)` pairs.
#[derive(Debug, Clone)]
pub(crate) struct Options<'a> {
    data: &'a [u8],
    endianness: Endianness,
}

impl<'a> Options<'a> {
    pub(crate) fn new(data: &'a [u8], endianness: Endianness) -> Self {
        Options { data, endianness }
    }
}

impl<'a> Iterator for Options<'a> {
    type Item = PcapResult<(u16, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        // Fewer than 4 bytes left can only be padding.
        if self.data.len() < 4 {
            return None;
        }

        let code = self.endianness.u16_at(self.data, 0);
        if code == OPT_ENDOFOPT {
            self.data = &[];
            return None;
        }

        let len = usize::from(self.endianness.u16_at(self.data, 2));
        let Some(value) = self.data.get(4..4 + len) else {
            self.data = &[];
            return Some(Err(PcapError::MalformedInput("option overruns its block")));
        };

        let padded = (4 + len + 3) & !3;
        self.data = self.data.get(padded..).unwrap_or(&[]);
        Some(Ok((code, value)))
    }
}

/// Everything an Interface Description Block says about its interface.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct InterfaceDescription {
    pub link_type: LinkLayerType,
    pub snaplen: u32,
    /// MD5 digest of `if_name`, if present.
    pub name_hash: Option<[u8; 16]>,
    pub ts: TsParams,
    /// `if_tszone`, kept for callers, not applied to capture times.
    pub time_zone: i32,
    /// `if_tsoffset` in seconds.
    pub time_offset: i64,
}

impl InterfaceDescription {
    /// Length of the fixed part of the body (link type, reserved, snaplen).
    pub const FIXED_LEN: usize = 8;

    /// Link-layer type of the fixed part, the 16 bit field widened.
    pub(crate) fn link_type_of(
        fixed: &[u8; Self::FIXED_LEN],
        endianness: Endianness,
    ) -> LinkLayerType {
        LinkLayerType::from(endianness.u16_at(fixed, 0))
    }

    /// Digest of the first `if_name` option. Scanning stops quietly at a malformed option.
    pub(crate) fn name_hash_of(options: &[u8], endianness: Endianness) -> Option<[u8; 16]> {
        Options::new(options, endianness)
            .map_while(Result::ok)
            .find(|(code, _)| *code == IF_NAME)
            .map(|(_, value)| name_digest(value))
    }

    /// Parses the fixed part and the option list of a block body.
    pub fn parse(
        fixed: &[u8; Self::FIXED_LEN],
        options: &[u8],
        endianness: Endianness,
    ) -> PcapResult<Self> {
        let mut name_hash = None;
        let mut resolution = DEFAULT_TSRESOL;
        let mut time_zone = 0;
        let mut time_offset = 0;

        for option in Options::new(options, endianness) {
            let (code, value) = option?;
            match code {
                IF_NAME if name_hash.is_none() => name_hash = Some(name_digest(value)),
                IF_TSRESOL => {
                    resolution = *value
                        .first()
                        .ok_or(PcapError::MalformedInput("empty if_tsresol option"))?;
                }
                IF_TSZONE => {
                    if value.len() != 4 {
                        return Err(PcapError::MalformedInput("if_tszone must be 4 bytes"));
                    }
                    time_zone = endianness.i32_at(value, 0);
                }
                IF_TSOFFSET => {
                    if value.len() != 8 {
                        return Err(PcapError::MalformedInput("if_tsoffset must be 8 bytes"));
                    }
                    time_offset = endianness.i64_at(value, 0);
                }
                _ => {}
            }
        }

        Ok(InterfaceDescription {
            link_type: Self::link_type_of(fixed, endianness),
            snaplen: endianness.u32_at(fixed, 4),
            name_hash,
            ts: TsParams::from_resolution(resolution)?,
            time_zone,
            time_offset,
        })
    }
}
