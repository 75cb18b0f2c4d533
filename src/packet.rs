use crate::common::{
    capture_time,
    Endianness,
    PcapResult,
    TsResolution,
};
use chrono::{
    DateTime,
    Utc,
};

/// Pcap record header, the 16 bytes in front of every packet payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    /// Timestamp in seconds.
    pub ts_sec: u32,
    /// Nanosecond or microsecond part of the timestamp.
    pub ts_frac: u32,
    /// Length of the packet that is saved in the file (length of the data that follows).
    pub incl_len: u32,
    /// Original length of the packet on the wire.
    pub orig_len: u32,
}

impl RecordHeader {
    /// The size of the record header.
    pub const LEN: usize = 16;

    /// Decodes the header out of its raw bytes.
    pub fn parse(bytes: &[u8; Self::LEN], endianness: Endianness) -> Self {
        RecordHeader {
            ts_sec: endianness.u32_at(bytes, 0),
            ts_frac: endianness.u32_at(bytes, 4),
            incl_len: endianness.u32_at(bytes, 8),
            orig_len: endianness.u32_at(bytes, 12),
        }
    }

    /// Capture time of the record, scaling the fraction by the file's resolution.
    pub fn capture_time(&self, ts_resolution: TsResolution) -> PcapResult<DateTime<Utc>> {
        let nanos = u64::from(self.ts_frac) * ts_resolution.nanos_factor();
        capture_time(i64::from(self.ts_sec), nanos)
    }
}
