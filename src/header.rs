//! The header is based on the following structure from C
//!
//! ```c
//! typedef struct pcap_hdr_s {
//!     guint32 magic_number;   /* magic number */
//!     guint16 version_major;  /* major version number */
//!     guint16 version_minor;  /* minor version number */
//!     gint32  thiszone;       /* GMT to local correction */
//!     guint32 sigfigs;        /* accuracy of timestamps */
//!     guint32 snaplen;        /* max length of captured packets, in octets */
//!     guint32 network;        /* data link type */
//! } pcap_hdr_t;
//! ```
//!
//! The magic number selects both the byte order of every following field and the resolution of
//! the record timestamps. Only version 2.4 is accepted, it has been current since 1998.
//!
//! See <https://wiki.wireshark.org/Development/LibpcapFileFormat>.

use crate::common::{
    BigEndianReader,
    Endianness,
    LinkLayerType,
    LittleEndianReader,
    PcapError,
    PcapResult,
    ReadEndian,
    TsResolution,
};
use std::io::Read;

/// Pcap file global header.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct PcapHeader {
    /// Major version number.
    pub version_major: u16,

    /// Minor version number.
    pub version_minor: u16,

    /// GMT to local timezone correction, should always be 0.
    pub ts_correction: i32,

    /// Timestamp accuracy, should always be 0.
    pub ts_accuracy: u32,

    /// Max length of captured packet, typically 65535.
    pub snaplen: u32,

    /// Link-layer type (the first layer in the packets).
    pub link_type: LinkLayerType,

    /// Timestamp resolution of the pcap (microsecond or nanosecond).
    pub ts_resolution: TsResolution,

    /// Endianness of the pcap (excluding the packet data).
    pub endianness: Endianness,
}

impl PcapHeader {
    /// The size of the header.
    pub const LEN: u32 = 24;

    /// Parses a [`PcapHeader`] from a bytes reader.
    ///
    /// A short read is `PcapError::MalformedInput`, an unknown magic too. A version other than
    /// 2.4 is `PcapError::UnsupportedVersion`.
    pub fn read<R>(reader: R) -> PcapResult<PcapHeader>
    where
        R: Read,
    {
        fn _read(
            mut reader: impl ReadEndian,
            ts_resolution: TsResolution,
        ) -> PcapResult<PcapHeader> {
            let header = PcapHeader {
                version_major: reader.read_u16()?,
                version_minor: reader.read_u16()?,
                ts_correction: reader.read_i32()?,
                ts_accuracy: reader.read_u32()?,
                snaplen: reader.read_u32()?,
                link_type: LinkLayerType::from(reader.read_u32()?),
                ts_resolution,
                endianness: reader.endianness(),
            };

            if header.version_major != 2 || header.version_minor != 4 {
                return Err(PcapError::UnsupportedVersion {
                    major: header.version_major,
                    minor: header.version_minor,
                });
            }
            Ok(header)
        }

        let mut reader = BigEndianReader::from(reader);
        match reader.read_u32()? {
            0xA1B2C3D4 => _read(reader, TsResolution::MicroSecond),
            0xA1B23C4D => _read(reader, TsResolution::NanoSecond),
            0xD4C3B2A1 => _read(LittleEndianReader::from(reader), TsResolution::MicroSecond),
            0x4D3CB2A1 => _read(LittleEndianReader::from(reader), TsResolution::NanoSecond),
            _ => Err(PcapError::MalformedInput("incorrect magic number")),
        }
    }
}
