//! Streams packets out of classic pcap and pcapng capture files.
//!
//! Both decoders implement [`Traffic`]: pull packets with [`Traffic::next_packet`] until it
//! returns `Ok(None)`. The packet bytes borrow the decoder's scratch buffer and are overwritten
//! by the next call.
//!
//! ```no_run
//! use pcap_traffic::Traffic;
//!
//! let mut traffic = pcap_traffic::open("capture.pcapng")?;
//! while let Some((info, packet)) = traffic.next_packet()? {
//!     println!("{:?}\t{}\t{}", info.capture_time, info.size, packet.len());
//! }
//! # Ok::<(), pcap_traffic::PcapError>(())
//! ```
#![deny(unsafe_code)]

pub(crate) mod common;
pub(crate) mod config;
pub(crate) mod file;
pub(crate) mod header;
pub(crate) mod interface;
pub(crate) mod packet;
pub(crate) mod pcapng;
pub(crate) mod reader;
pub(crate) mod traffic;

pub use common::{
    Endianness,
    LinkLayerType,
    PcapError,
    PcapResult,
    TsResolution,
};
pub use config::{
    ReaderConfig,
    DEFAULT_BUFFER_CAPACITY,
    DEFAULT_MAX_BLOCK_LEN,
};
pub use file::{
    open,
    open_with,
    Format,
};
pub use header::PcapHeader;
pub use interface::{
    InterfaceDescription,
    TsParams,
};
pub use packet::RecordHeader;
pub use pcapng::PcapNgReader;
pub use reader::PcapReader;
pub use traffic::{
    Packet,
    PacketInfo,
    Traffic,
};
