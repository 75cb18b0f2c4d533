//! The streaming contract shared by the pcap and pcapng decoders.

use crate::common::{
    LinkLayerType,
    PcapResult,
};
use chrono::{
    DateTime,
    Utc,
};
use std::ops::Deref;

/// Per packet metadata.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct PacketInfo {
    /// When the packet was captured, in UTC.
    ///
    /// `None` for pcapng Simple Packet Blocks, which carry no timestamp.
    pub capture_time: Option<DateTime<Utc>>,

    /// Original length of the packet on the wire. May exceed the captured length.
    pub size: u32,
}

/// The captured bytes of a packet, borrowed from the decoder's scratch buffer.
///
/// The view lives only until the next call to [`Traffic::next_packet`] or [`Traffic::stop`],
/// both of which take `&mut self`. Copy it out (`to_vec`) to keep the bytes around.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Packet<'a>(&'a [u8]);

impl<'a> Packet<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Packet(data)
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.0
    }
}

impl Deref for Packet<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.0
    }
}

impl AsRef<[u8]> for Packet<'_> {
    fn as_ref(&self) -> &[u8] {
        self.0
    }
}

/// A forward only source of packets, independent of the on-disk format.
///
/// Every terminal outcome (end of stream, any error, or `stop`) releases the underlying byte
/// source. Afterwards `next_packet` returns [`crate::PcapError::AlreadyStopped`].
pub trait Traffic {
    /// Returns the next packet in file order, or `Ok(None)` once the input is cleanly exhausted.
    fn next_packet(&mut self) -> PcapResult<Option<(PacketInfo, Packet<'_>)>>;

    /// Link-layer type of the current (most recent) interface.
    fn link_layer_type(&self) -> LinkLayerType;

    /// Releases the byte source. Safe to call any number of times.
    fn stop(&mut self);
}

impl<T> Traffic for Box<T>
where
    T: Traffic + ?Sized,
{
    fn next_packet(&mut self) -> PcapResult<Option<(PacketInfo, Packet<'_>)>> {
        (**self).next_packet()
    }

    fn link_layer_type(&self) -> LinkLayerType {
        (**self).link_layer_type()
    }

    fn stop(&mut self) {
        (**self).stop()
    }
}
