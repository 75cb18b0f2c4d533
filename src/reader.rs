use crate::{
    common::{
        has_data_left,
        LinkLayerType,
        PcapError,
        PcapResult,
    },
    config::{
        prealloc_len,
        ReaderConfig,
    },
    header::PcapHeader,
    packet::RecordHeader,
    traffic::{
        Packet,
        PacketInfo,
        Traffic,
    },
};
use std::io::{
    BufReader,
    Read,
};
use tracing::{
    debug,
    trace,
};

/// A reader of a classic Pcap file. Can target any `std::io::Read` implementor.
///
/// The record header and the payload are read into scratch buffers owned by the reader, so a
/// stream costs a single payload allocation no matter how many packets it holds.
#[derive(Debug)]
pub struct PcapReader<R>
where
    R: Read,
{
    header: PcapHeader,
    // `None` once the source has been released.
    reader: Option<BufReader<R>>,
    record: [u8; RecordHeader::LEN],
    data: Vec<u8>,
}

impl<R> PcapReader<R>
where
    R: Read,
{
    /// Parses the global header with the default [`ReaderConfig`].
    pub fn new(reader: R) -> PcapResult<Self> {
        Self::with_config(reader, &ReaderConfig::default())
    }

    /// Parses the global header.
    ///
    /// `PcapError::Empty` when the source holds no bytes, `PcapError::MalformedInput` for a short
    /// header or an unknown magic and `PcapError::UnsupportedVersion` for anything but 2.4. The
    /// source is dropped on failure.
    pub fn with_config(reader: R, config: &ReaderConfig) -> PcapResult<Self> {
        let mut reader = BufReader::with_capacity(config.buffer_capacity, reader);
        if !has_data_left(&mut reader)? {
            return Err(PcapError::Empty);
        }

        let header = PcapHeader::read(&mut reader)?;
        debug!(
            endianness = ?header.endianness,
            ts_resolution = ?header.ts_resolution,
            snaplen = header.snaplen,
            link_type = %header.link_type,
            "opened pcap stream"
        );

        Ok(Self {
            header,
            reader: Some(reader),
            record: [0; RecordHeader::LEN],
            data: Vec::with_capacity(prealloc_len(header.snaplen)),
        })
    }

    /// Return the pcap file header.
    pub fn header(&self) -> PcapHeader {
        self.header
    }

    /// Whether the byte source has been released.
    pub fn is_stopped(&self) -> bool {
        self.reader.is_none()
    }
}

/// Reads one record into `data`. `Ok(None)` on a clean end of file before the record header.
fn read_record<R>(
    reader: &mut BufReader<R>,
    header: &PcapHeader,
    record: &mut [u8; RecordHeader::LEN],
    data: &mut Vec<u8>,
) -> PcapResult<Option<PacketInfo>>
where
    R: Read,
{
    if !has_data_left(reader)? {
        return Ok(None);
    }
    reader.read_exact(record)?;
    let record = RecordHeader::parse(record, header.endianness);

    if record.incl_len > header.snaplen {
        debug!(
            incl_len = record.incl_len,
            snaplen = header.snaplen,
            "record exceeds snapshot length"
        );
        return Err(PcapError::MalformedInput(
            "captured length exceeds snapshot length",
        ));
    }

    data.clear();
    let read = reader
        .by_ref()
        .take(u64::from(record.incl_len))
        .read_to_end(data)?;
    if read != record.incl_len as usize {
        return Err(PcapError::MalformedInput("truncated packet data"));
    }

    trace!(incl_len = record.incl_len, orig_len = record.orig_len, "pcap record");
    Ok(Some(PacketInfo {
        capture_time: Some(record.capture_time(header.ts_resolution)?),
        size: record.orig_len,
    }))
}

impl<R> Traffic for PcapReader<R>
where
    R: Read,
{
    fn next_packet(&mut self) -> PcapResult<Option<(PacketInfo, Packet<'_>)>> {
        let Some(reader) = self.reader.as_mut() else {
            return Err(PcapError::AlreadyStopped);
        };

        match read_record(reader, &self.header, &mut self.record, &mut self.data) {
            Ok(Some(info)) => Ok(Some((info, Packet::new(&self.data)))),
            Ok(None) => {
                self.stop();
                Ok(None)
            }
            Err(e) => {
                self.stop();
                Err(e)
            }
        }
    }

    fn link_layer_type(&self) -> LinkLayerType {
        self.header.link_type
    }

    fn stop(&mut self) {
        if self.reader.take().is_some() {
            debug!("pcap source released");
        }
    }
}
