use crate::{
    common::{
        PcapError,
        PcapResult,
    },
    config::ReaderConfig,
    pcapng::PcapNgReader,
    reader::PcapReader,
    traffic::Traffic,
};
use std::{
    fs::File,
    path::Path,
};
use tracing::debug;

/// On-disk capture format, chosen by file extension.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Format {
    /// Classic libpcap, `.pcap`.
    Pcap,
    /// Block structured, `.pcapng`.
    PcapNg,
}

impl Format {
    /// Looks the format up by extension. The match is case sensitive.
    pub fn from_path(path: impl AsRef<Path>) -> PcapResult<Self> {
        match path.as_ref().extension().and_then(|ext| ext.to_str()) {
            Some("pcap") => Ok(Format::Pcap),
            Some("pcapng") => Ok(Format::PcapNg),
            _ => Err(PcapError::UnknownExtension),
        }
    }
}

/// Opens a capture file with the default [`ReaderConfig`].
pub fn open(path: impl AsRef<Path>) -> PcapResult<Box<dyn Traffic + Send>> {
    open_with(path, &ReaderConfig::default())
}

/// Opens a capture file, picking the decoder from its extension.
///
/// An unknown extension fails before the file is touched.
pub fn open_with(
    path: impl AsRef<Path>,
    config: &ReaderConfig,
) -> PcapResult<Box<dyn Traffic + Send>> {
    let path = path.as_ref();
    let format = Format::from_path(path)?;
    let file = File::open(path).map_err(PcapError::Io)?;
    debug!(path = %path.display(), ?format, "opening capture");

    let traffic: Box<dyn Traffic + Send> = match format {
        Format::Pcap => Box::new(PcapReader::with_config(file, config)?),
        Format::PcapNg => Box::new(PcapNgReader::with_config(file, config)?),
    };
    Ok(traffic)
}
